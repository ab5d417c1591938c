//! PluginManager - loads native plugins and proxies calls into them

use libloading::{Library, Symbol};
use std::collections::BTreeMap;
use std::mem::ManuallyDrop;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use edito_plugin_api::{
    API_VERSION, CONFIG_API_VERSION_SYMBOL, CONFIG_INIT_SYMBOL, Capabilities, ConfigDirective,
    ConfigEditor, HookHandler, PLUGIN_API_VERSION_SYMBOL, PLUGIN_CREATE_SYMBOL,
    PLUGIN_DESTROY_SYMBOL, Plugin,
};

use super::error::PluginHostError;

type CreateFn = extern "C" fn() -> *mut dyn Plugin;
type DestroyFn = extern "C" fn(*mut dyn Plugin);
type ApiVersionFn = extern "C" fn() -> u32;
type ConfigInitFn = extern "C" fn(*mut ConfigEditor);

/// A plugin instance, destroyed through its library's exported destructor
/// when it has one.
struct PluginInstance {
    plugin: ManuallyDrop<Box<dyn Plugin>>,
    destroy: Option<DestroyFn>,
}

impl PluginInstance {
    fn new(plugin: Box<dyn Plugin>, destroy: Option<DestroyFn>) -> Self {
        Self {
            plugin: ManuallyDrop::new(plugin),
            destroy,
        }
    }

    fn get_mut(&mut self) -> &mut dyn Plugin {
        &mut **self.plugin
    }
}

impl Drop for PluginInstance {
    fn drop(&mut self) {
        // SAFETY: `plugin` is never touched again after this.
        let plugin = unsafe { ManuallyDrop::take(&mut self.plugin) };
        match self.destroy {
            Some(destroy) => destroy(Box::into_raw(plugin)),
            None => drop(plugin),
        }
    }
}

/// A registered plugin
pub struct LoadedPlugin {
    name: String,
    version: String,
    /// Artifact it was loaded from; `None` for built-in plugins
    path: Option<PathBuf>,
    instance: Mutex<PluginInstance>,
}

impl LoadedPlugin {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn info(&self) -> PluginInfo {
        PluginInfo {
            name: self.name.clone(),
            version: self.version.clone(),
            path: self.path.clone(),
        }
    }
}

/// Information about a loaded plugin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginInfo {
    pub name: String,
    pub version: String,
    pub path: Option<PathBuf>,
}

/// Directives and hooks recorded by a compiled configuration
pub struct CompiledConfig {
    pub path: PathBuf,
    pub directives: Vec<ConfigDirective>,
    pub hooks: Vec<(String, HookHandler)>,
}

impl std::fmt::Debug for CompiledConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledConfig")
            .field("path", &self.path)
            .field("directives", &self.directives)
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

/// Registry of loaded plugins.
///
/// Lookups and execution take the read lock; `load`, `register` and
/// `unload` take the write lock. Each plugin sits behind its own mutex.
///
/// Opened libraries are never unmapped. Handlers a plugin registered through
/// its [`Capabilities`] may outlive the plugin, so the code they point into
/// has to stay mapped for the life of the process.
pub struct PluginManager {
    plugins: RwLock<BTreeMap<String, Arc<LoadedPlugin>>>,
    capabilities: Capabilities,
    retained: Mutex<Vec<&'static Library>>,
}

impl PluginManager {
    pub fn new(capabilities: Capabilities) -> Self {
        Self {
            plugins: RwLock::new(BTreeMap::new()),
            capabilities,
            retained: Mutex::new(Vec::new()),
        }
    }

    /// Load the plugin artifact at `path` and return its name
    pub fn load(&self, path: &Path) -> Result<String, PluginHostError> {
        let library = self.open(path)?;

        // SAFETY: symbol types match what `export_plugin!` generates.
        let create: Symbol<CreateFn> = unsafe { library.get(PLUGIN_CREATE_SYMBOL) }
            .map_err(|source| missing_symbol(path, PLUGIN_CREATE_SYMBOL, source))?;
        let create = *create;

        let version: Symbol<ApiVersionFn> = unsafe { library.get(PLUGIN_API_VERSION_SYMBOL) }
            .map_err(|source| missing_symbol(path, PLUGIN_API_VERSION_SYMBOL, source))?;
        check_api_version(path, version())?;

        let destroy: Option<DestroyFn> = unsafe { library.get::<DestroyFn>(PLUGIN_DESTROY_SYMBOL) }
            .ok()
            .map(|symbol| *symbol);

        let raw = create();
        if raw.is_null() {
            return Err(PluginHostError::InvalidInstance {
                path: path.to_path_buf(),
            });
        }
        // SAFETY: the pointer comes from `Box::into_raw` in the constructor.
        let plugin = unsafe { Box::from_raw(raw) };

        self.insert(PluginInstance::new(plugin, destroy), Some(path.to_path_buf()))
    }

    /// Register a plugin linked into the host
    pub fn register(&self, plugin: Box<dyn Plugin>) -> Result<String, PluginHostError> {
        self.insert(PluginInstance::new(plugin, None), None)
    }

    fn insert(
        &self,
        mut instance: PluginInstance,
        path: Option<PathBuf>,
    ) -> Result<String, PluginHostError> {
        let name = instance.get_mut().name().to_string();
        let version = instance.get_mut().version().to_string();

        if self.is_loaded(&name) {
            tracing::warn!(plugin = %name, "Rejecting plugin with duplicate name");
            return Err(PluginHostError::DuplicateName { name });
        }

        instance
            .get_mut()
            .init(self.capabilities.clone())
            .map_err(|source| PluginHostError::InitFailed {
                name: name.clone(),
                source,
            })?;

        let mut plugins = self.plugins.write().unwrap_or_else(PoisonError::into_inner);
        if plugins.contains_key(&name) {
            return Err(PluginHostError::DuplicateName { name });
        }
        plugins.insert(
            name.clone(),
            Arc::new(LoadedPlugin {
                name: name.clone(),
                version: version.clone(),
                path,
                instance: Mutex::new(instance),
            }),
        );
        tracing::info!(plugin = %name, version = %version, "Plugin loaded");
        Ok(name)
    }

    /// Remove a plugin after calling its `cleanup`. Its library stays mapped.
    pub fn unload(&self, name: &str) -> Result<(), PluginHostError> {
        let removed = self
            .plugins
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .ok_or_else(|| PluginHostError::NotFound {
                name: name.to_string(),
            })?;

        let mut instance = removed.instance.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = instance.get_mut().cleanup() {
            tracing::warn!(plugin = %name, error = %e, "Plugin cleanup returned error");
        }
        tracing::info!(plugin = %name, "Plugin unloaded");
        Ok(())
    }

    /// Names of loaded plugins, sorted
    pub fn list(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    pub fn info(&self, name: &str) -> Option<PluginInfo> {
        self.read().get(name).map(|p| p.info())
    }

    pub fn get(&self, name: &str) -> Option<Arc<LoadedPlugin>> {
        self.read().get(name).cloned()
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }

    pub fn count(&self) -> usize {
        self.read().len()
    }

    /// Run `command` on the plugin called `name`
    pub fn execute(&self, name: &str, command: &str, args: &[String]) -> Result<(), PluginHostError> {
        let plugin = self.get(name).ok_or_else(|| PluginHostError::NotFound {
            name: name.to_string(),
        })?;
        let mut instance = plugin.instance.lock().unwrap_or_else(PoisonError::into_inner);
        instance
            .get_mut()
            .execute(command, args)
            .map_err(|source| PluginHostError::Execute {
                name: name.to_string(),
                source,
            })
    }

    /// Number of libraries opened so far, rejected loads included
    pub fn retained_modules(&self) -> usize {
        self.retained
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Run a compiled configuration's `init` and collect what it recorded
    pub fn load_compiled_config(&self, path: &Path) -> Result<CompiledConfig, PluginHostError> {
        let library = self.open(path)?;

        // SAFETY: symbol types match what `export_config!` generates.
        let version: Symbol<ApiVersionFn> = unsafe { library.get(CONFIG_API_VERSION_SYMBOL) }
            .map_err(|source| missing_symbol(path, CONFIG_API_VERSION_SYMBOL, source))?;
        check_api_version(path, version())?;

        let init: Symbol<ConfigInitFn> = unsafe { library.get(CONFIG_INIT_SYMBOL) }
            .map_err(|source| missing_symbol(path, CONFIG_INIT_SYMBOL, source))?;

        let mut editor = ConfigEditor::new();
        init(&mut editor);
        let (directives, hooks) = editor.into_parts();
        tracing::debug!(
            path = %path.display(),
            directives = directives.len(),
            "Compiled configuration ran"
        );

        Ok(CompiledConfig {
            path: path.to_path_buf(),
            directives,
            hooks,
        })
    }

    fn open(&self, path: &Path) -> Result<&'static Library, PluginHostError> {
        // SAFETY: loaded extensions are trusted; their initialisers run here.
        let library = unsafe { Library::new(path) }.map_err(|source| {
            PluginHostError::LibraryLoad {
                path: path.to_path_buf(),
                source,
            }
        })?;
        let library: &'static Library = Box::leak(Box::new(library));
        self.retained
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(library);
        Ok(library)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<String, Arc<LoadedPlugin>>> {
        self.plugins.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for PluginManager {
    fn default() -> Self {
        Self::new(Capabilities::default())
    }
}

fn missing_symbol(path: &Path, symbol: &'static [u8], source: libloading::Error) -> PluginHostError {
    PluginHostError::MissingSymbol {
        path: path.to_path_buf(),
        symbol: std::str::from_utf8(symbol).unwrap_or("<symbol>"),
        source,
    }
}

fn check_api_version(path: &Path, found: u32) -> Result<(), PluginHostError> {
    if found != API_VERSION {
        return Err(PluginHostError::ApiVersionMismatch {
            path: path.to_path_buf(),
            expected: API_VERSION,
            found,
        });
    }
    Ok(())
}
