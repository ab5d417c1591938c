//! Configuration directives and the recorder used by compiled configuration
//!
//! A configuration script is ordinary Rust:
//!
//! ```ignore
//! use edito_plugin_api::ConfigEditor;
//!
//! pub fn init(editor: &mut ConfigEditor) {
//!     editor.set_option("tab-width", 4);
//!     editor.bind_key("C-x C-s", "save-buffer");
//!     editor.register_hook("after-save", || {});
//! }
//! ```
//!
//! The host reads it in two ways: its interpreter extracts the literal calls
//! straight from the source, and the compiled artifact replays the calls into
//! a [`ConfigEditor`]. Both produce the same [`ConfigDirective`] sequence.

use std::fmt;
use std::sync::Arc;

/// Handler attached to an editor event by compiled configuration
pub type HookHandler = Arc<dyn Fn() + Send + Sync>;

/// A literal option value
#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl OptionValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            OptionValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            OptionValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            OptionValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::String(s) => write!(f, "{s:?}"),
            OptionValue::Int(i) => write!(f, "{i}"),
            OptionValue::Float(x) => write!(f, "{x:?}"),
            OptionValue::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        OptionValue::String(value.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(value: String) -> Self {
        OptionValue::String(value)
    }
}

impl From<i32> for OptionValue {
    fn from(value: i32) -> Self {
        OptionValue::Int(i64::from(value))
    }
}

impl From<i64> for OptionValue {
    fn from(value: i64) -> Self {
        OptionValue::Int(value)
    }
}

impl From<u32> for OptionValue {
    fn from(value: u32) -> Self {
        OptionValue::Int(i64::from(value))
    }
}

impl From<f64> for OptionValue {
    fn from(value: f64) -> Self {
        OptionValue::Float(value)
    }
}

impl From<bool> for OptionValue {
    fn from(value: bool) -> Self {
        OptionValue::Bool(value)
    }
}

/// Kind of a configuration directive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DirectiveKind {
    BindKey,
    SetOption,
    LoadPlugin,
    InstallPlugin,
    RegisterHook,
}

impl DirectiveKind {
    /// Method name used in configuration source
    pub fn method_name(self) -> &'static str {
        match self {
            DirectiveKind::BindKey => "bind_key",
            DirectiveKind::SetOption => "set_option",
            DirectiveKind::LoadPlugin => "load_plugin",
            DirectiveKind::InstallPlugin => "install_plugin",
            DirectiveKind::RegisterHook => "register_hook",
        }
    }

    pub fn from_method_name(name: &str) -> Option<Self> {
        match name {
            "bind_key" => Some(DirectiveKind::BindKey),
            "set_option" => Some(DirectiveKind::SetOption),
            "load_plugin" => Some(DirectiveKind::LoadPlugin),
            "install_plugin" => Some(DirectiveKind::InstallPlugin),
            "register_hook" => Some(DirectiveKind::RegisterHook),
            _ => None,
        }
    }
}

/// One configuration call with its literal arguments
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigDirective {
    BindKey {
        key: String,
        command: String,
    },
    SetOption {
        key: String,
        value: OptionValue,
    },
    LoadPlugin {
        name: String,
    },
    InstallPlugin {
        name: String,
        repository: String,
        version: String,
    },
    /// Only the event name is carried; handlers never run at config-load time.
    RegisterHook {
        event: String,
    },
}

impl ConfigDirective {
    pub fn kind(&self) -> DirectiveKind {
        match self {
            ConfigDirective::BindKey { .. } => DirectiveKind::BindKey,
            ConfigDirective::SetOption { .. } => DirectiveKind::SetOption,
            ConfigDirective::LoadPlugin { .. } => DirectiveKind::LoadPlugin,
            ConfigDirective::InstallPlugin { .. } => DirectiveKind::InstallPlugin,
            ConfigDirective::RegisterHook { .. } => DirectiveKind::RegisterHook,
        }
    }
}

impl fmt::Display for ConfigDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.kind().method_name();
        match self {
            ConfigDirective::BindKey { key, command } => {
                write!(f, "{name}({key:?}, {command:?})")
            }
            ConfigDirective::SetOption { key, value } => write!(f, "{name}({key:?}, {value})"),
            ConfigDirective::LoadPlugin { name: plugin } => write!(f, "{name}({plugin:?})"),
            ConfigDirective::InstallPlugin {
                name: plugin,
                repository,
                version,
            } => write!(f, "{name}({plugin:?}, {repository:?}, {version:?})"),
            ConfigDirective::RegisterHook { event } => write!(f, "{name}({event:?}, ..)"),
        }
    }
}

/// Receiver passed to a compiled configuration's `init` function.
///
/// Records every call in order. Hook handlers are kept alongside so the host
/// can attach them to its hook table.
#[derive(Default)]
pub struct ConfigEditor {
    directives: Vec<ConfigDirective>,
    hooks: Vec<(String, HookHandler)>,
}

impl ConfigEditor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind_key(&mut self, key: impl Into<String>, command: impl Into<String>) {
        self.directives.push(ConfigDirective::BindKey {
            key: key.into(),
            command: command.into(),
        });
    }

    pub fn set_option(&mut self, key: impl Into<String>, value: impl Into<OptionValue>) {
        self.directives.push(ConfigDirective::SetOption {
            key: key.into(),
            value: value.into(),
        });
    }

    pub fn load_plugin(&mut self, name: impl Into<String>) {
        self.directives
            .push(ConfigDirective::LoadPlugin { name: name.into() });
    }

    /// Request that a plugin be built from a git repository.
    ///
    /// `version` is `"latest"`, a tag, a branch or a commit hash.
    pub fn install_plugin(
        &mut self,
        name: impl Into<String>,
        repository: impl Into<String>,
        version: impl Into<String>,
    ) {
        self.directives.push(ConfigDirective::InstallPlugin {
            name: name.into(),
            repository: repository.into(),
            version: version.into(),
        });
    }

    pub fn register_hook<F>(&mut self, event: impl Into<String>, handler: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        let event = event.into();
        self.directives.push(ConfigDirective::RegisterHook {
            event: event.clone(),
        });
        self.hooks.push((event, Arc::new(handler)));
    }

    pub fn directives(&self) -> &[ConfigDirective] {
        &self.directives
    }

    pub fn into_parts(self) -> (Vec<ConfigDirective>, Vec<(String, HookHandler)>) {
        (self.directives, self.hooks)
    }
}

impl fmt::Debug for ConfigEditor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigEditor")
            .field("directives", &self.directives)
            .field("hooks", &self.hooks.len())
            .finish()
    }
}
