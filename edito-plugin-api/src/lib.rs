//! edito-plugin-api - the contract between the edito host and its extensions
//!
//! Plugins are native Rust dynamic libraries (`cdylib`). The host opens the
//! library, checks the API version, creates the plugin through the exported
//! constructor and hands it a [`Capabilities`] object to call back into the
//! editor.
//!
//! # Example
//!
//! ```ignore
//! use edito_plugin_api::{Capabilities, Plugin, PluginError, export_plugin};
//!
//! #[derive(Default)]
//! pub struct Shout;
//!
//! impl Plugin for Shout {
//!     fn name(&self) -> &str {
//!         "shout"
//!     }
//!
//!     fn version(&self) -> &str {
//!         "0.1.0"
//!     }
//!
//!     fn init(&mut self, caps: Capabilities) -> Result<(), PluginError> {
//!         let editor = caps.clone();
//!         caps.register_command("shout", move |_| {
//!             let line = editor.current_line().to_uppercase();
//!             editor.set_current_line(&line);
//!             Ok(())
//!         });
//!         Ok(())
//!     }
//! }
//!
//! export_plugin!(Shout);
//! ```
//!
//! Configuration scripts use the same crate through [`ConfigEditor`]; see the
//! [`config`] module.

pub mod capabilities;
pub mod config;
pub mod error;

pub use capabilities::{Capabilities, CapabilitiesBuilder, CommandHandler, KeyHandler};
pub use config::{ConfigDirective, ConfigEditor, DirectiveKind, HookHandler, OptionValue};
pub use error::PluginError;

/// Re-exported so extensions log through the host's subscriber
pub use tracing;

/// Current plugin API version. Extensions must match this exactly.
pub const API_VERSION: u32 = 1;

/// Version of this crate. Generated extension crates pin it with `=`.
pub const CRATE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Source directory this crate was built from
pub const CRATE_DIR: &str = env!("CARGO_MANIFEST_DIR");

/// Constructor exported by [`export_plugin!`]
pub const PLUGIN_CREATE_SYMBOL: &[u8] = b"_edito_plugin_create";
/// API version getter exported by [`export_plugin!`]
pub const PLUGIN_API_VERSION_SYMBOL: &[u8] = b"_edito_plugin_api_version";
/// Destructor exported by [`export_plugin!`]
pub const PLUGIN_DESTROY_SYMBOL: &[u8] = b"_edito_plugin_destroy";
/// Entry point exported by [`export_config!`]
pub const CONFIG_INIT_SYMBOL: &[u8] = b"_edito_config_init";
/// API version getter exported by [`export_config!`]
pub const CONFIG_API_VERSION_SYMBOL: &[u8] = b"_edito_config_api_version";

/// The plugin trait - implement this and export it with [`export_plugin!`].
pub trait Plugin: Send + Sync {
    /// Unique name the plugin is registered under
    fn name(&self) -> &str;

    fn version(&self) -> &str;

    /// Called once after loading. Register commands and key bindings here.
    fn init(&mut self, capabilities: Capabilities) -> Result<(), PluginError>;

    /// Run a named command directly, bypassing registered handlers.
    fn execute(&mut self, command: &str, _args: &[String]) -> Result<(), PluginError> {
        Err(PluginError::UnknownCommand(command.to_string()))
    }

    /// Called when the plugin is unloaded
    fn cleanup(&mut self) -> Result<(), PluginError> {
        Ok(())
    }
}

/// Export a plugin type for dynamic loading.
///
/// The type must implement [`Default`].
///
/// # Generated Functions
///
/// - `_edito_plugin_create()`: Creates a new plugin instance
/// - `_edito_plugin_api_version()`: Returns the API version
/// - `_edito_plugin_destroy()`: Destroys a plugin instance
#[macro_export]
macro_rules! export_plugin {
    ($plugin_type:ty) => {
        #[unsafe(no_mangle)]
        #[allow(improper_ctypes_definitions)]
        pub extern "C" fn _edito_plugin_create() -> *mut dyn $crate::Plugin {
            let plugin: Box<dyn $crate::Plugin> = Box::new(<$plugin_type>::default());
            Box::into_raw(plugin)
        }

        #[unsafe(no_mangle)]
        pub extern "C" fn _edito_plugin_api_version() -> u32 {
            $crate::API_VERSION
        }

        #[unsafe(no_mangle)]
        #[allow(improper_ctypes_definitions)]
        pub extern "C" fn _edito_plugin_destroy(ptr: *mut dyn $crate::Plugin) {
            if !ptr.is_null() {
                unsafe {
                    drop(Box::from_raw(ptr));
                }
            }
        }
    };
}

/// Export a configuration `init` function.
///
/// The build pipeline appends this to compiled configuration, so
/// configuration authors never write it themselves.
///
/// ```ignore
/// pub fn init(editor: &mut edito_plugin_api::ConfigEditor) {
///     editor.set_option("tab-width", 4);
/// }
///
/// edito_plugin_api::export_config!(init);
/// ```
#[macro_export]
macro_rules! export_config {
    ($init:path) => {
        #[unsafe(no_mangle)]
        #[allow(improper_ctypes_definitions)]
        pub extern "C" fn _edito_config_init(editor: *mut $crate::ConfigEditor) {
            if let Some(editor) = unsafe { editor.as_mut() } {
                $init(editor);
            }
        }

        #[unsafe(no_mangle)]
        pub extern "C" fn _edito_config_api_version() -> u32 {
            $crate::API_VERSION
        }
    };
}
