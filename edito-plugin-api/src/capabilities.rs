//! Capabilities - the callbacks a host hands to a plugin at init time
//!
//! A plugin never receives a reference to editor internals. It gets a
//! [`Capabilities`] value made of host-provided closures and calls back
//! through those. Every callback the host leaves unset is a no-op.

use std::fmt;
use std::sync::Arc;

use crate::error::PluginError;

/// Handler for a command registered by a plugin
pub type CommandHandler = Arc<dyn Fn(&[String]) -> Result<(), PluginError> + Send + Sync>;

/// Handler for a key binding registered by a plugin
pub type KeyHandler = Arc<dyn Fn() + Send + Sync>;

type RegisterCommandFn = Arc<dyn Fn(&str, CommandHandler) + Send + Sync>;
type RegisterKeyFn = Arc<dyn Fn(&str, KeyHandler) + Send + Sync>;
type GetLineFn = Arc<dyn Fn() -> String + Send + Sync>;
type TextFn = Arc<dyn Fn(&str) + Send + Sync>;
type GetCursorFn = Arc<dyn Fn() -> (usize, usize) + Send + Sync>;
type RangeFn = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// The fixed capability surface exposed to plugins.
///
/// Cloning is cheap; all callbacks are shared.
#[derive(Clone)]
pub struct Capabilities {
    register_command: RegisterCommandFn,
    register_key_binding: RegisterKeyFn,
    current_line: GetLineFn,
    set_current_line: TextFn,
    cursor_position: GetCursorFn,
    set_cursor_position: RangeFn,
    insert_text: TextFn,
    delete_text: RangeFn,
    show_message: TextFn,
}

impl Capabilities {
    /// Start building a capability set. Unset callbacks do nothing.
    pub fn builder() -> CapabilitiesBuilder {
        CapabilitiesBuilder {
            inner: Capabilities::default(),
        }
    }

    /// Register a named command, callable as `M-x <name>`
    pub fn register_command<F>(&self, name: &str, handler: F)
    where
        F: Fn(&[String]) -> Result<(), PluginError> + Send + Sync + 'static,
    {
        (self.register_command)(name, Arc::new(handler));
    }

    /// Bind a key sequence (e.g. `"C-c f"`) to a handler
    pub fn register_key_binding<F>(&self, key: &str, handler: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        (self.register_key_binding)(key, Arc::new(handler));
    }

    /// Text of the line under the cursor
    pub fn current_line(&self) -> String {
        (self.current_line)()
    }

    /// Replace the line under the cursor
    pub fn set_current_line(&self, text: &str) {
        (self.set_current_line)(text);
    }

    /// Cursor position as `(column, row)`
    pub fn cursor_position(&self) -> (usize, usize) {
        (self.cursor_position)()
    }

    /// Move the cursor to `(column, row)`
    pub fn set_cursor_position(&self, col: usize, row: usize) {
        (self.set_cursor_position)(col, row);
    }

    /// Insert text at the cursor
    pub fn insert_text(&self, text: &str) {
        (self.insert_text)(text);
    }

    /// Delete the text between two offsets of the current line
    pub fn delete_text(&self, start: usize, end: usize) {
        (self.delete_text)(start, end);
    }

    /// Show a message in the echo area
    pub fn show_message(&self, text: &str) {
        (self.show_message)(text);
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            register_command: Arc::new(|_: &str, _: CommandHandler| {}),
            register_key_binding: Arc::new(|_: &str, _: KeyHandler| {}),
            current_line: Arc::new(String::new),
            set_current_line: Arc::new(|_: &str| {}),
            cursor_position: Arc::new(|| (0, 0)),
            set_cursor_position: Arc::new(|_: usize, _: usize| {}),
            insert_text: Arc::new(|_: &str| {}),
            delete_text: Arc::new(|_: usize, _: usize| {}),
            show_message: Arc::new(|_: &str| {}),
        }
    }
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capabilities").finish_non_exhaustive()
    }
}

/// Builder for [`Capabilities`], used by the host
pub struct CapabilitiesBuilder {
    inner: Capabilities,
}

impl CapabilitiesBuilder {
    pub fn on_register_command<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, CommandHandler) + Send + Sync + 'static,
    {
        self.inner.register_command = Arc::new(f);
        self
    }

    pub fn on_register_key_binding<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, KeyHandler) + Send + Sync + 'static,
    {
        self.inner.register_key_binding = Arc::new(f);
        self
    }

    pub fn on_current_line<F>(mut self, f: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.inner.current_line = Arc::new(f);
        self
    }

    pub fn on_set_current_line<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.inner.set_current_line = Arc::new(f);
        self
    }

    pub fn on_cursor_position<F>(mut self, f: F) -> Self
    where
        F: Fn() -> (usize, usize) + Send + Sync + 'static,
    {
        self.inner.cursor_position = Arc::new(f);
        self
    }

    pub fn on_set_cursor_position<F>(mut self, f: F) -> Self
    where
        F: Fn(usize, usize) + Send + Sync + 'static,
    {
        self.inner.set_cursor_position = Arc::new(f);
        self
    }

    pub fn on_insert_text<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.inner.insert_text = Arc::new(f);
        self
    }

    pub fn on_delete_text<F>(mut self, f: F) -> Self
    where
        F: Fn(usize, usize) + Send + Sync + 'static,
    {
        self.inner.delete_text = Arc::new(f);
        self
    }

    pub fn on_show_message<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.inner.show_message = Arc::new(f);
        self
    }

    pub fn build(self) -> Capabilities {
        self.inner
    }
}
