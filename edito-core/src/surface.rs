//! The editor surface the lifecycle system drives
//!
//! The terminal editor implements [`EditorSurface`]; the host applies
//! configuration directives to it and builds the plugins' [`Capabilities`]
//! from it. [`MemorySurface`] is a headless implementation used by the CLI
//! and the tests.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use edito_plugin_api::{
    Capabilities, CommandHandler, ConfigDirective, HookHandler, KeyHandler, OptionValue,
    PluginError,
};

/// Operations the host and its extensions need from the editor
pub trait EditorSurface: Send + Sync {
    fn register_command(&self, name: &str, handler: CommandHandler);
    fn register_key_binding(&self, key: &str, handler: KeyHandler);
    /// Bind `key` to a named command
    fn bind_key(&self, key: &str, command: &str);
    fn set_option(&self, key: &str, value: OptionValue);
    fn register_hook(&self, event: &str, handler: HookHandler);

    fn current_line(&self) -> String;
    fn set_current_line(&self, text: &str);
    /// `(column, row)`
    fn cursor_position(&self) -> (usize, usize);
    fn set_cursor_position(&self, col: usize, row: usize);
    fn insert_text(&self, text: &str);
    fn delete_text(&self, start: usize, end: usize);
    fn show_message(&self, text: &str);
}

/// Apply one interpreted directive.
///
/// Plugin directives are not surface operations and are ignored here.
/// Hooks declared by interpreted configuration get a no-op handler since
/// the interpreter never evaluates closures.
pub fn apply_directive(surface: &dyn EditorSurface, directive: &ConfigDirective) {
    match directive {
        ConfigDirective::BindKey { key, command } => surface.bind_key(key, command),
        ConfigDirective::SetOption { key, value } => surface.set_option(key, value.clone()),
        ConfigDirective::RegisterHook { event } => surface.register_hook(event, Arc::new(|| {})),
        ConfigDirective::LoadPlugin { .. } | ConfigDirective::InstallPlugin { .. } => {}
    }
}

/// Capability object whose callbacks forward to `surface`
pub fn capabilities_for(surface: Arc<dyn EditorSurface>) -> Capabilities {
    let s1 = surface.clone();
    let s2 = surface.clone();
    let s3 = surface.clone();
    let s4 = surface.clone();
    let s5 = surface.clone();
    let s6 = surface.clone();
    let s7 = surface.clone();
    let s8 = surface.clone();
    let s9 = surface;

    Capabilities::builder()
        .on_register_command(move |name, handler| s1.register_command(name, handler))
        .on_register_key_binding(move |key, handler| s2.register_key_binding(key, handler))
        .on_current_line(move || s3.current_line())
        .on_set_current_line(move |text| s4.set_current_line(text))
        .on_cursor_position(move || s5.cursor_position())
        .on_set_cursor_position(move |col, row| s6.set_cursor_position(col, row))
        .on_insert_text(move |text| s7.insert_text(text))
        .on_delete_text(move |start, end| s8.delete_text(start, end))
        .on_show_message(move |text| s9.show_message(text))
        .build()
}

/// What a key sequence is bound to
#[derive(Clone)]
pub enum KeyBinding {
    Command(String),
    Handler(KeyHandler),
}

impl std::fmt::Debug for KeyBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyBinding::Command(command) => f.debug_tuple("Command").field(command).finish(),
            KeyBinding::Handler(_) => f.write_str("Handler(..)"),
        }
    }
}

#[derive(Default)]
struct SurfaceState {
    lines: Vec<String>,
    cursor: (usize, usize),
    options: BTreeMap<String, OptionValue>,
    bindings: BTreeMap<String, KeyBinding>,
    commands: BTreeMap<String, CommandHandler>,
    hooks: BTreeMap<String, Vec<HookHandler>>,
    messages: Vec<String>,
}

impl SurfaceState {
    fn line_mut(&mut self) -> &mut String {
        let row = self.cursor.1;
        if self.lines.len() <= row {
            self.lines.resize(row + 1, String::new());
        }
        &mut self.lines[row]
    }
}

/// Headless editor: a line buffer, one cursor and the tables extensions
/// register into.
///
/// Handlers are called with no lock held, so they may call back into the
/// surface.
#[derive(Default)]
pub struct MemorySurface {
    state: Mutex<SurfaceState>,
}

impl MemorySurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(text: &str) -> Self {
        let surface = Self::default();
        surface.state().lines = text.lines().map(str::to_string).collect();
        surface
    }

    pub fn lines(&self) -> Vec<String> {
        self.state().lines.clone()
    }

    pub fn option(&self, key: &str) -> Option<OptionValue> {
        self.state().options.get(key).cloned()
    }

    pub fn options(&self) -> BTreeMap<String, OptionValue> {
        self.state().options.clone()
    }

    pub fn binding(&self, key: &str) -> Option<KeyBinding> {
        self.state().bindings.get(key).cloned()
    }

    /// Registered command names, sorted
    pub fn commands(&self) -> Vec<String> {
        self.state().commands.keys().cloned().collect()
    }

    /// Events with at least one handler, sorted
    pub fn hook_events(&self) -> Vec<String> {
        self.state().hooks.keys().cloned().collect()
    }

    pub fn messages(&self) -> Vec<String> {
        self.state().messages.clone()
    }

    pub fn last_message(&self) -> Option<String> {
        self.state().messages.last().cloned()
    }

    /// Run a registered command
    pub fn run_command(&self, name: &str, args: &[String]) -> Result<(), PluginError> {
        let handler = self
            .state()
            .commands
            .get(name)
            .cloned()
            .ok_or_else(|| PluginError::UnknownCommand(name.to_string()))?;
        handler(args)
    }

    /// Dispatch a key sequence. Returns `Ok(false)` when nothing is bound.
    pub fn press_key(&self, key: &str) -> Result<bool, PluginError> {
        let binding = self.state().bindings.get(key).cloned();
        match binding {
            Some(KeyBinding::Command(command)) => self.run_command(&command, &[]).map(|()| true),
            Some(KeyBinding::Handler(handler)) => {
                handler();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Run every handler attached to `event`, returning how many ran
    pub fn fire_hook(&self, event: &str) -> usize {
        let handlers = self.state().hooks.get(event).cloned().unwrap_or_default();
        for handler in &handlers {
            handler();
        }
        handlers.len()
    }

    fn state(&self) -> MutexGuard<'_, SurfaceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl EditorSurface for MemorySurface {
    fn register_command(&self, name: &str, handler: CommandHandler) {
        tracing::debug!(command = %name, "Command registered");
        self.state().commands.insert(name.to_string(), handler);
    }

    fn register_key_binding(&self, key: &str, handler: KeyHandler) {
        self.state()
            .bindings
            .insert(key.to_string(), KeyBinding::Handler(handler));
    }

    fn bind_key(&self, key: &str, command: &str) {
        self.state()
            .bindings
            .insert(key.to_string(), KeyBinding::Command(command.to_string()));
    }

    fn set_option(&self, key: &str, value: OptionValue) {
        self.state().options.insert(key.to_string(), value);
    }

    fn register_hook(&self, event: &str, handler: HookHandler) {
        self.state()
            .hooks
            .entry(event.to_string())
            .or_default()
            .push(handler);
    }

    fn current_line(&self) -> String {
        let state = self.state();
        state.lines.get(state.cursor.1).cloned().unwrap_or_default()
    }

    fn set_current_line(&self, text: &str) {
        *self.state().line_mut() = text.to_string();
    }

    fn cursor_position(&self) -> (usize, usize) {
        self.state().cursor
    }

    /// The row is clamped to one past the last line, where editing starts
    /// a new line.
    fn set_cursor_position(&self, col: usize, row: usize) {
        let mut state = self.state();
        let row = row.min(state.lines.len());
        state.cursor = (col, row);
    }

    /// Inserts at the cursor column and moves the cursor past the text.
    /// Newlines are kept in the line rather than splitting it.
    fn insert_text(&self, text: &str) {
        let mut state = self.state();
        let col = state.cursor.0;
        let line = state.line_mut();
        let at = byte_offset(line, col);
        line.insert_str(at, text);
        let inserted = line[..at + text.len()].chars().count();
        state.cursor.0 = inserted;
    }

    /// Character offsets, clamped to the line
    fn delete_text(&self, start: usize, end: usize) {
        let mut state = self.state();
        let line = state.line_mut();
        let (start, end) = (start.min(end), start.max(end));
        let from = byte_offset(line, start);
        let to = byte_offset(line, end);
        line.replace_range(from..to, "");
        let len = line.chars().count();
        if state.cursor.0 > len {
            state.cursor.0 = len;
        }
    }

    fn show_message(&self, text: &str) {
        tracing::info!(message = %text, "Editor message");
        self.state().messages.push(text.to_string());
    }
}

/// Byte offset of the `col`th character, or the end of the line
fn byte_offset(line: &str, col: usize) -> usize {
    line.char_indices()
        .nth(col)
        .map(|(offset, _)| offset)
        .unwrap_or(line.len())
}
