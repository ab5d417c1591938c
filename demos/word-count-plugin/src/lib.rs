//! Counts the words on the current line
//!
//! Registers the `word-count` command and binds it to `C-c w`.

use edito_plugin_api::{Capabilities, Plugin, PluginError, export_plugin};

#[derive(Default)]
pub struct WordCount;

pub fn count_words(line: &str) -> usize {
    line.split_whitespace().count()
}

impl Plugin for WordCount {
    fn name(&self) -> &str {
        "word-count"
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn init(&mut self, caps: Capabilities) -> Result<(), PluginError> {
        let editor = caps.clone();
        caps.register_command("word-count", move |_| {
            let words = count_words(&editor.current_line());
            editor.show_message(&format!("{words} words"));
            Ok(())
        });

        let editor = caps.clone();
        caps.register_key_binding("C-c w", move || {
            let words = count_words(&editor.current_line());
            editor.show_message(&format!("{words} words"));
        });
        Ok(())
    }

    fn execute(&mut self, command: &str, args: &[String]) -> Result<(), PluginError> {
        match command {
            "count" => {
                let text = args.join(" ");
                edito_plugin_api::tracing::info!(words = count_words(&text), "Counted words");
                Ok(())
            }
            other => Err(PluginError::UnknownCommand(other.to_string())),
        }
    }
}

export_plugin!(WordCount);

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_count_words() {
        assert_eq!(count_words(""), 0);
        assert_eq!(count_words("  one two\tthree "), 3);
    }

    #[test]
    fn test_command_reports_count() {
        let messages = Arc::new(Mutex::new(Vec::new()));
        let commands = Arc::new(Mutex::new(Vec::new()));
        let (sink, registry) = (messages.clone(), commands.clone());
        let caps = Capabilities::builder()
            .on_current_line(|| "the quick brown fox".to_string())
            .on_show_message(move |m| sink.lock().unwrap().push(m.to_string()))
            .on_register_command(move |_, handler| registry.lock().unwrap().push(handler))
            .build();

        WordCount.init(caps).unwrap();
        let handler = commands.lock().unwrap()[0].clone();
        handler(&[]).unwrap();
        assert_eq!(*messages.lock().unwrap(), vec!["4 words"]);
    }
}
