// Sample ~/.config/edito/config.rs
//
// Only direct calls with literal arguments are read when the editor starts;
// hook bodies run from the compiled build of this file.

use edito_plugin_api::ConfigEditor;

pub fn init(editor: &mut ConfigEditor) {
    editor.set_option("tab-width", 4);
    editor.set_option("show-line-numbers", true);
    editor.set_option("auto-save", true);
    editor.set_option("theme", "dark");

    editor.bind_key("C-x C-s", "save-buffer");
    editor.bind_key("C-x C-c", "quit");
    editor.bind_key("C-x b", "switch-to-buffer");
    editor.bind_key("C-x C-f", "find-file");
    editor.bind_key("M-g g", "goto-line");
    editor.bind_key("C-c w", "word-count");

    editor.install_plugin("file-tree", "github.com/edito-editor/file-tree", "v0.2.0");
    editor.load_plugin("word-count");

    editor.set_option("auto-complete-delay", 500);

    editor.register_hook("after-save", || {
        edito_plugin_api::tracing::info!("buffer saved");
    });
}
