//! End-to-end properties of the extension lifecycle
//!
//! - Auto-install is idempotent and isolates failures
//! - Plugin names are unique in the registry
//! - Interpretation is deterministic and evaluates literals only

use std::path::Path;
use std::sync::{Arc, Mutex};

use tempfile::TempDir;

use edito_core::build::BuildError;
use edito_core::installer::{InstallError, PluginBuilder};
use edito_core::{
    ArtifactStore, AutoInstaller, ConfigDirective, OptionValue, PluginHostError, PluginManager,
    PluginSpec, interpret,
};
use edito_plugin_api::{Capabilities, Plugin, PluginError};

/// Records every build; repositories without a host part are rejected
#[derive(Default)]
struct RecordingBuilder {
    calls: Mutex<Vec<String>>,
}

impl RecordingBuilder {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

struct SharedBuilder(Arc<RecordingBuilder>);

impl PluginBuilder for SharedBuilder {
    fn build(&self, spec: &PluginSpec, output: &Path) -> Result<(), BuildError> {
        self.0.calls.lock().unwrap().push(spec.name.clone());
        if !spec.repository.contains('/') {
            return Err(BuildError::Dependencies {
                output: format!("error: invalid url `{}`", spec.git_url()),
            });
        }
        std::fs::write(output, format!("{}@{}", spec.name, spec.version))
            .map_err(|e| BuildError::Dependencies {
                output: e.to_string(),
            })
    }
}

fn installer(dir: &TempDir) -> (AutoInstaller, Arc<RecordingBuilder>) {
    let builder = Arc::new(RecordingBuilder::default());
    let installer = AutoInstaller::new(
        ArtifactStore::new(dir.path().join("plugins")),
        Box::new(SharedBuilder(builder.clone())),
    );
    (installer, builder)
}

#[test]
fn auto_install_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let specs = vec![
        PluginSpec::new("file-tree", "github.com/acme/edito-file-tree", "v0.2.0"),
        PluginSpec::new("git-gutter", "github.com/acme/edito-git-gutter", "latest"),
    ];

    let (first, builder) = installer(&dir);
    let report = first.check_and_install(&specs);
    assert!(report.is_success());
    assert_eq!(report.installed, vec!["file-tree", "git-gutter"]);
    assert_eq!(builder.calls().len(), 2);

    // A later run against the same store builds nothing
    let (second, builder) = installer(&dir);
    let report = second.check_and_install(&specs);
    assert!(report.installed.is_empty());
    assert_eq!(report.skipped, vec!["file-tree", "git-gutter"]);
    assert!(builder.calls().is_empty());
}

#[test]
fn one_bad_spec_does_not_stop_the_others() {
    let dir = TempDir::new().unwrap();
    let (installer, builder) = installer(&dir);
    let specs = vec![
        PluginSpec::new("a", "github.com/acme/a", "latest"),
        PluginSpec::new("b", "not-a-repository", "latest"),
        PluginSpec::new("c", "github.com/acme/c", "main"),
    ];

    let report = installer.check_and_install(&specs);

    assert_eq!(report.installed, vec!["a", "c"]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].name, "b");
    assert!(matches!(report.failed[0].error, InstallError::Build { .. }));
    assert_eq!(builder.calls(), vec!["a", "b", "c"]);

    let store = installer.store();
    assert_eq!(store.list().unwrap(), vec!["a", "c"]);
    assert_eq!(
        std::fs::read_to_string(store.artifact_path("c").unwrap()).unwrap(),
        "c@main"
    );
}

struct Named(&'static str, &'static str);

impl Plugin for Named {
    fn name(&self) -> &str {
        self.0
    }

    fn version(&self) -> &str {
        self.1
    }

    fn init(&mut self, _capabilities: Capabilities) -> Result<(), PluginError> {
        Ok(())
    }
}

#[test]
fn second_plugin_with_same_name_is_rejected() {
    let manager = PluginManager::default();
    manager.register(Box::new(Named("file-tree", "1.0.0"))).unwrap();

    let err = manager
        .register(Box::new(Named("file-tree", "2.0.0")))
        .unwrap_err();

    assert!(matches!(err, PluginHostError::DuplicateName { ref name } if name == "file-tree"));
    assert_eq!(manager.list(), vec!["file-tree"]);
    assert_eq!(manager.info("file-tree").unwrap().version, "1.0.0");
}

const CONFIG: &str = r#"
use edito_plugin_api::ConfigEditor;

pub fn init(editor: &mut ConfigEditor) {
    let some_variable = 8;
    editor.set_option("theme", "dark");
    editor.set_option("tab-width", some_variable);
    editor.set_option("line-numbers", true);
    editor.bind_key("C-x C-f", "find-file");
    editor.register_hook("file-opened", || {
        println!("opened");
    });
    editor.install_plugin("file-tree", "github.com/acme/edito-file-tree", "latest");
    editor.load_plugin("file-tree");
}
"#;

#[test]
fn interpretation_is_deterministic() {
    let first = interpret(CONFIG).unwrap();
    let second = interpret(CONFIG).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.directives.len(), 6);
}

#[test]
fn non_literal_arguments_are_dropped() {
    let script = interpret(CONFIG).unwrap();

    assert_eq!(
        script.directives[..3],
        [
            ConfigDirective::SetOption {
                key: "theme".into(),
                value: OptionValue::from("dark"),
            },
            ConfigDirective::SetOption {
                key: "line-numbers".into(),
                value: OptionValue::Bool(true),
            },
            ConfigDirective::BindKey {
                key: "C-x C-f".into(),
                command: "find-file".into(),
            },
        ]
    );
    assert_eq!(
        script.directives[3],
        ConfigDirective::RegisterHook {
            event: "file-opened".into()
        }
    );

    assert_eq!(script.skipped.len(), 1);
    assert_eq!(script.skipped[0].method, "set_option");
    assert_eq!(script.skipped[0].line, 7);
}

#[test]
fn sample_configuration_is_fully_understood() {
    let script = interpret(include_str!("../../demos/config.rs")).unwrap();

    assert!(script.skipped.is_empty());
    assert_eq!(script.directives.len(), 14);
    let specs: Vec<_> = script
        .directives
        .iter()
        .filter_map(PluginSpec::from_directive)
        .collect();
    assert_eq!(
        specs,
        vec![PluginSpec::new(
            "file-tree",
            "github.com/edito-editor/file-tree",
            "v0.2.0"
        )]
    );
}
