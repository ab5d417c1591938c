//! Directive extraction from a parsed configuration script

use edito_plugin_api::{ConfigDirective, DirectiveKind, OptionValue};

use super::ast::{Expr, FnItem, Item, Lit, SourceFile, Stmt};
use super::{ConfigScript, SkippedCall};

/// Name of the initialisation routine
const INIT_FN: &str = "init";

/// Receiver name that is always accepted for method-call directives
const EDITOR_RECEIVER: &str = "editor";

/// Walk every top-level `init` routine in source order.
pub(super) fn extract(file: &SourceFile) -> ConfigScript {
    let mut script = ConfigScript::default();
    let inits = file.items.iter().filter_map(|item| match item {
        Item::Fn(f) if f.name == INIT_FN => Some(f),
        _ => None,
    });
    for init in inits {
        extract_init(init, &mut script);
    }
    script
}

fn extract_init(init: &FnItem, script: &mut ConfigScript) {
    let param = init.first_param_name();

    // Only top-level statements count; nested blocks and control flow are
    // parsed but never produce directives.
    for stmt in &init.body.stmts {
        let Stmt::Expr { line, expr, .. } = stmt else {
            continue;
        };
        let Some((method, args)) = directive_call(expr, param) else {
            continue;
        };
        let Some(kind) = DirectiveKind::from_method_name(method) else {
            tracing::debug!(line, method, "Ignoring call outside the configuration vocabulary");
            continue;
        };

        match build_directive(kind, args) {
            Ok(directive) => script.directives.push(directive),
            Err(reason) => {
                tracing::warn!(line, method, reason = %reason, "Skipping configuration call");
                script.skipped.push(SkippedCall {
                    line: *line,
                    method: method.to_string(),
                    reason,
                });
            }
        }
    }
}

/// The called name and its arguments, when `expr` is a call the
/// interpreter looks at.
fn directive_call<'e>(expr: &'e Expr, param: Option<&str>) -> Option<(&'e str, &'e [Expr])> {
    match expr {
        Expr::MethodCall {
            receiver,
            method,
            args,
        } => match receiver.as_ref() {
            Expr::Path(segments)
                if segments.len() == 1
                    && (segments[0] == EDITOR_RECEIVER || Some(segments[0].as_str()) == param) =>
            {
                Some((method.as_str(), args.as_slice()))
            }
            _ => None,
        },
        Expr::Call { func, args } => match func.as_ref() {
            Expr::Path(segments) => segments
                .last()
                .map(|name| (name.as_str(), args.as_slice())),
            _ => None,
        },
        _ => None,
    }
}

fn arity(kind: DirectiveKind) -> usize {
    match kind {
        DirectiveKind::LoadPlugin => 1,
        DirectiveKind::BindKey | DirectiveKind::SetOption | DirectiveKind::RegisterHook => 2,
        DirectiveKind::InstallPlugin => 3,
    }
}

fn build_directive(kind: DirectiveKind, args: &[Expr]) -> Result<ConfigDirective, String> {
    let expected = arity(kind);
    if args.len() != expected {
        return Err(format!(
            "expected {expected} argument{}, found {}",
            if expected == 1 { "" } else { "s" },
            args.len()
        ));
    }

    let directive = match kind {
        DirectiveKind::BindKey => ConfigDirective::BindKey {
            key: string_arg(args, 0)?,
            command: string_arg(args, 1)?,
        },
        DirectiveKind::SetOption => ConfigDirective::SetOption {
            key: string_arg(args, 0)?,
            value: option_value(&args[1])?,
        },
        DirectiveKind::LoadPlugin => ConfigDirective::LoadPlugin {
            name: string_arg(args, 0)?,
        },
        DirectiveKind::InstallPlugin => ConfigDirective::InstallPlugin {
            name: string_arg(args, 0)?,
            repository: string_arg(args, 1)?,
            version: string_arg(args, 2)?,
        },
        // The handler is never evaluated
        DirectiveKind::RegisterHook => ConfigDirective::RegisterHook {
            event: string_arg(args, 0)?,
        },
    };
    Ok(directive)
}

fn string_arg(args: &[Expr], index: usize) -> Result<String, String> {
    match &args[index] {
        Expr::Lit(Lit::Str(s)) => Ok(s.clone()),
        Expr::Lit(_) => Err(format!("argument {} must be a string literal", index + 1)),
        _ => Err(format!("argument {} is not a literal", index + 1)),
    }
}

fn option_value(arg: &Expr) -> Result<OptionValue, String> {
    match arg {
        Expr::Lit(Lit::Str(s)) => Ok(OptionValue::String(s.clone())),
        Expr::Lit(Lit::Int(i)) => Ok(OptionValue::Int(*i)),
        Expr::Lit(Lit::Float(x)) => Ok(OptionValue::Float(*x)),
        Expr::Lit(Lit::Bool(b)) => Ok(OptionValue::Bool(*b)),
        Expr::Lit(Lit::Char(_)) => Err("character literals are not option values".to_string()),
        _ => Err("argument 2 is not a literal".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use crate::config::{SkippedCall, interpret};
    use edito_plugin_api::{ConfigDirective, OptionValue};

    fn set_option(key: &str, value: impl Into<OptionValue>) -> ConfigDirective {
        ConfigDirective::SetOption {
            key: key.to_string(),
            value: value.into(),
        }
    }

    #[test]
    fn test_full_vocabulary() {
        let script = interpret(
            r#"
use edito_plugin_api::ConfigEditor;

pub fn init(editor: &mut ConfigEditor) {
    editor.set_option("tab-width", 4);
    editor.bind_key("C-x C-s", "save-buffer");
    editor.load_plugin("file-tree");
    editor.install_plugin("file-tree", "github.com/acme/edito-file-tree", "v0.1.0");
    editor.register_hook("after-save", || {});
}
"#,
        )
        .unwrap();

        assert!(script.skipped.is_empty());
        assert_eq!(
            script.directives,
            vec![
                set_option("tab-width", 4i64),
                ConfigDirective::BindKey {
                    key: "C-x C-s".into(),
                    command: "save-buffer".into(),
                },
                ConfigDirective::LoadPlugin {
                    name: "file-tree".into()
                },
                ConfigDirective::InstallPlugin {
                    name: "file-tree".into(),
                    repository: "github.com/acme/edito-file-tree".into(),
                    version: "v0.1.0".into(),
                },
                ConfigDirective::RegisterHook {
                    event: "after-save".into()
                },
            ]
        );
    }

    #[test]
    fn test_non_literal_argument_drops_only_that_call() {
        let script = interpret(
            r#"
pub fn init(editor: &mut ConfigEditor) {
    let some_variable = 8;
    editor.set_option("theme", "dark");
    editor.set_option("tab-width", some_variable);
    editor.set_option("line-numbers", true);
}
"#,
        )
        .unwrap();

        assert_eq!(
            script.directives,
            vec![set_option("theme", "dark"), set_option("line-numbers", true)]
        );
        assert_eq!(
            script.skipped,
            vec![SkippedCall {
                line: 5,
                method: "set_option".into(),
                reason: "argument 2 is not a literal".into(),
            }]
        );
    }

    #[test]
    fn test_option_value_literals() {
        let script = interpret(
            r#"
fn init(editor: &mut ConfigEditor) {
    editor.set_option("scroll-margin", -3);
    editor.set_option("ratio", 0.25);
    editor.set_option("wrap", false);
    editor.set_option("fill", 'x');
}
"#,
        )
        .unwrap();

        assert_eq!(
            script.directives,
            vec![
                set_option("scroll-margin", -3i64),
                set_option("ratio", 0.25),
                set_option("wrap", false),
            ]
        );
        assert_eq!(script.skipped.len(), 1);
        assert_eq!(script.skipped[0].line, 6);
    }

    #[test]
    fn test_arity_and_string_parameters_are_exact() {
        let script = interpret(
            r#"
fn init(editor: &mut ConfigEditor) {
    editor.bind_key("C-q");
    editor.load_plugin("a", "b");
    editor.bind_key("C-q", 7);
    editor.install_plugin("x", "github.com/x/x", "latest");
}
"#,
        )
        .unwrap();

        assert_eq!(script.directives.len(), 1);
        let reasons: Vec<_> = script.skipped.iter().map(|s| s.reason.as_str()).collect();
        assert_eq!(
            reasons,
            vec![
                "expected 2 arguments, found 1",
                "expected 1 argument, found 2",
                "argument 2 must be a string literal",
            ]
        );
    }

    #[test]
    fn test_free_functions_and_renamed_receiver() {
        let script = interpret(
            r#"
pub fn init(mut cfg: &mut ConfigEditor) {
    cfg.load_plugin("one");
    edito::load_plugin("two");
    load_plugin("three");
    other.load_plugin("ignored");
    editor.load_plugin("four");
}
"#,
        )
        .unwrap();

        let names: Vec<_> = script
            .directives
            .iter()
            .map(|d| match d {
                ConfigDirective::LoadPlugin { name } => name.as_str(),
                other => panic!("unexpected directive {other:?}"),
            })
            .collect();
        assert_eq!(names, vec!["one", "two", "three", "four"]);
    }

    #[test]
    fn test_control_flow_and_unknown_calls_produce_nothing() {
        let script = interpret(
            r#"
fn init(editor: &mut ConfigEditor) {
    if cfg!(target_os = "macos") {
        editor.bind_key("M-q", "quit");
    }
    for name in ["a", "b"] {
        editor.load_plugin(name);
    }
    {
        editor.set_option("nested", 1);
    }
    println!("configuring");
    editor.show_message("hello");
    editor.bind_key("C-g", "cancel");
}

fn helper(editor: &mut ConfigEditor) {
    editor.bind_key("C-h", "help");
}
"#,
        )
        .unwrap();

        assert_eq!(
            script.directives,
            vec![ConfigDirective::BindKey {
                key: "C-g".into(),
                command: "cancel".into(),
            }]
        );
        assert!(script.skipped.is_empty());
    }

    #[test]
    fn test_interpretation_is_deterministic() {
        let source = r#"
fn init(editor: &mut ConfigEditor) {
    editor.set_option("a", 1);
    editor.set_option("b", width);
    editor.bind_key("C-a", "start");
}
"#;
        assert_eq!(interpret(source).unwrap(), interpret(source).unwrap());
    }

    #[test]
    fn test_multiple_init_routines_in_order() {
        let script = interpret(
            r#"
fn init(editor: &mut ConfigEditor) { editor.load_plugin("first"); }
mod extra;
fn init(e: &mut ConfigEditor) { e.load_plugin("second"); }
"#,
        )
        .unwrap();
        assert_eq!(script.directives.len(), 2);
    }
}
