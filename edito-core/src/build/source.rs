//! Source preparation: dependency discovery and `lib.rs` synthesis

use std::collections::BTreeSet;
use std::path::Path;

use regex::Regex;

use super::BuildError;
use crate::artifact::ArtifactKind;

/// Roots that never name an external crate
const BUILTIN_ROOTS: &[&str] = &[
    "std",
    "core",
    "alloc",
    "crate",
    "self",
    "super",
    "edito_plugin_api",
];

/// Crate-level attributes that conflict with the generated `cdylib`
const STRIPPED_ATTRIBUTES: &str = "crate_type|crate_name|no_std|no_main";

/// Root crates named by `use` and `extern crate` in `source`.
///
/// Modules declared in the same file are not dependencies.
pub fn scan_dependencies(source: &str) -> Result<BTreeSet<String>, BuildError> {
    let crate_refs = Regex::new(
        r"(?m)^\s*(?:pub(?:\([^)]*\))?\s+)?(?:use\s+(?:::)?|extern\s+crate\s+)([A-Za-z_][A-Za-z0-9_]*)",
    )?;
    let local_mods = Regex::new(r"(?m)^\s*(?:pub(?:\([^)]*\))?\s+)?mod\s+([A-Za-z_][A-Za-z0-9_]*)")?;

    let modules: BTreeSet<&str> = local_mods
        .captures_iter(source)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect();

    Ok(crate_refs
        .captures_iter(source)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .filter(|name| !BUILTIN_ROOTS.contains(name) && !modules.contains(name))
        .map(str::to_string)
        .collect())
}

/// Remove crate-level attributes the build sets itself.
pub fn strip_crate_attributes(source: &str) -> Result<String, BuildError> {
    let pattern = Regex::new(&format!(
        r"(?m)^[ \t]*#!\[\s*(?:{STRIPPED_ATTRIBUTES})\b[^\]]*\][ \t]*\r?\n?"
    ))?;
    Ok(pattern.replace_all(source, "").into_owned())
}

/// The `src/lib.rs` compiled for `source`.
pub fn synthesize_lib(origin: &Path, source: &str, kind: ArtifactKind) -> Result<String, BuildError> {
    let body = strip_crate_attributes(source)?;
    let mut lib = format!(
        "// Generated by edito from {}. Changes here are overwritten.\n\n{body}",
        origin.display()
    );
    if !lib.ends_with('\n') {
        lib.push('\n');
    }
    if kind == ArtifactKind::Config {
        lib.push_str("\n::edito_plugin_api::export_config!(init);\n");
    }
    Ok(lib)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_finds_external_roots() {
        let source = r#"
use std::collections::HashMap;
use regex::Regex;
use ::serde_json::Value;
pub use chrono::Utc;
pub(crate) use itertools::Itertools;
extern crate libc;
use edito_plugin_api::ConfigEditor;
use crate::helpers::x;
use self::inner::y;
use super::z;

mod helpers;
use helpers::thing;
"#;
        let deps = scan_dependencies(source).unwrap();
        let deps: Vec<_> = deps.iter().map(String::as_str).collect();
        assert_eq!(deps, vec!["chrono", "itertools", "libc", "regex", "serde_json"]);
    }

    #[test]
    fn test_scan_ignores_mentions_outside_declarations() {
        let source = "fn f() { let s = \"use fake::Thing\"; }\n// reuse nothing\n";
        assert!(scan_dependencies(source).unwrap().is_empty());
    }

    #[test]
    fn test_strip_crate_attributes() {
        let source = "#![no_std]\n#![crate_type = \"bin\"]\n#![allow(unused)]\n  #![crate_name = \"x\"]\nfn init() {}\n";
        let stripped = strip_crate_attributes(source).unwrap();
        assert_eq!(stripped, "#![allow(unused)]\nfn init() {}\n");
    }

    #[test]
    fn test_synthesize_config_lib_appends_export() {
        let lib = synthesize_lib(
            Path::new("/home/me/.config/edito/config.rs"),
            "#![no_main]\npub fn init(editor: &mut ConfigEditor) {}",
            ArtifactKind::Config,
        )
        .unwrap();

        assert!(lib.starts_with("// Generated by edito from /home/me/.config/edito/config.rs."));
        assert!(!lib.contains("no_main"));
        assert!(lib.ends_with("::edito_plugin_api::export_config!(init);\n"));
    }

    #[test]
    fn test_synthesize_plugin_lib_adds_no_export() {
        let lib = synthesize_lib(
            Path::new("shout.rs"),
            "edito_plugin_api::export_plugin!(Shout);\n",
            ArtifactKind::Plugin,
        )
        .unwrap();
        assert!(!lib.contains("export_config"));
        assert!(lib.ends_with("export_plugin!(Shout);\n"));
    }
}
