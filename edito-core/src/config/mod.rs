//! Configuration script interpreter
//!
//! The configuration script is a Rust source file whose `init` routine calls
//! into the editor. Interpretation is declarations only: the file is parsed
//! with nom into a syntax tree and the direct calls with literal arguments
//! in `init` become [`ConfigDirective`]s. Everything else is checked for
//! well-formedness and otherwise ignored.

pub mod ast;
mod combinators;
mod error;
mod interpreter;

pub use error::{ConfigError, ParseError};

use std::path::Path;

use edito_plugin_api::ConfigDirective;

/// Result of interpreting a configuration script
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigScript {
    /// Recognised calls in source order
    pub directives: Vec<ConfigDirective>,
    /// Calls that named a directive but could not be evaluated
    pub skipped: Vec<SkippedCall>,
}

impl ConfigScript {
    pub fn is_empty(&self) -> bool {
        self.directives.is_empty() && self.skipped.is_empty()
    }
}

/// A vocabulary call dropped during interpretation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedCall {
    pub line: u32,
    pub method: String,
    pub reason: String,
}

/// Parse configuration source into a syntax tree.
pub fn parse(source: &str) -> Result<ast::SourceFile, ParseError> {
    match combinators::source_file(combinators::Span::new(source)) {
        Ok((_, file)) => Ok(file),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(ParseError::at(e.input)),
        Err(nom::Err::Incomplete(_)) => Err(ParseError {
            line: 1,
            column: 1,
            message: "incomplete input".to_string(),
        }),
    }
}

/// Parse `source` and extract its directives.
///
/// Interpreting the same text always yields the same script.
pub fn interpret(source: &str) -> Result<ConfigScript, ParseError> {
    let file = parse(source)?;
    Ok(interpreter::extract(&file))
}

/// Interpret the configuration file at `path`.
///
/// A missing file is an empty configuration, not an error.
pub fn load_config(path: &Path) -> Result<ConfigScript, ConfigError> {
    let source = match std::fs::read_to_string(path) {
        Ok(source) => source,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "No configuration file");
            return Ok(ConfigScript::default());
        }
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    let script = interpret(&source)?;
    tracing::debug!(
        path = %path.display(),
        directives = script.directives.len(),
        skipped = script.skipped.len(),
        "Configuration interpreted"
    );
    Ok(script)
}
