use std::path::PathBuf;

use thiserror::Error;

use super::combinators::Span;

const SNIPPET_LEN: usize = 24;

/// Malformed configuration source
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Parse error at line {line}, column {column}: {message}")]
pub struct ParseError {
    pub line: u32,
    pub column: usize,
    pub message: String,
}

impl ParseError {
    /// Error positioned at the input the parser stopped on
    pub(crate) fn at(span: Span) -> Self {
        let rest = span.fragment().trim_start();
        let message = if rest.is_empty() {
            "unexpected end of input".to_string()
        } else {
            let snippet: String = rest
                .lines()
                .next()
                .unwrap_or_default()
                .chars()
                .take(SNIPPET_LEN)
                .collect();
            format!("unexpected `{snippet}`")
        };
        Self {
            line: span.location_line(),
            column: span.get_utf8_column(),
            message,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Parse(#[from] ParseError),
}
