//! Error types for parsing, dumping and the plugin header codec.
//!
//! Every failure propagates straight to the caller. There is no partial
//! parse and no best-effort dump: a document either round-trips or the
//! caller gets one of the four categories below.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Crate-wide error.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed node construction (bad token and friends).
    #[error("invalid node: {0}")]
    Validation(String),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Encoding(#[from] EncodingError),

    /// Programmer misuse of the tree API.
    #[error("{0}")]
    Logic(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// The grammar failed to match at some position of the input.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("parse error at line {line}, column {column}: {message}")]
pub struct ParseError {
    pub message: String,
    /// 1-based line of the failure.
    pub line: usize,
    /// 1-based column (in characters) of the failure.
    pub column: usize,
    /// (start, end) byte offsets into the parsed source.
    pub span: (usize, usize),
}

impl ParseError {
    pub fn new(message: impl Into<String>, line: usize, column: usize) -> Self {
        ParseError {
            message: message.into(),
            line,
            column,
            span: (0, 0),
        }
    }

    pub fn with_span(mut self, start: usize, end: usize) -> Self {
        self.span = (start, end);
        self
    }

    /// Render the error with `radius` lines of source on each side of the
    /// failing line, plus a caret under the failing column.
    ///
    /// `source` must be the text that produced this error.
    pub fn render_context(&self, source: &str, radius: usize) -> String {
        let lines: Vec<&str> = source.lines().collect();
        let mut out = format!("{}\n", self);
        if lines.is_empty() || self.line == 0 {
            return out;
        }

        let failing = self.line.min(lines.len());
        let first = failing.saturating_sub(radius).max(1);
        let last = (failing + radius).min(lines.len());
        let width = last.to_string().len();

        for number in first..=last {
            let marker = if number == failing { '>' } else { ' ' };
            out.push_str(&format!(
                "{} {:>width$} | {}\n",
                marker,
                number,
                lines[number - 1],
                width = width
            ));
            if number == failing {
                out.push_str(&format!(
                    "  {:>width$} | {}^\n",
                    "",
                    " ".repeat(self.column.saturating_sub(1)),
                    width = width
                ));
            }
        }
        out
    }
}

/// A value could not be turned into (or recovered from) its encoded form.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodingError {
    #[error("cannot encode non-finite number {0}")]
    NonFiniteNumber(String),

    #[error("<{token}> expects a string as parameter {index}")]
    ExpectedString { token: String, index: usize },

    #[error("<{token}> is a free-text block and cannot carry {what}")]
    TextBlockContent { token: String, what: &'static str },

    #[error("invalid base64: {0}")]
    InvalidBase64(String),

    #[error("plugin header truncated: needed {needed} bytes, found {available}")]
    TruncatedHeader { needed: usize, available: usize },

    #[error("plugin header magic {found:02x?} does not match {expected:02x?}")]
    BadMagic { found: [u8; 4], expected: [u8; 4] },

    #[error("plugin header has {0} unexpected trailing bytes")]
    TrailingBytes(usize),

    #[error("invalid plugin id {0:?}")]
    InvalidPluginId(String),

    #[error("string {0:?} holds a line break and has no single-line form")]
    LineBreakInString(String),

    #[error("<{0}> is not a section source")]
    NotASection(String),
}

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config {origin}: {message}")]
    Parse { origin: String, message: String },
}
