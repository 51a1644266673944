//! Error taxonomy for the engine, grammar loading, queries and edits

use std::ops::Range;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use url::Url;

/// Grammar loading failures.
///
/// Cloneable because one failed in-flight load is observed by every caller
/// that was waiting on it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GrammarError {
    #[error("no grammar configured for language '{0}'")]
    Unsupported(String),

    #[error("grammar library for '{language}' not found at {path}")]
    NotFound { language: String, path: PathBuf },

    #[error("failed to load grammar library {path}: {message}")]
    Library { path: PathBuf, message: String },

    #[error("grammar library {path} does not export {symbol}")]
    MissingSymbol { path: PathBuf, symbol: String },

    #[error("grammar for '{language}' is incompatible with this tree-sitter runtime: {message}")]
    IncompatibleVersion { language: String, message: String },

    #[error("no builtin grammar named '{0}'")]
    UnknownBuiltin(String),

    #[error("grammar for '{0}' is still loading")]
    Pending(String),

    #[error("grammar loading task failed: {0}")]
    Task(String),
}

/// Structural query failures. Callers treat these as "not applicable here".
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("no node contains range {start}..{end}")]
    NotFound { start: usize, end: usize },

    #[error("cannot determine sibling boundaries for range {start}..{end}")]
    AmbiguousBoundary { start: usize, end: usize },

    #[error("ranges {first:?} and {second:?} overlap")]
    OverlappingRanges { first: Range<usize>, second: Range<usize> },

    #[error("range {start}..{end} is invalid")]
    InvalidRange { start: usize, end: usize },

    #[error(transparent)]
    Edit(#[from] EditError),
}

impl QueryError {
    pub(crate) fn not_found(range: &Range<usize>) -> Self {
        QueryError::NotFound { start: range.start, end: range.end }
    }

    pub(crate) fn ambiguous(range: &Range<usize>) -> Self {
        QueryError::AmbiguousBoundary { start: range.start, end: range.end }
    }
}

/// Text edits rejected by a [`crate::document::TextDocument`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EditError {
    #[error("edit range {start}..{end} exceeds document length {len}")]
    OutOfBounds { start: usize, end: usize, len: usize },

    #[error("edit range {start}..{end} is reversed")]
    Reversed { start: usize, end: usize },

    #[error("byte offset {0} is not on a character boundary")]
    NotCharBoundary(usize),
}

/// Errors surfaced by [`crate::engine::SyntaxEngine`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("language '{0}' has no grammar")]
    UnsupportedLanguage(String),

    #[error("grammar for '{0}' is still loading")]
    GrammarNotReady(String),

    #[error(transparent)]
    Grammar(#[from] GrammarError),

    #[error("document {0} is not open")]
    DocumentNotOpen(Url),

    #[error("parsing {uri} exceeded {timeout:?}")]
    ParseTimeout { uri: Url, timeout: Duration },

    #[error("parsing {uri} failed: {reason}")]
    ParseFailed { uri: Url, reason: String },

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Edit(#[from] EditError),
}

/// Configuration loading failures.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
