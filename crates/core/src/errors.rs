//! Error types for the repocrawl core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them all for callers that want a
//! single error type.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    RepositoryAccess(#[from] RepositoryAccessError),

    #[error(transparent)]
    MappingLoad(#[from] MappingLoadError),

    #[error(transparent)]
    MappingValidation(#[from] MappingValidationError),

    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Filesystem failure outside of dataset parsing (copying, creating
    /// output directories, walking the storage tree).
    #[error("I/O error at '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl CoreError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        CoreError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

// ---------------------------------------------------------------------------
// Repository access errors
// ---------------------------------------------------------------------------

/// Git history could not be read for identity harvesting.
#[derive(Debug, Error)]
pub enum RepositoryAccessError {
    /// The repository path does not exist or is not a git repo.
    #[error("git repository not found at '{0}'")]
    NotFound(String),

    /// Walking the commit graph failed part way through.
    #[error("failed to read git history at '{path}': {detail}")]
    History { path: String, detail: String },
}

// ---------------------------------------------------------------------------
// Manual mapping errors
// ---------------------------------------------------------------------------

/// Errors loading the manually curated override mapping.
#[derive(Debug, Error)]
pub enum MappingLoadError {
    /// The mapping file does not exist.
    #[error("manual mapping file not found: {0}")]
    FileNotFound(String),

    /// The mapping file could not be parsed.
    #[error("manual mapping parse error in '{path}': {detail}")]
    ParseError { path: String, detail: String },

    /// An entry has an empty variant or token.
    #[error("invalid manual mapping entry in '{path}': {detail}")]
    InvalidEntry { path: String, detail: String },

    /// Generic I/O error.
    #[error("manual mapping I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Mapping validation errors
// ---------------------------------------------------------------------------

/// A mapping cannot be compiled into a matcher.
#[derive(Debug, Error)]
pub enum MappingValidationError {
    /// A key that is empty or whitespace would match everywhere.
    #[error("mapping key {0:?} is empty or whitespace-only")]
    EmptyKey(String),

    /// A key maps to an empty token, which would erase text.
    #[error("mapping key {0:?} has an empty token")]
    EmptyToken(String),

    /// The combined pattern failed to compile.
    #[error("failed to compile identity matcher: {0}")]
    Pattern(#[from] regex::Error),
}

// ---------------------------------------------------------------------------
// Dataset errors
// ---------------------------------------------------------------------------

/// Errors reading or writing a tabular file.
#[derive(Debug, Error)]
pub enum DatasetError {
    /// The file has no header row.
    #[error("tabular file '{0}' is empty")]
    Empty(String),

    /// CSV parse or write error.
    #[error("CSV error in '{path}': {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },

    /// JSON parse or write error.
    #[error("JSON error in '{path}': {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// The JSON document is not an array of objects.
    #[error("'{path}' is not a JSON table: {detail}")]
    NotATable { path: String, detail: String },

    /// The file extension has no reader.
    #[error("unsupported tabular format: '{0}'")]
    UnsupportedFormat(String),

    /// Generic I/O error.
    #[error("dataset I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
