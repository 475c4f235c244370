//! Error types for configuration, extraction, persistence and export.

use std::path::PathBuf;
use thiserror::Error;

/// Malformed or unreadable normalization configuration. The engine keeps its
/// previous rules and mappings when this is returned.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read mapping file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid mapping document: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid replacement pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Failure to extract orders from one input file. Always fatal to that file
/// only; the batch records it and moves on.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The file kind has no extractor.
    #[error("unsupported document format: {path}")]
    UnsupportedFormat { path: PathBuf },

    #[error("could not open workbook {path}: {message}")]
    Workbook { path: PathBuf, message: String },

    #[error("could not read PDF {path}: {message}")]
    Pdf { path: PathBuf, message: String },

    #[error("could not read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The document opened but holds nothing that looks like an order sheet.
    #[error("no order structure found in {path}: {reason}")]
    NoStructure { path: PathBuf, reason: String },
}

/// Storage sink failure. Aborts the whole run.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("could not open database {path}: {message}")]
    Open { path: PathBuf, message: String },

    #[error("could not create tables: {0}")]
    Schema(#[source] rusqlite::Error),

    #[error("could not append records: {0}")]
    Append(#[source] rusqlite::Error),

    #[error("database query failed: {0}")]
    Query(#[source] rusqlite::Error),

    #[error("could not close database: {0}")]
    Close(#[source] rusqlite::Error),

    #[error("database connection lock poisoned")]
    Poisoned,
}

/// Failure while writing the found-schools export or the mapping template.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("could not write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not serialize export: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Anything that stops a command-line run.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error("input folder not found: {0}")]
    MissingInput(PathBuf),

    #[error("could not start batch worker: {0}")]
    Worker(#[source] std::io::Error),

    #[error("batch worker panicked")]
    WorkerPanicked,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_format_names_the_file() {
        let err = ExtractError::UnsupportedFormat {
            path: PathBuf::from("/orders/week12.docx"),
        };
        assert_eq!(err.to_string(), "unsupported document format: /orders/week12.docx");
    }

    #[test]
    fn config_parse_error_from_serde() {
        let serde_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: ConfigError = serde_err.into();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
