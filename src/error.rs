use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum ReconcileError {
    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("source file not found: {0}")]
    MissingSource(PathBuf),

    #[error("failed to read table {path}: {message}")]
    TableRead { path: PathBuf, message: String },

    #[error("failed to write table {path}: {message}")]
    TableWrite { path: PathBuf, message: String },

    #[error("column {column} missing from {table}")]
    MissingColumn { table: String, column: String },

    #[error("no report file available for batch {0}")]
    NoReport(String),

    #[error("malformed batch layout in {path}: {reason}")]
    MalformedLayout { path: PathBuf, reason: String },

    #[error("malformed batch metadata in {path}: {reason}")]
    MalformedMetadata { path: PathBuf, reason: String },

    #[error("operator prompt failed: {0}")]
    Prompt(String),
}

impl ReconcileError {
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ReconcileError::ConfigRead(_)
                | ReconcileError::ConfigParse(_)
                | ReconcileError::InvalidConfig(_)
                | ReconcileError::TableWrite { .. }
                | ReconcileError::Filesystem(_)
        )
    }
}
