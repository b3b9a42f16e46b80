//! Error taxonomy shared by the upload pipeline and the read path.
//!
//! Connection failures are fatal to the current command. Query failures are
//! isolated by the read wrappers in [`crate::query`]. Every upload-path variant
//! aborts the whole batch before anything is written.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, MonitorError>;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("Cannot connect to database {target}: {source}")]
    Connection {
        target: String,
        #[source]
        source: rusqlite::Error,
    },
    #[error("Query '{context}' failed: {source}")]
    Query {
        context: String,
        #[source]
        source: rusqlite::Error,
    },
    #[error(
        "Columns do not match table '{table}': missing [{}], extra [{}]",
        missing.join(", "),
        extra.join(", ")
    )]
    SchemaMismatch {
        table: String,
        missing: Vec<String>,
        extra: Vec<String>,
    },
    #[error(
        "{} value(s) of '{column}' already exist in '{table}': {}",
        keys.len(),
        keys.join(", ")
    )]
    DuplicateKeyConflict {
        table: String,
        column: String,
        keys: Vec<String>,
    },
    #[error("Upload repeats '{column}' value(s) {}", keys.join(", "))]
    DuplicateKeysInBatch { column: String, keys: Vec<String> },
    #[error("Row {row} column '{column}': cannot read '{value}' as {expected}")]
    InvalidValue {
        row: usize,
        column: String,
        value: String,
        expected: &'static str,
    },
    #[error("Writing to '{table}' failed: {source}")]
    Write {
        table: String,
        #[source]
        source: rusqlite::Error,
    },
    #[error("Reading upload {path:?}: {message}")]
    Input { path: PathBuf, message: String },
    #[error("Upload contains no data rows")]
    EmptyUpload,
    #[error("Unknown table '{0}' (expected one of: data, alarm_standards, equipment, alarm, component)")]
    UnknownTable(String),
    #[error("Invalid filter selection: {0}")]
    InvalidSelection(String),
}

impl MonitorError {
    pub fn input(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        MonitorError::Input {
            path: path.into(),
            message: message.to_string(),
        }
    }

    pub fn query(context: impl Into<String>, source: rusqlite::Error) -> Self {
        MonitorError::Query {
            context: context.into(),
            source,
        }
    }

    /// True for failures that reject an upload batch because of its contents.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            MonitorError::SchemaMismatch { .. }
                | MonitorError::DuplicateKeyConflict { .. }
                | MonitorError::DuplicateKeysInBatch { .. }
                | MonitorError::InvalidValue { .. }
                | MonitorError::EmptyUpload
        )
    }
}
