use crate::schema::DatasetKind;
use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while reading a source file into a [`crate::types::Table`].
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Both the first attempt and the fallback attempt failed.
    #[error("cannot read file {path}: {reason}")]
    Unreadable { path: PathBuf, reason: String },
    #[error("unsupported file extension for {0}")]
    UnsupportedFormat(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MappingError {
    #[error("{kind} has no canonical field named `{field}`")]
    UnknownField { kind: DatasetKind, field: String },
    #[error("source column `{source_column}` does not exist in the {kind} file")]
    UnknownSource { kind: DatasetKind, source_column: String },
    #[error("mapping is for {found} but the dataset is {expected}")]
    KindMismatch { expected: DatasetKind, found: DatasetKind },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{name} must be between {min} and {max} days, got {value}")]
pub struct ThresholdError {
    pub name: &'static str,
    pub value: i64,
    pub min: i64,
    pub max: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReportError {
    /// No delivery, request or process dataset is loaded.
    #[error("no dataset loaded, nothing to report")]
    NothingToReport,
}

#[derive(Debug, Error)]
pub enum PresetError {
    #[error("failed to read preset {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid preset {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Threshold(#[from] ThresholdError),
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write CSV {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("failed to serialize {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
