//! Error types for shapegraph-storage

use std::fmt;
use thiserror::Error;

/// Storage error kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Database errors (SQLite)
    Database,
    /// Serialization/deserialization errors
    Serialization,
    /// No snapshot for the requested document/revision
    SnapshotNotFound,
    /// A snapshot with the same document and revision already exists
    Conflict,
    /// Payload written by a newer format
    UnsupportedVersion,
    /// Payload checksum does not match its content
    Integrity,
    /// Snapshot could not be applied to a body
    Restore,
    /// I/O errors
    IO,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Database => "database",
            ErrorKind::Serialization => "serialization",
            ErrorKind::SnapshotNotFound => "snapshot_not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::UnsupportedVersion => "unsupported_version",
            ErrorKind::Integrity => "integrity",
            ErrorKind::Restore => "restore",
            ErrorKind::IO => "io",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Storage error type
#[derive(Debug, Error)]
#[error("[{kind}] {message}")]
pub struct StorageError {
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
    pub kind: ErrorKind,
    pub message: String,
}

impl StorageError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    // Convenience constructors
    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Database, message)
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Serialization, message)
    }

    pub fn snapshot_not_found(document_id: &str, revision: Option<u64>) -> Self {
        let message = match revision {
            Some(revision) => format!("Snapshot not found: {document_id}@{revision}"),
            None => format!("No snapshots for document: {document_id}"),
        };
        Self::new(ErrorKind::SnapshotNotFound, message)
    }

    pub fn conflict(document_id: &str, revision: u64) -> Self {
        Self::new(
            ErrorKind::Conflict,
            format!("Snapshot already exists: {document_id}@{revision}"),
        )
    }

    pub fn unsupported_version(found: u32, supported: u32) -> Self {
        Self::new(
            ErrorKind::UnsupportedVersion,
            format!("Document format {found} is newer than supported format {supported}"),
        )
    }

    pub fn integrity(expected: &str, actual: &str) -> Self {
        Self::new(
            ErrorKind::Integrity,
            format!("Checksum mismatch: stored {expected}, computed {actual}"),
        )
    }
}

// SQLite error conversions
#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        StorageError::database(format!("SQLite error: {}", err)).with_source(err)
    }
}

// JSON error conversions
impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::serialization(format!("JSON error: {}", err)).with_source(err)
    }
}

impl From<shapegraph_core::RebuildError> for StorageError {
    fn from(err: shapegraph_core::RebuildError) -> Self {
        StorageError::new(ErrorKind::Restore, format!("Restore failed: {}", err)).with_source(err)
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::new(ErrorKind::IO, format!("I/O error: {}", err)).with_source(err)
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, StorageError>;
