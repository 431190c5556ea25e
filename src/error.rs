// Soundvault Error Types

use serde::Serialize;
use thiserror::Error;

/// Coarse failure code reported by the schema manager and the library facade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorCode {
    ReadError,
    WriteError,
    InvalidError,
    SchemaMismatch,
    TableFormatError,
    QueryError,
}

#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("Read error: {0}")]
    Read(String),

    #[error("Write error: {0}")]
    Write(String),

    #[error("Invalid or corrupt library file: {0}")]
    Invalid(String),

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Table format error: {0}")]
    TableFormat(String),

    #[error("Query error: {0}")]
    Query(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Sound not found: {0}")]
    SoundNotFound(String),

    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    #[error("Collection already exists: {0}")]
    CollectionExists(String),

    #[error("Invalid collection name: {0}")]
    InvalidCollectionName(String),

    #[error("Collection is read-only: {0}")]
    ReadOnlyCollection(String),

    #[error("Sound is factory content and cannot be modified: {0}")]
    FactoryLocked(String),

    #[error("Invalid slot: {0}")]
    InvalidSlot(i64),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Collection is full: {0}")]
    CollectionFull(String),

    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    #[error("Tag not found: {0}")]
    TagNotFound(String),

    #[error("{0}")]
    Other(String),
}

impl LibraryError {
    /// Project this error onto the coarse code surfaced to callers.
    pub fn code(&self) -> ErrorCode {
        match self {
            LibraryError::Read(_) => ErrorCode::ReadError,
            LibraryError::Write(_) | LibraryError::Io(_) => ErrorCode::WriteError,
            LibraryError::Invalid(_) | LibraryError::Json(_) => ErrorCode::InvalidError,
            LibraryError::SchemaMismatch(_) => ErrorCode::SchemaMismatch,
            LibraryError::TableFormat(_) => ErrorCode::TableFormatError,
            _ => ErrorCode::QueryError,
        }
    }

    /// Classify a SQLite failure raised while opening or probing the file.
    pub fn from_open_failure(err: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode as Sqlite;

        match &err {
            rusqlite::Error::SqliteFailure(e, _) => match e.code {
                Sqlite::CannotOpen | Sqlite::PermissionDenied => LibraryError::Read(err.to_string()),
                Sqlite::NotADatabase | Sqlite::DatabaseCorrupt => LibraryError::Invalid(err.to_string()),
                Sqlite::ReadOnly | Sqlite::DiskFull | Sqlite::SystemIoFailure => {
                    LibraryError::Write(err.to_string())
                }
                _ => LibraryError::Query(err),
            },
            _ => LibraryError::Query(err),
        }
    }
}

pub type Result<T> = std::result::Result<T, LibraryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(LibraryError::TableFormat("x".into()).code(), ErrorCode::TableFormatError);
        assert_eq!(LibraryError::SchemaMismatch("x".into()).code(), ErrorCode::SchemaMismatch);
        assert_eq!(LibraryError::InvalidSlot(2000).code(), ErrorCode::QueryError);
        assert_eq!(LibraryError::Invalid("x".into()).code(), ErrorCode::InvalidError);
    }
}
