//! Result and error types for the core library

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Core library error type
///
/// File-level and mapping-level problems are fatal and surface here.
/// Row-level problems never do: they are collected as
/// [`ParseError`](crate::domain::ParseError) values next to the parsed rows.
#[derive(Error, Debug)]
pub enum Error {
    // === File-level ===
    #[error("File is empty: no header row found")]
    EmptyFile,

    #[error("File has a header row but no data rows")]
    NoData,

    #[error("Unreadable file encoding: {0}")]
    Encoding(String),

    // === Mapping-level ===
    #[error("Invalid column mapping: {}", .0.join("; "))]
    InvalidMapping(Vec<String>),

    #[error("Columns not found in file: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("Account {0} has no saved column mapping")]
    NoSavedMapping(String),

    // === Infrastructure ===
    #[error("Database error: {0}")]
    Database(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a database error
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// True for errors raised before any row was looked at because the
    /// file itself could not be read as a table
    pub fn is_file_level(&self) -> bool {
        matches!(self, Self::EmptyFile | Self::NoData | Self::Encoding(_))
    }

    /// True for errors that require the user to fix the column mapping
    pub fn is_mapping_level(&self) -> bool {
        matches!(
            self,
            Self::InvalidMapping(_) | Self::MissingColumns(_) | Self::NoSavedMapping(_)
        )
    }
}

impl From<duckdb::Error> for Error {
    fn from(e: duckdb::Error) -> Self {
        Self::Database(e.to_string())
    }
}

/// Core library result type
pub type Result<T> = std::result::Result<T, Error>;

/// Operation result with optional context (for JSON output)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationResult<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub context: Option<HashMap<String, serde_json::Value>>,
}

impl<T> OperationResult<T> {
    /// Create a successful result
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            context: None,
        }
    }

    /// Create a successful result with context
    pub fn ok_with_context(data: T, context: HashMap<String, serde_json::Value>) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            context: Some(context),
        }
    }

    /// Create a failed result
    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            context: None,
        }
    }
}

impl<T> From<Result<T>> for OperationResult<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => Self::fail(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_result_ok() {
        let result: OperationResult<i32> = OperationResult::ok(42);
        assert!(result.success);
        assert_eq!(result.data, Some(42));
        assert!(result.error.is_none());
    }

    #[test]
    fn test_from_result() {
        let err: Result<i32> = Err(Error::MissingColumns(vec!["Date".into(), "Amount".into()]));
        let result: OperationResult<i32> = err.into();
        assert!(!result.success);
        assert_eq!(
            result.error.as_deref(),
            Some("Columns not found in file: Date, Amount")
        );
    }

    #[test]
    fn test_error_levels() {
        assert!(Error::EmptyFile.is_file_level());
        assert!(Error::NoData.is_file_level());
        assert!(!Error::NoData.is_mapping_level());
        assert!(Error::InvalidMapping(vec!["x".into()]).is_mapping_level());
        assert!(Error::NoSavedMapping("a".into()).is_mapping_level());
        assert!(!Error::database("boom").is_file_level());
    }
}
