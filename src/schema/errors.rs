//! Schema and interning error types
//!
//! Error codes:
//! - DIR_SCHEMA_UNKNOWN_ATTRIBUTE (ERROR)
//! - DIR_SCHEMA_TABLE_FULL (FATAL)
//! - DIR_SCHEMA_TABLE_CORRUPT (FATAL)
//! - DIR_SCHEMA_STORAGE (FATAL)

use thiserror::Error;

use crate::error::{ErrorKind, Severity};
use crate::kv::KvError;

/// Result type for schema operations
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Errors raised while resolving or interning attribute descriptions
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// The schema has no attribute type with this name
    #[error("unknown attribute type: {0}")]
    UnknownAttribute(String),

    /// Every interning index is taken
    #[error("attribute interning table is full ({0} entries)")]
    TableFull(usize),

    /// A persisted interning entry is unreadable or out of sequence
    #[error("attribute interning table corrupt: {0}")]
    Corrupt(String),

    /// The key-value engine failed underneath the table
    #[error("attribute interning table storage: {0}")]
    Storage(#[from] KvError),
}

impl SchemaError {
    /// Returns the stable error code
    pub fn code(&self) -> &'static str {
        match self {
            SchemaError::UnknownAttribute(_) => "DIR_SCHEMA_UNKNOWN_ATTRIBUTE",
            SchemaError::TableFull(_) => "DIR_SCHEMA_TABLE_FULL",
            SchemaError::Corrupt(_) => "DIR_SCHEMA_TABLE_CORRUPT",
            SchemaError::Storage(_) => "DIR_SCHEMA_STORAGE",
        }
    }

    /// Returns the severity level for this error
    pub fn severity(&self) -> Severity {
        match self {
            SchemaError::UnknownAttribute(_) => Severity::Error,
            _ => Severity::Fatal,
        }
    }

    /// Returns the outcome class
    pub fn kind(&self) -> ErrorKind {
        match self {
            SchemaError::UnknownAttribute(_) => ErrorKind::InvalidRequest,
            SchemaError::TableFull(_) => ErrorKind::StorageFault,
            SchemaError::Corrupt(_) => ErrorKind::DecodeFault,
            SchemaError::Storage(e) => e.kind(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_and_kinds() {
        let err = SchemaError::UnknownAttribute("fooBar".into());
        assert_eq!(err.code(), "DIR_SCHEMA_UNKNOWN_ATTRIBUTE");
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
        assert!(err.to_string().contains("fooBar"));

        let err = SchemaError::from(KvError::Engine("io".into()));
        assert_eq!(err.kind(), ErrorKind::StorageFault);
        assert_eq!(err.severity(), Severity::Fatal);
    }
}
