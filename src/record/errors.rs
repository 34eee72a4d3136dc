//! Record codec error types
//!
//! Error codes:
//! - DIR_RECORD_TOO_LARGE (ERROR)
//! - DIR_RECORD_DUPLICATE_VALUE (ERROR)
//! - DIR_RECORD_NOT_INTERNED (ERROR)
//! - DIR_RECORD_MALFORMED (ERROR) - the record is unusable, the store is not
//! - DIR_RECORD_UNKNOWN_ATTRIBUTE (ERROR)
//! - DIR_RECORD_SCHEMA (FATAL)
//! - DIR_RECORD_STORAGE (FATAL)

use thiserror::Error;

use crate::error::{ErrorKind, Severity};
use crate::idl::Id;
use crate::kv::KvError;
use crate::schema::SchemaError;

/// Result type for codec operations
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors raised while encoding, decoding or storing records
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// The encoded record would exceed the configured maximum
    #[error("encoded record is {size} bytes, limit is {max}")]
    TooLarge { size: usize, max: usize },

    /// Two values of one attribute compare equal
    #[error("attribute {attr} holds a duplicate value")]
    DuplicateValue { attr: String },

    /// Encoding met an attribute with no interning index
    #[error("attribute {0} is not interned")]
    NotInterned(String),

    /// The stored bytes do not follow the record layout
    #[error("record {id} malformed: {reason}")]
    Malformed { id: Id, reason: String },

    /// The stored record names an attribute index nobody interned
    #[error("record {id} uses unknown attribute index {adx}")]
    UnknownAttribute { id: Id, adx: u32 },

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("record storage: {0}")]
    Storage(#[from] KvError),
}

impl CodecError {
    pub(crate) fn malformed(id: Id, reason: impl Into<String>) -> Self {
        CodecError::Malformed {
            id,
            reason: reason.into(),
        }
    }

    /// Returns the stable error code
    pub fn code(&self) -> &'static str {
        match self {
            CodecError::TooLarge { .. } => "DIR_RECORD_TOO_LARGE",
            CodecError::DuplicateValue { .. } => "DIR_RECORD_DUPLICATE_VALUE",
            CodecError::NotInterned(_) => "DIR_RECORD_NOT_INTERNED",
            CodecError::Malformed { .. } => "DIR_RECORD_MALFORMED",
            CodecError::UnknownAttribute { .. } => "DIR_RECORD_UNKNOWN_ATTRIBUTE",
            CodecError::Schema(_) => "DIR_RECORD_SCHEMA",
            CodecError::Storage(_) => "DIR_RECORD_STORAGE",
        }
    }

    /// Returns the severity level for this error
    pub fn severity(&self) -> Severity {
        match self {
            CodecError::Schema(e) => e.severity(),
            CodecError::Storage(e) => e.severity(),
            _ => Severity::Error,
        }
    }

    /// Returns the outcome class
    pub fn kind(&self) -> ErrorKind {
        match self {
            CodecError::TooLarge { .. } => ErrorKind::TooLarge,
            CodecError::DuplicateValue { .. } | CodecError::NotInterned(_) => ErrorKind::InvalidRequest,
            CodecError::Malformed { .. } | CodecError::UnknownAttribute { .. } => ErrorKind::DecodeFault,
            CodecError::Schema(e) => e.kind(),
            CodecError::Storage(e) => e.kind(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_faults_are_not_fatal() {
        let err = CodecError::UnknownAttribute { id: 9, adx: 77 };
        assert_eq!(err.kind(), ErrorKind::DecodeFault);
        assert_eq!(err.severity(), Severity::Error);
        assert!(err.to_string().contains("77"));
    }

    #[test]
    fn test_too_large() {
        let err = CodecError::TooLarge { size: 100, max: 64 };
        assert_eq!(err.kind(), ErrorKind::TooLarge);
        assert_eq!(err.code(), "DIR_RECORD_TOO_LARGE");
    }
}
