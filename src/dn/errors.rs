//! Name index error types
//!
//! Error codes:
//! - DIR_DN_INVALID (ERROR)
//! - DIR_DN_NOT_FOUND (ERROR)
//! - DIR_DN_CONFLICT (ERROR)
//! - DIR_DN_CORRUPT (FATAL)
//! - DIR_DN_STORAGE (FATAL)

use thiserror::Error;

use crate::error::{ErrorKind, Severity};
use crate::idl::Id;
use crate::kv::KvError;

/// Result type for name index operations
pub type DnResult<T> = Result<T, DnError>;

/// Errors raised by DN parsing and the name index
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DnError {
    /// The string is not a distinguished name
    #[error("invalid DN {dn:?}: {reason}")]
    Invalid { dn: String, reason: String },

    /// No entry with this name or identifier
    #[error("no such entry: {0}")]
    NotFound(String),

    /// An entry with this name already exists under the parent
    #[error("entry already exists: {0}")]
    Conflict(String),

    /// A tree node is unreadable or disagrees with its counterpart
    #[error("tree node {id} corrupt: {reason}")]
    Corrupt { id: Id, reason: String },

    /// The key-value engine failed
    #[error("name index storage: {0}")]
    Storage(#[from] KvError),
}

impl DnError {
    pub(crate) fn invalid(dn: &str, reason: impl Into<String>) -> Self {
        DnError::Invalid {
            dn: dn.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn corrupt(id: Id, reason: impl Into<String>) -> Self {
        DnError::Corrupt {
            id,
            reason: reason.into(),
        }
    }

    /// Returns the stable error code
    pub fn code(&self) -> &'static str {
        match self {
            DnError::Invalid { .. } => "DIR_DN_INVALID",
            DnError::NotFound(_) => "DIR_DN_NOT_FOUND",
            DnError::Conflict(_) => "DIR_DN_CONFLICT",
            DnError::Corrupt { .. } => "DIR_DN_CORRUPT",
            DnError::Storage(_) => "DIR_DN_STORAGE",
        }
    }

    /// Returns the severity level for this error
    pub fn severity(&self) -> Severity {
        match self {
            DnError::Invalid { .. } | DnError::NotFound(_) | DnError::Conflict(_) => Severity::Error,
            DnError::Corrupt { .. } | DnError::Storage(_) => Severity::Fatal,
        }
    }

    /// Returns the outcome class
    pub fn kind(&self) -> ErrorKind {
        match self {
            DnError::Invalid { .. } => ErrorKind::InvalidRequest,
            DnError::NotFound(_) => ErrorKind::NotFound,
            DnError::Conflict(_) => ErrorKind::Conflict,
            DnError::Corrupt { .. } => ErrorKind::DecodeFault,
            DnError::Storage(e) => e.kind(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, DnError::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(DnError::NotFound("cn=x".into()).kind(), ErrorKind::NotFound);
        assert_eq!(DnError::Conflict("cn=x".into()).kind(), ErrorKind::Conflict);
        assert_eq!(DnError::corrupt(4, "short").kind(), ErrorKind::DecodeFault);
        assert!(DnError::corrupt(4, "short").to_string().contains("tree node 4"));
        assert_eq!(DnError::invalid("x", "no '='").code(), "DIR_DN_INVALID");
    }
}
