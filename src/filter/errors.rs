//! Candidate evaluation error types
//!
//! Error codes:
//! - DIR_FILTER_STORAGE (FATAL)
//! - DIR_FILTER_NAME_INDEX (FATAL, or ERROR for a corrupt node)
//!
//! Unindexed or unanswerable assertions are not errors; they widen the
//! candidate set instead.

use thiserror::Error;

use crate::dn::DnError;
use crate::error::{ErrorKind, Severity};
use crate::kv::KvError;

/// Result type for candidate evaluation
pub type FilterResult<T> = Result<T, FilterError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error("index read failed: {0}")]
    Storage(#[from] KvError),

    #[error("name index: {0}")]
    Dn(#[from] DnError),
}

impl FilterError {
    /// Returns the stable error code
    pub fn code(&self) -> &'static str {
        match self {
            FilterError::Storage(_) => "DIR_FILTER_STORAGE",
            FilterError::Dn(_) => "DIR_FILTER_NAME_INDEX",
        }
    }

    /// Returns the severity level for this error
    pub fn severity(&self) -> Severity {
        match self {
            FilterError::Storage(e) => e.severity(),
            FilterError::Dn(e) => e.severity(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            FilterError::Storage(e) => e.kind(),
            FilterError::Dn(e) => e.kind(),
        }
    }
}
