//! Key-value engine error types
//!
//! Error codes:
//! - DIR_KV_KEY_EXIST (ERROR)
//! - DIR_KV_NOT_FOUND (ERROR)
//! - DIR_KV_UNKNOWN_SPACE (FATAL)
//! - DIR_KV_BAD_REPLACE (FATAL)
//! - DIR_KV_ENGINE (FATAL)

use thiserror::Error;

use crate::error::{ErrorKind, Severity};

/// Result type for key-value operations
pub type KvResult<T> = Result<T, KvError>;

/// Errors reported by the transactional key-value engine
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KvError {
    /// A no-overwrite or no-duplicate write hit an existing pair
    #[error("key/data pair already exists")]
    KeyExist,

    /// A write addressed a pair that does not exist
    #[error("no matching key/data pair: {0}")]
    NotFound(String),

    /// A transaction referenced a key space that was never opened
    #[error("unknown key space: {0}")]
    UnknownSpace(u32),

    /// A duplicate replacement would change the duplicate's sort position
    #[error("replacement value does not compare equal to the value it replaces")]
    BadReplace,

    /// The engine failed (I/O, resource exhaustion, corruption)
    #[error("storage engine failure: {0}")]
    Engine(String),
}

impl KvError {
    /// Returns the stable error code
    pub fn code(&self) -> &'static str {
        match self {
            KvError::KeyExist => "DIR_KV_KEY_EXIST",
            KvError::NotFound(_) => "DIR_KV_NOT_FOUND",
            KvError::UnknownSpace(_) => "DIR_KV_UNKNOWN_SPACE",
            KvError::BadReplace => "DIR_KV_BAD_REPLACE",
            KvError::Engine(_) => "DIR_KV_ENGINE",
        }
    }

    /// Returns the severity level for this error
    pub fn severity(&self) -> Severity {
        match self {
            KvError::KeyExist | KvError::NotFound(_) => Severity::Error,
            KvError::UnknownSpace(_) | KvError::BadReplace | KvError::Engine(_) => Severity::Fatal,
        }
    }

    /// Returns the outcome class
    pub fn kind(&self) -> ErrorKind {
        match self {
            KvError::KeyExist => ErrorKind::Conflict,
            _ => ErrorKind::StorageFault,
        }
    }

    /// Returns true for the "already exists" outcome of a guarded write
    pub fn is_key_exist(&self) -> bool {
        matches!(self, KvError::KeyExist)
    }
}
