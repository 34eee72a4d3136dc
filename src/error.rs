//! Crate-wide error taxonomy
//!
//! Every subsystem defines its own error enum with a stable `code()` and a
//! `severity()`. Each one also maps onto an [`ErrorKind`], the five outcome
//! classes the surrounding server acts on. [`CoreError`] is the union type
//! returned by the store façade.

use std::fmt;

use thiserror::Error;

use crate::config::ConfigError;
use crate::dn::DnError;
use crate::filter::FilterError;
use crate::kv::KvError;
use crate::record::CodecError;
use crate::schema::SchemaError;

/// Severity levels shared by all subsystems
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Operation fails, the store stays usable
    Error,
    /// The surrounding transaction must be aborted
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

/// Outcome classes reported to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A lookup found nothing. A normal outcome, not a failure.
    NotFound,
    /// The name or identifier already exists.
    Conflict,
    /// A persisted record or node could not be decoded.
    DecodeFault,
    /// An encoded record exceeds the configured maximum size.
    TooLarge,
    /// The key-value engine failed.
    StorageFault,
    /// The request itself is unusable (bad name, absent value, bad config).
    InvalidRequest,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Conflict => "CONFLICT",
            ErrorKind::DecodeFault => "DECODE_FAULT",
            ErrorKind::TooLarge => "TOO_LARGE",
            ErrorKind::StorageFault => "STORAGE_FAULT",
            ErrorKind::InvalidRequest => "INVALID_REQUEST",
        };
        f.write_str(s)
    }
}

/// Result type for store operations
pub type CoreResult<T> = Result<T, CoreError>;

/// Any error the data engine can report
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Kv(#[from] KvError),

    #[error(transparent)]
    Dn(#[from] DnError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The request cannot be applied to the current record state
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl CoreError {
    /// Creates an invalid-request error
    pub fn invalid(message: impl Into<String>) -> Self {
        CoreError::InvalidRequest(message.into())
    }

    /// Returns the outcome class
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::Kv(e) => e.kind(),
            CoreError::Dn(e) => e.kind(),
            CoreError::Codec(e) => e.kind(),
            CoreError::Schema(e) => e.kind(),
            CoreError::Filter(e) => e.kind(),
            CoreError::Config(_) => ErrorKind::InvalidRequest,
            CoreError::InvalidRequest(_) => ErrorKind::InvalidRequest,
        }
    }

    /// Returns the stable error code
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::Kv(e) => e.code(),
            CoreError::Dn(e) => e.code(),
            CoreError::Codec(e) => e.code(),
            CoreError::Schema(e) => e.code(),
            CoreError::Filter(e) => e.code(),
            CoreError::Config(e) => e.code(),
            CoreError::InvalidRequest(_) => "DIR_INVALID_REQUEST",
        }
    }

    /// Returns the severity level for this error
    pub fn severity(&self) -> Severity {
        match self {
            CoreError::Kv(e) => e.severity(),
            CoreError::Dn(e) => e.severity(),
            CoreError::Codec(e) => e.severity(),
            CoreError::Schema(e) => e.severity(),
            CoreError::Filter(e) => e.severity(),
            CoreError::Config(_) | CoreError::InvalidRequest(_) => Severity::Error,
        }
    }

    /// Returns true if the caller must abort its write transaction
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }

    /// Returns true for the not-found outcome
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}
