//! Error types for kvguard
//!
//! Two layers:
//! - [`StoreError`]: what the underlying store client reports (a code and a
//!   message, never interpreted beyond classification)
//! - [`DriverError`]: what the driver façade returns to application code

use std::fmt;

use thiserror::Error;

/// Result type alias using DriverError
pub type Result<T> = std::result::Result<T, DriverError>;

/// Result type alias for raw store calls
pub type StoreResult<T> = std::result::Result<T, StoreError>;

// =============================================================================
// Store Errors
// =============================================================================

/// Legacy numeric code for "temporary failure"
pub const LEGACY_TEMPORARY_FAILURE: i64 = 11;

/// Legacy numeric code for "key exists" (also reported on CAS mismatch)
pub const LEGACY_KEY_EXISTS: i64 = 12;

/// Legacy numeric code for "key not found"
pub const LEGACY_KEY_NOT_FOUND: i64 = 13;

/// Error code attached to a store error
///
/// Binary-protocol paths report canonical codes; older client paths report
/// bare numerics; some paths report arbitrary strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorCode {
    KeyNotFound,
    TemporaryFailure,
    KeyExists,
    Locked,
    Unsupported,
    Numeric(i64),
    Other(String),
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCode::KeyNotFound => f.write_str("KEY_ENOENT"),
            ErrorCode::TemporaryFailure => f.write_str("ETMPFAIL"),
            ErrorCode::KeyExists => f.write_str("KEY_EEXISTS"),
            ErrorCode::Locked => f.write_str("ELOCKED"),
            ErrorCode::Unsupported => f.write_str("ENOTSUP"),
            ErrorCode::Numeric(n) => write!(f, "{}", n),
            ErrorCode::Other(s) => f.write_str(s),
        }
    }
}

/// Opaque error reported by the store client
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct StoreError {
    /// Code as reported by the transport path (may be missing)
    pub code: Option<ErrorCode>,

    /// Human readable message as reported by the store
    pub message: String,
}

impl StoreError {
    /// Create an error with a code and message
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            message: message.into(),
        }
    }

    /// Create an error carrying only a message
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    /// The document does not exist
    pub fn key_not_found() -> Self {
        Self::new(ErrorCode::KeyNotFound, "The key does not exist on the server")
    }

    /// The server asked the client to back off and retry
    pub fn temporary_failure() -> Self {
        Self::new(
            ErrorCode::TemporaryFailure,
            "Temporary failure received from server. Try again later",
        )
    }

    /// The key exists already, or the supplied CAS no longer matches
    pub fn key_exists() -> Self {
        Self::new(
            ErrorCode::KeyExists,
            "The key already exists in the server. If you have supplied a CAS then the key exists with a CAS value different than specified",
        )
    }

    /// The document is held by a pessimistic lock
    pub fn locked() -> Self {
        Self::new(ErrorCode::Locked, "The document is locked")
    }

    /// The store does not implement the requested operation
    pub fn unsupported(operation: &str) -> Self {
        Self::new(
            ErrorCode::Unsupported,
            format!("Operation not supported by this store: {}", operation),
        )
    }

    /// Whether this error reports a CAS mismatch or an insert collision
    pub fn is_cas_conflict(&self) -> bool {
        match &self.code {
            Some(ErrorCode::KeyExists) => true,
            Some(code) => code.to_string() == LEGACY_KEY_EXISTS.to_string(),
            None => false,
        }
    }
}

// =============================================================================
// Driver Errors
// =============================================================================

/// Unified error type for driver operations
#[derive(Debug, Error)]
pub enum DriverError {
    // -------------------------------------------------------------------------
    // Store Errors
    // -------------------------------------------------------------------------
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // -------------------------------------------------------------------------
    // Usage Errors
    // -------------------------------------------------------------------------
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl DriverError {
    /// The store error behind this failure, if any
    pub fn store_error(&self) -> Option<&StoreError> {
        match self {
            DriverError::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for DriverError {
    fn from(e: serde_json::Error) -> Self {
        DriverError::Serialization(e.to_string())
    }
}
