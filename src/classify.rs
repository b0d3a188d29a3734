//! Error classification
//!
//! Different transport paths report the same condition differently (binary
//! protocol codes, legacy numeric codes, view/query messages). Everything
//! here normalizes them to one [`ErrorKind`].
//!
//! The predicates are pure and accept anything that may carry a store error:
//! [`StoreError`], [`DriverError`], or an `Option` of either (`None` is never
//! classified as anything).

use crate::error::{
    DriverError, ErrorCode, StoreError, LEGACY_KEY_NOT_FOUND, LEGACY_TEMPORARY_FAILURE,
};

/// Classification tag for a store error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The key does not exist
    NotFound,

    /// Expected to resolve itself on retry
    Transient,

    /// Anything else
    Other,
}

/// Access to the store error behind a value, if there is one
pub trait AsStoreError {
    fn as_store_error(&self) -> Option<&StoreError>;
}

impl AsStoreError for StoreError {
    fn as_store_error(&self) -> Option<&StoreError> {
        Some(self)
    }
}

impl AsStoreError for DriverError {
    fn as_store_error(&self) -> Option<&StoreError> {
        self.store_error()
    }
}

impl<E: AsStoreError> AsStoreError for Option<E> {
    fn as_store_error(&self) -> Option<&StoreError> {
        self.as_ref().and_then(AsStoreError::as_store_error)
    }
}

impl<E: AsStoreError + ?Sized> AsStoreError for &E {
    fn as_store_error(&self) -> Option<&StoreError> {
        (**self).as_store_error()
    }
}

/// Whether the error reports a missing key
pub fn is_key_not_found<E: AsStoreError + ?Sized>(err: &E) -> bool {
    let Some(err) = err.as_store_error() else {
        return false;
    };

    code_matches(err, ErrorCode::KeyNotFound, LEGACY_KEY_NOT_FOUND)
        || err.message == "key not found"
        || err.message.contains("key does not exist")
        || err.message.contains("key not found")
}

/// Whether the error is a transient server condition
pub fn is_temporary_error<E: AsStoreError + ?Sized>(err: &E) -> bool {
    let Some(err) = err.as_store_error() else {
        return false;
    };

    code_matches(err, ErrorCode::TemporaryFailure, LEGACY_TEMPORARY_FAILURE)
        || err.message.contains("Temporary failure")
}

/// Classify an error
///
/// Not-found wins over transient when both match.
pub fn classify<E: AsStoreError + ?Sized>(err: &E) -> ErrorKind {
    if is_key_not_found(err) {
        ErrorKind::NotFound
    } else if is_temporary_error(err) {
        ErrorKind::Transient
    } else {
        ErrorKind::Other
    }
}

/// Canonical code, or any code that stringifies to the legacy numeric
fn code_matches(err: &StoreError, canonical: ErrorCode, legacy: i64) -> bool {
    match &err.code {
        Some(code) if *code == canonical => true,
        Some(code) => code.to_string() == legacy.to_string(),
        None => false,
    }
}
