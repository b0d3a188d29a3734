//! Tests for error classification
//!
//! These tests verify:
//! - Every not-found shape (canonical code, legacy numeric, messages)
//! - Every temporary-failure shape
//! - Absent errors classify as nothing
//! - Driver errors classify through their store error

use kvguard::error::{LEGACY_KEY_EXISTS, LEGACY_KEY_NOT_FOUND, LEGACY_TEMPORARY_FAILURE};
use kvguard::{classify, is_key_not_found, is_temporary_error, DriverError, ErrorCode, ErrorKind, StoreError};

// =============================================================================
// Not Found
// =============================================================================

#[test]
fn test_canonical_not_found_code() {
    let err = StoreError::new(ErrorCode::KeyNotFound, "whatever the transport says");
    assert!(is_key_not_found(&err));
    assert_eq!(classify(&err), ErrorKind::NotFound);
}

#[test]
fn test_legacy_numeric_not_found_code() {
    let err = StoreError::new(ErrorCode::Numeric(LEGACY_KEY_NOT_FOUND), "opaque");
    assert!(is_key_not_found(&err));
}

#[test]
fn test_string_code_that_stringifies_to_legacy_not_found() {
    let err = StoreError::new(ErrorCode::Other("13".to_string()), "opaque");
    assert!(is_key_not_found(&err));
}

#[test]
fn test_not_found_messages() {
    assert!(is_key_not_found(&StoreError::message("key not found")));
    assert!(is_key_not_found(&StoreError::message(
        "The key does not exist on the server"
    )));
    assert!(is_key_not_found(&StoreError::message(
        "view query failed: key not found in index"
    )));
}

#[test]
fn test_message_match_is_case_sensitive() {
    assert!(!is_key_not_found(&StoreError::message("Key Not Found")));
}

#[test]
fn test_other_codes_are_not_not_found() {
    let err = StoreError::new(ErrorCode::Numeric(LEGACY_KEY_EXISTS), "exists");
    assert!(!is_key_not_found(&err));
    assert_eq!(classify(&err), ErrorKind::Other);
}

// =============================================================================
// Temporary Failures
// =============================================================================

#[test]
fn test_canonical_temporary_code() {
    let err = StoreError::temporary_failure();
    assert!(is_temporary_error(&err));
    assert_eq!(classify(&err), ErrorKind::Transient);
}

#[test]
fn test_legacy_numeric_temporary_code() {
    let err = StoreError::new(ErrorCode::Numeric(LEGACY_TEMPORARY_FAILURE), "busy");
    assert!(is_temporary_error(&err));
}

#[test]
fn test_temporary_message() {
    let err = StoreError::message("Temporary failure received from server. Try again later");
    assert!(is_temporary_error(&err));
    assert!(!is_key_not_found(&err));
}

#[test]
fn test_locked_is_not_temporary() {
    assert!(!is_temporary_error(&StoreError::locked()));
    assert_eq!(classify(&StoreError::locked()), ErrorKind::Other);
}

// =============================================================================
// Absent and Wrapped Errors
// =============================================================================

#[test]
fn test_absent_error_is_nothing() {
    let none: Option<StoreError> = None;
    assert!(!is_key_not_found(&none));
    assert!(!is_temporary_error(&none));
}

#[test]
fn test_present_optional_error_is_classified() {
    let some = Some(StoreError::key_not_found());
    assert!(is_key_not_found(&some));
}

#[test]
fn test_driver_error_classifies_through_store_error() {
    let err = DriverError::from(StoreError::temporary_failure());
    assert!(is_temporary_error(&err));

    let invalid = DriverError::InvalidOperation("replace".to_string());
    assert!(!is_temporary_error(&invalid));
    assert!(!is_key_not_found(&invalid));
    assert_eq!(classify(&invalid), ErrorKind::Other);
}

#[test]
fn test_cas_conflict_detection() {
    assert!(StoreError::key_exists().is_cas_conflict());
    assert!(StoreError::new(ErrorCode::Numeric(LEGACY_KEY_EXISTS), "exists").is_cas_conflict());
    assert!(!StoreError::locked().is_cas_conflict());
    assert!(!StoreError::message("key exists").is_cas_conflict());
}
