//! Batch Get Reconciler
//!
//! Splits a raw multi-get response into hits, misses and genuine per-key
//! errors.
//!
//! ## Per-key rules (request order)
//! 1. No entry, or an empty entry: skipped (transport anomaly, not a miss)
//! 2. Entry with a present value: hit
//! 3. Entry with a not-found error: miss
//! 4. Entry with any other error: error
//!
//! An entry with neither a present value nor an error falls through every
//! rule and is skipped as well.

use crate::classify::is_key_not_found;
use crate::error::StoreError;
use crate::store::{is_truthy, Document, MultiResponse};

/// A per-key failure inside a batch get
#[derive(Debug, Clone, PartialEq)]
pub struct KeyError {
    pub key: String,
    pub error: StoreError,
}

/// Reconciled batch get
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchGet {
    /// Hits, in request order
    pub found: Vec<(String, Document)>,

    /// Keys the store reported missing; `None` when misses are not surfaced
    pub misses: Option<Vec<String>>,

    /// Genuine per-key errors; `None` when there were none
    pub errors: Option<Vec<KeyError>>,
}

impl BatchGet {
    /// Documents only, in request order
    pub fn documents(&self) -> impl Iterator<Item = &Document> {
        self.found.iter().map(|(_, doc)| doc)
    }

    /// Whether any key failed with a genuine error
    pub fn has_errors(&self) -> bool {
        self.errors.is_some()
    }
}

/// Reconcile `response` against the requested `keys`
///
/// A key requested twice is reconciled once, at its first position.
pub fn reconcile(keys: &[String], mut response: MultiResponse, return_misses: bool) -> BatchGet {
    let mut found = Vec::new();
    let mut misses = Vec::new();
    let mut errors = Vec::new();

    for key in keys {
        let Some(Some(entry)) = response.remove(key) else {
            tracing::trace!(key = %key, "no entry in multi-get response, skipping");
            continue;
        };

        match (entry.value, entry.error) {
            (Some(value), _) if is_truthy(&value) => {
                let cas = entry.cas.unwrap_or_default();
                found.push((key.clone(), Document { value, cas }));
            }
            (_, Some(error)) if is_key_not_found(&error) => misses.push(key.clone()),
            (_, Some(error)) => errors.push(KeyError {
                key: key.clone(),
                error,
            }),
            (_, None) => {
                tracing::trace!(key = %key, "empty multi-get entry, skipping");
            }
        }
    }

    tracing::debug!(
        requested = keys.len(),
        found = found.len(),
        misses = misses.len(),
        errors = errors.len(),
        "batch get reconciled"
    );

    BatchGet {
        found,
        misses: return_misses.then_some(misses),
        errors: (!errors.is_empty()).then_some(errors),
    }
}
