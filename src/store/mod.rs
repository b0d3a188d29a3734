//! Store Module
//!
//! The boundary with the underlying key-value document store.
//!
//! ## Responsibilities
//! - Define the [`KvStore`] client contract the driver consumes
//! - Define the values that cross it: [`Document`], [`Cas`], [`StoreOptions`],
//!   [`MutationResult`] and raw multi-get entries
//! - Provide [`MemoryStore`], an in-process store with real CAS, locking and
//!   expiry semantics
//!
//! ## Passthrough Surface
//! Operations the driver forwards without retry or normalization:
//!
//! | Operation | Style |
//! |-----------|-------|
//! | `replace`, `touch`, `counter`, `lookup_in`, `mutate_in`, `query` | async |
//! | `disconnect`, `invalidate_query_cache`, `set_transcoder`, `manager` | sync |
//!
//! Stores that lack one of these keep the default method, which reports
//! [`ErrorCode::Unsupported`](crate::error::ErrorCode::Unsupported) (async) or
//! does nothing (sync).

mod memory;

pub use memory::{MemoryStore, DEFAULT_LOCK_TIME_SECS, LOCKED_CAS, MAX_LOCK_TIME_SECS};

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{StoreError, StoreResult};

// =============================================================================
// Values
// =============================================================================

/// Opaque version token issued by the store
///
/// Only ever compared or forwarded, never interpreted. `Cas(0)` stands for
/// "no version reported".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cas(pub u64);

impl fmt::Display for Cas {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// A retrieved document and the CAS it was read at
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub value: Value,
    pub cas: Cas,
}

/// Whether a document body counts as present
///
/// `null`, `false`, `0` and `""` are empty; objects and arrays never are.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Outcome of a successful mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutationResult {
    pub cas: Cas,
}

/// Per-key entry of a raw multi-get response
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawEntry {
    pub value: Option<Value>,
    pub cas: Option<Cas>,
    pub error: Option<StoreError>,
}

impl RawEntry {
    pub fn hit(value: Value, cas: Cas) -> Self {
        Self {
            value: Some(value),
            cas: Some(cas),
            error: None,
        }
    }

    pub fn failed(error: StoreError) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }
}

/// Raw multi-get response; a `None` entry is a transport anomaly
pub type MultiResponse = HashMap<String, Option<RawEntry>>;

/// How the store encodes document bodies on the wire
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transcoder {
    #[default]
    Json,
    Utf8,
    Binary,
}

// =============================================================================
// Options
// =============================================================================

/// Option bag accepted by store operations
///
/// Unset fields leave the store's own default in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreOptions {
    /// Only apply the write if the document is still at this version
    pub cas: Option<Cas>,

    /// Document expiry in seconds (0 = never)
    pub expiry_secs: Option<u32>,

    /// Lock duration for locking reads, in seconds
    pub lock_time_secs: Option<u32>,

    /// Durability: number of nodes the write must be persisted to
    pub persist_to: Option<u8>,

    /// Durability: number of replicas the write must reach
    pub replicate_to: Option<u8>,
}

impl StoreOptions {
    /// Set the CAS guard
    pub fn with_cas(mut self, cas: Cas) -> Self {
        self.cas = Some(cas);
        self
    }

    /// Set the expiry (seconds)
    pub fn with_expiry_secs(mut self, secs: u32) -> Self {
        self.expiry_secs = Some(secs);
        self
    }

    /// Set the lock duration (seconds)
    pub fn with_lock_time_secs(mut self, secs: u32) -> Self {
        self.lock_time_secs = Some(secs);
        self
    }

    /// Layer `overrides` on top of `self`, field by field
    pub fn merged_with(&self, overrides: &StoreOptions) -> StoreOptions {
        StoreOptions {
            cas: overrides.cas.or(self.cas),
            expiry_secs: overrides.expiry_secs.or(self.expiry_secs),
            lock_time_secs: overrides.lock_time_secs.or(self.lock_time_secs),
            persist_to: overrides.persist_to.or(self.persist_to),
            replicate_to: overrides.replicate_to.or(self.replicate_to),
        }
    }
}

// =============================================================================
// Client Contract
// =============================================================================

/// Administrative access to a bucket
#[async_trait]
pub trait BucketManager: Send + Sync {
    /// Remove every document
    async fn flush(&self) -> StoreResult<()>;

    /// Number of live documents
    async fn item_count(&self) -> StoreResult<usize>;
}

/// Key-value document store client
///
/// Implementations must be safe for concurrent use through `&self`; the
/// driver shares one client across every in-flight call.
#[async_trait]
pub trait KvStore: Send + Sync {
    // -------------------------------------------------------------------------
    // Wrapped by the driver
    // -------------------------------------------------------------------------

    /// Read a document
    async fn get(&self, key: &str, options: &StoreOptions) -> StoreResult<Document>;

    /// Read many documents; one entry per key the store answered for
    async fn get_multi(&self, keys: &[String]) -> StoreResult<MultiResponse>;

    /// Read a document and take a pessimistic lock on it
    ///
    /// The returned CAS is the lock token.
    async fn get_and_lock(&self, key: &str, options: &StoreOptions) -> StoreResult<Document>;

    /// Create a document; fails if the key exists
    async fn insert(
        &self,
        key: &str,
        value: &Value,
        options: &StoreOptions,
    ) -> StoreResult<MutationResult>;

    /// Create or replace a document
    async fn upsert(
        &self,
        key: &str,
        value: &Value,
        options: &StoreOptions,
    ) -> StoreResult<MutationResult>;

    /// Delete a document
    async fn remove(&self, key: &str, options: &StoreOptions) -> StoreResult<MutationResult>;

    /// Release a lock taken by [`get_and_lock`](KvStore::get_and_lock)
    async fn unlock(&self, key: &str, cas: Cas) -> StoreResult<MutationResult>;

    // -------------------------------------------------------------------------
    // Forwarded unchanged (async)
    // -------------------------------------------------------------------------

    /// Replace an existing document; fails if the key is missing
    async fn replace(
        &self,
        _key: &str,
        _value: &Value,
        _options: &StoreOptions,
    ) -> StoreResult<MutationResult> {
        Err(StoreError::unsupported("replace"))
    }

    /// Update a document's expiry without reading it
    async fn touch(&self, _key: &str, _expiry_secs: u32) -> StoreResult<MutationResult> {
        Err(StoreError::unsupported("touch"))
    }

    /// Add `delta` to a numeric document, creating it with `initial` if absent
    async fn counter(
        &self,
        _key: &str,
        _delta: i64,
        _initial: Option<i64>,
        _options: &StoreOptions,
    ) -> StoreResult<(i64, Cas)> {
        Err(StoreError::unsupported("counter"))
    }

    /// Read sub-document paths (JSON pointers)
    async fn lookup_in(&self, _key: &str, _paths: &[String]) -> StoreResult<Vec<Option<Value>>> {
        Err(StoreError::unsupported("lookup_in"))
    }

    /// Write one sub-document path (JSON pointer)
    async fn mutate_in(
        &self,
        _key: &str,
        _path: &str,
        _value: &Value,
        _options: &StoreOptions,
    ) -> StoreResult<MutationResult> {
        Err(StoreError::unsupported("mutate_in"))
    }

    /// Run a query statement
    async fn query(&self, _statement: &str) -> StoreResult<Vec<Value>> {
        Err(StoreError::unsupported("query"))
    }

    // -------------------------------------------------------------------------
    // Forwarded unchanged (sync)
    // -------------------------------------------------------------------------

    /// Close the connection
    fn disconnect(&self) {}

    /// Drop cached prepared query plans
    fn invalidate_query_cache(&self) {}

    /// Change how document bodies are encoded
    fn set_transcoder(&self, _transcoder: Transcoder) {}

    /// Administrative handle, if the store exposes one
    fn manager(&self) -> Option<&dyn BucketManager> {
        None
    }
}
