//! Driver Module
//!
//! The façade application code talks to. Wraps a [`KvStore`] client and adds:
//! - not-found normalization (a missing key is an absent result, not an error)
//! - batch gets with miss tracking
//! - bounded retry of transient errors on writes and locking reads
//! - CAS-based atomic read-modify-write, optionally under a pessimistic lock
//!
//! ## Layering
//! ```text
//! atomic ──► write façade ──► retry executor ──► KvStore
//!    │            │
//!    └──► get ────┴──► classifier
//! ```
//!
//! The driver holds no mutable state. Concurrent calls, including concurrent
//! atomic calls on one key, are serialized only by the store's CAS and lock
//! protocol.

mod atomic;
mod write;

pub use atomic::{AtomicOutcome, Directive, Operation, OPERATIONS};
pub use write::{OpOutput, StoreOp};

use serde_json::Value;

use crate::batch::{reconcile, BatchGet};
use crate::classify::is_key_not_found;
use crate::config::{DriverConfig, GetOptions};
use crate::error::Result;
use crate::store::{
    BucketManager, Cas, Document, KvStore, MutationResult, StoreOptions, Transcoder,
};

/// Resilience façade over a key-value store client
pub struct Driver<S> {
    /// Underlying client (shared read-only by every call)
    store: S,

    /// Driver-wide defaults
    config: DriverConfig,
}

impl<S: KvStore> Driver<S> {
    /// Wrap `store` with the given driver-wide configuration
    pub fn new(store: S, config: DriverConfig) -> Result<Self> {
        config.validate()?;
        tracing::debug!(?config, "driver created");
        Ok(Self { store, config })
    }

    /// Wrap `store` with default configuration
    pub fn with_defaults(store: S) -> Self {
        Self {
            store,
            config: DriverConfig::default(),
        }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Get one document; a missing key yields `Ok(None)`
    pub async fn get(&self, key: &str) -> Result<Option<Document>> {
        self.get_with(key, &GetOptions::default()).await
    }

    /// Get one document with per-call options
    pub async fn get_with(&self, key: &str, options: &GetOptions) -> Result<Option<Document>> {
        match self.store.get(key, &options.store).await {
            Ok(doc) => Ok(Some(doc)),
            Err(err) if is_key_not_found(&err) => {
                tracing::trace!(key, "get miss suppressed");
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Get many documents
    ///
    /// Missing keys never fail the call. Whether they are surfaced in
    /// [`BatchGet::misses`] follows the driver-wide `missing` setting.
    pub async fn get_multi<K: AsRef<str>>(&self, keys: &[K]) -> Result<BatchGet> {
        self.get_multi_with(keys, &GetOptions::default()).await
    }

    /// Get many documents with per-call options
    pub async fn get_multi_with<K: AsRef<str>>(
        &self,
        keys: &[K],
        options: &GetOptions,
    ) -> Result<BatchGet> {
        let return_misses = self.config.resolve_missing(options);
        let keys: Vec<String> = keys.iter().map(|k| k.as_ref().to_string()).collect();

        if keys.is_empty() {
            return Ok(reconcile(&keys, Default::default(), return_misses));
        }

        let response = self.store.get_multi(&keys).await?;
        Ok(reconcile(&keys, response, return_misses))
    }

    // =========================================================================
    // Passthrough (async, no retry)
    // =========================================================================

    /// Release a lock taken by a locking read
    pub async fn unlock(&self, key: &str, cas: Cas) -> Result<MutationResult> {
        Ok(self.store.unlock(key, cas).await?)
    }

    pub async fn replace(
        &self,
        key: &str,
        value: &Value,
        options: &StoreOptions,
    ) -> Result<MutationResult> {
        Ok(self.store.replace(key, value, options).await?)
    }

    pub async fn touch(&self, key: &str, expiry_secs: u32) -> Result<MutationResult> {
        Ok(self.store.touch(key, expiry_secs).await?)
    }

    pub async fn counter(
        &self,
        key: &str,
        delta: i64,
        initial: Option<i64>,
        options: &StoreOptions,
    ) -> Result<(i64, Cas)> {
        Ok(self.store.counter(key, delta, initial, options).await?)
    }

    pub async fn lookup_in(&self, key: &str, paths: &[String]) -> Result<Vec<Option<Value>>> {
        Ok(self.store.lookup_in(key, paths).await?)
    }

    pub async fn mutate_in(
        &self,
        key: &str,
        path: &str,
        value: &Value,
        options: &StoreOptions,
    ) -> Result<MutationResult> {
        Ok(self.store.mutate_in(key, path, value, options).await?)
    }

    pub async fn query(&self, statement: &str) -> Result<Vec<Value>> {
        Ok(self.store.query(statement).await?)
    }

    // =========================================================================
    // Passthrough (sync)
    // =========================================================================

    pub fn disconnect(&self) {
        self.store.disconnect()
    }

    pub fn invalidate_query_cache(&self) {
        self.store.invalidate_query_cache()
    }

    pub fn set_transcoder(&self, transcoder: Transcoder) {
        self.store.set_transcoder(transcoder)
    }

    pub fn manager(&self) -> Option<&dyn BucketManager> {
        self.store.manager()
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Get the underlying store client
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Get the driver-wide configuration
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }
}
