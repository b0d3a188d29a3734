//! Atomic Engine
//!
//! Client-orchestrated read-transform-write made safe by CAS and bounded
//! retry.
//!
//! ## One attempt
//! ```text
//! READ (get, or get_and_lock when locking)
//!   │  missing key → transform sees None
//!   ▼
//! TRANSFORM (caller's pure function)
//!   │
//!   ├─ Noop ──────────────────► unlock if locked ─► done
//!   ├─ Upsert, present value ─► doc existed? upsert with read CAS
//!   │                           otherwise insert (loses to a concurrent create)
//!   └─ anything else ─────────► unlock if locked ─► remove
//! ```
//!
//! Any failure fails the attempt, and the whole attempt is re-run from READ
//! until `atomic_retry_times` attempts have been made. A stale CAS is always
//! rejected, so every attempt must start from a fresh read.
//!
//! The upsert path issues no explicit unlock: a write carrying the lock CAS
//! releases the lock on the store side.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{AtomicOptions, ResolvedAtomic, WriteOptions};
use crate::error::{DriverError, Result};
use crate::retry::retry;
use crate::store::{is_truthy, Cas, Document, KvStore, StoreOptions};

use super::Driver;

/// Action requested by a transform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    Upsert,
    Remove,
    Noop,
}

/// Every action a transform may return
pub const OPERATIONS: [Operation; 3] = [Operation::Upsert, Operation::Remove, Operation::Noop];

/// What a transform wants done with the document
#[derive(Debug, Clone, PartialEq)]
pub struct Directive {
    pub action: Operation,
    pub value: Option<Value>,
}

impl Directive {
    /// Write `value` (an empty value removes the document instead)
    pub fn upsert(value: Value) -> Self {
        Self {
            action: Operation::Upsert,
            value: Some(value),
        }
    }

    /// Delete the document
    pub fn remove() -> Self {
        Self {
            action: Operation::Remove,
            value: None,
        }
    }

    /// Leave the document alone and hand `value` back to the caller
    pub fn noop(value: Option<Value>) -> Self {
        Self {
            action: Operation::Noop,
            value,
        }
    }
}

/// Result of a successful atomic call
#[derive(Debug, Clone, PartialEq)]
pub struct AtomicOutcome {
    /// Action actually performed
    pub action: Operation,

    /// Value written (upsert) or handed back (noop)
    pub value: Option<Value>,

    /// CAS of the write, if the store reported one
    pub cas: Option<Cas>,
}

impl<S: KvStore> Driver<S> {
    /// Atomically update `key` with driver-wide defaults
    pub async fn atomic<F>(&self, key: &str, transform: F) -> Result<AtomicOutcome>
    where
        F: Fn(Option<&Value>) -> Directive + Sync,
    {
        self.atomic_with(key, transform, &AtomicOptions::default())
            .await
    }

    /// Atomically update `key`
    ///
    /// `transform` receives the current value (`None` if the key is missing)
    /// and may be called once per attempt. On exhaustion the last attempt's
    /// error is returned unchanged.
    pub async fn atomic_with<F>(
        &self,
        key: &str,
        transform: F,
        options: &AtomicOptions,
    ) -> Result<AtomicOutcome>
    where
        F: Fn(Option<&Value>) -> Directive + Sync,
    {
        let resolved = self.config.resolve_atomic(options);
        let settings = &resolved;
        let transform = &transform;

        retry(&resolved.retry, move |attempt| {
            self.atomic_attempt(key, transform, settings, attempt)
        })
        .await
    }

    /// One READ → TRANSFORM → DISPATCH pass
    async fn atomic_attempt<F>(
        &self,
        key: &str,
        transform: &F,
        settings: &ResolvedAtomic,
        attempt: u32,
    ) -> Result<AtomicOutcome>
    where
        F: Fn(Option<&Value>) -> Directive + Sync,
    {
        let current = self.atomic_read(key, settings).await?;
        let locked = settings.lock && current.is_some();

        let directive = transform(current.as_ref().map(|doc| &doc.value));
        tracing::debug!(
            key,
            attempt,
            existed = current.is_some(),
            locked,
            action = ?directive.action,
            "atomic dispatch"
        );

        let result = match (directive.action, directive.value) {
            (Operation::Noop, value) => self.atomic_noop(key, current.as_ref(), locked, value).await,
            (Operation::Upsert, Some(value)) if is_truthy(&value) => {
                self.atomic_write(key, current.as_ref(), value, settings).await
            }
            _ => {
                self.atomic_remove(key, current.as_ref(), locked, settings)
                    .await
            }
        };

        if let Err(DriverError::Store(err)) = &result {
            if err.is_cas_conflict() {
                tracing::debug!(key, attempt, "atomic attempt lost a CAS race");
            }
        }

        result
    }

    async fn atomic_read(&self, key: &str, settings: &ResolvedAtomic) -> Result<Option<Document>> {
        if settings.lock {
            let options = WriteOptions {
                temp_retry: settings.temp_retry.clone(),
                store: StoreOptions {
                    lock_time_secs: settings.lock_time_secs,
                    ..StoreOptions::default()
                },
            };
            self.get_and_lock(key, &options).await
        } else {
            self.get(key).await
        }
    }

    async fn atomic_noop(
        &self,
        key: &str,
        current: Option<&Document>,
        locked: bool,
        value: Option<Value>,
    ) -> Result<AtomicOutcome> {
        if let (true, Some(doc)) = (locked, current) {
            self.store.unlock(key, doc.cas).await?;
        }

        Ok(AtomicOutcome {
            action: Operation::Noop,
            value,
            cas: None,
        })
    }

    async fn atomic_write(
        &self,
        key: &str,
        current: Option<&Document>,
        value: Value,
        settings: &ResolvedAtomic,
    ) -> Result<AtomicOutcome> {
        let result = match current {
            Some(doc) => {
                let options = WriteOptions {
                    temp_retry: settings.temp_retry.clone(),
                    store: settings
                        .save_options
                        .merged_with(&StoreOptions::default().with_cas(doc.cas)),
                };
                self.upsert(key, &value, &options).await?
            }
            None => {
                let options = WriteOptions {
                    temp_retry: settings.temp_retry.clone(),
                    store: settings.save_options.clone(),
                };
                self.insert(key, &value, &options).await?
            }
        };

        Ok(AtomicOutcome {
            action: Operation::Upsert,
            value: Some(value),
            cas: result.map(|r| r.cas),
        })
    }

    /// Locking reads remove with save options and the post-unlock CAS;
    /// plain reads issue a bare remove.
    async fn atomic_remove(
        &self,
        key: &str,
        current: Option<&Document>,
        locked: bool,
        settings: &ResolvedAtomic,
    ) -> Result<AtomicOutcome> {
        let mut store_options = if settings.lock {
            settings.save_options.clone()
        } else {
            StoreOptions::default()
        };

        if let (true, Some(doc)) = (locked, current) {
            let unlocked = self.store.unlock(key, doc.cas).await?;
            store_options.cas = Some(unlocked.cas);
        }

        let options = WriteOptions {
            temp_retry: settings.temp_retry.clone(),
            store: store_options,
        };
        let result = self.remove(key, &options).await?;

        Ok(AtomicOutcome {
            action: Operation::Remove,
            value: None,
            cas: result.map(|r| r.cas),
        })
    }
}
