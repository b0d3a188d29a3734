//! In-memory store
//!
//! HashMap-based store behind a RwLock, honoring the same CAS, locking and
//! expiry rules as a networked document store:
//! - every mutation issues a fresh CAS
//! - a CAS-guarded write fails with "key exists" if the CAS moved
//! - a locked document rejects writes that do not carry the lock CAS
//! - plain reads of a locked document report a sentinel CAS
//! - locking reads of a locked document fail with a temporary failure
//!
//! Each operation yields to the runtime before touching the map so
//! concurrent callers interleave between store calls, as they would over a
//! network.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;

use crate::error::{ErrorCode, StoreError, StoreResult};

use super::{
    BucketManager, Cas, Document, KvStore, MultiResponse, MutationResult, RawEntry, StoreOptions,
    Transcoder,
};

/// Lock duration used when the caller does not pass one
pub const DEFAULT_LOCK_TIME_SECS: u32 = 15;

/// Longest lock the store grants
pub const MAX_LOCK_TIME_SECS: u32 = 30;

/// CAS reported by plain reads of a locked document
pub const LOCKED_CAS: Cas = Cas(u64::MAX);

/// A stored document
#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    cas: Cas,
    expires_at: Option<Instant>,
    lock: Option<Lock>,
}

/// A pessimistic lock held on an entry
#[derive(Debug, Clone, Copy)]
struct Lock {
    cas: Cas,
    until: Instant,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    fn active_lock(&self, now: Instant) -> Option<Lock> {
        self.lock.filter(|lock| lock.until > now)
    }

    /// Check that a write carrying `cas` may proceed
    fn check_write(&self, cas: Option<Cas>, now: Instant) -> StoreResult<()> {
        if let Some(lock) = self.active_lock(now) {
            return if cas == Some(lock.cas) {
                Ok(())
            } else {
                Err(StoreError::locked())
            };
        }

        match cas {
            Some(cas) if cas != self.cas => Err(StoreError::key_exists()),
            _ => Ok(()),
        }
    }

    /// CAS as reported to plain readers
    fn visible_cas(&self, now: Instant) -> Cas {
        if self.active_lock(now).is_some() {
            LOCKED_CAS
        } else {
            self.cas
        }
    }
}

/// In-process document store
///
/// ## Concurrency:
/// - `data`: RwLock over the whole map (reads shared, mutations exclusive)
/// - `next_cas`: atomic counter (lock-free)
/// - All methods use `&self`
pub struct MemoryStore {
    /// Live documents by key
    data: RwLock<HashMap<String, Entry>>,

    /// Source of fresh CAS values
    next_cas: AtomicU64,

    /// Cleared by `disconnect`
    connected: AtomicBool,

    /// Encoding selected through `set_transcoder`
    transcoder: Mutex<Transcoder>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
            next_cas: AtomicU64::new(1),
            connected: AtomicBool::new(true),
            transcoder: Mutex::new(Transcoder::default()),
        }
    }

    /// Whether `key` is currently held by a lock
    pub fn is_locked(&self, key: &str) -> bool {
        let now = Instant::now();
        self.data
            .read()
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .is_some_and(|entry| entry.active_lock(now).is_some())
    }

    /// Whether the store still accepts requests
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Encoding last selected through `set_transcoder`
    pub fn transcoder(&self) -> Transcoder {
        *self.transcoder.lock()
    }

    /// Number of live documents
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.data
            .read()
            .values()
            .filter(|entry| !entry.is_expired(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // =========================================================================
    // Internal Helpers
    // =========================================================================

    fn fresh_cas(&self) -> Cas {
        Cas(self.next_cas.fetch_add(1, Ordering::Relaxed))
    }

    /// Yield to the scheduler, then fail if disconnected
    async fn enter(&self, operation: &str, key: &str) -> StoreResult<Instant> {
        tokio::task::yield_now().await;

        if !self.is_connected() {
            return Err(StoreError::new(
                ErrorCode::Other("ENOTCONN".to_string()),
                "Client is disconnected",
            ));
        }

        tracing::trace!(operation, key, "memory store call");
        Ok(Instant::now())
    }

    fn expiry(options: &StoreOptions, now: Instant) -> Option<Instant> {
        match options.expiry_secs {
            Some(0) | None => None,
            Some(secs) => Some(now + Duration::from_secs(u64::from(secs))),
        }
    }

    /// Run `f` against the live entry for `key`, dropping it first if expired
    fn with_live_entry<T>(
        &self,
        key: &str,
        now: Instant,
        f: impl FnOnce(&mut Entry) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let mut data = self.data.write();

        if data.get(key).is_some_and(|entry| entry.is_expired(now)) {
            data.remove(key);
        }

        match data.get_mut(key) {
            Some(entry) => f(entry),
            None => Err(StoreError::key_not_found()),
        }
    }

    fn read_live(&self, key: &str, now: Instant) -> Option<(Value, Cas)> {
        self.data
            .read()
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| (entry.value.clone(), entry.visible_cas(now)))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str, _options: &StoreOptions) -> StoreResult<Document> {
        let now = self.enter("get", key).await?;

        self.read_live(key, now)
            .map(|(value, cas)| Document { value, cas })
            .ok_or_else(StoreError::key_not_found)
    }

    async fn get_multi(&self, keys: &[String]) -> StoreResult<MultiResponse> {
        let now = self.enter("get_multi", "*").await?;
        tracing::trace!(keys = keys.len(), "multi-get");

        let mut response = MultiResponse::with_capacity(keys.len());
        for key in keys {
            let entry = match self.read_live(key, now) {
                Some((value, cas)) => RawEntry::hit(value, cas),
                None => RawEntry::failed(StoreError::key_not_found()),
            };
            response.insert(key.clone(), Some(entry));
        }

        Ok(response)
    }

    async fn get_and_lock(&self, key: &str, options: &StoreOptions) -> StoreResult<Document> {
        let now = self.enter("get_and_lock", key).await?;
        let lock_secs = options
            .lock_time_secs
            .unwrap_or(DEFAULT_LOCK_TIME_SECS)
            .clamp(1, MAX_LOCK_TIME_SECS);

        self.with_live_entry(key, now, |entry| {
            if entry.active_lock(now).is_some() {
                return Err(StoreError::temporary_failure());
            }

            let cas = self.fresh_cas();
            entry.cas = cas;
            entry.lock = Some(Lock {
                cas,
                until: now + Duration::from_secs(u64::from(lock_secs)),
            });

            Ok(Document {
                value: entry.value.clone(),
                cas,
            })
        })
    }

    async fn insert(
        &self,
        key: &str,
        value: &Value,
        options: &StoreOptions,
    ) -> StoreResult<MutationResult> {
        let now = self.enter("insert", key).await?;
        let mut data = self.data.write();

        if data.get(key).is_some_and(|entry| !entry.is_expired(now)) {
            return Err(StoreError::key_exists());
        }

        let cas = self.fresh_cas();
        data.insert(
            key.to_string(),
            Entry {
                value: value.clone(),
                cas,
                expires_at: Self::expiry(options, now),
                lock: None,
            },
        );

        Ok(MutationResult { cas })
    }

    async fn upsert(
        &self,
        key: &str,
        value: &Value,
        options: &StoreOptions,
    ) -> StoreResult<MutationResult> {
        let now = self.enter("upsert", key).await?;
        let mut data = self.data.write();

        let cas = self.fresh_cas();
        match data.get_mut(key).filter(|entry| !entry.is_expired(now)) {
            Some(entry) => {
                entry.check_write(options.cas, now)?;
                entry.value = value.clone();
                entry.cas = cas;
                entry.expires_at = Self::expiry(options, now);
                entry.lock = None;
            }
            None if options.cas.is_some() => return Err(StoreError::key_not_found()),
            None => {
                data.insert(
                    key.to_string(),
                    Entry {
                        value: value.clone(),
                        cas,
                        expires_at: Self::expiry(options, now),
                        lock: None,
                    },
                );
            }
        }

        Ok(MutationResult { cas })
    }

    async fn remove(&self, key: &str, options: &StoreOptions) -> StoreResult<MutationResult> {
        let now = self.enter("remove", key).await?;
        let mut data = self.data.write();

        let entry = data
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .ok_or_else(StoreError::key_not_found)?;
        entry.check_write(options.cas, now)?;

        data.remove(key);
        Ok(MutationResult {
            cas: self.fresh_cas(),
        })
    }

    async fn unlock(&self, key: &str, cas: Cas) -> StoreResult<MutationResult> {
        let now = self.enter("unlock", key).await?;

        self.with_live_entry(key, now, |entry| match entry.active_lock(now) {
            Some(lock) if lock.cas == cas => {
                entry.lock = None;
                Ok(MutationResult { cas: entry.cas })
            }
            Some(_) => Err(StoreError::key_exists()),
            None => Err(StoreError::new(
                ErrorCode::Other("NOT_LOCKED".to_string()),
                "The document is not locked",
            )),
        })
    }

    // -------------------------------------------------------------------------
    // Passthrough operations
    // -------------------------------------------------------------------------

    async fn replace(
        &self,
        key: &str,
        value: &Value,
        options: &StoreOptions,
    ) -> StoreResult<MutationResult> {
        let now = self.enter("replace", key).await?;

        self.with_live_entry(key, now, |entry| {
            entry.check_write(options.cas, now)?;
            let cas = self.fresh_cas();
            entry.value = value.clone();
            entry.cas = cas;
            entry.expires_at = Self::expiry(options, now);
            entry.lock = None;
            Ok(MutationResult { cas })
        })
    }

    async fn touch(&self, key: &str, expiry_secs: u32) -> StoreResult<MutationResult> {
        let now = self.enter("touch", key).await?;
        let options = StoreOptions::default().with_expiry_secs(expiry_secs);

        self.with_live_entry(key, now, |entry| {
            entry.check_write(None, now)?;
            let cas = self.fresh_cas();
            entry.cas = cas;
            entry.expires_at = Self::expiry(&options, now);
            Ok(MutationResult { cas })
        })
    }

    async fn counter(
        &self,
        key: &str,
        delta: i64,
        initial: Option<i64>,
        options: &StoreOptions,
    ) -> StoreResult<(i64, Cas)> {
        let now = self.enter("counter", key).await?;

        let existing = self.with_live_entry(key, now, |entry| {
            entry.check_write(options.cas, now)?;
            let current = entry.value.as_i64().ok_or_else(|| {
                StoreError::new(
                    ErrorCode::Other("DELTA_BADVAL".to_string()),
                    "The document is not a number",
                )
            })?;

            let next = current.wrapping_add(delta);
            let cas = self.fresh_cas();
            entry.value = Value::from(next);
            entry.cas = cas;
            Ok((next, cas))
        });

        match (existing, initial) {
            (Err(err), Some(initial)) if err.code == Some(ErrorCode::KeyNotFound) => {
                let cas = self.insert(key, &Value::from(initial), options).await?.cas;
                Ok((initial, cas))
            }
            (result, _) => result,
        }
    }

    async fn lookup_in(&self, key: &str, paths: &[String]) -> StoreResult<Vec<Option<Value>>> {
        let now = self.enter("lookup_in", key).await?;
        let (value, _) = self
            .read_live(key, now)
            .ok_or_else(StoreError::key_not_found)?;

        Ok(paths
            .iter()
            .map(|path| value.pointer(path).cloned())
            .collect())
    }

    async fn mutate_in(
        &self,
        key: &str,
        path: &str,
        value: &Value,
        options: &StoreOptions,
    ) -> StoreResult<MutationResult> {
        let now = self.enter("mutate_in", key).await?;

        self.with_live_entry(key, now, |entry| {
            entry.check_write(options.cas, now)?;
            set_pointer(&mut entry.value, path, value.clone())?;
            let cas = self.fresh_cas();
            entry.cas = cas;
            entry.lock = None;
            Ok(MutationResult { cas })
        })
    }

    fn disconnect(&self) {
        self.connected.store(false, Ordering::Release);
        tracing::debug!("memory store disconnected");
    }

    fn set_transcoder(&self, transcoder: Transcoder) {
        *self.transcoder.lock() = transcoder;
    }

    fn manager(&self) -> Option<&dyn BucketManager> {
        Some(self)
    }
}

#[async_trait]
impl BucketManager for MemoryStore {
    async fn flush(&self) -> StoreResult<()> {
        self.enter("flush", "*").await?;
        self.data.write().clear();
        Ok(())
    }

    async fn item_count(&self) -> StoreResult<usize> {
        self.enter("item_count", "*").await?;
        Ok(self.len())
    }
}

/// Write `value` at JSON pointer `path`, creating the last segment if needed
fn set_pointer(target: &mut Value, path: &str, value: Value) -> StoreResult<()> {
    let path_error = || {
        StoreError::new(
            ErrorCode::Other("SUBDOC_PATH_ENOENT".to_string()),
            format!("Sub-document path does not exist: {}", path),
        )
    };

    if path.is_empty() {
        *target = value;
        return Ok(());
    }

    let (parent_path, last) = path.rsplit_once('/').ok_or_else(path_error)?;
    let last = last.replace("~1", "/").replace("~0", "~");

    match target.pointer_mut(parent_path).ok_or_else(path_error)? {
        Value::Object(map) => {
            map.insert(last, value);
            Ok(())
        }
        Value::Array(items) => {
            if last == "-" {
                items.push(value);
                return Ok(());
            }
            let slot = last
                .parse::<usize>()
                .ok()
                .and_then(|index| items.get_mut(index))
                .ok_or_else(path_error)?;
            *slot = value;
            Ok(())
        }
        _ => Err(path_error()),
    }
}
