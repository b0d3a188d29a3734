//! Write Façade
//!
//! Retry-wrapped `insert`, `upsert`, `remove` and `get_and_lock`.
//!
//! Every wrapped call:
//! 1. Completes as a no-op (`Ok(None)`) when the key is empty
//! 2. Runs the store call under the transient-error retry policy
//!    (one attempt unless `retry_temporary_errors` is on)
//! 3. For `remove` and `get_and_lock`, turns a not-found failure into
//!    `Ok(None)`

use std::fmt;
use std::future::Future;
use std::str::FromStr;

use serde_json::Value;

use crate::classify::is_key_not_found;
use crate::config::{TempRetryOptions, WriteOptions};
use crate::error::{DriverError, Result, StoreResult};
use crate::retry::retry;
use crate::store::{Document, KvStore, MutationResult};

use super::Driver;

/// Store operations the write façade wraps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Insert,
    Upsert,
    Remove,
    GetAndLock,
}

impl StoreOp {
    pub fn name(&self) -> &'static str {
        match self {
            StoreOp::Insert => "insert",
            StoreOp::Upsert => "upsert",
            StoreOp::Remove => "remove",
            StoreOp::GetAndLock => "getAndLock",
        }
    }

    /// Whether a missing key counts as success for this operation
    pub fn suppresses_not_found(&self) -> bool {
        matches!(self, StoreOp::Remove | StoreOp::GetAndLock)
    }

    /// Whether the operation carries a document body
    pub fn takes_value(&self) -> bool {
        matches!(self, StoreOp::Insert | StoreOp::Upsert)
    }
}

impl fmt::Display for StoreOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StoreOp {
    type Err = DriverError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "insert" => Ok(StoreOp::Insert),
            "upsert" => Ok(StoreOp::Upsert),
            "remove" => Ok(StoreOp::Remove),
            "getAndLock" | "get_and_lock" => Ok(StoreOp::GetAndLock),
            other => Err(DriverError::InvalidOperation(format!(
                "unsupported operation '{}'",
                other
            ))),
        }
    }
}

/// Result of a wrapped operation run by name
#[derive(Debug, Clone, PartialEq)]
pub enum OpOutput {
    Mutation(MutationResult),
    Document(Document),
}

impl<S: KvStore> Driver<S> {
    /// Run a wrapped operation by name
    ///
    /// Fails with [`DriverError::InvalidOperation`] for names the façade does
    /// not wrap, and for `insert`/`upsert` without a value.
    pub async fn execute(
        &self,
        operation: &str,
        key: &str,
        value: Option<&Value>,
        options: &WriteOptions,
    ) -> Result<Option<OpOutput>> {
        let op: StoreOp = operation.parse()?;

        let output = match op {
            StoreOp::Insert => self
                .insert(key, required_value(op, value)?, options)
                .await?
                .map(OpOutput::Mutation),
            StoreOp::Upsert => self
                .upsert(key, required_value(op, value)?, options)
                .await?
                .map(OpOutput::Mutation),
            StoreOp::Remove => self.remove(key, options).await?.map(OpOutput::Mutation),
            StoreOp::GetAndLock => self
                .get_and_lock(key, options)
                .await?
                .map(OpOutput::Document),
        };

        Ok(output)
    }

    /// Create a document; fails if the key exists
    pub async fn insert(
        &self,
        key: &str,
        value: &Value,
        options: &WriteOptions,
    ) -> Result<Option<MutationResult>> {
        self.wrapped(StoreOp::Insert, key, &options.temp_retry, |_| {
            self.store.insert(key, value, &options.store)
        })
        .await
    }

    /// Create or replace a document (CAS-guarded when `options.store.cas` is set)
    pub async fn upsert(
        &self,
        key: &str,
        value: &Value,
        options: &WriteOptions,
    ) -> Result<Option<MutationResult>> {
        self.wrapped(StoreOp::Upsert, key, &options.temp_retry, |_| {
            self.store.upsert(key, value, &options.store)
        })
        .await
    }

    /// Delete a document; deleting a missing key succeeds with `None`
    pub async fn remove(&self, key: &str, options: &WriteOptions) -> Result<Option<MutationResult>> {
        self.wrapped(StoreOp::Remove, key, &options.temp_retry, |_| {
            self.store.remove(key, &options.store)
        })
        .await
    }

    /// Read and lock a document; a missing key yields `None`
    pub async fn get_and_lock(&self, key: &str, options: &WriteOptions) -> Result<Option<Document>> {
        self.wrapped(StoreOp::GetAndLock, key, &options.temp_retry, |_| {
            self.store.get_and_lock(key, &options.store)
        })
        .await
    }

    /// Empty-key short-circuit, transient retry and not-found suppression
    async fn wrapped<T, F, Fut>(
        &self,
        op: StoreOp,
        key: &str,
        retry_options: &TempRetryOptions,
        call: F,
    ) -> Result<Option<T>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        if key.is_empty() {
            tracing::trace!(op = op.name(), "empty key, nothing to do");
            return Ok(None);
        }

        let retry_config = self.config.resolve_temp_retry(retry_options);

        match retry(&retry_config, call).await {
            Ok(output) => Ok(Some(output)),
            Err(err) if op.suppresses_not_found() && is_key_not_found(&err) => {
                tracing::trace!(op = op.name(), key, "not found suppressed");
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }
}

fn required_value(op: StoreOp, value: Option<&Value>) -> Result<&Value> {
    value.ok_or_else(|| DriverError::InvalidOperation(format!("{} requires a value", op)))
}
