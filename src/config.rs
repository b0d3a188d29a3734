//! Configuration for kvguard
//!
//! Two layers, resolved once per call:
//! 1. [`DriverConfig`]: driver-wide defaults, fixed at construction
//! 2. Per-call options ([`GetOptions`], [`WriteOptions`], [`AtomicOptions`]):
//!    every field is an `Option`; a set field wins over the driver value
//!
//! Store option bags merge field by field, the later layer winning.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::classify::is_temporary_error;
use crate::error::{DriverError, Result, StoreError};
use crate::retry::{retry_always, RetryConfig};
use crate::store::StoreOptions;

/// Retry configuration for transient store errors
pub type TempRetry = RetryConfig<fn(&StoreError) -> bool>;

/// Retry configuration for whole atomic attempts
pub type AtomicRetry = RetryConfig<fn(&DriverError) -> bool>;

/// Driver-wide configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------
    /// Surface missing keys from batch gets
    pub missing: bool,

    // -------------------------------------------------------------------------
    // Transient Error Retry
    // -------------------------------------------------------------------------
    /// Retry writes and locking reads that fail with a temporary error
    pub retry_temporary_errors: bool,

    /// Total attempts when retrying temporary errors
    pub temp_retry_times: u32,

    /// Delay between temporary error retries (milliseconds)
    pub temp_retry_interval_ms: u64,

    // -------------------------------------------------------------------------
    // Atomic Operations
    // -------------------------------------------------------------------------
    /// Total read-transform-write attempts
    pub atomic_retry_times: u32,

    /// Delay between atomic attempts (milliseconds)
    pub atomic_retry_interval_ms: u64,

    /// Read with a pessimistic lock instead of a plain get
    pub atomic_lock: bool,

    /// Options applied to every atomic write
    pub save_options: StoreOptions,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            missing: true,
            retry_temporary_errors: false,
            temp_retry_times: 5,
            temp_retry_interval_ms: 50,
            atomic_retry_times: 5,
            atomic_retry_interval_ms: 0,
            atomic_lock: true,
            save_options: StoreOptions::default(),
        }
    }
}

impl DriverConfig {
    /// Create a new config builder
    pub fn builder() -> DriverConfigBuilder {
        DriverConfigBuilder::default()
    }

    /// Load a config from a JSON file; absent fields keep their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: DriverConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the retry executor cannot honor
    pub fn validate(&self) -> Result<()> {
        if self.temp_retry_times == 0 {
            return Err(DriverError::Config(
                "temp_retry_times must be at least 1".to_string(),
            ));
        }
        if self.atomic_retry_times == 0 {
            return Err(DriverError::Config(
                "atomic_retry_times must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    // =========================================================================
    // Per-call Resolution
    // =========================================================================

    /// Whether a batch get surfaces its misses
    ///
    /// | driver `missing` | call `missing` | surfaced |
    /// |------------------|----------------|----------|
    /// | true             | unset / true   | yes      |
    /// | true             | false          | no       |
    /// | false            | unset / false  | no       |
    /// | false            | true           | yes      |
    pub fn resolve_missing(&self, options: &GetOptions) -> bool {
        options.missing.unwrap_or(self.missing)
    }

    /// Transient-error retry for one wrapped store call
    pub fn resolve_temp_retry(&self, options: &TempRetryOptions) -> TempRetry {
        let enabled = options
            .retry_temporary_errors
            .unwrap_or(self.retry_temporary_errors);
        let max_attempts = if enabled {
            options.temp_retry_times.unwrap_or(self.temp_retry_times)
        } else {
            1
        };
        let interval = options
            .temp_retry_interval
            .unwrap_or(Duration::from_millis(self.temp_retry_interval_ms));

        RetryConfig::new(
            max_attempts,
            interval,
            is_temporary_error::<StoreError> as fn(&StoreError) -> bool,
        )
    }

    /// Everything one atomic call needs
    pub fn resolve_atomic(&self, options: &AtomicOptions) -> ResolvedAtomic {
        let max_attempts = options.atomic_retry_times.unwrap_or(self.atomic_retry_times);
        let interval = options
            .atomic_retry_interval
            .unwrap_or(Duration::from_millis(self.atomic_retry_interval_ms));
        let save_options = match &options.save_options {
            Some(call) => self.save_options.merged_with(call),
            None => self.save_options.clone(),
        };

        ResolvedAtomic {
            retry: RetryConfig::new(
                max_attempts,
                interval,
                retry_always::<DriverError> as fn(&DriverError) -> bool,
            ),
            lock: options.atomic_lock.unwrap_or(self.atomic_lock),
            save_options,
            lock_time_secs: options.lock_time_secs,
            temp_retry: options.temp_retry.clone(),
        }
    }
}

/// Atomic call settings after resolution
#[derive(Debug, Clone)]
pub struct ResolvedAtomic {
    pub retry: AtomicRetry,
    pub lock: bool,
    pub save_options: StoreOptions,
    pub lock_time_secs: Option<u32>,
    pub temp_retry: TempRetryOptions,
}

/// Builder for DriverConfig
#[derive(Default)]
pub struct DriverConfigBuilder {
    config: DriverConfig,
}

impl DriverConfigBuilder {
    /// Surface missing keys from batch gets by default
    pub fn missing(mut self, missing: bool) -> Self {
        self.config.missing = missing;
        self
    }

    /// Retry temporary errors on wrapped writes
    pub fn retry_temporary_errors(mut self, enabled: bool) -> Self {
        self.config.retry_temporary_errors = enabled;
        self
    }

    /// Set the total attempts for temporary error retry
    pub fn temp_retry_times(mut self, times: u32) -> Self {
        self.config.temp_retry_times = times;
        self
    }

    /// Set the delay between temporary error retries (milliseconds)
    pub fn temp_retry_interval_ms(mut self, ms: u64) -> Self {
        self.config.temp_retry_interval_ms = ms;
        self
    }

    /// Set the total attempts for atomic operations
    pub fn atomic_retry_times(mut self, times: u32) -> Self {
        self.config.atomic_retry_times = times;
        self
    }

    /// Set the delay between atomic attempts (milliseconds)
    pub fn atomic_retry_interval_ms(mut self, ms: u64) -> Self {
        self.config.atomic_retry_interval_ms = ms;
        self
    }

    /// Use locking reads in atomic operations
    pub fn atomic_lock(mut self, lock: bool) -> Self {
        self.config.atomic_lock = lock;
        self
    }

    /// Set the options applied to atomic writes
    pub fn save_options(mut self, options: StoreOptions) -> Self {
        self.config.save_options = options;
        self
    }

    pub fn build(self) -> DriverConfig {
        self.config
    }
}

// =============================================================================
// Per-call Options
// =============================================================================

/// Per-call overrides for transient error retry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TempRetryOptions {
    pub retry_temporary_errors: Option<bool>,
    pub temp_retry_times: Option<u32>,
    pub temp_retry_interval: Option<Duration>,
}

/// Options for `get` and `get_multi`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GetOptions {
    /// Override the driver-wide `missing` setting
    pub missing: Option<bool>,

    /// Passed to the store unchanged
    pub store: StoreOptions,
}

impl GetOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn missing(mut self, missing: bool) -> Self {
        self.missing = Some(missing);
        self
    }
}

/// Options for wrapped writes and locking reads
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteOptions {
    pub temp_retry: TempRetryOptions,

    /// Passed to the store unchanged
    pub store: StoreOptions,
}

impl WriteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn retry_temporary_errors(mut self, enabled: bool) -> Self {
        self.temp_retry.retry_temporary_errors = Some(enabled);
        self
    }

    pub fn temp_retry_times(mut self, times: u32) -> Self {
        self.temp_retry.temp_retry_times = Some(times);
        self
    }

    pub fn temp_retry_interval(mut self, interval: Duration) -> Self {
        self.temp_retry.temp_retry_interval = Some(interval);
        self
    }

    pub fn store(mut self, store: StoreOptions) -> Self {
        self.store = store;
        self
    }
}

/// Options for `atomic`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AtomicOptions {
    pub atomic_retry_times: Option<u32>,
    pub atomic_retry_interval: Option<Duration>,
    pub atomic_lock: Option<bool>,

    /// Merged over the driver-wide save options
    pub save_options: Option<StoreOptions>,

    /// Lock duration for the locking read
    pub lock_time_secs: Option<u32>,

    /// Applied to each store call inside an attempt
    pub temp_retry: TempRetryOptions,
}

impl AtomicOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn atomic_retry_times(mut self, times: u32) -> Self {
        self.atomic_retry_times = Some(times);
        self
    }

    pub fn atomic_retry_interval(mut self, interval: Duration) -> Self {
        self.atomic_retry_interval = Some(interval);
        self
    }

    pub fn atomic_lock(mut self, lock: bool) -> Self {
        self.atomic_lock = Some(lock);
        self
    }

    pub fn save_options(mut self, options: StoreOptions) -> Self {
        self.save_options = Some(options);
        self
    }

    pub fn lock_time_secs(mut self, secs: u32) -> Self {
        self.lock_time_secs = Some(secs);
        self
    }

    pub fn retry_temporary_errors(mut self, enabled: bool) -> Self {
        self.temp_retry.retry_temporary_errors = Some(enabled);
        self
    }
}
