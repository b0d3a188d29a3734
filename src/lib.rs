//! # kvguard
//!
//! A resilience layer in front of a key-value document store client:
//! - "Not found" normalized to an absent result
//! - Batch gets that separate hits, misses and genuine errors
//! - Bounded retry of transient server errors
//! - CAS-based atomic read-modify-write with optional pessimistic locking
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Application code                         │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                   Driver (façade)                            │
//! │        get / get_multi / atomic / passthrough                │
//! └──────────┬──────────────────────────────┬───────────────────┘
//!            │                              │
//!            ▼                              ▼
//!   ┌─────────────────┐            ┌─────────────────┐
//!   │  Atomic Engine  │───────────►│  Write Façade   │
//!   │ (CAS + retry)   │            │ (temp retry)    │
//!   └─────────────────┘            └────────┬────────┘
//!            │                              │
//!            ▼                              ▼
//!   ┌─────────────────┐            ┌─────────────────┐
//!   │ Batch Reconciler│            │ Retry Executor  │
//!   └────────┬────────┘            └────────┬────────┘
//!            │        ┌────────────┐        │
//!            └───────►│ Classifier │◄───────┘
//!                     └─────┬──────┘
//!                           ▼
//!                   ┌───────────────┐
//!                   │ KvStore client│
//!                   └───────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod classify;
pub mod retry;
pub mod store;
pub mod batch;
pub mod driver;
pub mod callback;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{DriverError, ErrorCode, Result, StoreError};
pub use config::{AtomicOptions, DriverConfig, GetOptions, WriteOptions};
pub use classify::{classify, is_key_not_found, is_temporary_error, ErrorKind};
pub use batch::BatchGet;
pub use driver::{AtomicOutcome, Directive, Driver, Operation, OPERATIONS};
pub use store::{Cas, Document, KvStore, MemoryStore, StoreOptions};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of kvguard
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
