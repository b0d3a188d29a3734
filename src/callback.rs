//! Callback adapter
//!
//! The driver only returns futures. Callers built around completion callbacks
//! can hand any driver future to [`on_complete`], which runs it on the current
//! tokio runtime and passes the `Result` to the callback.

use std::future::Future;

use tokio::task::JoinHandle;

use crate::batch::{BatchGet, KeyError};
use crate::error::Result;
use crate::store::Document;

/// Run `future` in the background and deliver its result to `callback`
///
/// Must be called from within a tokio runtime.
pub fn on_complete<T, Fut, C>(future: Fut, callback: C) -> JoinHandle<()>
where
    T: Send + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
    C: FnOnce(Result<T>) + Send + 'static,
{
    tokio::spawn(async move { callback(future.await) })
}

/// A batch get in callback argument order: `(errors, found, misses)`
///
/// `misses` is `None` when the call did not surface them, which corresponds
/// to the two-argument callback form.
pub type BatchCallbackArgs = (
    Option<Vec<KeyError>>,
    Vec<(String, Document)>,
    Option<Vec<String>>,
);

/// Split a batch get into callback arguments
pub fn batch_args(batch: BatchGet) -> BatchCallbackArgs {
    (batch.errors, batch.found, batch.misses)
}
