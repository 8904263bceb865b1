//! Async runtime helpers for blocking callers.
//!
//! Reconciliation handlers are often synchronous while the probes and the wait
//! engine are async. This module is the single bridge between the two.

use std::future::Future;

use thiserror::Error;
use tokio::{
    runtime::{Handle, RuntimeFlavor},
    task,
};

/// Error raised when no runtime can be used to drive a future.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// A fallback runtime could not be built.
    #[error("could not build a Tokio runtime: {0}")]
    Build(#[from] std::io::Error),
    /// The caller is inside a current-thread runtime, where blocking would deadlock.
    #[error("cannot block inside a current-thread Tokio runtime; await the future instead")]
    CurrentThreadRuntime,
}

/// Execute an async future to completion from synchronous code.
///
/// - Inside a multi-threaded runtime the current worker is handed over with
///   `block_in_place` and the future runs on the existing runtime.
/// - Outside any runtime a single-threaded runtime is created for the call.
/// - Inside a current-thread runtime an error is returned instead of deadlocking.
pub fn block_on_future<F, T>(future: F) -> Result<T, RuntimeError>
where
    F: Future<Output = T>,
{
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::CurrentThread => Err(RuntimeError::CurrentThreadRuntime),
        Ok(handle) => Ok(task::block_in_place(|| handle.block_on(future))),
        Err(_) => {
            let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
            Ok(runtime.block_on(future))
        }
    }
}
