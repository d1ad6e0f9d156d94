//! Isolated execution of unstable operations.
//!
//! Wraps a single risky, hang-prone operation (evidence retrieval against an
//! embedding index) so its failure cannot take down the worker loop. Each
//! attempt runs on a freshly spawned thread with a deadline enforced through
//! a bounded result channel; nothing is reused across attempts, so a
//! poisoned cache or leaked handle in a failed attempt cannot reach the
//! retry. A timed-out attempt is abandoned — its thread finishes (or hangs)
//! on its own with a disconnected sender.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, RecvTimeoutError};
use thiserror::Error;

/// Error from an exhausted isolated call. Carries the final attempt's
/// failure; earlier attempts are logged as they happen.
#[derive(Error, Debug)]
pub enum IsolateError<E>
where
    E: std::error::Error + 'static,
{
    #[error("isolated operation timed out after {0:?}")]
    TimedOut(Duration),

    #[error("isolated worker died: {0}")]
    WorkerDied(String),

    #[error(transparent)]
    Operation(E),
}

/// Timeout and retry policy for isolated execution.
#[derive(Debug, Clone, Copy)]
pub struct IsolatedCall {
    pub timeout: Duration,
    pub max_attempts: u32,
    pub retry_delay: Duration,
}

impl Default for IsolatedCall {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            max_attempts: 2,
            retry_delay: Duration::from_secs(5),
        }
    }
}

impl IsolatedCall {
    pub fn new(timeout: Duration, max_attempts: u32, retry_delay: Duration) -> Self {
        Self {
            timeout,
            max_attempts,
            retry_delay,
        }
    }

    /// Runs `op` in an isolated context, retrying up to `max_attempts` total
    /// attempts with a fixed delay between them.
    ///
    /// Returns the first successful result without further attempts. On
    /// exhaustion the final attempt's error (operation error, timeout, or
    /// dead worker) is returned.
    ///
    /// # Panics
    /// Panics if `max_attempts` is 0.
    pub fn run<T, E, F>(&self, op: F) -> Result<T, IsolateError<E>>
    where
        F: Fn() -> Result<T, E> + Send + Sync + 'static,
        T: Send + 'static,
        E: std::error::Error + Send + 'static,
    {
        assert!(self.max_attempts > 0, "max_attempts must be > 0");

        let op = Arc::new(op);
        let mut last_error = IsolateError::WorkerDied("no attempts were made".to_string());

        for attempt in 1..=self.max_attempts {
            let (result_tx, result_rx) = bounded(1);
            let op = Arc::clone(&op);

            let spawned = thread::Builder::new()
                .name(format!("isolated-call-{}", attempt))
                .spawn(move || {
                    let outcome = catch_unwind(AssertUnwindSafe(|| op()));
                    let _ = result_tx.send(outcome);
                });

            last_error = match spawned {
                Err(e) => IsolateError::WorkerDied(format!("failed to spawn worker: {}", e)),
                Ok(_handle) => match result_rx.recv_timeout(self.timeout) {
                    Ok(Ok(Ok(value))) => {
                        log::info!("Isolated call succeeded on attempt {}", attempt);
                        return Ok(value);
                    }
                    Ok(Ok(Err(e))) => IsolateError::Operation(e),
                    Ok(Err(panic)) => IsolateError::WorkerDied(panic_message(panic)),
                    Err(RecvTimeoutError::Timeout) => IsolateError::TimedOut(self.timeout),
                    Err(RecvTimeoutError::Disconnected) => {
                        IsolateError::WorkerDied("result channel disconnected".to_string())
                    }
                },
            };

            log::warn!(
                "Attempt {}/{} of isolated call failed: {}",
                attempt,
                self.max_attempts,
                last_error
            );

            if attempt < self.max_attempts {
                log::info!("Waiting {:?} before retrying", self.retry_delay);
                thread::sleep(self.retry_delay);
            }
        }

        log::error!("All retry attempts failed for isolated call, propagating error");
        Err(last_error)
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic in isolated worker".to_string()
    }
}
