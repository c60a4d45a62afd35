//! Wait/result facade for pool-scheduled work.
//!
//! Work handed to a [`Spawn`] capability is fire-and-forget: the pool gives
//! nothing back. [`fork`] wraps such a job so that it offers the same wait
//! contract as a [`ControlBlock`](crate::task::ControlBlock):
//!
//! - [`Completion::try_wait`] never blocks past its timeout and returns
//!   `Ok(false)` while the job is running;
//! - once the job finished with an error, every wait replays that error;
//! - aggregate errors are collapsed to their first logical cause.
//!
//! # Example
//!
//! ```
//! use taskward::{fork, ThreadSpawner};
//!
//! let spawner = ThreadSpawner::default();
//! let job = fork(&spawner, || Ok(6 * 7)).unwrap();
//! assert_eq!(job.wait().unwrap(), 42);
//! ```

use crate::context::Spawn;
use crate::error::{Error, Result};
use crate::sync::Gate;
use parking_lot::Mutex;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

/// Handle to the eventual outcome of a forked job.
pub struct Completion<T> {
    shared: Arc<Shared<T>>,
}

struct Shared<T> {
    done: Gate,
    outcome: Mutex<Option<Result<T>>>,
}

impl<T> Clone for Completion<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Completion<T> {
    fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                done: Gate::closed(),
                outcome: Mutex::new(None),
            }),
        }
    }

    fn complete(&self, outcome: Result<T>) {
        *self.shared.outcome.lock() = Some(outcome);
        self.shared.done.open();
    }

    /// Returns true once the job has finished, successfully or not.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.shared.done.is_open()
    }

    /// Waits up to `timeout` for the job.
    ///
    /// Returns `Ok(false)` if it is still running, `Ok(true)` if it
    /// finished successfully, and the (collapsed) error if it failed.
    pub fn try_wait(&self, timeout: Duration) -> Result<bool> {
        if !self.shared.done.wait_timeout(timeout) {
            return Ok(false);
        }
        self.replay_error()?;
        Ok(true)
    }

    fn replay_error(&self) -> Result<()> {
        match self.shared.outcome.lock().as_ref() {
            Some(Err(err)) => Err(err.clone().into_root_cause()),
            _ => Ok(()),
        }
    }

    /// Blocks until the job finished and takes its value.
    ///
    /// Errors are replayed as for [`wait`](Self::wait). Taking the value
    /// leaves later `join`s on other handles with `InvalidOperation`.
    pub fn join(self) -> Result<T> {
        self.shared.done.wait();
        self.replay_error()?;
        match self.shared.outcome.lock().take() {
            Some(Ok(value)) => Ok(value),
            Some(Err(err)) => Err(err.into_root_cause()),
            None => Err(Error::invalid_operation("job result already taken")),
        }
    }
}

impl<T: Clone> Completion<T> {
    /// Blocks until the job finished; returns its value or replays its error.
    pub fn wait(&self) -> Result<T> {
        self.shared.done.wait();
        self.cloned_outcome()
    }

    /// Like [`wait`](Self::wait), bounded by `timeout`.
    ///
    /// Returns a `Timeout` error if the job is still running afterwards.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<T> {
        if !self.shared.done.wait_timeout(timeout) {
            return Err(Error::timeout(timeout));
        }
        self.cloned_outcome()
    }

    fn cloned_outcome(&self) -> Result<T> {
        match self.shared.outcome.lock().as_ref() {
            Some(Ok(value)) => Ok(value.clone()),
            Some(Err(err)) => Err(err.clone().into_root_cause()),
            None => Err(Error::invalid_operation("job result already taken")),
        }
    }
}

impl<T> fmt::Debug for Completion<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("finished", &self.is_finished())
            .finish_non_exhaustive()
    }
}

/// Schedules `job` on `spawner` and returns a handle to its outcome.
///
/// A panic inside `job` is captured and reported as
/// [`ErrorKind::Panicked`](crate::error::ErrorKind::Panicked).
pub fn fork<T, F>(spawner: &dyn Spawn, job: F) -> Result<Completion<T>>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let completion = Completion::new();
    let handle = completion.clone();
    spawner.spawn(Box::new(move || {
        let outcome = catch_unwind(AssertUnwindSafe(job))
            .unwrap_or_else(|payload| Err(Error::panicked(payload.as_ref())));
        handle.complete(outcome);
    }))?;
    Ok(completion)
}
