//! Capabilities consumed from the embedding application.
//!
//! The crate never owns a thread pool or a UI loop. Instead it is handed:
//!
//! - a [`Spawn`] capability that runs fire-and-forget jobs (the escort
//!   guard's monitoring loop, off-thread notification delivery), and
//! - optionally a [`SyncContext`] that marshals notifications onto a
//!   designated execution context such as a UI event loop.
//!
//! [`ThreadSpawner`] is the default `Spawn`: one named OS thread per job.

use crate::error::{Error, ErrorKind, Result};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// A unit of fire-and-forget work.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Capability to run a job somewhere other than the calling thread.
pub trait Spawn: Send + Sync + 'static {
    /// Schedules `job`. Returns once the job has been accepted.
    fn spawn(&self, job: Job) -> Result<()>;
}

/// Capability to marshal work onto a designated execution context.
pub trait SyncContext: Send + Sync + 'static {
    /// Returns true when the calling thread is not the designated context
    /// and work therefore has to be marshaled.
    fn requires_marshal(&self) -> bool;

    /// Runs `job` on the designated context. When `wait_for_completion` is
    /// true, returns only after `job` has run.
    fn marshal(&self, job: Job, wait_for_completion: bool);
}

/// Shared handle to a spawn capability.
pub type SharedSpawn = Arc<dyn Spawn>;

/// Shared handle to a synchronization context.
pub type SharedSyncContext = Arc<dyn SyncContext>;

/// Spawns each job on a fresh, named OS thread.
pub struct ThreadSpawner {
    name_prefix: String,
    next: AtomicU64,
}

impl ThreadSpawner {
    /// Creates a spawner whose threads are named `<prefix>-<n>`.
    #[must_use]
    pub fn new(name_prefix: impl Into<String>) -> Self {
        Self {
            name_prefix: name_prefix.into(),
            next: AtomicU64::new(1),
        }
    }

    /// Returns a shared default spawner.
    #[must_use]
    pub fn shared() -> SharedSpawn {
        Arc::new(Self::default())
    }
}

impl Default for ThreadSpawner {
    fn default() -> Self {
        Self::new("taskward-worker")
    }
}

impl fmt::Debug for ThreadSpawner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadSpawner")
            .field("name_prefix", &self.name_prefix)
            .finish_non_exhaustive()
    }
}

impl Spawn for ThreadSpawner {
    fn spawn(&self, job: Job) -> Result<()> {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        std::thread::Builder::new()
            .name(format!("{}-{n}", self.name_prefix))
            .spawn(job)
            .map(drop)
            .map_err(|e| Error::from_source(ErrorKind::Failed, e).with_context("spawn failed"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::Gate;
    use std::time::Duration;

    #[test]
    fn thread_spawner_runs_jobs_on_named_threads() {
        let spawner = ThreadSpawner::new("ctx-test");
        let done = Gate::closed();
        let name = Arc::new(parking_lot::Mutex::new(None));

        let (signal, slot) = (done.clone(), Arc::clone(&name));
        spawner
            .spawn(Box::new(move || {
                *slot.lock() = std::thread::current().name().map(str::to_string);
                signal.open();
            }))
            .unwrap();

        assert!(done.wait_timeout(Duration::from_secs(5)));
        let name = name.lock().clone().unwrap();
        assert!(name.starts_with("ctx-test-"), "{name}");
    }

    #[test]
    fn debug_shows_prefix() {
        let spawner = ThreadSpawner::default();
        assert!(format!("{spawner:?}").contains("taskward-worker"));
    }
}
