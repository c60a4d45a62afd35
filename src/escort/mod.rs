//! The escort guard.
//!
//! [`ControlBlock::disgraceful_wrap`] runs a callable that never calls
//! `pulse` while keeping the calling task responsive. The callable runs in
//! an isolated worker owned by an inner block; a guard loop, scheduled on the
//! task's spawner, watches the outer task's gates on its behalf:
//!
//! - outer suspended: stop the worker and announce `Suspended`;
//! - outer resumed: continue the worker and announce `Resumed`;
//! - outer aborted: continue the worker if it was stopped, then kill it.
//!
//! Notifications raised by the guard are the outer task's own and keep the
//! strict Suspended/Resumed alternation with its checkpoints.

mod guard;

use crate::completion::fork;
use crate::error::{Error, Result};
use crate::sync::Gate;
use crate::task::{ControlBlock, FunctionTask, ResultSlot, TaskBuilder};
use crate::tracing_compat::debug;
use guard::GuardLoop;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;

impl ControlBlock {
    /// Runs `action` in an escorted isolated worker and returns its value.
    ///
    /// Must be called from this task's own thread. With
    /// `pulse_around_escort` set, the task pulses before and after the
    /// region, so a pending abort is reported without forking at all.
    /// If the outer task is aborted while the worker runs, the worker is
    /// killed and `Canceled` is returned.
    pub fn disgraceful_wrap<T, F>(&self, action: F) -> Result<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Serialize + DeserializeOwned + Send + 'static,
    {
        if !self.is_current_thread() {
            return Err(Error::invalid_operation(
                "disgraceful_wrap must be called from the task's own thread",
            ));
        }
        let pulse = self.config().pulse_around_escort;
        if pulse {
            self.pulse()?;
        }
        let value = self.escort(action)?;
        if pulse {
            self.pulse()?;
        }
        Ok(value)
    }

    fn escort<T, F>(&self, action: F) -> Result<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Serialize + DeserializeOwned + Send + 'static,
    {
        let start = Gate::closed();
        let stop = Gate::closed();

        let slot = ResultSlot::new();
        let block = TaskBuilder::new()
            .config(self.config().clone())
            .name(format!("{}-escorted", self.name()))
            .spawner(Arc::clone(self.spawner()))
            .build(crate::isolate::IsolatedBody::new(
                action,
                Arc::clone(&slot),
                Some(start.clone()),
            ))?;
        let inner = FunctionTask::from_parts(block, slot);
        inner.start()?;
        debug!(task = %self.id(), inner = %inner.id(), "escort started");

        let guard = GuardLoop {
            outer: self.clone(),
            inner: inner.control().clone(),
            start: start.clone(),
            stop: stop.clone(),
            poll: self.config().escort_poll_interval(),
        };
        let watcher = match fork(self.spawner().as_ref(), move || guard.run()) {
            Ok(watcher) => watcher,
            Err(err) => {
                // Release the inner block without ever forking its worker.
                inner.abort(true, true)?;
                start.open();
                let _ = inner.control().wait();
                return Err(err);
            }
        };

        let outcome = inner.control().wait();
        stop.open();
        let guarded = watcher.join();
        debug!(task = %self.id(), inner = %inner.id(), "escort finished");

        outcome?;
        guarded?;
        inner.into_result()
    }
}
