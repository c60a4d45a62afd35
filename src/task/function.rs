//! Tasks that compute a value.

use crate::error::{Error, Result};
use crate::sync::Gate;
use crate::task::{ControlBlock, TaskBody};
use parking_lot::Mutex;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

/// Holds a task's value once it is ready.
pub(crate) struct ResultSlot<T> {
    value: Mutex<Option<T>>,
    ready: Gate,
}

impl<T> ResultSlot<T> {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            value: Mutex::new(None),
            ready: Gate::closed(),
        })
    }

    pub(crate) fn store(&self, value: T) {
        *self.value.lock() = Some(value);
        self.ready.open();
    }

    fn is_ready(&self) -> bool {
        self.ready.is_open()
    }

    fn take(&self) -> Option<T> {
        self.value.lock().take()
    }
}

impl<T: Clone> ResultSlot<T> {
    fn cloned(&self) -> Option<T> {
        self.value.lock().clone()
    }
}

struct FunctionBody<F, T> {
    factory: Option<F>,
    slot: Arc<ResultSlot<T>>,
}

impl<F, T> TaskBody for FunctionBody<F, T>
where
    F: FnOnce(&ControlBlock) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    fn run(&mut self, task: &ControlBlock) -> Result<()> {
        let factory = self
            .factory
            .take()
            .ok_or_else(|| Error::invalid_operation("function already ran"))?;
        let value = factory(task)?;
        self.slot.store(value);
        Ok(())
    }
}

pub(crate) fn function_body<F, T>(factory: F, slot: Arc<ResultSlot<T>>) -> impl TaskBody
where
    F: FnOnce(&ControlBlock) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    FunctionBody {
        factory: Some(factory),
        slot,
    }
}

/// A control block computing a value of type `T`.
///
/// The value becomes available when the body returns successfully.
/// Derefs to [`ControlBlock`] for the lifecycle operations; the `wait`
/// family is shadowed by versions that also return the value.
pub struct FunctionTask<T> {
    block: ControlBlock,
    slot: Arc<ResultSlot<T>>,
}

impl<T> Clone for FunctionTask<T> {
    fn clone(&self) -> Self {
        Self {
            block: self.block.clone(),
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T: Send + 'static> FunctionTask<T> {
    /// Creates a function task with the default configuration.
    pub fn new<F>(factory: F) -> Self
    where
        F: FnOnce(&ControlBlock) -> Result<T> + Send + 'static,
    {
        let slot = ResultSlot::new();
        let block = ControlBlock::new(function_body(factory, Arc::clone(&slot)));
        Self::from_parts(block, slot)
    }
}

impl<T> FunctionTask<T> {
    pub(crate) fn from_parts(block: ControlBlock, slot: Arc<ResultSlot<T>>) -> Self {
        Self { block, slot }
    }

    /// Returns the underlying control block.
    #[must_use]
    pub fn control(&self) -> &ControlBlock {
        &self.block
    }

    /// Returns true once the value has been produced.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.slot.is_ready()
    }

    /// Waits for the task and moves the value out.
    ///
    /// Other handles see `InvalidOperation` from `result` afterwards.
    pub fn into_result(self) -> Result<T> {
        self.block.wait()?;
        self.slot
            .take()
            .ok_or_else(|| Error::invalid_operation("function result already taken"))
    }
}

impl<T: Clone> FunctionTask<T> {
    /// Returns the value without waiting.
    ///
    /// Fails with `InvalidOperation` while the value is not ready.
    pub fn result(&self) -> Result<T> {
        if !self.slot.is_ready() {
            return Err(Error::invalid_operation(format!(
                "result of task {} is not ready",
                self.block.id()
            )));
        }
        self.slot
            .cloned()
            .ok_or_else(|| Error::invalid_operation("function result already taken"))
    }

    /// Blocks until the task finished and returns its value.
    pub fn wait(&self) -> Result<T> {
        self.block.wait()?;
        self.result()
    }

    /// Like [`wait`](Self::wait), failing with `Timeout` after `timeout`.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<T> {
        self.block.wait_timeout(timeout)?;
        self.result()
    }
}

impl<T: Clone + Default> FunctionTask<T> {
    /// Returns the value, or `T::default()` while it is not ready.
    #[must_use]
    pub fn result_or_default(&self) -> T {
        self.result().unwrap_or_default()
    }
}

impl<T> Deref for FunctionTask<T> {
    type Target = ControlBlock;

    fn deref(&self) -> &ControlBlock {
        &self.block
    }
}

impl<T> fmt::Debug for FunctionTask<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionTask")
            .field("block", &self.block)
            .field("ready", &self.slot.is_ready())
            .finish()
    }
}
