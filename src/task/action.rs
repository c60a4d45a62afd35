//! Tasks that run a callable for its side effects.

use crate::error::{Error, Result};
use crate::task::{ControlBlock, TaskBody, TaskBuilder};
use std::ops::Deref;

type Completed = Box<dyn FnOnce(&ControlBlock) + Send>;

pub(crate) struct ActionBody<F> {
    action: Option<F>,
    completed: Option<Completed>,
}

impl<F> ActionBody<F>
where
    F: FnOnce(&ControlBlock) -> Result<()> + Send + 'static,
{
    pub(crate) fn new(action: F, completed: Option<Completed>) -> Self {
        Self {
            action: Some(action),
            completed,
        }
    }
}

impl<F> TaskBody for ActionBody<F>
where
    F: FnOnce(&ControlBlock) -> Result<()> + Send + 'static,
{
    fn run(&mut self, task: &ControlBlock) -> Result<()> {
        let action = self
            .action
            .take()
            .ok_or_else(|| Error::invalid_operation("action already ran"))?;
        action(task)
    }

    fn finished(&mut self, task: &ControlBlock) {
        if let Some(completed) = self.completed.take() {
            completed(task);
        }
    }
}

/// A control block running a single callable.
///
/// Derefs to [`ControlBlock`] for the lifecycle operations.
#[derive(Clone, Debug)]
pub struct ActionTask {
    block: ControlBlock,
}

impl ActionTask {
    /// Creates an action task with the default configuration.
    pub fn new<F>(action: F) -> Self
    where
        F: FnOnce(&ControlBlock) -> Result<()> + Send + 'static,
    {
        Self::from_block(ControlBlock::new(ActionBody::new(action, None)))
    }

    /// Like [`new`](Self::new), also running `completed` once the action
    /// returned.
    pub fn with_completion<F, C>(action: F, completed: C) -> Self
    where
        F: FnOnce(&ControlBlock) -> Result<()> + Send + 'static,
        C: FnOnce(&ControlBlock) + Send + 'static,
    {
        Self::from_block(ControlBlock::new(ActionBody::new(
            action,
            Some(Box::new(completed)),
        )))
    }

    /// Returns a builder for customised action tasks.
    pub fn builder() -> TaskBuilder {
        TaskBuilder::new()
    }

    pub(crate) fn from_block(block: ControlBlock) -> Self {
        Self { block }
    }

    /// Returns the underlying control block.
    #[must_use]
    pub fn control(&self) -> &ControlBlock {
        &self.block
    }
}

impl Deref for ActionTask {
    type Target = ControlBlock;

    fn deref(&self) -> &ControlBlock {
        &self.block
    }
}
