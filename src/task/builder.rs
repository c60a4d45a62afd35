//! Builder for control blocks.

use crate::config::TaskConfig;
use crate::context::{SharedSpawn, SharedSyncContext, ThreadSpawner};
use crate::error::Result;
use crate::task::action::ActionBody;
use crate::task::function::{ResultSlot, function_body};
use crate::task::notify::Notifications;
use crate::task::{ActionTask, ControlBlock, FunctionTask, TaskBody};
use std::fmt;
use std::sync::Arc;

/// Configures and creates control blocks.
///
/// ```
/// use taskward::TaskBuilder;
///
/// let task = TaskBuilder::new()
///     .name("indexer")
///     .on_finished(|task| println!("{} done", task.name()))
///     .function(|task| {
///         let mut total = 0u64;
///         for n in 0..1_000u64 {
///             task.pulse()?;
///             total += n;
///         }
///         Ok(total)
///     })
///     .unwrap();
/// task.start().unwrap();
/// assert_eq!(task.wait().unwrap(), 499_500);
/// ```
#[must_use]
pub struct TaskBuilder {
    config: TaskConfig,
    name: Option<String>,
    sync_context: Option<SharedSyncContext>,
    spawner: Option<SharedSpawn>,
    notifications: Notifications,
}

impl Default for TaskBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskBuilder {
    /// Creates a builder with the default configuration.
    pub fn new() -> Self {
        Self {
            config: TaskConfig::default(),
            name: None,
            sync_context: None,
            spawner: None,
            notifications: Notifications::default(),
        }
    }

    /// Replaces the configuration.
    pub fn config(mut self, config: TaskConfig) -> Self {
        self.config = config;
        self
    }

    /// Names the task thread. Defaults to `<prefix>-<id>`.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the task thread's stack size in bytes.
    pub fn stack_size(mut self, bytes: usize) -> Self {
        self.config.stack_size = Some(bytes);
        self
    }

    /// Marshals notifications through `ctx`.
    pub fn sync_context(mut self, ctx: SharedSyncContext) -> Self {
        self.sync_context = Some(ctx);
        self
    }

    /// Uses `spawner` for the escort guard and off-thread deliveries.
    pub fn spawner(mut self, spawner: SharedSpawn) -> Self {
        self.spawner = Some(spawner);
        self
    }

    /// Called when the body blocks at a checkpoint or its worker is stopped.
    pub fn on_suspended<F>(mut self, f: F) -> Self
    where
        F: Fn(&ControlBlock) + Send + Sync + 'static,
    {
        self.notifications.suspended = Some(Arc::new(f));
        self
    }

    /// Called when a suspended task continues.
    pub fn on_resumed<F>(mut self, f: F) -> Self
    where
        F: Fn(&ControlBlock) + Send + Sync + 'static,
    {
        self.notifications.resumed = Some(Arc::new(f));
        self
    }

    /// Called once the body has exited, before waiters are released.
    pub fn on_finished<F>(mut self, f: F) -> Self
    where
        F: Fn(&ControlBlock) + Send + Sync + 'static,
    {
        self.notifications.finished = Some(Arc::new(f));
        self
    }

    /// Validates the configuration and creates a block running `body`.
    pub fn build(self, body: impl TaskBody) -> Result<ControlBlock> {
        self.config.validate()?;
        Ok(self.assemble(Box::new(body)))
    }

    /// Creates an [`ActionTask`].
    pub fn action<F>(self, action: F) -> Result<ActionTask>
    where
        F: FnOnce(&ControlBlock) -> Result<()> + Send + 'static,
    {
        self.build(ActionBody::new(action, None))
            .map(ActionTask::from_block)
    }

    /// Creates an [`ActionTask`] that runs `completed` after the action.
    pub fn action_with_completion<F, C>(self, action: F, completed: C) -> Result<ActionTask>
    where
        F: FnOnce(&ControlBlock) -> Result<()> + Send + 'static,
        C: FnOnce(&ControlBlock) + Send + 'static,
    {
        self.build(ActionBody::new(action, Some(Box::new(completed))))
            .map(ActionTask::from_block)
    }

    /// Creates a [`FunctionTask`].
    pub fn function<F, T>(self, factory: F) -> Result<FunctionTask<T>>
    where
        F: FnOnce(&ControlBlock) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let slot = ResultSlot::new();
        let block = self.build(function_body(factory, Arc::clone(&slot)))?;
        Ok(FunctionTask::from_parts(block, slot))
    }

    pub(crate) fn assemble(self, body: Box<dyn TaskBody>) -> ControlBlock {
        let spawner = self
            .spawner
            .unwrap_or_else(|| Arc::new(ThreadSpawner::new(format!("{}-worker", self.config.thread_name_prefix))));
        ControlBlock::from_parts(
            self.name,
            self.config,
            body,
            self.notifications,
            self.sync_context,
            spawner,
        )
    }
}

impl fmt::Debug for TaskBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskBuilder")
            .field("config", &self.config)
            .field("name", &self.name)
            .field("notifications", &self.notifications)
            .finish_non_exhaustive()
    }
}
