//! The work a control block runs.

use crate::error::Result;
use crate::task::ControlBlock;

/// Work executed on a control block's thread.
///
/// `run` is called exactly once. Returning an error marks the task failed;
/// returning a `Canceled` error (usually propagated from
/// [`ControlBlock::pulse`]) marks it terminated as well.
pub trait TaskBody: Send + 'static {
    /// Runs the task. `task` is the block the body belongs to.
    fn run(&mut self, task: &ControlBlock) -> Result<()>;

    /// Called after `run` returned, before waiters are released.
    ///
    /// Not called when notifications were suppressed by an abort.
    fn finished(&mut self, _task: &ControlBlock) {}
}
