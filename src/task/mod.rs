//! Control blocks and the tasks built on them.
//!
//! - [`ControlBlock`]: the lifecycle state machine around one thread
//! - [`TaskBody`]: what a block runs
//! - [`ActionTask`] / [`FunctionTask`]: callable and value-producing tasks
//! - [`TaskBuilder`]: configuration, naming and notifications

mod action;
mod body;
mod builder;
mod control;
mod function;
mod notify;

pub use action::ActionTask;
pub use body::TaskBody;
pub use builder::TaskBuilder;
pub use control::ControlBlock;
pub use function::FunctionTask;
pub use notify::Notification;

pub(crate) use control::Preemptible;
pub(crate) use function::ResultSlot;
