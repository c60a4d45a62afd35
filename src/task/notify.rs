//! Lifecycle notifications and their delivery.
//!
//! Suspended and Resumed strictly alternate, starting with Suspended. When a
//! synchronization context is configured and the notifying thread is not
//! its designated context, delivery is marshaled there without waiting.

use crate::context::SharedSyncContext;
use crate::task::ControlBlock;
use std::fmt;
use std::sync::Arc;

/// Callback invoked with the block that raised the notification.
pub type Notification = Arc<dyn Fn(&ControlBlock) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Event {
    Suspended,
    Resumed,
}

#[derive(Clone, Default)]
pub(crate) struct Notifications {
    pub(crate) suspended: Option<Notification>,
    pub(crate) resumed: Option<Notification>,
    pub(crate) finished: Option<Notification>,
}

impl Notifications {
    fn get(&self, event: Event) -> Option<&Notification> {
        match event {
            Event::Suspended => self.suspended.as_ref(),
            Event::Resumed => self.resumed.as_ref(),
        }
    }

    pub(crate) fn deliver(
        &self,
        event: Event,
        task: &ControlBlock,
        marshal_to: Option<&SharedSyncContext>,
    ) {
        let Some(callback) = self.get(event).cloned() else {
            return;
        };
        match marshal_to {
            Some(ctx) => {
                let task = task.clone();
                ctx.marshal(Box::new(move || callback(&task)), false);
            }
            None => callback(task),
        }
    }
}

impl fmt::Debug for Notifications {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notifications")
            .field("suspended", &self.suspended.is_some())
            .field("resumed", &self.resumed.is_some())
            .field("finished", &self.finished.is_some())
            .finish()
    }
}
