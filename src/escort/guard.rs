//! The guard loop that mirrors the outer task onto the escorted worker.

use crate::error::Result;
use crate::sync::Gate;
use crate::task::ControlBlock;
use crate::tracing_compat::{trace, warn};
use crate::types::CancelReason;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Observed {
    Terminate,
    Stop,
    Resume,
    Suspend,
}

pub(super) struct GuardLoop {
    pub(super) outer: ControlBlock,
    pub(super) inner: ControlBlock,
    pub(super) start: Gate,
    pub(super) stop: Gate,
    pub(super) poll: Duration,
}

impl GuardLoop {
    /// Drives the escort until the outer task aborts or the worker is done,
    /// then waits for the stop gate.
    pub(super) fn run(self) -> Result<()> {
        self.start.open();
        let outcome = self.drive();
        if let Err(err) = &outcome {
            warn!(task = %self.outer.id(), error = %err, "escort guard failed; killing worker");
            let _ = self.inner.force_abort(CancelReason::escort(), true);
        }
        self.stop.wait();
        outcome
    }

    fn drive(&self) -> Result<()> {
        let mut suspended = false;
        loop {
            match self.observe(suspended) {
                Observed::Terminate => {
                    if suspended {
                        self.inner.resume()?;
                    }
                    trace!(task = %self.outer.id(), "escort aborting worker");
                    return self.inner.force_abort(CancelReason::escort(), true);
                }
                Observed::Stop => return Ok(()),
                Observed::Resume => {
                    if suspended {
                        self.inner.resume()?;
                        suspended = false;
                        self.outer.notify_resumed();
                    }
                }
                Observed::Suspend => {
                    if !suspended {
                        self.inner.suspend(false)?;
                        suspended = true;
                        self.outer.notify_suspended();
                    }
                }
            }
        }
    }

    fn observe(&self, suspended: bool) -> Observed {
        let terminate = self.outer.terminate_gate();
        let resume = self.outer.resume_gate();
        let all = [terminate, &self.stop, resume];

        if suspended {
            return match Gate::select(&all, None) {
                Some(0) => Observed::Terminate,
                Some(1) => Observed::Stop,
                Some(_) => Observed::Resume,
                None => Observed::Suspend,
            };
        }
        match Gate::select(&all, Some(Duration::ZERO)) {
            Some(0) => Observed::Terminate,
            Some(1) => Observed::Stop,
            // Running: back off on the gates that end the escort.
            Some(_) => match Gate::select(&[terminate, &self.stop], Some(self.poll)) {
                Some(0) => Observed::Terminate,
                Some(_) => Observed::Stop,
                None => Observed::Resume,
            },
            None => Observed::Suspend,
        }
    }
}
