//! The task control block.
//!
//! A [`ControlBlock`] owns one dedicated thread and the lifecycle state
//! machine around it. Other threads steer it through three gates:
//!
//! | gate      | default | opened by             | closed by   |
//! |-----------|---------|-----------------------|-------------|
//! | resume    | open    | `resume()`            | `suspend()` |
//! | terminate | closed  | `abort()`             | never       |
//! | finished  | closed  | the exiting thread    | never       |
//!
//! The body cooperates by calling [`ControlBlock::pulse`]. Pulse first scans
//! the terminate and resume gates without blocking; only if both are closed
//! does it announce the suspension and block on the same pair. Terminate is
//! always checked first.
//!
//! # Forced tier
//!
//! Forced suspension and abort never pre-empt the block's own thread. They
//! act on the isolated worker the block currently supervises (see
//! [`crate::isolate`]): the worker process is stopped, continued or killed.
//! A forced abort takes the abort lock first, so it cannot land while
//! [`ControlBlock::nonabortable`] is running.

use crate::config::{FinishedPanicPolicy, TaskConfig};
use crate::context::{SharedSpawn, SharedSyncContext};
use crate::error::{Error, ErrorKind, Result};
use crate::sync::Gate;
use crate::task::body::TaskBody;
use crate::task::notify::{Event, Notifications};
use crate::tracing_compat::{debug, trace, warn};
use crate::types::{CancelReason, StateFlags, TaskId};
use parking_lot::{Mutex, ReentrantMutex};
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::thread::{self, Thread};
use std::time::Duration;

/// Something the forced tier can stop, continue and kill.
pub(crate) trait Preemptible: Send + Sync {
    fn suspend(&self) -> Result<()>;
    fn resume(&self) -> Result<()>;
    fn kill(&self) -> Result<()>;
}

/// Handle to a task control block.
///
/// Cloning yields another handle to the same block. The block's thread
/// holds a handle of its own until it exits, so dropping every external
/// handle while the task runs does not tear anything down.
#[derive(Clone)]
pub struct ControlBlock {
    inner: Arc<Inner>,
}

struct Inner {
    id: TaskId,
    name: String,
    config: TaskConfig,
    state: Mutex<State>,
    /// Held by forced aborts and by `nonabortable` sections.
    abort_lock: ReentrantMutex<()>,
    resume: Gate,
    terminate: Gate,
    finished: Gate,
    notifications: Notifications,
    sync_context: Option<SharedSyncContext>,
    spawner: SharedSpawn,
}

struct State {
    flags: StateFlags,
    error: Option<Error>,
    body: Option<Box<dyn TaskBody>>,
    thread: Option<Thread>,
    hard_suspends: usize,
    suspend_notified: bool,
    callbacks_suppressed: bool,
    forced_abort: Option<CancelReason>,
    preempt: Option<Arc<dyn Preemptible>>,
}

/// Opens the finished gate and forgets the thread, even when unwinding.
struct FinishGuard<'a> {
    block: &'a ControlBlock,
}

impl Drop for FinishGuard<'_> {
    fn drop(&mut self) {
        self.block.inner.state.lock().thread = None;
        self.block.inner.finished.open();
    }
}

impl ControlBlock {
    /// Creates a block running `body` with the default configuration.
    pub fn new(body: impl TaskBody) -> Self {
        crate::task::TaskBuilder::new().assemble(Box::new(body))
    }

    pub(crate) fn from_parts(
        name: Option<String>,
        config: TaskConfig,
        body: Box<dyn TaskBody>,
        notifications: Notifications,
        sync_context: Option<SharedSyncContext>,
        spawner: SharedSpawn,
    ) -> Self {
        let id = TaskId::next();
        let name = name.unwrap_or_else(|| format!("{}-{}", config.thread_name_prefix, id.as_u64()));
        Self {
            inner: Arc::new(Inner {
                id,
                name,
                config,
                state: Mutex::new(State {
                    flags: StateFlags::CREATED,
                    error: None,
                    body: Some(body),
                    thread: None,
                    hard_suspends: 0,
                    suspend_notified: false,
                    callbacks_suppressed: false,
                    forced_abort: None,
                    preempt: None,
                }),
                abort_lock: ReentrantMutex::new(()),
                resume: Gate::opened(),
                terminate: Gate::closed(),
                finished: Gate::closed(),
                notifications,
                sync_context,
                spawner,
            }),
        }
    }

    /// Returns the task identifier.
    #[must_use]
    pub fn id(&self) -> TaskId {
        self.inner.id
    }

    /// Returns the name given to the task thread.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns the configuration the block was built with.
    #[must_use]
    pub fn config(&self) -> &TaskConfig {
        &self.inner.config
    }

    /// Returns a snapshot of the lifecycle flags.
    #[must_use]
    pub fn state(&self) -> StateFlags {
        self.inner.state.lock().flags
    }

    /// Returns true once `start()` has run.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.state().contains(StateFlags::STARTED)
    }

    /// Returns true while started, unfinished and not resumed.
    #[must_use]
    pub fn is_suspended(&self) -> bool {
        self.state().is_suspended()
    }

    /// Returns true once the body has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.state().contains(StateFlags::FINISHED)
    }

    /// Returns true if the body exited through cancellation.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.state().contains(StateFlags::TERMINATED)
    }

    /// Returns true if the body exited with an error.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.state().contains(StateFlags::FAILED)
    }

    /// Returns the captured error, if the task failed.
    #[must_use]
    pub fn error(&self) -> Option<Error> {
        self.inner.state.lock().error.clone()
    }

    /// Returns true when called from the task's own thread.
    #[must_use]
    pub fn is_current_thread(&self) -> bool {
        let current = thread::current().id();
        self.inner
            .state
            .lock()
            .thread
            .as_ref()
            .is_some_and(|t| t.id() == current)
    }

    /// Spawns the task thread and waits until it is running.
    ///
    /// A block runs at most once: calling `start` again returns
    /// `InvalidOperation`.
    pub fn start(&self) -> Result<()> {
        let body = {
            let mut state = self.inner.state.lock();
            if state.flags.contains(StateFlags::STARTED) {
                return Err(Error::invalid_operation(format!(
                    "task {} was already started",
                    self.inner.id
                )));
            }
            let Some(body) = state.body.take() else {
                return Err(Error::invalid_operation("task body is missing"));
            };
            state.flags.insert(StateFlags::STARTED);
            if self.inner.resume.is_open() {
                state.flags.insert(StateFlags::RESUMED);
            }
            body
        };

        let initialized = Gate::closed();
        let mut builder = thread::Builder::new().name(self.inner.name.clone());
        if let Some(size) = self.inner.config.stack_size {
            builder = builder.stack_size(size);
        }

        let block = self.clone();
        let ready = initialized.clone();
        if let Err(e) = builder.spawn(move || block.run_thread(body, &ready)) {
            let err = Error::from_source(ErrorKind::Failed, e).with_context("failed to spawn task thread");
            {
                let mut state = self.inner.state.lock();
                state.flags.insert(StateFlags::FINISHED | StateFlags::FAILED);
                state.error = Some(err.clone());
            }
            self.inner.finished.open();
            return Err(err);
        }

        initialized.wait();
        debug!(task = %self.inner.id, name = %self.inner.name, "task started");
        Ok(())
    }

    fn run_thread(&self, mut body: Box<dyn TaskBody>, initialized: &Gate) {
        self.inner.state.lock().thread = Some(thread::current());
        initialized.open();

        let outcome = catch_unwind(AssertUnwindSafe(|| body.run(self)))
            .unwrap_or_else(|payload| Err(Error::panicked(payload.as_ref())));
        self.finish(body, outcome);
    }

    fn finish(&self, body: Box<dyn TaskBody>, outcome: Result<()>) {
        let _guard = FinishGuard { block: self };
        let flags = {
            let mut state = self.inner.state.lock();
            state.flags.insert(StateFlags::FINISHED);
            match &outcome {
                Ok(()) => {}
                Err(err) if err.is_canceled() => {
                    state.flags.insert(StateFlags::TERMINATED | StateFlags::FAILED);
                }
                Err(_) => state.flags.insert(StateFlags::FAILED),
            }
            state.error = outcome.err();
            state.preempt = None;
            state.flags
        };
        debug!(task = %self.inner.id, flags = %flags, "task finished");

        self.deliver_finished(body);
    }

    fn deliver_finished(&self, mut body: Box<dyn TaskBody>) {
        if self.inner.state.lock().callbacks_suppressed {
            trace!(task = %self.inner.id, "finished notification suppressed");
            return;
        }
        let callback = self.inner.notifications.finished.clone();

        if let Some(ctx) = self.marshal_target() {
            let task = self.clone();
            let job = Box::new(move || {
                let context = Arc::clone(&ctx);
                context.marshal(
                    Box::new(move || {
                        if let Some(err) = run_finished(&task, body.as_mut(), callback.as_ref()) {
                            warn!(task = %task.id(), error = %err, "finished notification panicked");
                        }
                    }),
                    true,
                );
            });
            if let Err(err) = self.inner.spawner.spawn(job) {
                warn!(task = %self.inner.id, error = %err, "could not deliver finished notification");
            }
            return;
        }

        let Some(err) = run_finished(self, body.as_mut(), callback.as_ref()) else {
            return;
        };
        match self.inner.config.finished_panic_policy {
            FinishedPanicPolicy::Log => {
                warn!(task = %self.inner.id, error = %err, "finished notification panicked");
            }
            FinishedPanicPolicy::Capture => {
                let mut state = self.inner.state.lock();
                if state.error.is_none() {
                    state.flags.insert(StateFlags::FAILED);
                    state.error = Some(err);
                } else {
                    warn!(
                        task = %self.inner.id,
                        error = %err,
                        "finished notification panicked after the body failed"
                    );
                }
            }
        }
    }

    fn marshal_target(&self) -> Option<SharedSyncContext> {
        self.inner
            .sync_context
            .as_ref()
            .filter(|ctx| ctx.requires_marshal())
            .cloned()
    }

    /// Requests suspension.
    ///
    /// Graceful suspension closes the resume gate; the body blocks at its
    /// next [`pulse`](Self::pulse). Forced suspension additionally stops the
    /// supervised isolated worker, if any, and must not be requested from
    /// the task's own thread.
    pub fn suspend(&self, graceful: bool) -> Result<()> {
        if !graceful && self.is_current_thread() {
            return Err(Error::invalid_operation(
                "a task cannot forcibly suspend its own thread",
            ));
        }
        debug!(task = %self.inner.id, graceful, "suspend requested");
        let mut state = self.inner.state.lock();
        if state.flags.contains(StateFlags::FINISHED) {
            return Ok(());
        }
        state.flags.remove(StateFlags::RESUMED);
        self.inner.resume.close();
        if graceful {
            return Ok(());
        }
        state.hard_suspends += 1;
        // Signals go out under the state lock so they reach the worker in
        // the order the counter changed.
        match &state.preempt {
            Some(target) if state.hard_suspends == 1 => target.suspend(),
            _ => Ok(()),
        }
    }

    /// Reopens the resume gate.
    ///
    /// Each call also undoes one forced suspension when made from another
    /// thread; the isolated worker continues once none are left.
    pub fn resume(&self) -> Result<()> {
        let current = self.is_current_thread();
        debug!(task = %self.inner.id, "resume requested");
        let mut state = self.inner.state.lock();
        if state.flags.contains(StateFlags::STARTED) && !state.flags.contains(StateFlags::FINISHED) {
            state.flags.insert(StateFlags::RESUMED);
        }
        self.inner.resume.open();
        if state.hard_suspends == 0 || current {
            return Ok(());
        }
        state.hard_suspends -= 1;
        match &state.preempt {
            Some(target) if state.hard_suspends == 0 => target.resume(),
            _ => Ok(()),
        }
    }

    /// Requests cancellation.
    ///
    /// From the task's own thread this returns `Canceled` at once, for the
    /// body to propagate. From any other thread it opens the terminate gate;
    /// a forced abort (`graceful == false`) also kills the supervised
    /// isolated worker once no `nonabortable` section is running. A body
    /// without an isolated worker only sees the forced abort at its next
    /// [`pulse`](Self::pulse); a loop that never pulses keeps running.
    /// `suppress_callback` silences the block's notifications from now on.
    pub fn abort(&self, graceful: bool, suppress_callback: bool) -> Result<()> {
        if self.is_current_thread() {
            self.inner.terminate.open();
            return Err(Error::canceled(CancelReason::self_abort()));
        }
        if graceful {
            if suppress_callback {
                self.inner.state.lock().callbacks_suppressed = true;
            }
            self.inner.terminate.open();
            debug!(task = %self.inner.id, "abort requested");
            return Ok(());
        }
        self.force_abort(CancelReason::forced(), suppress_callback)
    }

    /// Graceful abort with notifications left on.
    pub fn cancel(&self) -> Result<()> {
        self.abort(true, false)
    }

    pub(crate) fn force_abort(&self, reason: CancelReason, suppress_callback: bool) -> Result<()> {
        if suppress_callback {
            self.inner.state.lock().callbacks_suppressed = true;
        }
        self.inner.terminate.open();

        let _abort = self.inner.abort_lock.lock();
        let mut state = self.inner.state.lock();
        if state.flags.contains(StateFlags::FINISHED) {
            return Ok(());
        }
        if let Some(existing) = state.forced_abort.as_mut() {
            existing.strengthen(&reason);
        } else {
            state.forced_abort = Some(reason.clone());
        }
        let stopped = state.hard_suspends > 0;
        state.hard_suspends = 0;
        debug!(task = %self.inner.id, reason = %reason, "forced abort");
        let Some(target) = &state.preempt else {
            warn!(
                task = %self.inner.id,
                "forced abort found no isolated worker; it takes effect at the next pulse or worker attach"
            );
            return Ok(());
        };
        if stopped {
            target.resume()?;
        }
        target.kill()
    }

    /// Cooperative checkpoint.
    ///
    /// Returns `Canceled` once the terminate gate is open, blocks while the
    /// task is suspended, and is a no-op when called from any thread other
    /// than the task's own.
    pub fn pulse(&self) -> Result<()> {
        if !self.is_current_thread() {
            return Ok(());
        }
        let gates = [&self.inner.terminate, &self.inner.resume];
        let selected = match Gate::select(&gates, Some(Duration::ZERO)) {
            Some(index) => index,
            None => {
                self.notify_suspended();
                loop {
                    if let Some(index) = Gate::select(&gates, None) {
                        break index;
                    }
                }
            }
        };
        if selected == 0 {
            trace!(task = %self.inner.id, "cancellation observed at checkpoint");
            return Err(Error::canceled(CancelReason::requested()));
        }
        self.notify_resumed();
        Ok(())
    }

    /// Alias for [`pulse`](Self::pulse).
    pub fn checkpoint(&self) -> Result<()> {
        self.pulse()
    }

    /// Blocks until the task finished, replaying its error.
    pub fn wait(&self) -> Result<()> {
        self.check_waitable()?;
        self.inner.finished.wait();
        self.replay_error()
    }

    /// Like [`wait`](Self::wait), but gives up with `Timeout` after `timeout`.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<()> {
        self.check_waitable()?;
        if !self.inner.finished.wait_timeout(timeout) {
            return Err(Error::timeout(timeout));
        }
        self.replay_error()
    }

    /// Waits up to `timeout`; `Ok(false)` means the task is still running.
    pub fn try_wait(&self, timeout: Duration) -> Result<bool> {
        self.check_waitable()?;
        if !self.inner.finished.wait_timeout(timeout) {
            return Ok(false);
        }
        self.replay_error()?;
        Ok(true)
    }

    fn check_waitable(&self) -> Result<()> {
        if self.is_current_thread() {
            return Err(Error::invalid_operation(
                "a task cannot wait for itself from its own thread",
            ));
        }
        if !self.is_started() {
            return Err(Error::invalid_operation(format!(
                "task {} was never started",
                self.inner.id
            )));
        }
        Ok(())
    }

    fn replay_error(&self) -> Result<()> {
        match &self.inner.state.lock().error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    /// Runs `f` while holding the abort lock; forced aborts wait for it.
    pub fn nonabortable<R>(&self, f: impl FnOnce() -> R) -> R {
        let _abort = self.inner.abort_lock.lock();
        f()
    }

    pub(crate) fn notify_suspended(&self) {
        let deliver = {
            let mut state = self.inner.state.lock();
            if state.suspend_notified {
                false
            } else {
                state.suspend_notified = true;
                !state.callbacks_suppressed
            }
        };
        if deliver {
            trace!(task = %self.inner.id, "suspended");
            self.inner
                .notifications
                .deliver(Event::Suspended, self, self.marshal_target().as_ref());
        }
    }

    pub(crate) fn notify_resumed(&self) {
        let deliver = {
            let mut state = self.inner.state.lock();
            if state.suspend_notified {
                state.suspend_notified = false;
                !state.callbacks_suppressed
            } else {
                false
            }
        };
        if deliver {
            trace!(task = %self.inner.id, "resumed");
            self.inner
                .notifications
                .deliver(Event::Resumed, self, self.marshal_target().as_ref());
        }
    }

    pub(crate) fn terminate_gate(&self) -> &Gate {
        &self.inner.terminate
    }

    pub(crate) fn resume_gate(&self) -> &Gate {
        &self.inner.resume
    }

    pub(crate) fn spawner(&self) -> &SharedSpawn {
        &self.inner.spawner
    }

    pub(crate) fn forced_abort_reason(&self) -> Option<CancelReason> {
        self.inner.state.lock().forced_abort.clone()
    }

    /// Registers the worker the forced tier acts on.
    ///
    /// Requests that arrived before the worker existed are applied now.
    pub(crate) fn attach_preemptible(&self, target: Arc<dyn Preemptible>) -> Result<()> {
        let mut state = self.inner.state.lock();
        state.preempt = Some(Arc::clone(&target));
        if state.forced_abort.is_some() {
            target.kill()
        } else if state.hard_suspends > 0 {
            target.suspend()
        } else {
            Ok(())
        }
    }

    pub(crate) fn detach_preemptible(&self) {
        self.inner.state.lock().preempt = None;
    }
}

fn run_finished(
    task: &ControlBlock,
    body: &mut dyn TaskBody,
    callback: Option<&crate::task::Notification>,
) -> Option<Error> {
    let mut failure = None;
    if let Err(payload) = catch_unwind(AssertUnwindSafe(|| body.finished(task))) {
        failure = Some(Error::panicked(payload.as_ref()));
    }
    if let Some(callback) = callback {
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| callback(task))) {
            failure.get_or_insert_with(|| Error::panicked(payload.as_ref()));
        }
    }
    failure
}

impl fmt::Debug for ControlBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("ControlBlock")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("flags", &state.flags)
            .field("error", &state.error)
            .field("hard_suspends", &state.hard_suspends)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{ActionTask, TaskBuilder};
    use crate::test_utils::init_test_logging;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn init_test(test_name: &str) {
        init_test_logging();
        crate::test_phase!(test_name);
    }

    struct Probe {
        suspends: AtomicUsize,
        resumes: AtomicUsize,
        kills: AtomicUsize,
    }

    impl Probe {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                suspends: AtomicUsize::new(0),
                resumes: AtomicUsize::new(0),
                kills: AtomicUsize::new(0),
            })
        }
    }

    impl Preemptible for Probe {
        fn suspend(&self) -> Result<()> {
            self.suspends.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn resume(&self) -> Result<()> {
            self.resumes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn kill(&self) -> Result<()> {
            self.kills.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn parked_task(release: &Gate) -> ActionTask {
        let release = release.clone();
        ActionTask::new(move |task| {
            while !release.is_open() {
                task.pulse()?;
                thread::sleep(Duration::from_millis(1));
            }
            Ok(())
        })
    }

    #[test]
    fn start_twice_is_rejected() {
        init_test("start_twice_is_rejected");
        let task = ActionTask::new(|_| Ok(()));
        task.start().unwrap();
        let err = task.start().unwrap_err();
        crate::assert_with_log!(
            err.is_invalid_operation(),
            "second start is misuse",
            ErrorKind::InvalidOperation,
            err.kind()
        );
        task.wait().unwrap();
        assert_eq!(
            task.state(),
            StateFlags::STARTED | StateFlags::RESUMED | StateFlags::FINISHED
        );
        crate::test_complete!("start_twice_is_rejected");
    }

    #[test]
    fn wait_before_start_is_rejected() {
        init_test("wait_before_start_is_rejected");
        let task = ActionTask::new(|_| Ok(()));
        assert!(task.wait().unwrap_err().is_invalid_operation());
        assert!(task.try_wait(Duration::ZERO).unwrap_err().is_invalid_operation());
        crate::test_complete!("wait_before_start_is_rejected");
    }

    #[test]
    fn thread_is_named_and_cleared() {
        init_test("thread_is_named_and_cleared");
        let seen = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&seen);
        let task = TaskBuilder::new()
            .name("named-task")
            .action(move |task| {
                assert!(task.is_current_thread());
                *slot.lock() = thread::current().name().map(str::to_string);
                Ok(())
            })
            .unwrap();
        task.start().unwrap();
        task.wait().unwrap();
        assert_eq!(seen.lock().as_deref(), Some("named-task"));
        assert!(task.inner.state.lock().thread.is_none());
        crate::test_complete!("thread_is_named_and_cleared");
    }

    #[test]
    fn pulse_off_thread_is_noop() {
        init_test("pulse_off_thread_is_noop");
        let release = Gate::closed();
        let task = parked_task(&release);
        task.start().unwrap();
        task.cancel().unwrap();
        assert!(task.pulse().is_ok(), "pulse from a foreign thread never fails");
        let err = task.wait().unwrap_err();
        assert!(err.is_canceled());
        crate::test_complete!("pulse_off_thread_is_noop");
    }

    #[test]
    fn suspend_then_resume_toggles_resumed_bit() {
        init_test("suspend_then_resume_toggles_resumed_bit");
        let release = Gate::closed();
        let task = parked_task(&release);
        task.start().unwrap();

        task.suspend(true).unwrap();
        assert!(task.is_suspended());
        task.resume().unwrap();
        assert!(!task.is_suspended());
        assert!(task.is_started());

        release.open();
        task.wait().unwrap();
        assert!(!task.is_suspended(), "finished tasks are never suspended");
        crate::test_complete!("suspend_then_resume_toggles_resumed_bit");
    }

    #[test]
    fn forced_self_suspend_is_rejected() {
        init_test("forced_self_suspend_is_rejected");
        let task = ActionTask::new(|task| {
            let err = task.suspend(false).unwrap_err();
            assert!(err.is_invalid_operation());
            Ok(())
        });
        task.start().unwrap();
        task.wait().unwrap();
        crate::test_complete!("forced_self_suspend_is_rejected");
    }

    #[test]
    fn self_abort_raises_canceled() {
        init_test("self_abort_raises_canceled");
        let task = ActionTask::new(|task| {
            task.abort(true, false)?;
            unreachable!("self-abort returns an error");
        });
        task.start().unwrap();
        let err = task.wait().unwrap_err();
        assert_eq!(
            err.cancel_reason().map(CancelReason::kind),
            Some(crate::types::CancelKind::SelfAbort)
        );
        assert!(task.is_terminated() && task.is_failed());
        crate::test_complete!("self_abort_raises_canceled");
    }

    #[test]
    fn hard_suspend_counts_and_reaches_target() {
        init_test("hard_suspend_counts_and_reaches_target");
        let release = Gate::closed();
        let task = parked_task(&release);
        task.start().unwrap();
        let probe = Probe::new();
        task.attach_preemptible(probe.clone()).unwrap();

        task.suspend(false).unwrap();
        task.suspend(false).unwrap();
        assert_eq!(probe.suspends.load(Ordering::SeqCst), 1, "stopped once");

        task.resume().unwrap();
        assert_eq!(probe.resumes.load(Ordering::SeqCst), 0, "one suspension left");
        task.resume().unwrap();
        assert_eq!(probe.resumes.load(Ordering::SeqCst), 1, "continued");

        task.detach_preemptible();
        release.open();
        task.wait().unwrap();
        crate::test_complete!("hard_suspend_counts_and_reaches_target");
    }

    #[test]
    fn forced_abort_resumes_before_kill() {
        init_test("forced_abort_resumes_before_kill");
        let release = Gate::closed();
        let task = parked_task(&release);
        task.start().unwrap();
        let probe = Probe::new();
        task.attach_preemptible(probe.clone()).unwrap();

        task.suspend(false).unwrap();
        task.abort(false, false).unwrap();
        assert_eq!(probe.resumes.load(Ordering::SeqCst), 1);
        assert_eq!(probe.kills.load(Ordering::SeqCst), 1);
        assert_eq!(task.forced_abort_reason(), Some(CancelReason::forced()));

        // The gates still cancel the cooperative body.
        task.resume().unwrap();
        let err = task.wait().unwrap_err();
        assert!(err.is_canceled());
        crate::test_complete!("forced_abort_resumes_before_kill");
    }

    /// Target whose stop takes a while to go out.
    struct SlowStop {
        log: Mutex<Vec<&'static str>>,
        stopped: std::sync::atomic::AtomicBool,
    }

    impl Preemptible for SlowStop {
        fn suspend(&self) -> Result<()> {
            thread::sleep(Duration::from_millis(50));
            self.log.lock().push("stop");
            self.stopped.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn resume(&self) -> Result<()> {
            self.log.lock().push("continue");
            self.stopped.store(false, Ordering::SeqCst);
            Ok(())
        }

        fn kill(&self) -> Result<()> {
            self.log.lock().push("kill");
            Ok(())
        }
    }

    #[test]
    fn resume_racing_late_attach_leaves_worker_running() {
        init_test("resume_racing_late_attach_leaves_worker_running");
        let release = Gate::closed();
        let task = parked_task(&release);
        task.start().unwrap();
        task.suspend(false).unwrap();

        let target = Arc::new(SlowStop {
            log: Mutex::new(Vec::new()),
            stopped: std::sync::atomic::AtomicBool::new(false),
        });
        let attaching = {
            let block = task.control().clone();
            let target = Arc::clone(&target);
            thread::spawn(move || block.attach_preemptible(target))
        };
        thread::sleep(Duration::from_millis(10));
        task.resume().unwrap();
        attaching.join().unwrap().unwrap();

        let log = target.log.lock().clone();
        crate::assert_with_log!(
            !target.stopped.load(Ordering::SeqCst),
            "worker running after balanced resume",
            "stop then continue",
            log
        );
        assert!(log.is_empty() || log == ["stop", "continue"], "{log:?}");

        task.detach_preemptible();
        release.open();
        task.wait().unwrap();
        crate::test_complete!("resume_racing_late_attach_leaves_worker_running");
    }

    #[test]
    fn forced_abort_without_worker_cancels_at_pulse() {
        init_test("forced_abort_without_worker_cancels_at_pulse");
        let release = Gate::closed();
        let task = parked_task(&release);
        task.start().unwrap();

        task.abort(false, false).unwrap();
        assert_eq!(task.forced_abort_reason(), Some(CancelReason::forced()));
        let err = task.wait_timeout(Duration::from_secs(5)).unwrap_err();
        assert!(err.is_canceled(), "{err}");
        crate::test_complete!("forced_abort_without_worker_cancels_at_pulse");
    }

    #[test]
    fn late_attach_applies_pending_requests() {
        init_test("late_attach_applies_pending_requests");
        let release = Gate::closed();
        let task = parked_task(&release);
        task.start().unwrap();

        task.suspend(false).unwrap();
        let probe = Probe::new();
        task.attach_preemptible(probe.clone()).unwrap();
        assert_eq!(probe.suspends.load(Ordering::SeqCst), 1);

        task.abort(false, false).unwrap();
        let late = Probe::new();
        task.attach_preemptible(late.clone()).unwrap();
        assert_eq!(late.kills.load(Ordering::SeqCst), 1);

        task.detach_preemptible();
        task.resume().unwrap();
        assert!(task.wait().unwrap_err().is_canceled());
        crate::test_complete!("late_attach_applies_pending_requests");
    }

    #[test]
    fn nonabortable_delays_forced_abort() {
        init_test("nonabortable_delays_forced_abort");
        let entered = Gate::closed();
        let leave = Gate::closed();
        let (inside, exit) = (entered.clone(), leave.clone());
        let task = ActionTask::new(move |task| {
            task.nonabortable(|| {
                inside.open();
                exit.wait();
            });
            loop {
                task.pulse()?;
                thread::sleep(Duration::from_millis(1));
            }
        });
        task.start().unwrap();
        entered.wait();

        let aborted = Gate::closed();
        let (block, done) = (task.control().clone(), aborted.clone());
        let aborter = thread::spawn(move || {
            block.abort(false, false).unwrap();
            done.open();
        });

        assert!(
            !aborted.wait_timeout(Duration::from_millis(50)),
            "forced abort must wait for the critical section"
        );
        leave.open();
        assert!(aborted.wait_timeout(Duration::from_secs(5)));
        aborter.join().unwrap();
        assert!(task.wait().unwrap_err().is_canceled());
        crate::test_complete!("nonabortable_delays_forced_abort");
    }

    #[test]
    fn finished_panic_is_logged_by_default() {
        init_test("finished_panic_is_logged_by_default");
        let task = TaskBuilder::new()
            .on_finished(|_| panic!("listener bug"))
            .action(|_| Ok(()))
            .unwrap();
        task.start().unwrap();
        task.wait().unwrap();
        assert!(!task.is_failed());
        crate::test_complete!("finished_panic_is_logged_by_default");
    }

    #[test]
    fn finished_panic_can_be_captured() {
        init_test("finished_panic_can_be_captured");
        let config = TaskConfig::default().with_finished_panic_policy(FinishedPanicPolicy::Capture);
        let task = TaskBuilder::new()
            .config(config)
            .on_finished(|_| panic!("listener bug"))
            .action(|_| Ok(()))
            .unwrap();
        task.start().unwrap();
        let err = task.wait().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Panicked);
        assert!(task.is_failed() && !task.is_terminated());
        crate::test_complete!("finished_panic_can_be_captured");
    }

    #[test]
    fn captured_finished_panic_keeps_body_error() {
        init_test("captured_finished_panic_keeps_body_error");
        let config = TaskConfig::default().with_finished_panic_policy(FinishedPanicPolicy::Capture);
        let task = TaskBuilder::new()
            .config(config)
            .on_finished(|_| panic!("listener bug"))
            .action(|_| Err(Error::failed("disk full")))
            .unwrap();
        task.start().unwrap();
        let err = task.wait().unwrap_err();
        crate::assert_with_log!(
            err.kind() == ErrorKind::Failed,
            "body error wins over the listener panic",
            ErrorKind::Failed,
            err.kind()
        );
        assert_eq!(err.context(), Some("disk full"));
        crate::test_complete!("captured_finished_panic_keeps_body_error");
    }

    #[test]
    fn suppressed_callbacks_do_not_fire() {
        init_test("suppressed_callbacks_do_not_fire");
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let release = Gate::closed();
        let gate = release.clone();
        let task = TaskBuilder::new()
            .on_finished(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .action(move |task| {
                while !gate.is_open() {
                    task.pulse()?;
                    thread::sleep(Duration::from_millis(1));
                }
                Ok(())
            })
            .unwrap();
        task.start().unwrap();
        task.abort(true, true).unwrap();
        assert!(task.wait().unwrap_err().is_canceled());
        thread::sleep(Duration::from_millis(20));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        crate::test_complete!("suppressed_callbacks_do_not_fire");
    }

    #[test]
    fn debug_lists_flags() {
        init_test("debug_lists_flags");
        let task = ActionTask::new(|_| Ok(()));
        let debug = format!("{:?}", task.control());
        assert!(debug.contains("ControlBlock"), "{debug}");
        assert!(debug.contains("CREATED"), "{debug}");
        crate::test_complete!("debug_lists_flags");
    }
}
