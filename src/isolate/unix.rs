//! Forked-process workers.
#![allow(unsafe_code)]

use super::{WorkerError, WorkerReport};
use crate::error::{Error, Result};
use crate::task::{ControlBlock, Preemptible};
use crate::tracing_compat::{debug, trace};
use crate::types::{CancelReason, TaskId};
use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::sys::wait::{WaitStatus, waitpid};
use nix::unistd::{ForkResult, Pid, fork};
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::os::fd::OwnedFd;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Held from `pipe` until the parent closed its write end, so no worker
/// inherits another worker's pipe and delays its EOF.
static SPAWN_LOCK: Mutex<()> = Mutex::new(());

const EXIT_REPORTED: i32 = 0;
const EXIT_UNREPORTED: i32 = 70;

fn sys(call: &'static str) -> impl FnOnce(Errno) -> WorkerError {
    move |errno| WorkerError::Sys {
        call,
        errno: errno.into(),
    }
}

/// A live worker process.
struct ChildProcess {
    pid: Pid,
    task: TaskId,
    stopped: AtomicBool,
    killed: AtomicBool,
}

impl ChildProcess {
    fn signal(&self, signal: Signal) -> Result<()> {
        match kill(self.pid, signal) {
            // Already gone; the supervisor reaps it.
            Ok(()) | Err(Errno::ESRCH) => {
                trace!(task = %self.task, pid = self.pid.as_raw(), signal = signal.as_str(), "signaled worker");
                Ok(())
            }
            Err(errno) => Err(sys("kill")(errno).into()),
        }
    }
}

impl Preemptible for ChildProcess {
    fn suspend(&self) -> Result<()> {
        self.signal(Signal::SIGSTOP)?;
        self.stopped.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn resume(&self) -> Result<()> {
        self.signal(Signal::SIGCONT)?;
        self.stopped.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn kill(&self) -> Result<()> {
        self.killed.store(true, Ordering::SeqCst);
        if self.stopped.swap(false, Ordering::SeqCst) {
            self.signal(Signal::SIGCONT)?;
        }
        self.signal(Signal::SIGKILL)
    }
}

pub(super) fn run<T, F>(task: &ControlBlock, action: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Serialize + DeserializeOwned + Send + 'static,
{
    let spawning = SPAWN_LOCK.lock();
    let (reader, writer) = cloexec_pipe()?;

    // SAFETY: the child only runs `action`, writes its report into the pipe
    // and leaves through `_exit`; it never returns into the caller's frames.
    match unsafe { fork() }.map_err(sys("fork"))? {
        ForkResult::Child => {
            drop(reader);
            let code = report_and_exit(File::from(writer), action);
            // SAFETY: `_exit` skips atexit handlers and stdio flushing, which
            // belong to the parent's threads.
            unsafe { libc::_exit(code) }
        }
        ForkResult::Parent { child } => {
            drop(writer);
            drop(spawning);
            debug!(task = %task.id(), pid = child.as_raw(), "isolated worker started");
            let process = Arc::new(ChildProcess {
                pid: child,
                task: task.id(),
                stopped: AtomicBool::new(false),
                killed: AtomicBool::new(false),
            });
            let attached = task.attach_preemptible(Arc::clone(&process) as Arc<dyn Preemptible>);

            let mut bytes = Vec::new();
            let read = File::from(reader).read_to_end(&mut bytes);
            task.detach_preemptible();
            let status = reap(child)?;
            debug!(task = %task.id(), pid = child.as_raw(), status = ?status, "isolated worker exited");

            attached?;
            read.map_err(|errno| WorkerError::Sys { call: "read", errno })?;
            interpret(task, &process, status, &bytes)
        }
    }
}

/// Both ends are close-on-exec, so a process exec'd elsewhere in the parent
/// never holds the write end open.
#[cfg(any(
    target_os = "linux",
    target_os = "android",
    target_os = "freebsd",
    target_os = "dragonfly",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "illumos",
    target_os = "solaris",
))]
fn cloexec_pipe() -> Result<(OwnedFd, OwnedFd)> {
    use nix::fcntl::OFlag;
    Ok(nix::unistd::pipe2(OFlag::O_CLOEXEC).map_err(sys("pipe2"))?)
}

#[cfg(not(any(
    target_os = "linux",
    target_os = "android",
    target_os = "freebsd",
    target_os = "dragonfly",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "illumos",
    target_os = "solaris",
)))]
fn cloexec_pipe() -> Result<(OwnedFd, OwnedFd)> {
    use nix::fcntl::{FcntlArg, FdFlag, fcntl};
    let (reader, writer) = nix::unistd::pipe().map_err(sys("pipe"))?;
    for fd in [&reader, &writer] {
        fcntl(fd, FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC)).map_err(sys("fcntl"))?;
    }
    Ok((reader, writer))
}

fn report_and_exit<T, F>(pipe: File, action: F) -> i32
where
    F: FnOnce() -> Result<T>,
    T: Serialize,
{
    let written = catch_unwind(AssertUnwindSafe(move || {
        let report = WorkerReport::from_outcome(catch_unwind(AssertUnwindSafe(action)));
        let mut out = BufWriter::new(pipe);
        serde_json::to_writer(&mut out, &report).is_ok() && out.flush().is_ok()
    }));
    match written {
        Ok(true) => EXIT_REPORTED,
        _ => EXIT_UNREPORTED,
    }
}

fn reap(child: Pid) -> Result<WaitStatus> {
    loop {
        match waitpid(child, None) {
            Err(Errno::EINTR) => {}
            other => return other.map_err(|errno| sys("waitpid")(errno).into()),
        }
    }
}

fn interpret<T: DeserializeOwned>(
    task: &ControlBlock,
    process: &ChildProcess,
    status: WaitStatus,
    bytes: &[u8],
) -> Result<T> {
    match status {
        WaitStatus::Exited(_, EXIT_REPORTED) if !bytes.is_empty() => {
            let report: WorkerReport<T> = serde_json::from_slice(bytes).map_err(WorkerError::from)?;
            report.into_result()
        }
        WaitStatus::Signaled(_, Signal::SIGKILL, _) if process.killed.load(Ordering::SeqCst) => {
            let reason = task.forced_abort_reason().unwrap_or_else(CancelReason::forced);
            Err(Error::canceled(reason))
        }
        WaitStatus::Signaled(_, signal, _) => Err(WorkerError::Signaled(signal.as_str().to_string()).into()),
        WaitStatus::Exited(_, code) => Err(WorkerError::NoReport(code).into()),
        other => Err(WorkerError::Signaled(format!("{other:?}")).into()),
    }
}
