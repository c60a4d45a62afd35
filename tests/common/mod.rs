//! Shared helpers for integration tests.
#![allow(dead_code)]

use parking_lot::Mutex;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::mpsc;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};
use taskward::{ControlBlock, Gate, Job, SyncContext};

pub use taskward::test_utils::{eventually, init_test_logging};

/// Logs a named section inside a test phase.
#[macro_export]
macro_rules! test_section {
    ($name:expr) => {
        ::tracing::debug!(section = %$name, "test section");
    };
}

/// Body that pulses until canceled.
pub fn pulse_forever(task: &ControlBlock) -> taskward::Result<()> {
    loop {
        task.pulse()?;
        thread::sleep(Duration::from_micros(200));
    }
}

/// Spins without ever calling `pulse`.
pub fn busy_loop() -> taskward::Result<u64> {
    let mut n = 0u64;
    loop {
        n = std::hint::black_box(n.wrapping_add(1));
    }
}

/// Runs `f` and returns how long it took.
pub fn timed<R>(f: impl FnOnce() -> R) -> (R, Duration) {
    let started = Instant::now();
    let value = f();
    (value, started.elapsed())
}

/// Lifecycle notification observed by a [`Recorder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Seen {
    Suspended,
    Resumed,
    Finished,
}

/// Records notifications together with the thread they ran on.
#[derive(Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<(Seen, Option<String>)>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hook(&self, seen: Seen) -> impl Fn(&ControlBlock) + Send + Sync + 'static {
        let events = Arc::clone(&self.events);
        move |_| {
            let name = thread::current().name().map(str::to_string);
            events.lock().push((seen, name));
        }
    }

    pub fn events(&self) -> Vec<Seen> {
        self.events.lock().iter().map(|(seen, _)| *seen).collect()
    }

    pub fn threads(&self) -> Vec<Option<String>> {
        self.events.lock().iter().map(|(_, name)| name.clone()).collect()
    }

    pub fn count(&self, seen: Seen) -> usize {
        self.events().into_iter().filter(|s| *s == seen).count()
    }
}

/// Asserts Suspended/Resumed strictly alternate, starting with Suspended.
pub fn assert_alternating(events: &[Seen]) {
    let mut expect = Seen::Suspended;
    for (i, seen) in events.iter().filter(|s| **s != Seen::Finished).enumerate() {
        assert_eq!(*seen, expect, "event {i} out of order in {events:?}");
        expect = if expect == Seen::Suspended {
            Seen::Resumed
        } else {
            Seen::Suspended
        };
    }
}

/// A single-threaded event loop standing in for a UI context.
pub struct LoopContext {
    queue: mpsc::Sender<Job>,
    thread: ThreadId,
}

impl LoopContext {
    pub const THREAD_NAME: &'static str = "event-loop";

    pub fn start() -> Arc<Self> {
        let (queue, jobs) = mpsc::channel::<Job>();
        let handle = thread::Builder::new()
            .name(Self::THREAD_NAME.to_string())
            .spawn(move || {
                for job in jobs {
                    let _ = catch_unwind(AssertUnwindSafe(job));
                }
            })
            .unwrap();
        Arc::new(Self {
            queue,
            thread: handle.thread().id(),
        })
    }
}

impl SyncContext for LoopContext {
    fn requires_marshal(&self) -> bool {
        thread::current().id() != self.thread
    }

    fn marshal(&self, job: Job, wait_for_completion: bool) {
        if !wait_for_completion {
            let _ = self.queue.send(job);
            return;
        }
        let done = Gate::closed();
        let signal = done.clone();
        let sent = self.queue.send(Box::new(move || {
            let _ = catch_unwind(AssertUnwindSafe(job));
            signal.open();
        }));
        if sent.is_ok() {
            done.wait();
        }
    }
}
