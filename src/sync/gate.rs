//! Waitable open/closed flag.
//!
//! A [`Gate`] is the signal every other part of the crate is built from: the
//! resume, terminate and finished signals of a control block, the escort
//! guard's start/stop handshake, and the result-ready flag of function
//! tasks.
//!
//! # Select
//!
//! [`Gate::select`] waits until any of several gates is open and reports the
//! first open one in slice order, so callers encode priority by ordering.
//! The waiter registers with every gate *before* scanning them, which means
//! a gate that opens between the scan and the sleep still wakes the waiter.
//! A zero timeout performs only the scan ("try-select").

use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A boolean, thread-safe, waitable flag.
///
/// Cloning a `Gate` yields another handle to the same flag.
#[derive(Clone)]
pub struct Gate {
    inner: Arc<GateInner>,
}

struct GateInner {
    state: Mutex<GateState>,
    cond: Condvar,
}

struct GateState {
    open: bool,
    /// Multi-gate waiters currently parked in [`Gate::select`].
    watchers: Vec<Arc<Watcher>>,
}

#[derive(Default)]
struct Watcher {
    fired: Mutex<bool>,
    cond: Condvar,
}

impl Watcher {
    fn fire(&self) {
        let mut fired = self.fired.lock();
        *fired = true;
        self.cond.notify_one();
    }
}

impl Gate {
    /// Creates a gate in the given state.
    #[must_use]
    pub fn new(open: bool) -> Self {
        Self {
            inner: Arc::new(GateInner {
                state: Mutex::new(GateState {
                    open,
                    watchers: Vec::new(),
                }),
                cond: Condvar::new(),
            }),
        }
    }

    /// Creates an open gate.
    #[must_use]
    pub fn opened() -> Self {
        Self::new(true)
    }

    /// Creates a closed gate.
    #[must_use]
    pub fn closed() -> Self {
        Self::new(false)
    }

    /// Returns true if the gate is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.inner.state.lock().open
    }

    /// Opens the gate, releasing every waiter.
    pub fn open(&self) {
        let mut state = self.inner.state.lock();
        if state.open {
            return;
        }
        state.open = true;
        self.inner.cond.notify_all();
        for watcher in &state.watchers {
            watcher.fire();
        }
    }

    /// Closes the gate. Subsequent waits block until it is opened again.
    pub fn close(&self) {
        self.inner.state.lock().open = false;
    }

    /// Blocks until the gate is open.
    pub fn wait(&self) {
        let mut state = self.inner.state.lock();
        while !state.open {
            self.inner.cond.wait(&mut state);
        }
    }

    /// Blocks until the gate is open or `timeout` elapses.
    ///
    /// Returns whether the gate was open on return.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            self.wait();
            return true;
        };
        let mut state = self.inner.state.lock();
        while !state.open {
            if self.inner.cond.wait_until(&mut state, deadline).timed_out() {
                return state.open;
            }
        }
        true
    }

    /// Returns true if both handles refer to the same gate.
    #[must_use]
    pub fn same_gate(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Waits until any gate in `gates` is open.
    ///
    /// Returns the index of the first open gate in slice order, or `None`
    /// if `timeout` elapsed first. `Some(Duration::ZERO)` never blocks;
    /// `None` blocks indefinitely.
    #[must_use]
    pub fn select(gates: &[&Self], timeout: Option<Duration>) -> Option<usize> {
        if let Some(index) = first_open(gates) {
            return Some(index);
        }
        if gates.is_empty() || timeout == Some(Duration::ZERO) {
            return None;
        }
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));

        let watcher = Arc::new(Watcher::default());
        for gate in gates {
            gate.inner.state.lock().watchers.push(Arc::clone(&watcher));
        }

        let selected = loop {
            if let Some(index) = first_open(gates) {
                break Some(index);
            }
            let mut fired = watcher.fired.lock();
            if !*fired {
                match deadline {
                    Some(deadline) => {
                        if watcher.cond.wait_until(&mut fired, deadline).timed_out() && !*fired {
                            drop(fired);
                            break first_open(gates);
                        }
                    }
                    None => watcher.cond.wait(&mut fired),
                }
            }
            *fired = false;
        };

        for gate in gates {
            gate.inner
                .state
                .lock()
                .watchers
                .retain(|w| !Arc::ptr_eq(w, &watcher));
        }
        selected
    }
}

fn first_open(gates: &[&Gate]) -> Option<usize> {
    gates.iter().position(|gate| gate.is_open())
}

impl Default for Gate {
    fn default() -> Self {
        Self::closed()
    }
}

impl fmt::Debug for Gate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gate")
            .field("open", &self.is_open())
            .finish()
    }
}
