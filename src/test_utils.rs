//! Test helpers shared by unit and integration tests.
//!
//! Only compiled for `cfg(test)` or with the `test-internals` feature.

use std::sync::Once;
use std::time::{Duration, Instant};

static INIT_LOGGING: Once = Once::new();

/// Installs a test-friendly `tracing` subscriber once per process.
///
/// The filter honours `RUST_LOG` and falls back to `taskward=debug`.
/// Output goes through the test writer so it is captured per test.
pub fn init_test_logging() {
    INIT_LOGGING.call_once(|| {
        let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "taskward=debug".to_string());
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_thread_names(true)
            .try_init();
    });
}

/// Polls `condition` every millisecond until it holds or `limit` elapses.
///
/// Returns whether the condition was observed.
pub fn eventually(limit: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + limit;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
}

/// Marks the start of a named test phase in the log.
#[macro_export]
macro_rules! test_phase {
    ($name:expr) => {
        ::tracing::info!(phase = %$name, "test phase started");
    };
}

/// Marks successful completion of a named test.
#[macro_export]
macro_rules! test_complete {
    ($name:expr) => {
        ::tracing::info!(test = %$name, "test completed");
    };
}

/// Asserts `cond`, logging expected and actual values before failing.
#[macro_export]
macro_rules! assert_with_log {
    ($cond:expr, $msg:expr, $expected:expr, $actual:expr $(,)?) => {{
        let passed = $cond;
        if passed {
            ::tracing::debug!(
                check = %$msg,
                expected = ?$expected,
                actual = ?$actual,
                "assertion passed"
            );
        } else {
            ::tracing::error!(
                check = %$msg,
                expected = ?$expected,
                actual = ?$actual,
                "assertion failed"
            );
        }
        assert!(
            passed,
            "{}: expected {:?}, got {:?}",
            $msg,
            $expected,
            $actual
        );
    }};
}
