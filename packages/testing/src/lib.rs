#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(coverage_nightly, coverage(off))] // This is all test code, no need to test it.

//! Private helpers for tests, benchmarks and examples in this workspace.

use std::env;
use std::hint::black_box;
use std::panic;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

/// Runs a test on a separate thread and fails it if it does not finish in time.
///
/// Tests of background threads tend to hang rather than fail when something goes wrong, which
/// would stall the whole test run. The watchdog turns such a hang into a panic.
///
/// The timeout is 10 seconds, or 60 seconds under Miri, where thread synchronization is far
/// slower.
///
/// When the `MUTATION_TESTING` environment variable is set to "1", the test function runs
/// directly on the calling thread without a watchdog, so that mutation testing can detect
/// mutations that cause hangs.
///
/// # Panics
///
/// Panics if the test exceeds the timeout. If the test itself panics, the panic is resumed on
/// the calling thread.
///
/// # Example
///
/// ```rust
/// use testing::with_watchdog;
///
/// let answer = with_watchdog(|| 6 * 7);
/// assert_eq!(answer, 42);
/// ```
pub fn with_watchdog<F, R>(test_fn: F) -> R
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    if env::var("MUTATION_TESTING").as_deref() == Ok("1") {
        return test_fn();
    }

    let timeout = if cfg!(miri) {
        Duration::from_secs(60)
    } else {
        Duration::from_secs(10)
    };

    let (tx, rx) = mpsc::channel();

    let test_thread = thread::spawn(move || {
        let result = test_fn();

        // If this fails, the watchdog has already given up on us.
        drop(tx.send(result));
    });

    match rx.recv_timeout(timeout) {
        Ok(result) => {
            test_thread.join().expect("test thread sent its result, so it did not panic");
            result
        }
        Err(mpsc::RecvTimeoutError::Timeout) => {
            panic!("test did not finish within {timeout:?}");
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => match test_thread.join() {
            Ok(()) => panic!("test thread exited without sending a result"),
            Err(payload) => panic::resume_unwind(payload),
        },
    }
}

/// Keeps the current thread busy on the processor for at least `duration` of wall clock time.
///
/// Unlike sleeping, this keeps the thread runnable, which is what a sampling profiler observes
/// when it looks at a thread doing real work.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
///
/// testing::spin_for(Duration::from_millis(1));
/// ```
pub fn spin_for(duration: Duration) {
    let started = Instant::now();
    let mut counter: u64 = 0;

    while started.elapsed() < duration {
        counter = black_box(counter.wrapping_add(1));
    }
}
