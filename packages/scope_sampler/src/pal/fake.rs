//! Fake platform implementation for testing.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::pal::Platform;

/// Fake platform whose thread time is set by the test.
///
/// Clones share the same time value, so a test can keep one clone and advance the time seen
/// by a profiler that owns another clone.
#[derive(Clone, Debug)]
pub(crate) struct FakePlatform {
    thread_time: Arc<Mutex<Duration>>,
}

impl FakePlatform {
    pub(crate) fn new() -> Self {
        Self {
            thread_time: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    pub(crate) fn set_thread_time(&self, time: Duration) {
        *self.thread_time.lock() = time;
    }
}

impl Platform for FakePlatform {
    fn thread_time(&self) -> Duration {
        *self.thread_time.lock()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn starts_at_zero() {
        assert_eq!(FakePlatform::new().thread_time(), Duration::ZERO);
    }

    #[test]
    fn clones_share_time() {
        let platform = FakePlatform::new();
        let clone = platform.clone();

        platform.set_thread_time(Duration::from_millis(150));

        assert_eq!(clone.thread_time(), Duration::from_millis(150));
    }
}
