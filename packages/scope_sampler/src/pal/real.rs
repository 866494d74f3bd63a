//! Platform implementation backed by the operating system.

use std::time::Duration;

use cpu_time::ThreadTime;

use crate::pal::Platform;

#[derive(Clone, Debug, Default)]
pub(crate) struct RealPlatform;

impl Platform for RealPlatform {
    #[cfg_attr(test, mutants::skip)] // Real OS values cannot be predicted by tests.
    fn thread_time(&self) -> Duration {
        // Processor time is reporting metadata, so an unsupported platform degrades to zero
        // rather than failing the profiled thread.
        ThreadTime::try_now().map_or(Duration::ZERO, |time| time.as_duration())
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[cfg_attr(miri, ignore)] // Miri cannot query thread processor time.
    #[test]
    fn thread_time_does_not_go_backwards() {
        let platform = RealPlatform;

        let before = platform.thread_time();

        let mut sum = 0_u64;
        for i in 0..100_000_u64 {
            sum = sum.wrapping_add(std::hint::black_box(i));
        }
        std::hint::black_box(sum);

        assert!(platform.thread_time() >= before);
    }
}
