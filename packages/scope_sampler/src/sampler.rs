//! The background thread that samples all registered threads.

use std::io;
use std::panic;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::debug;

use crate::{SamplerRegistry, ThreadProfileState};

const SAMPLER_THREAD_NAME: &str = "scope-sampler";

/// A running sampler thread.
///
/// The thread waits for one interval, then sweeps the registry, attributing one sample to the
/// active scope of every live thread, and repeats until [`stop()`][Self::stop] is called. The
/// sampling rate is whatever the configured interval and lock contention allow. It is not a
/// fixed frequency.
#[derive(Debug)]
pub(crate) struct BackgroundSampler {
    keep_sampling: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl BackgroundSampler {
    /// Starts the sampler thread.
    ///
    /// With a zero `interval`, the thread only yields the processor between sweeps.
    pub(crate) fn start(registry: Arc<SamplerRegistry>, interval: Duration) -> io::Result<Self> {
        let keep_sampling = Arc::new(AtomicBool::new(true));

        let handle = thread::Builder::new()
            .name(SAMPLER_THREAD_NAME.to_string())
            .spawn({
                let keep_sampling = Arc::clone(&keep_sampling);
                move || sampler_loop(&registry, &keep_sampling, interval)
            })?;

        Ok(Self {
            keep_sampling,
            handle,
        })
    }

    /// Signals the sampler thread to stop and waits for it to exit.
    ///
    /// # Panics
    ///
    /// Resumes the panic of the sampler thread, if it panicked.
    pub(crate) fn stop(self) {
        // Release pairs with the Acquire load in the loop, so the thread observes the flag on
        // its next iteration.
        self.keep_sampling.store(false, Ordering::Release);

        // Cut the current wait short, so stopping does not take up to a full interval.
        self.handle.thread().unpark();

        if let Err(payload) = self.handle.join() {
            panic::resume_unwind(payload);
        }
    }

    #[cfg(test)]
    pub(crate) fn thread_id(&self) -> thread::ThreadId {
        self.handle.thread().id()
    }
}

fn sampler_loop(registry: &SamplerRegistry, keep_sampling: &AtomicBool, interval: Duration) {
    debug!(?interval, "sampler thread started");

    let mut sweeps: u64 = 0;

    loop {
        if interval.is_zero() {
            thread::yield_now();
        } else {
            // May wake early, either spuriously or because we are being stopped.
            thread::park_timeout(interval);
        }

        if !keep_sampling.load(Ordering::Acquire) {
            break;
        }

        registry.for_each_live(ThreadProfileState::sample);
        sweeps = sweeps.wrapping_add(1);
    }

    debug!(sweeps, "sampler thread exiting");
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::time::Instant;

    use super::*;
    use crate::FingerprintMode;
    use crate::pal::PlatformFacade;

    fn wait_for_samples(state: &ThreadProfileState, at_least: u64) {
        let deadline = Instant::now() + Duration::from_secs(5);

        while state.total_samples() < at_least {
            assert!(Instant::now() < deadline, "sampler did not take enough samples in time");
            thread::yield_now();
        }
    }

    #[cfg_attr(miri, ignore)]
    #[test]
    fn samples_registered_states() {
        let registry = Arc::new(SamplerRegistry::new());

        let state = Arc::new(ThreadProfileState::for_current_thread(
            FingerprintMode::Reversible,
            PlatformFacade::real(),
        ));
        registry.register(&state);
        state.enter("busy");

        let sampler = BackgroundSampler::start(Arc::clone(&registry), Duration::ZERO).unwrap();
        wait_for_samples(&state, 10);
        sampler.stop();

        state.exit("busy");

        let report = state.finalize();
        assert!(report.total_samples() >= 10);
        assert_eq!(
            report.scope(&["busy"]).unwrap().samples(),
            report.total_samples()
        );
    }

    #[cfg_attr(miri, ignore)]
    #[test]
    fn no_samples_after_stop() {
        let registry = Arc::new(SamplerRegistry::new());

        let state = Arc::new(ThreadProfileState::for_current_thread(
            FingerprintMode::Reversible,
            PlatformFacade::real(),
        ));
        registry.register(&state);

        let sampler =
            BackgroundSampler::start(Arc::clone(&registry), Duration::from_micros(50)).unwrap();
        wait_for_samples(&state, 1);
        sampler.stop();

        let after_stop = state.total_samples();
        thread::sleep(Duration::from_millis(10));

        assert_eq!(state.total_samples(), after_stop);
    }

    #[cfg_attr(miri, ignore)]
    #[test]
    fn stop_does_not_wait_for_interval() {
        let registry = Arc::new(SamplerRegistry::new());

        let state = Arc::new(ThreadProfileState::for_current_thread(
            FingerprintMode::Reversible,
            PlatformFacade::real(),
        ));
        registry.register(&state);

        let sampler =
            BackgroundSampler::start(Arc::clone(&registry), Duration::from_secs(3600)).unwrap();

        let started = Instant::now();
        sampler.stop();

        assert!(started.elapsed() < Duration::from_secs(60));

        // The first sweep only happens after one interval.
        assert_eq!(state.total_samples(), 0);
    }
}
