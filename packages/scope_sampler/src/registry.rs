//! Registry of the thread profile states that the sampler visits.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::trace;

use crate::ThreadProfileState;

/// Non-owning references to every thread profile state of one profiler.
///
/// Threads register their state once, when it is created. States are owned by their threads,
/// so a registered state may be dropped at any time. Entries whose state is gone are skipped
/// and pruned during the next sweep or the next registration, whichever comes first; there is
/// no explicit deregistration.
///
/// A single lock guards the list and is held for an entire sweep. This means registering a new
/// thread waits for any in-progress sweep to finish. Sweeps only increment counters, so the
/// wait is short.
#[derive(Debug, Default)]
pub(crate) struct SamplerRegistry {
    states: Mutex<Vec<Weak<ThreadProfileState>>>,
}

impl SamplerRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(&self, state: &Arc<ThreadProfileState>) {
        let mut states = self.states.lock();

        // Without a running sampler there are no sweeps, so this is the only chance to let go
        // of the allocations of ended threads.
        states.retain(|weak| weak.strong_count() > 0);
        states.push(Arc::downgrade(state));
    }

    /// Calls `f` for each registered state that is still alive.
    ///
    /// Entries whose state has been dropped are removed from the registry.
    pub(crate) fn for_each_live(&self, mut f: impl FnMut(&ThreadProfileState)) {
        let mut states = self.states.lock();

        states.retain(|weak| {
            if let Some(state) = weak.upgrade() {
                f(&state);
                true
            } else {
                trace!("pruning registry entry of ended thread");
                false
            }
        });
    }

    /// Number of registered states that are still alive.
    #[must_use]
    pub(crate) fn live_count(&self) -> usize {
        self.states
            .lock()
            .iter()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    #[cfg(test)]
    pub(crate) fn entry_count(&self) -> usize {
        self.states.lock().len()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use static_assertions::assert_impl_all;

    use super::*;
    use crate::FingerprintMode;
    use crate::pal::PlatformFacade;

    assert_impl_all!(SamplerRegistry: Send, Sync);

    fn create_state() -> Arc<ThreadProfileState> {
        Arc::new(ThreadProfileState::for_current_thread(
            FingerprintMode::Reversible,
            PlatformFacade::real(),
        ))
    }

    #[test]
    fn visits_every_live_state() {
        let registry = SamplerRegistry::new();

        let first = create_state();
        let second = create_state();
        registry.register(&first);
        registry.register(&second);

        let mut visited = 0;
        registry.for_each_live(|state| {
            state.sample();
            visited += 1;
        });

        assert_eq!(visited, 2);
        assert_eq!(first.total_samples(), 1);
        assert_eq!(second.total_samples(), 1);
    }

    #[test]
    fn skips_and_prunes_dropped_states() {
        let registry = SamplerRegistry::new();

        let kept = create_state();
        let dropped = create_state();
        registry.register(&kept);
        registry.register(&dropped);

        drop(dropped);

        assert_eq!(registry.live_count(), 1);
        assert_eq!(registry.entry_count(), 2);

        let mut visited = 0;
        registry.for_each_live(|_| visited += 1);

        assert_eq!(visited, 1);
        assert_eq!(registry.entry_count(), 1);
    }

    #[test]
    fn register_prunes_dropped_states() {
        let registry = SamplerRegistry::new();

        let states = (0..100).map(|_| create_state()).collect::<Vec<_>>();
        for state in &states {
            registry.register(state);
        }
        assert_eq!(registry.entry_count(), 100);

        drop(states);
        assert_eq!(registry.live_count(), 0);

        let survivor = create_state();
        registry.register(&survivor);

        assert_eq!(registry.entry_count(), 1);
        assert_eq!(registry.live_count(), 1);
    }

    #[test]
    fn empty_registry_visits_nothing() {
        let registry = SamplerRegistry::new();

        let mut visited = 0;
        registry.for_each_live(|_| visited += 1);

        assert_eq!(visited, 0);
        assert_eq!(registry.live_count(), 0);
    }
}
