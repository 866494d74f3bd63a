//! Profiling state owned by one application thread.

use std::thread::{self, ThreadId};
use std::time::Duration;

use parking_lot::Mutex;

use crate::pal::{Platform, PlatformFacade};
use crate::{FingerprintMode, NodeIndex, ScopeFingerprint, ScopeHash, ScopeTree, ThreadReport};

/// The scope tree of one thread plus the bookkeeping needed to sample it.
///
/// The owning thread calls [`enter()`][Self::enter] and [`exit()`][Self::exit] via scope guards,
/// while the background sampler calls [`sample()`][Self::sample] from its own thread. All
/// operations take the same lock, so they are totally ordered with respect to each other.
#[derive(Debug)]
pub(crate) struct ThreadProfileState {
    mode: FingerprintMode,
    data: Mutex<ThreadProfileData>,
}

#[derive(Debug)]
struct ThreadProfileData {
    fingerprint: ScopeFingerprint,

    // Number of scopes currently entered. Needed to calculate depth-aware fingerprints and to
    // detect unbalanced exits.
    depth: usize,

    // None if no scope is active (the fingerprint is empty).
    current: Option<NodeIndex>,

    total_samples: u64,
    tree: ScopeTree,

    // Once finalized, the state ignores samples.
    finalized: bool,

    thread_id: ThreadId,
    thread_name: Option<String>,

    platform: PlatformFacade,
    processor_time_at_start: Duration,
}

impl ThreadProfileState {
    /// Creates the state for the calling thread.
    ///
    /// Must be called on the thread that the state will describe, as the thread identity and
    /// the processor time baseline are taken from the calling thread.
    pub(crate) fn for_current_thread(mode: FingerprintMode, platform: PlatformFacade) -> Self {
        let current = thread::current();
        let processor_time_at_start = platform.thread_time();

        Self {
            mode,
            data: Mutex::new(ThreadProfileData {
                fingerprint: ScopeFingerprint::NONE,
                depth: 0,
                current: None,
                total_samples: 0,
                tree: ScopeTree::new(),
                finalized: false,
                thread_id: current.id(),
                thread_name: current.name().map(str::to_string),
                platform,
                processor_time_at_start,
            }),
        }
    }

    /// Marks the start of a scope with the given name.
    pub(crate) fn enter(&self, name: &str) {
        let mut data = self.data.lock();

        let depth = data
            .depth
            .checked_add(1)
            .expect("scope nesting depth cannot realistically exceed usize::MAX");

        let parent_fingerprint = data.fingerprint;
        let fingerprint = parent_fingerprint.toggle(ScopeHash::new(self.mode, name, depth));

        data.depth = depth;
        data.fingerprint = fingerprint;
        data.current = if fingerprint.is_none() {
            None
        } else {
            Some(
                data.tree
                    .get_or_insert(fingerprint, parent_fingerprint, name),
            )
        };
    }

    /// Marks the end of the innermost scope, which must have been entered with the same name.
    ///
    /// # Panics
    ///
    /// Panics if no scope is active, as this means enter/exit calls are not correctly paired.
    pub(crate) fn exit(&self, name: &str) {
        let mut data = self.data.lock();

        let depth = data.depth;
        assert!(depth != 0, "exited scope '{name}' without any scope being active");

        let fingerprint = data
            .fingerprint
            .toggle(ScopeHash::new(self.mode, name, depth));

        data.depth = depth.wrapping_sub(1);
        data.fingerprint = fingerprint;
        data.current = if fingerprint.is_none() {
            None
        } else {
            Some(data.tree.find(fingerprint).expect(
                "the scope we returned to must have a node - enter/exit calls are not correctly paired",
            ))
        };
    }

    /// Attributes one sample to the currently active scope, if any.
    ///
    /// The thread's total sample count grows even when no scope is active, so proportions are
    /// calculated against everything the thread was observed doing.
    pub(crate) fn sample(&self) {
        let mut data = self.data.lock();

        if data.finalized {
            return;
        }

        if let Some(current) = data.current {
            data.tree.record_sample(current);
        }

        data.total_samples = data.total_samples.saturating_add(1);
    }

    /// Calculates cumulative counts and proportions and produces the thread's report.
    ///
    /// Must be called on the owning thread, as this is where the processor time is read from.
    ///
    /// # Panics
    ///
    /// Panics if called more than once.
    #[must_use]
    pub(crate) fn finalize(&self) -> ThreadReport {
        let mut data = self.data.lock();

        assert!(!data.finalized, "thread profile state can only be finalized once");
        data.finalized = true;

        let processor_time = data
            .platform
            .thread_time()
            .saturating_sub(data.processor_time_at_start);

        let total_samples = data.total_samples;
        let scopes = data.tree.aggregate(total_samples, processor_time);

        ThreadReport::new(
            data.thread_id,
            data.thread_name.clone(),
            total_samples,
            processor_time,
            scopes,
        )
    }

    #[cfg(test)]
    pub(crate) fn fingerprint(&self) -> ScopeFingerprint {
        self.data.lock().fingerprint
    }

    #[cfg(test)]
    pub(crate) fn total_samples(&self) -> u64 {
        self.data.lock().total_samples
    }

    #[cfg(test)]
    pub(crate) fn is_in_scope(&self) -> bool {
        self.data.lock().current.is_some()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use static_assertions::assert_impl_all;

    use super::*;
    use crate::ScopeReport;
    use crate::pal::FakePlatform;

    assert_impl_all!(ThreadProfileState: Send, Sync);

    fn create_state(mode: FingerprintMode) -> ThreadProfileState {
        ThreadProfileState::for_current_thread(mode, PlatformFacade::fake(FakePlatform::new()))
    }

    fn child_names(scope: &ScopeReport) -> Vec<&str> {
        scope.children().map(ScopeReport::name).collect()
    }

    #[test]
    fn fingerprint_returns_to_none_after_balanced_calls() {
        let state = create_state(FingerprintMode::Reversible);

        state.enter("outer");
        state.enter("inner1");
        state.exit("inner1");
        state.enter("inner2");
        state.enter("innermost");
        state.exit("innermost");
        state.exit("inner2");

        assert!(!state.fingerprint().is_none());

        state.exit("outer");

        assert!(state.fingerprint().is_none());
        assert!(!state.is_in_scope());
    }

    #[test]
    fn fingerprint_restored_after_each_exit() {
        let state = create_state(FingerprintMode::DepthAware);

        state.enter("outer");
        let in_outer = state.fingerprint();

        state.enter("inner");
        assert_ne!(state.fingerprint(), in_outer);

        state.exit("inner");
        assert_eq!(state.fingerprint(), in_outer);
    }

    #[test]
    #[should_panic]
    fn exit_without_enter_panics() {
        let state = create_state(FingerprintMode::Reversible);
        state.exit("never_entered");
    }

    #[test]
    fn samples_go_to_innermost_scope() {
        let state = create_state(FingerprintMode::Reversible);

        state.sample();

        state.enter("outer");
        state.sample();

        state.enter("inner1");
        state.sample();
        state.sample();
        state.exit("inner1");

        state.enter("inner2");
        state.sample();
        state.sample();
        state.sample();
        state.exit("inner2");

        state.exit("outer");
        state.sample();

        assert_eq!(state.total_samples(), 8);

        let report = state.finalize();

        assert_eq!(report.total_samples(), 8);
        assert_eq!(report.unscoped_samples(), 2);

        let outer = report.scope(&["outer"]).unwrap();
        assert_eq!(outer.own_samples(), 1);
        assert_eq!(outer.samples(), 6);
        assert_eq!(child_names(outer), ["inner1", "inner2"]);

        let inner1 = outer.child("inner1").unwrap();
        let inner2 = outer.child("inner2").unwrap();
        assert_eq!(inner1.samples(), 2);
        assert_eq!(inner2.samples(), 3);
        assert!((inner1.proportion() - 0.25).abs() < f64::EPSILON);
        assert!((outer.proportion() - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn reentering_a_scope_reuses_its_node() {
        let state = create_state(FingerprintMode::Reversible);

        for _ in 0..3 {
            state.enter("repeated");
            state.sample();
            state.exit("repeated");
        }

        let report = state.finalize();

        assert_eq!(report.scopes().count(), 1);
        assert_eq!(report.scope(&["repeated"]).unwrap().samples(), 3);
    }

    #[test]
    fn zero_samples_produce_zero_proportions() {
        let state = create_state(FingerprintMode::Reversible);

        state.enter("outer");
        state.enter("inner");
        state.exit("inner");
        state.exit("outer");

        let report = state.finalize();

        assert!(report.is_empty());

        let outer = report.scope(&["outer"]).unwrap();
        assert_eq!(outer.samples(), 0);
        assert!(outer.proportion().abs() < f64::EPSILON);
        assert!(!outer.proportion().is_nan());
        assert!(outer.child("inner").unwrap().proportion().abs() < f64::EPSILON);
    }

    #[test]
    fn reversible_recursion_collapses_onto_ancestors() {
        let state = create_state(FingerprintMode::Reversible);

        state.enter("recursive");
        state.sample();

        // Second level cancels out the first - we are "outside any scope" again.
        state.enter("recursive");
        assert!(state.fingerprint().is_none());
        assert!(!state.is_in_scope());
        state.sample();

        // Third level lands on the node of the first level.
        state.enter("recursive");
        state.sample();
        state.exit("recursive");

        state.exit("recursive");
        state.exit("recursive");

        let report = state.finalize();

        assert_eq!(report.scopes().count(), 1);

        let recursive = report.scope(&["recursive"]).unwrap();
        assert_eq!(recursive.samples(), 2);
        assert_eq!(recursive.children().count(), 0);
        assert_eq!(report.unscoped_samples(), 1);
    }

    #[test]
    fn depth_aware_recursion_creates_levels() {
        let state = create_state(FingerprintMode::DepthAware);

        state.enter("recursive");
        state.enter("recursive");
        state.enter("recursive");
        state.sample();
        state.exit("recursive");
        state.exit("recursive");
        state.exit("recursive");

        let report = state.finalize();

        let deepest = report
            .scope(&["recursive", "recursive", "recursive"])
            .unwrap();
        assert_eq!(deepest.samples(), 1);
        assert_eq!(report.scope(&["recursive"]).unwrap().samples(), 1);
    }

    #[test]
    fn finalized_state_ignores_samples() {
        let state = create_state(FingerprintMode::Reversible);

        state.enter("outer");
        let _report = state.finalize();

        state.sample();
        assert_eq!(state.total_samples(), 0);
    }

    #[test]
    #[should_panic]
    fn finalize_twice_panics() {
        let state = create_state(FingerprintMode::Reversible);

        let _first = state.finalize();
        let _second = state.finalize();
    }

    #[test]
    fn report_identifies_thread() {
        let report = thread::Builder::new()
            .name("profiled".to_string())
            .spawn(|| create_state(FingerprintMode::Reversible).finalize())
            .unwrap()
            .join()
            .unwrap();

        assert_eq!(report.thread_name(), Some("profiled"));
        assert_ne!(report.thread_id(), thread::current().id());
    }

    #[test]
    fn processor_time_measured_from_creation() {
        let platform = FakePlatform::new();
        platform.set_thread_time(Duration::from_millis(100));

        let state = ThreadProfileState::for_current_thread(
            FingerprintMode::Reversible,
            PlatformFacade::fake(platform.clone()),
        );

        state.enter("work");
        state.sample();
        state.sample();
        state.exit("work");
        state.sample();
        state.sample();

        platform.set_thread_time(Duration::from_millis(300));

        let report = state.finalize();

        assert_eq!(report.processor_time(), Duration::from_millis(200));
        assert_eq!(
            report.scope(&["work"]).unwrap().processor_time(),
            Duration::from_millis(100)
        );
    }
}
