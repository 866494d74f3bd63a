//! Reversible summary of the stack of scopes active on one thread.

use std::fmt;
use std::hash::BuildHasher;

use foldhash::fast::FixedState;

/// How scope names are folded into a [`ScopeFingerprint`].
///
/// # Example
///
/// ```
/// use scope_sampler::{FingerprintMode, Profiler};
///
/// let profiler = Profiler::builder()
///     .fingerprint_mode(FingerprintMode::DepthAware)
///     .build();
/// # drop(profiler);
/// ```
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum FingerprintMode {
    /// Each scope contributes only the hash of its name.
    ///
    /// This is cheap and makes every exit restore the exact pre-entry fingerprint. The catch is
    /// that a scope nested directly inside a scope with the same name cancels it out: the second
    /// level of a recursive scope has the fingerprint of the level above the first one, so
    /// recursive invocations collapse onto ancestor nodes (or onto "no scope active" when the
    /// recursion starts at the top level) instead of forming new levels of the tree.
    #[default]
    Reversible,

    /// Each scope contributes the hash of its name combined with its nesting depth.
    ///
    /// Recursive scopes with the same name get a distinct tree node per recursion level.
    /// Deep recursion therefore grows the tree by one node per level.
    DepthAware,
}

/// Identifies the ordered set of scopes currently active on a thread.
///
/// The fingerprint is built by XOR-ing together one hash per active scope. XOR is its own
/// inverse, so exiting a scope (applying the same hash again) restores the fingerprint that was
/// in effect before the scope was entered. [`ScopeFingerprint::NONE`] means no scope is active.
///
/// Distinct scope stacks may produce the same fingerprint. With 64-bit hashes this is
/// improbable enough that we accept it as an approximation.
#[derive(Clone, Copy, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub(crate) struct ScopeFingerprint(u64);

impl ScopeFingerprint {
    /// The fingerprint of a thread that is not inside any scope.
    pub(crate) const NONE: Self = Self(0);

    #[must_use]
    pub(crate) fn is_none(self) -> bool {
        self == Self::NONE
    }

    /// Folds one scope contribution into the fingerprint.
    ///
    /// Applying the same contribution twice is a no-op.
    #[must_use]
    pub(crate) fn toggle(self, contribution: ScopeHash) -> Self {
        Self(self.0 ^ contribution.0)
    }
}

impl fmt::Debug for ScopeFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ScopeFingerprint({:#018x})", self.0)
    }
}

/// The contribution of a single scope to a [`ScopeFingerprint`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct ScopeHash(u64);

impl ScopeHash {
    /// Calculates the contribution of a scope with the given name entered at the given depth.
    ///
    /// `depth` is 1 for a top-level scope. It is ignored in [`FingerprintMode::Reversible`].
    #[must_use]
    pub(crate) fn new(mode: FingerprintMode, name: &str, depth: usize) -> Self {
        // FixedState gives the same hash on every thread, which keeps fingerprints comparable
        // between threads and stable for the lifetime of the process.
        let hasher = FixedState::default();

        let hash = match mode {
            FingerprintMode::Reversible => hasher.hash_one(name),
            FingerprintMode::DepthAware => hasher.hash_one((name, depth)),
        };

        // A zero contribution would make a scope indistinguishable from its parent.
        Self(if hash == 0 { u64::MAX } else { hash })
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn toggle_twice_restores_original() {
        let hash = ScopeHash::new(FingerprintMode::Reversible, "outer", 1);

        let entered = ScopeFingerprint::NONE.toggle(hash);
        assert!(!entered.is_none());

        let exited = entered.toggle(hash);
        assert!(exited.is_none());
    }

    #[test]
    fn well_nested_sequence_returns_to_none() {
        let names = ["a", "b", "c", "d"];

        let mut fingerprint = ScopeFingerprint::NONE;
        let mut history = Vec::new();

        for (index, name) in names.iter().enumerate() {
            history.push(fingerprint);
            fingerprint = fingerprint.toggle(ScopeHash::new(
                FingerprintMode::Reversible,
                name,
                index + 1,
            ));
        }

        for (index, name) in names.iter().enumerate().rev() {
            fingerprint = fingerprint.toggle(ScopeHash::new(
                FingerprintMode::Reversible,
                name,
                index + 1,
            ));
            assert_eq!(Some(fingerprint), history.pop());
        }

        assert!(fingerprint.is_none());
    }

    #[test]
    fn reversible_hash_ignores_depth() {
        assert_eq!(
            ScopeHash::new(FingerprintMode::Reversible, "work", 1),
            ScopeHash::new(FingerprintMode::Reversible, "work", 7)
        );
    }

    #[test]
    fn depth_aware_hash_depends_on_depth() {
        assert_ne!(
            ScopeHash::new(FingerprintMode::DepthAware, "work", 1),
            ScopeHash::new(FingerprintMode::DepthAware, "work", 2)
        );
    }

    #[test]
    fn same_name_twice_collapses_in_reversible_mode() {
        let hash = ScopeHash::new(FingerprintMode::Reversible, "recursive", 1);

        let once = ScopeFingerprint::NONE.toggle(hash);
        let twice = once.toggle(hash);

        assert!(twice.is_none());
    }

    #[test]
    fn same_name_twice_does_not_collapse_in_depth_aware_mode() {
        let first = ScopeHash::new(FingerprintMode::DepthAware, "recursive", 1);
        let second = ScopeHash::new(FingerprintMode::DepthAware, "recursive", 2);

        let once = ScopeFingerprint::NONE.toggle(first);
        let twice = once.toggle(second);

        assert!(!twice.is_none());
        assert_ne!(once, twice);
    }

    #[test]
    fn hashes_are_stable_across_threads() {
        let here = ScopeHash::new(FingerprintMode::Reversible, "shared_name", 1);
        let there = std::thread::spawn(|| {
            ScopeHash::new(FingerprintMode::Reversible, "shared_name", 1)
        })
        .join()
        .unwrap();

        assert_eq!(here, there);
    }
}
