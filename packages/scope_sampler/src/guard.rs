use std::borrow::Cow;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::ThreadProfileState;

/// The name of a scope.
///
/// Static names are used as-is, dynamic names are owned by the guard.
pub type ScopeName = Cow<'static, str>;

/// Marks the current thread as being inside a named scope for as long as the guard lives.
///
/// Created by [`Profiler::scope()`][crate::Profiler::scope] or the free function
/// [`scope()`][crate::scope]. The scope is entered when the guard is created and exited when it
/// is dropped, including when the thread unwinds from a panic. Guards on one thread must be
/// dropped in the reverse order of creation, which lexical scoping gives you for free.
///
/// The guard keeps its own copy of the scope name, unless the name is `'static`.
///
/// # Example
///
/// ```
/// use scope_sampler::Profiler;
///
/// let profiler = Profiler::new();
///
/// fn parse(profiler: &Profiler) {
///     let _scope = profiler.scope("parse");
///     // Samples taken here are attributed to "parse".
/// }
///
/// let _scope = profiler.scope("main_loop");
/// parse(&profiler);
/// ```
#[derive(Debug)]
#[must_use = "the scope is exited as soon as the guard is dropped"]
pub struct ScopeGuard {
    name: ScopeName,

    // None if the thread could not be profiled (thread-local storage already torn down).
    state: Option<Arc<ThreadProfileState>>,

    _single_threaded: PhantomData<*const ()>,
}

impl ScopeGuard {
    pub(crate) fn enter(name: ScopeName, state: Arc<ThreadProfileState>) -> Self {
        state.enter(&name);

        Self {
            name,
            state: Some(state),
            _single_threaded: PhantomData,
        }
    }

    /// A guard that records nothing.
    pub(crate) fn detached(name: ScopeName) -> Self {
        Self {
            name,
            state: None,
            _single_threaded: PhantomData,
        }
    }

    /// The name of the scope this guard marks.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the scope is being recorded.
    ///
    /// This is false only for guards created while the thread was already shutting down.
    #[must_use]
    pub fn is_recording(&self) -> bool {
        self.state.is_some()
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        if let Some(state) = &self.state {
            state.exit(&self.name);
        }
    }
}
