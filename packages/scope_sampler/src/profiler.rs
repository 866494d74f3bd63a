//! The profiler context and its lifecycle.

use std::any::type_name;
use std::cell::RefCell;
use std::fmt;
use std::mem;
use std::sync::{Arc, LazyLock, OnceLock};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::pal::PlatformFacade;
use crate::{
    BackgroundSampler, Error, FingerprintMode, Reporter, Result, SamplerRegistry, ScopeGuard,
    ScopeName, ThreadProfileState, ThreadReport,
};

/// Pause between two sweeps of the sampler over all threads, unless configured otherwise.
const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_micros(100);

static GLOBAL_PROFILER: LazyLock<Profiler> = LazyLock::new(Profiler::new);

thread_local! {
    // One slot per profiler that this thread has entered a scope of.
    static THREAD_SLOTS: RefCell<Vec<ThreadSlot>> = const { RefCell::new(Vec::new()) };
}

/// Links the profile state of the current thread to the profiler it reports to.
///
/// Dropping the slot finalizes the state and delivers the report, which normally happens when
/// the thread ends and its thread-local storage is destroyed.
///
/// The slot only references the part of the profiler that threads need, so a thread that has
/// entered scopes does not keep the sampler alive.
struct ThreadSlot {
    shared: Arc<ProfilerShared>,
    state: Arc<ThreadProfileState>,
}

impl Drop for ThreadSlot {
    fn drop(&mut self) {
        let report = self.state.finalize();
        self.shared.deliver(report);
    }
}

#[derive(Debug)]
enum Lifecycle {
    Uninitialized,
    Running(BackgroundSampler),
    Stopped,
}

/// Owns the sampler. Only referenced by `Profiler` handles.
struct ProfilerInner {
    sample_interval: Duration,
    lifecycle: Mutex<Lifecycle>,
    shared: Arc<ProfilerShared>,
}

/// The part of a profiler that profiled threads keep referencing until they end.
struct ProfilerShared {
    fingerprint_mode: FingerprintMode,
    platform: PlatformFacade,
    registry: Arc<SamplerRegistry>,

    // Set when leaving the uninitialized state, which can only happen once.
    reporter: OnceLock<Box<dyn Reporter>>,
}

impl ProfilerShared {
    fn deliver(&self, report: ThreadReport) {
        if let Some(reporter) = self.reporter.get() {
            debug!(
                thread_id = ?report.thread_id(),
                total_samples = report.total_samples(),
                "delivering thread report"
            );

            reporter.handle(report);
        } else {
            debug!(
                thread_id = ?report.thread_id(),
                "discarding thread report because the profiler was never initialized"
            );
        }
    }
}

impl fmt::Debug for ProfilerShared {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("fingerprint_mode", &self.fingerprint_mode)
            .field("platform", &self.platform)
            .field("registry", &self.registry)
            .field("has_reporter", &self.reporter.get().is_some())
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for ProfilerInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("sample_interval", &self.sample_interval)
            .field("lifecycle", &*self.lifecycle.lock())
            .field("shared", &self.shared)
            .finish()
    }
}

impl Drop for ProfilerInner {
    fn drop(&mut self) {
        if let Lifecycle::Running(sampler) =
            mem::replace(self.lifecycle.get_mut(), Lifecycle::Stopped)
        {
            sampler.stop();
        }
    }
}

/// A statistical profiler that samples which scope each thread is in.
///
/// Threads mark scopes with [`scope()`][Self::scope]. Once [`init()`][Self::init] has been
/// called, a background thread periodically samples every thread that has entered a scope of
/// this profiler, attributing one sample to that thread's innermost active scope. When such a
/// thread ends, its samples are aggregated into a [`ThreadReport`] and handed to the
/// [`Reporter`] given to `init()`.
///
/// Cloning a `Profiler` gives another handle to the same profiler. Most applications use the
/// process-wide instance via the free functions [`init()`][crate::init],
/// [`scope()`][crate::scope] and [`stop()`][crate::stop] instead of creating their own.
///
/// # Lifecycle
///
/// A profiler starts uninitialized, runs after the first `init()` and stops at the first
/// `stop()` after that. Once stopped, it cannot be started again. Scopes can be entered in any
/// state; they are simply not sampled unless the profiler is running. Dropping the last handle
/// to a running profiler stops it.
///
/// # Example
///
/// ```
/// use scope_sampler::{MemoryReporter, Profiler};
///
/// let profiler = Profiler::new();
/// let reporter = MemoryReporter::new();
/// profiler.init(reporter.clone()).unwrap();
///
/// let worker = std::thread::spawn({
///     let profiler = profiler.clone();
///     move || {
///         let _outer = profiler.scope("outer");
///         {
///             let _inner = profiler.scope("inner");
///             std::hint::black_box((0..10_000).sum::<u64>());
///         }
///     }
/// });
/// worker.join().unwrap();
///
/// profiler.stop();
///
/// let reports = reporter.reports();
/// assert_eq!(reports.len(), 1);
/// assert!(reports[0].scope(&["outer", "inner"]).is_some());
/// ```
#[derive(Clone, Debug)]
pub struct Profiler {
    inner: Arc<ProfilerInner>,
}

impl Profiler {
    /// Creates a profiler with the default configuration.
    ///
    /// Use [`Profiler::builder()`] for custom configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Creates a builder for configuring a profiler.
    #[must_use]
    #[cfg_attr(test, mutants::skip)] // Gets replaced with itself by different name, bad mutation.
    pub fn builder() -> ProfilerBuilder {
        ProfilerBuilder::new()
    }

    /// Starts sampling and installs the reporter that receives thread reports.
    ///
    /// Does nothing if the profiler is already running; the reporter passed to the second call
    /// is dropped without being used.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Stopped`] if the profiler has already been stopped and
    /// [`Error::SamplerSpawn`] if the sampler thread could not be started. In the latter case
    /// the profiler remains uninitialized and `init()` may be retried.
    pub fn init(&self, reporter: impl Reporter) -> Result<()> {
        let mut lifecycle = self.inner.lifecycle.lock();

        match *lifecycle {
            Lifecycle::Running(_) => {
                debug!("profiler is already running, ignoring repeated initialization");
                Ok(())
            }
            Lifecycle::Stopped => Err(Error::Stopped),
            Lifecycle::Uninitialized => {
                let sampler = BackgroundSampler::start(
                    Arc::clone(&self.inner.shared.registry),
                    self.inner.sample_interval,
                )
                .map_err(|source| Error::SamplerSpawn { source })?;

                let reporter: Box<dyn Reporter> = Box::new(reporter);
                self.inner.shared.reporter.get_or_init(|| reporter);
                *lifecycle = Lifecycle::Running(sampler);

                debug!(
                    sample_interval = ?self.inner.sample_interval,
                    fingerprint_mode = ?self.inner.shared.fingerprint_mode,
                    "profiler started"
                );

                Ok(())
            }
        }
    }

    /// Stops sampling and waits for the sampler thread to exit.
    ///
    /// Does nothing if the profiler is not running. Threads that end after this still deliver
    /// their reports, with whatever samples were taken before the profiler stopped.
    ///
    /// # Panics
    ///
    /// Resumes the panic of the sampler thread, if it panicked.
    pub fn stop(&self) {
        let mut lifecycle = self.inner.lifecycle.lock();

        if !matches!(*lifecycle, Lifecycle::Running(_)) {
            return;
        }

        // The sampler thread never touches the lifecycle, so joining it under the lock is fine
        // and guarantees that a concurrent `stop()` does not return before the thread is gone.
        if let Lifecycle::Running(sampler) = mem::replace(&mut *lifecycle, Lifecycle::Stopped) {
            sampler.stop();
            debug!("profiler stopped");
        }
    }

    /// Whether the sampler thread is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        matches!(*self.inner.lifecycle.lock(), Lifecycle::Running(_))
    }

    /// Enters a scope with the given name on the current thread.
    ///
    /// The scope is exited when the returned guard is dropped. The first scope a thread enters
    /// creates the thread's profile state and makes the thread visible to the sampler.
    ///
    /// Static names are not copied. Dynamic names are copied once per guard and once per new
    /// node in the thread's scope tree.
    ///
    /// If called while the thread's local storage is being destroyed (e.g. from the destructor
    /// of another thread-local value), the returned guard records nothing.
    pub fn scope(&self, name: impl Into<ScopeName>) -> ScopeGuard {
        let name = name.into();

        let Ok(state) = THREAD_SLOTS.try_with(|slots| self.state_for_current_thread(slots)) else {
            trace!(%name, "thread is shutting down, scope will not be recorded");
            return ScopeGuard::detached(name);
        };

        ScopeGuard::enter(name, state)
    }

    /// Finalizes the profile of the current thread and delivers its report right away,
    /// instead of when the thread ends.
    ///
    /// This is useful for the main thread, whose thread-local storage may never be destroyed
    /// and which would therefore never report otherwise. Scopes entered after this start a new
    /// profile. Guards that are still alive keep updating the finished profile, which is no
    /// longer sampled, so call this outside of any scope of this profiler.
    ///
    /// Returns `false` if the current thread has no profile with this profiler.
    pub fn finish_current_thread(&self) -> bool {
        let slot = THREAD_SLOTS
            .try_with(|slots| {
                let mut slots = slots.borrow_mut();

                let position = slots
                    .iter()
                    .position(|slot| Arc::ptr_eq(&slot.shared, &self.inner.shared))?;

                Some(slots.swap_remove(position))
            })
            .ok()
            .flatten();

        let Some(slot) = slot else {
            return false;
        };

        // Dropped outside the borrow, so the reporter may itself enter scopes on this thread.
        drop(slot);
        true
    }

    /// Number of threads with a live profile state known to the sampler.
    #[must_use]
    pub fn live_threads(&self) -> usize {
        self.inner.shared.registry.live_count()
    }

    fn state_for_current_thread(
        &self,
        slots: &RefCell<Vec<ThreadSlot>>,
    ) -> Arc<ThreadProfileState> {
        let mut slots = slots.borrow_mut();

        if let Some(slot) = slots
            .iter()
            .find(|slot| Arc::ptr_eq(&slot.shared, &self.inner.shared))
        {
            return Arc::clone(&slot.state);
        }

        let shared = &self.inner.shared;

        let state = Arc::new(ThreadProfileState::for_current_thread(
            shared.fingerprint_mode,
            shared.platform.clone(),
        ));

        shared.registry.register(&state);
        trace!("registered profile state of new thread");

        slots.push(ThreadSlot {
            shared: Arc::clone(shared),
            state: Arc::clone(&state),
        });

        state
    }

    #[cfg(test)]
    fn sampler_thread_id(&self) -> Option<std::thread::ThreadId> {
        match &*self.inner.lifecycle.lock() {
            Lifecycle::Running(sampler) => Some(sampler.thread_id()),
            Lifecycle::Uninitialized | Lifecycle::Stopped => None,
        }
    }
}

impl Default for Profiler {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for configuring a [`Profiler`].
#[derive(Debug)]
pub struct ProfilerBuilder {
    sample_interval: Duration,
    fingerprint_mode: FingerprintMode,
    platform: PlatformFacade,
}

impl ProfilerBuilder {
    fn new() -> Self {
        Self {
            sample_interval: DEFAULT_SAMPLE_INTERVAL,
            fingerprint_mode: FingerprintMode::default(),
            platform: PlatformFacade::real(),
        }
    }

    /// Sets the pause between two sweeps of the sampler over all threads.
    ///
    /// Shorter intervals give smoother proportions at the cost of more overhead. A zero
    /// interval makes the sampler sweep continuously, only yielding the processor between
    /// sweeps, which occupies one processor for as long as the profiler runs.
    ///
    /// The interval is a lower bound on the time between samples, not a guaranteed frequency.
    ///
    /// Default is 100 microseconds.
    #[must_use]
    pub fn sample_interval(mut self, interval: Duration) -> Self {
        self.sample_interval = interval;
        self
    }

    /// Sets how scope names are combined into the fingerprint that identifies a tree node.
    ///
    /// Default is [`FingerprintMode::Reversible`].
    #[must_use]
    pub fn fingerprint_mode(mut self, mode: FingerprintMode) -> Self {
        self.fingerprint_mode = mode;
        self
    }

    #[cfg(test)]
    fn platform(mut self, platform: PlatformFacade) -> Self {
        self.platform = platform;
        self
    }

    /// Builds the profiler with the configured settings.
    ///
    /// The profiler does not sample until [`Profiler::init()`] is called.
    #[must_use]
    pub fn build(self) -> Profiler {
        Profiler {
            inner: Arc::new(ProfilerInner {
                sample_interval: self.sample_interval,
                lifecycle: Mutex::new(Lifecycle::Uninitialized),
                shared: Arc::new(ProfilerShared {
                    fingerprint_mode: self.fingerprint_mode,
                    platform: self.platform,
                    registry: Arc::new(SamplerRegistry::new()),
                    reporter: OnceLock::new(),
                }),
            }),
        }
    }
}

/// The process-wide profiler used by the free functions of this crate.
///
/// It is created with the default configuration on first use and lives until the process
/// exits. Reports of threads still running at process exit, including the main thread, are
/// only delivered if those threads call [`finish_current_thread()`] first.
#[must_use]
pub fn global() -> &'static Profiler {
    &GLOBAL_PROFILER
}

/// Starts the process-wide profiler. See [`Profiler::init()`].
///
/// # Errors
///
/// See [`Profiler::init()`].
pub fn init(reporter: impl Reporter) -> Result<()> {
    global().init(reporter)
}

/// Stops the process-wide profiler. See [`Profiler::stop()`].
pub fn stop() {
    global().stop();
}

/// Enters a scope of the process-wide profiler. See [`Profiler::scope()`].
///
/// # Example
///
/// ```
/// fn handle_request() {
///     let _scope = scope_sampler::scope("handle_request");
///     // ...
/// }
/// # handle_request();
/// ```
pub fn scope(name: impl Into<ScopeName>) -> ScopeGuard {
    global().scope(name)
}

/// Delivers the current thread's report of the process-wide profiler now.
/// See [`Profiler::finish_current_thread()`].
pub fn finish_current_thread() -> bool {
    global().finish_current_thread()
}
