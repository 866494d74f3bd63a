//! Finalized per-thread profiling results.

use std::fmt::{self, Display};
use std::thread::ThreadId;
use std::time::Duration;

/// The profile of a single thread, produced once when the thread stops being profiled.
///
/// For human-readable output, use the `Display` trait implementation, which renders the scope
/// tree with one indented line per scope. For machine-readable output, walk the tree via
/// [`scopes()`][Self::scopes].
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
/// std::thread::spawn({
///     let profiler = profiler.clone();
///     move || {
///         let _outer = profiler.scope("outer");
///         std::hint::black_box(42);
///     }
/// })
/// .join()
/// .unwrap();
///
/// profiler.stop();
///
/// for report in reporter.reports() {
///     println!("{report}");
///
///     for scope in report.scopes() {
///         println!("{}: {:.1}%", scope.name(), scope.proportion() * 100.0);
///     }
/// }
/// ```
#[derive(Clone, Debug)]
pub struct ThreadReport {
    thread_id: ThreadId,
    thread_name: Option<String>,
    total_samples: u64,
    processor_time: Duration,

    // In order of first entry.
    scopes: Box<[ScopeReport]>,
}

impl ThreadReport {
    pub(crate) fn new(
        thread_id: ThreadId,
        thread_name: Option<String>,
        total_samples: u64,
        processor_time: Duration,
        scopes: Box<[ScopeReport]>,
    ) -> Self {
        Self {
            thread_id,
            thread_name,
            total_samples,
            processor_time,
            scopes,
        }
    }

    /// The identifier of the profiled thread.
    #[must_use]
    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    /// The name of the profiled thread, if it had one.
    #[must_use]
    pub fn thread_name(&self) -> Option<&str> {
        self.thread_name.as_deref()
    }

    /// How many samples were taken of this thread, whether or not it was inside a scope.
    ///
    /// This is the denominator of every [`ScopeReport::proportion()`] in the report.
    #[must_use]
    pub fn total_samples(&self) -> u64 {
        self.total_samples
    }

    /// Processor time consumed by the thread while it was being profiled.
    #[must_use]
    pub fn processor_time(&self) -> Duration {
        self.processor_time
    }

    /// Number of samples that landed while the thread was not inside any scope.
    #[must_use]
    pub fn unscoped_samples(&self) -> u64 {
        let scoped = self
            .scopes
            .iter()
            .map(ScopeReport::samples)
            .fold(0_u64, u64::saturating_add);

        self.total_samples.saturating_sub(scoped)
    }

    /// The top-level scopes entered by the thread, in order of first entry.
    pub fn scopes(&self) -> impl Iterator<Item = &ScopeReport> {
        self.scopes.iter()
    }

    /// Finds a scope by the names along its path from the top level.
    ///
    /// Returns `None` if the path is empty or no such scope was observed.
    ///
    /// # Example
    ///
    /// ```
    /// # use scope_sampler::ThreadReport;
    /// # fn inspect(report: &ThreadReport) {
    /// if let Some(inner) = report.scope(&["outer", "inner"]) {
    ///     println!("inner took {:.1}% of samples", inner.proportion() * 100.0);
    /// }
    /// # }
    /// ```
    #[must_use]
    pub fn scope(&self, path: &[&str]) -> Option<&ScopeReport> {
        let (first, rest) = path.split_first()?;

        let mut current = self.scopes.iter().find(|scope| scope.name() == *first)?;

        for name in rest {
            current = current.child(name)?;
        }

        Some(current)
    }

    /// Whether no samples at all were taken of this thread.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total_samples == 0
    }

    #[cfg(test)]
    pub(crate) fn fake(total_samples: u64, scopes: Vec<ScopeReport>) -> Self {
        Self::new(
            std::thread::current().id(),
            Some("fake".to_string()),
            total_samples,
            Duration::ZERO,
            scopes.into_boxed_slice(),
        )
    }
}

impl Display for ThreadReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "thread {:?}", self.thread_id)?;

        if let Some(name) = &self.thread_name {
            write!(f, " '{name}'")?;
        }

        writeln!(
            f,
            ": {} samples, {:?} processor time",
            self.total_samples, self.processor_time
        )?;

        for scope in &self.scopes {
            scope.fmt_subtree(f, 1)?;
        }

        Ok(())
    }
}

/// One node of the scope tree in a [`ThreadReport`].
///
/// Sample counts are cumulative: a scope's samples include the samples of all scopes nested
/// within it.
#[derive(Clone, Debug)]
pub struct ScopeReport {
    name: String,
    own_samples: u64,
    samples: u64,
    proportion: f64,
    processor_time: Duration,

    // In order of first entry.
    children: Box<[ScopeReport]>,
}

impl ScopeReport {
    pub(crate) fn new(
        name: String,
        own_samples: u64,
        samples: u64,
        total_samples: u64,
        thread_processor_time: Duration,
        children: Box<[Self]>,
    ) -> Self {
        let proportion = proportion(samples, total_samples);

        Self {
            name,
            own_samples,
            samples,
            proportion,
            processor_time: thread_processor_time.mul_f64(proportion),
            children,
        }
    }

    /// The name the scope was entered with.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Samples taken while this scope or any scope nested in it was active.
    #[must_use]
    pub fn samples(&self) -> u64 {
        self.samples
    }

    /// Samples taken while this scope was the innermost active scope.
    #[must_use]
    pub fn own_samples(&self) -> u64 {
        self.own_samples
    }

    /// The fraction of the thread's samples attributed to this scope, in `[0, 1]`.
    ///
    /// Zero if no samples were taken of the thread at all.
    #[must_use]
    pub fn proportion(&self) -> f64 {
        self.proportion
    }

    /// Estimate of the processor time spent in this scope.
    ///
    /// This is the thread's processor time scaled by [`proportion()`][Self::proportion], so it is
    /// only as accurate as the sampling that produced the proportion.
    #[must_use]
    pub fn processor_time(&self) -> Duration {
        self.processor_time
    }

    /// The scopes entered directly within this scope, in order of first entry.
    pub fn children(&self) -> impl Iterator<Item = &Self> {
        self.children.iter()
    }

    /// The direct child scope with the given name, if one was observed.
    #[must_use]
    pub fn child(&self, name: &str) -> Option<&Self> {
        self.children.iter().find(|child| child.name == name)
    }

    #[cfg(test)]
    pub(crate) fn fake(
        name: &str,
        own_samples: u64,
        total_samples: u64,
        children: Vec<Self>,
    ) -> Self {
        let samples = children
            .iter()
            .map(Self::samples)
            .fold(own_samples, u64::saturating_add);

        Self::new(
            name.to_string(),
            own_samples,
            samples,
            total_samples,
            Duration::ZERO,
            children.into_boxed_slice(),
        )
    }

    fn fmt_subtree(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        writeln!(
            f,
            "{:indent$}{}: {:.1}% ({} samples)",
            "",
            self.name,
            self.proportion * 100.0,
            self.samples,
            indent = depth.saturating_mul(2),
        )?;

        for child in &self.children {
            child.fmt_subtree(f, depth.saturating_add(1))?;
        }

        Ok(())
    }
}

impl Display for ScopeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_subtree(f, 0)
    }
}

/// `part / total`, defined as zero when there is no total.
#[must_use]
fn proportion(part: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }

    #[expect(
        clippy::cast_precision_loss,
        reason = "sample counts large enough to lose precision are unrealistic and the result is an estimate anyway"
    )]
    let ratio = part as f64 / total as f64;

    ratio.clamp(0.0, 1.0)
}
