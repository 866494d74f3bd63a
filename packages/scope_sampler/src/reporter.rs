//! Receivers of finalized thread reports.

use std::fmt;
use std::io::{self, Write};
use std::mem;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::ThreadReport;

/// Receives the report of each profiled thread when that thread stops being profiled.
///
/// `handle()` is called once per thread, on the thread that is ending, so different threads may
/// call it concurrently. Implementations that write to a shared sink must serialize access
/// themselves.
///
/// Any `Fn(ThreadReport)` closure that is `Send + Sync` is also a reporter.
///
/// # Example
///
/// ```
/// use scope_sampler::{Profiler, ThreadReport};
///
/// let profiler = Profiler::new();
/// profiler
///     .init(|report: ThreadReport| {
///         println!("{} samples on {:?}", report.total_samples(), report.thread_id());
///     })
///     .unwrap();
/// # profiler.stop();
/// ```
pub trait Reporter: Send + Sync + 'static {
    /// Consumes the finalized report of one thread.
    fn handle(&self, report: ThreadReport);
}

impl<F> Reporter for F
where
    F: Fn(ThreadReport) + Send + Sync + 'static,
{
    fn handle(&self, report: ThreadReport) {
        self(report);
    }
}

/// Writes the human-readable form of each report to an output stream.
///
/// Reports from different threads are never interleaved with each other.
///
/// # Example
///
/// ```
/// use scope_sampler::{ConsoleReporter, Profiler};
///
/// let profiler = Profiler::new();
/// profiler.init(ConsoleReporter::stdout()).unwrap();
/// # profiler.stop();
/// ```
pub struct ConsoleReporter<W> {
    out: Mutex<W>,
}

impl ConsoleReporter<io::Stdout> {
    /// Creates a reporter that writes to the standard output stream.
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W> ConsoleReporter<W>
where
    W: Write + Send + 'static,
{
    /// Creates a reporter that writes to the given output stream.
    #[must_use]
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    /// Returns the output stream, consuming the reporter.
    #[must_use]
    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }
}

impl<W> Reporter for ConsoleReporter<W>
where
    W: Write + Send + 'static,
{
    fn handle(&self, report: ThreadReport) {
        let mut out = self.out.lock();

        // There is no caller to return the error to and panicking in a thread-local destructor
        // aborts the process, so the report is lost.
        if let Err(error) = write!(out, "{report}").and_then(|()| out.flush()) {
            debug!(
                thread_id = ?report.thread_id(),
                %error,
                "discarding thread report because it could not be written"
            );
        }
    }
}

impl<W> fmt::Debug for ConsoleReporter<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsoleReporter").finish_non_exhaustive()
    }
}

/// Collects reports in memory, for inspection by tests or by custom exporters.
///
/// Clones share the same collection, so you can keep one clone and give another to the
/// profiler.
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
///         let _scope = profiler.scope("work");
///     }
/// })
/// .join()
/// .unwrap();
///
/// profiler.stop();
///
/// assert_eq!(reporter.len(), 1);
/// ```
#[derive(Clone, Debug, Default)]
pub struct MemoryReporter {
    reports: Arc<Mutex<Vec<ThreadReport>>>,
}

impl MemoryReporter {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of all reports received so far, in order of arrival.
    #[must_use]
    pub fn reports(&self) -> Vec<ThreadReport> {
        self.reports.lock().clone()
    }

    /// Removes and returns all reports received so far.
    #[must_use]
    pub fn take(&self) -> Vec<ThreadReport> {
        mem::take(&mut *self.reports.lock())
    }

    /// Number of reports received so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.reports.lock().len()
    }

    /// Whether no reports have been received yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.reports.lock().is_empty()
    }
}

impl Reporter for MemoryReporter {
    fn handle(&self, report: ThreadReport) {
        self.reports.lock().push(report);
    }
}
