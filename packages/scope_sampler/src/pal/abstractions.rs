//! Platform abstraction trait definitions.

use std::fmt::Debug;
use std::time::Duration;

/// Provides the processor time consumed by threads.
pub(crate) trait Platform: Debug + Send + Sync + 'static {
    /// Processor time consumed so far by the calling thread.
    fn thread_time(&self) -> Duration;
}
