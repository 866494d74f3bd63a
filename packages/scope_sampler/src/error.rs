use std::io;

use thiserror::Error;

/// Errors that can occur when controlling the lifecycle of a [`Profiler`][crate::Profiler].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The operating system refused to start the background sampler thread.
    #[error("failed to start the background sampler thread: {source}")]
    SamplerSpawn {
        /// The error reported when spawning the thread.
        #[source]
        source: io::Error,
    },

    /// The profiler has already been stopped. A stopped profiler cannot be started again.
    #[error("the profiler has been stopped and cannot be started again")]
    Stopped,
}

/// A specialized `Result` type for profiler lifecycle operations, returning the crate's
/// [`Error`] type as the error value.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::error::Error as _;
    use std::fmt::Debug;

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(Error: Send, Sync, Debug);

    #[test]
    fn spawn_error_exposes_source() {
        let error = Error::SamplerSpawn {
            source: io::Error::other("out of threads"),
        };

        assert!(error.to_string().contains("out of threads"));
        assert!(error.source().is_some());
    }

    #[test]
    fn stopped_error_has_no_source() {
        assert!(Error::Stopped.source().is_none());
    }
}
