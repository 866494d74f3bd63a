//! Platform abstraction layer for thread processor time.
//!
//! Lets the profiler read the real processor time of the current thread (using the `cpu_time`
//! package) while tests substitute a fake with controllable values.

mod abstractions;
mod facade;
#[cfg(test)]
mod fake;
mod real;

pub(crate) use abstractions::Platform;
pub(crate) use facade::PlatformFacade;
#[cfg(test)]
pub(crate) use fake::FakePlatform;
pub(crate) use real::RealPlatform;
