#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Statistical in-process profiler that samples which named scope each thread is executing.
//!
//! Code marks regions of interest with scope guards. A background sampler thread periodically
//! looks at every participating thread and attributes one sample to the innermost scope that
//! thread is in at that moment. When a thread ends, its samples are aggregated into a tree of
//! scopes, where each scope carries its share of all samples taken on that thread, and the
//! resulting [`ThreadReport`] is handed to a [`Reporter`].
//!
//! The core types are:
//! - [`Profiler`] - Owns the sampler thread and the reporter; hands out scope guards.
//! - [`ScopeGuard`] - Marks the current thread as being inside a named scope while it lives.
//! - [`ThreadReport`] and [`ScopeReport`] - The aggregated profile of one thread.
//! - [`Reporter`] - Receives thread reports; see [`ConsoleReporter`] and [`MemoryReporter`].
//!
//! # Simple usage
//!
//! Most applications use the process-wide profiler via the free functions:
//!
//! ```
//! use scope_sampler::ConsoleReporter;
//!
//! fn load_config() {
//!     let _scope = scope_sampler::scope("load_config");
//!     // ...
//! }
//!
//! fn handle_requests() {
//!     let _scope = scope_sampler::scope("handle_requests");
//!     // ...
//! }
//!
//! scope_sampler::init(ConsoleReporter::stdout()).unwrap();
//!
//! std::thread::spawn(|| {
//!     let _scope = scope_sampler::scope("worker");
//!     load_config();
//!     handle_requests();
//! })
//! .join()
//! .unwrap();
//!
//! scope_sampler::stop();
//! ```
//!
//! When the worker thread ends, the console receives something like:
//!
//! ```text
//! thread ThreadId(2): 7341 samples, 734.112ms processor time
//!   worker: 100.0% (7341 samples)
//!     load_config: 12.4% (910 samples)
//!     handle_requests: 87.6% (6431 samples)
//! ```
//!
//! # Reading the results
//!
//! Percentages are the share of all samples taken on the thread while it was inside a scope,
//! including time spent in nested scopes. Samples taken while the thread was outside of any
//! scope count toward the total but belong to no scope.
//!
//! Sampling is statistical. Short scopes may receive no samples at all, and the proportions
//! only become meaningful once a thread has accumulated many samples.
//!
//! # Scope identity
//!
//! A scope is identified by the set of scope names active around it, combined into a
//! fingerprint. With the default [`FingerprintMode::Reversible`], the fingerprint ignores
//! nesting depth, so a scope that directly nests another scope with the same name is
//! indistinguishable from having left both. Use [`FingerprintMode::DepthAware`] via
//! [`Profiler::builder()`] to profile recursive code.
//!
//! # Threading
//!
//! Scope guards are bound to the thread that created them. Each thread has its own scope
//! tree, which is reported when the thread ends. Threads that never end before the process
//! exits, such as the main thread, must call [`finish_current_thread()`] to have their report
//! delivered.

mod error;
mod fingerprint;
mod guard;
mod pal;
mod profiler;
mod registry;
mod report;
mod reporter;
mod sampler;
mod scope_tree;
mod thread_state;

pub use error::*;
pub use fingerprint::FingerprintMode;
pub(crate) use fingerprint::{ScopeFingerprint, ScopeHash};
pub use guard::*;
pub use profiler::*;
pub(crate) use registry::*;
pub use report::*;
pub use reporter::*;
pub(crate) use sampler::*;
pub(crate) use scope_tree::*;
pub(crate) use thread_state::*;
