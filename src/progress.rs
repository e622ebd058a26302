//! Progress-callback trait for per-job conversion events.
//!
//! Inject an [`Arc<dyn JobProgressCallback>`] via
//! [`crate::convert::Converter::with_progress`] to observe each job as it
//! launches, completes or fails.
//!
//! # Why callbacks instead of channels?
//!
//! Callers can forward events to a terminal spinner, a log line or a metrics
//! counter without the library knowing how the host application reports
//! progress. The trait is `Send + Sync` because jobs run concurrently on the
//! Tokio runtime.
//!
//! # Example
//!
//! ```rust
//! use md2pdf::{JobFailure, JobKey, JobProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct FailureCounter {
//!     failed: AtomicUsize,
//! }
//!
//! impl JobProgressCallback for FailureCounter {
//!     fn on_job_failed(&self, key: &JobKey, failure: &JobFailure) {
//!         self.failed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{key}: {failure}");
//!     }
//! }
//!
//! let counter: Arc<dyn JobProgressCallback> = Arc::new(FailureCounter {
//!     failed: AtomicUsize::new(0),
//! });
//! # let _ = counter;
//! ```

use std::sync::Arc;

use crate::error::JobFailure;
use crate::registry::JobKey;

/// Called by [`crate::convert::Converter`] around each converter process.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Events for different jobs may arrive concurrently.
pub trait JobProgressCallback: Send + Sync {
    /// Called right after the converter process was spawned.
    ///
    /// # Arguments
    /// * `key`: job key the process is registered under
    /// * `command_line`: the full argument vector, program first
    fn on_job_start(&self, key: &JobKey, command_line: &[String]) {
        let _ = (key, command_line);
    }

    /// Called when the converter exited with status zero.
    fn on_job_complete(&self, key: &JobKey, duration_ms: u64) {
        let _ = (key, duration_ms);
    }

    /// Called for every other terminal state, including launch failure,
    /// timeout and cancellation.
    fn on_job_failed(&self, key: &JobKey, failure: &JobFailure) {
        let _ = (key, failure);
    }
}

/// A no-op implementation for callers that don't need progress events.
///
/// This is the default when no callback is configured.
pub struct NoopProgressCallback;

impl JobProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::convert::Converter`].
pub type ProgressCallback = Arc<dyn JobProgressCallback>;
