//! Result type returned by every conversion entry point.

use crate::error::JobFailure;
use serde::{Deserialize, Serialize};

/// Message carried by every successful outcome.
pub const SUCCESS_MESSAGE: &str = "Conversion successful";

/// What happened to one conversion job.
///
/// The core never raises: launch errors, non-zero exits, timeouts and
/// cancellations all arrive here with `success == false`, a human-readable
/// `message` and the structured `failure`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionOutcome {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<JobFailure>,
    /// Wall-clock time from invocation to outcome.
    pub duration_ms: u64,
}

impl ConversionOutcome {
    pub fn succeeded(duration_ms: u64) -> Self {
        Self {
            success: true,
            message: SUCCESS_MESSAGE.to_string(),
            failure: None,
            duration_ms,
        }
    }

    pub fn failed(failure: JobFailure, duration_ms: u64) -> Self {
        Self {
            success: false,
            message: failure.to_string(),
            failure: Some(failure),
            duration_ms,
        }
    }

    /// True when the job ended through the cancellation protocol.
    pub fn is_cancelled(&self) -> bool {
        self.failure.as_ref().is_some_and(JobFailure::is_cancelled)
    }

    pub fn is_timeout(&self) -> bool {
        self.failure.as_ref().is_some_and(JobFailure::is_timeout)
    }

    /// Convert into a `Result` for `?`-style callers.
    pub fn into_result(self) -> Result<Self, JobFailure> {
        match self.failure.clone() {
            Some(failure) => Err(failure),
            None => Ok(self),
        }
    }
}
