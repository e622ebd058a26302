//! Error types for the md2pdf library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`Md2PdfError`]: **Rejected**: the request never reaches the converter
//!   (bad parameters, disallowed file type, missing field, unusable
//!   directory). Returned as `Err(Md2PdfError)` from builders and the
//!   boundary layer, before any process is launched.
//!
//! * [`JobFailure`]: **Terminal for one job**: the converter was (or was
//!   about to be) launched and the job ended without a PDF. Stored inside
//!   [`crate::output::ConversionOutcome`] rather than propagated, so the
//!   caller always receives a `(success, message)` pair and decides how to
//!   present it.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors raised before a conversion job exists.
#[derive(Debug, Error)]
pub enum Md2PdfError {
    // ── Validation ────────────────────────────────────────────────────────
    /// A conversion parameter failed validation.
    #[error("Invalid conversion parameters: {0}")]
    InvalidParams(String),

    /// A required request field was absent or empty. `message` is what the
    /// client is shown.
    #[error("{message}")]
    MissingField {
        field: &'static str,
        message: &'static str,
    },

    /// Upload filename has an extension outside the allow-list.
    #[error("File type not allowed: '{filename}'. Please upload .md, .txt, or .markdown files.")]
    UnsupportedFileType { filename: String },

    /// Filename was empty after sanitisation or tried to escape its directory.
    #[error("Invalid filename '{0}'")]
    InvalidFilename(String),

    // ── Files ─────────────────────────────────────────────────────────────
    /// Input file does not exist.
    #[error("Input file not found: '{path}'")]
    InputNotFound { path: PathBuf },

    /// A staging/output directory could not be created.
    #[error("Failed to prepare directory '{path}': {source}")]
    DirectoryUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Writing an uploaded file to the staging directory failed.
    #[error("Failed to store upload '{path}': {source}")]
    UploadWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Service settings could not be parsed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Why a single conversion job ended without producing a PDF.
///
/// Every variant renders into the human-readable message returned in
/// [`crate::output::ConversionOutcome::message`].
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobFailure {
    /// The converter executable could not be started.
    #[error("Failed to start converter '{program}': {detail}")]
    Launch { program: String, detail: String },

    /// The converter ran and exited unsuccessfully.
    #[error("Pandoc failed with return code {}: {stderr}", display_code(.code))]
    Exited { code: Option<i32>, stderr: String },

    /// The converter exceeded the wall-clock limit and was killed.
    #[error("Pandoc conversion timed out after {secs} seconds")]
    TimedOut { secs: u64 },

    /// The job was terminated through the cancellation protocol.
    #[error("Conversion was cancelled before it finished")]
    Cancelled,

    /// Waiting on or signalling the running converter failed.
    #[error("Unexpected error during conversion: {detail}")]
    Supervision { detail: String },

    /// Raw text could not be staged into a temporary file.
    #[error("Error in text conversion: {detail}")]
    Staging { detail: String },
}

impl JobFailure {
    /// Timeout failure for a wall-clock `limit`, in whole seconds rounded up
    /// so a sub-second limit never reads as zero.
    pub fn timed_out(limit: Duration) -> Self {
        let secs = limit.as_secs() + u64::from(limit.subsec_nanos() > 0);
        JobFailure::TimedOut { secs }
    }

    /// True for the caller-initiated termination path.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, JobFailure::Cancelled)
    }

    /// True when the converter was killed for exceeding its time limit.
    pub fn is_timeout(&self) -> bool {
        matches!(self, JobFailure::TimedOut { .. })
    }
}

fn display_code(code: &Option<i32>) -> String {
    match code {
        Some(c) => c.to_string(),
        None => "none (terminated by signal)".to_string(),
    }
}
