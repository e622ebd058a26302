//! # md2pdf
//!
//! Convert Markdown documents to PDF through pandoc and a LaTeX engine, with
//! the process lifecycle handled for you.
//!
//! ## Why this crate?
//!
//! Calling `pandoc in.md -o out.pdf` from a web handler looks trivial until
//! a LaTeX run hangs, a user closes the tab, or a cancelled request leaves an
//! orphaned `xelatex` behind. This crate wraps the converter invocation with
//! a registry of in-flight jobs, per-job cancellation, a wall-clock timeout
//! and scoped cleanup, so that no process or temporary file outlives its job
//! on any path.
//!
//! ## Pipeline Overview
//!
//! ```text
//! Markdown (file or text)
//!  │
//!  ├─ 1. Stage     raw text → temp .md (UTF-8 BOM for zh/ja/ko)
//!  ├─ 2. Command   ConversionParams → exact pandoc argv
//!  ├─ 3. Spawn     own process group, stdout/stderr drained
//!  ├─ 4. Register  JobKey → ProcessHandle (cancellable from elsewhere)
//!  ├─ 5. Supervise timeout kill, SIGTERM/SIGKILL on cancel, reap
//!  └─ 6. Outcome   success/message + structured JobFailure
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use md2pdf::{ConversionParams, Converter, ConverterConfig};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let converter = Converter::new(ConverterConfig::default());
//!     let params = ConversionParams::builder().language("ja").build()?;
//!     let outcome = converter
//!         .invoke_from_text("# こんにちは", Path::new("hello.pdf"), Some("job-1"), &params)
//!         .await;
//!     if !outcome.success {
//!         eprintln!("{}", outcome.message);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! From another task, `converter.cancel("job-1").await` terminates the job;
//! the invoking side then reports [`JobFailure::Cancelled`].
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `server` | on      | axum HTTP service ([`server`]) |
//! | `cli`    | on      | Enables the `md2pdf` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable both when using only the library:
//! ```toml
//! md2pdf = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod presets;
pub mod progress;
pub mod registry;
pub mod settings;

#[cfg(feature = "server")]
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ConversionParams, ConversionParamsBuilder, ConverterConfig, ConverterConfigBuilder};
pub use convert::Converter;
pub use error::{JobFailure, Md2PdfError};
pub use output::ConversionOutcome;
pub use progress::{JobProgressCallback, NoopProgressCallback, ProgressCallback};
pub use registry::{JobKey, ProcessHandle, ProcessRegistry};
pub use settings::ServiceSettings;
