//! Conversion entry points.
//!
//! [`Converter`] is the service object every boundary (HTTP handlers, the
//! CLI) shares. It owns the converter settings, the in-flight
//! [`ProcessRegistry`] and the progress callback, and exposes three
//! operations:
//!
//! * [`Converter::invoke`]: convert a Markdown file on disk;
//! * [`Converter::invoke_from_text`]: stage raw text to a temporary file,
//!   then convert it;
//! * [`Converter::cancel`]: terminate an in-flight job by key.
//!
//! ## Lifecycle of one job
//!
//! ```text
//! build argv ─▶ spawn ─▶ register ─▶ supervise (timeout / signals) ─▶ outcome
//!                 │                                                     │
//!                 └─ launch error: nothing registered        JobGuard drops: release
//! ```
//!
//! The [`JobGuard`] created right after registration removes the entry on
//! every path, including when the `invoke` future itself is dropped.

use crate::config::{ConversionParams, ConverterConfig};
use crate::error::JobFailure;
use crate::output::ConversionOutcome;
use crate::pipeline::command::ConverterCommand;
use crate::pipeline::{process, staging};
use crate::progress::{NoopProgressCallback, ProgressCallback};
use crate::registry::{JobKey, ProcessHandle, ProcessRegistry};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Markdown-to-PDF conversion service.
///
/// Cheap to clone: all state is behind `Arc`s, and clones share one
/// registry, so a job started through one clone can be cancelled through
/// another.
///
/// # Example
///
/// ```rust,no_run
/// use md2pdf::{ConversionParams, Converter, ConverterConfig};
/// use std::path::Path;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let converter = Converter::new(ConverterConfig::default());
///     let params = ConversionParams::builder().toc(true).build()?;
///     let outcome = converter
///         .invoke(Path::new("notes.md"), Path::new("notes.pdf"), &params, None)
///         .await;
///     println!("{}: {}", outcome.success, outcome.message);
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct Converter {
    config: Arc<ConverterConfig>,
    registry: Arc<ProcessRegistry>,
    progress: ProgressCallback,
}

impl fmt::Debug for Converter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Converter")
            .field("config", &self.config)
            .field("active_jobs", &self.registry.len())
            .finish_non_exhaustive()
    }
}

impl Converter {
    /// Create a converter with its own registry.
    pub fn new(config: ConverterConfig) -> Self {
        let registry = Arc::new(ProcessRegistry::new(config.grace_period));
        Self {
            config: Arc::new(config),
            registry,
            progress: Arc::new(NoopProgressCallback),
        }
    }

    /// Share an existing registry instead of the private one.
    pub fn with_registry(mut self, registry: Arc<ProcessRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = progress;
        self
    }

    pub fn config(&self) -> &ConverterConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ProcessRegistry> {
        &self.registry
    }

    /// The exact invocation [`Self::invoke`] would launch.
    pub fn command_for(&self, input: &Path, output: &Path, params: &ConversionParams) -> ConverterCommand {
        ConverterCommand::build(&self.config.pandoc_path, input, output, params)
            .with_path_prefix(self.config.extra_path_dir.as_deref())
    }

    /// Convert the Markdown file at `input` into a PDF at `output`.
    ///
    /// The job is registered under `request_id`, or under `output` when no
    /// id is given, and can be cancelled with [`Self::cancel`] until it
    /// finishes. Never panics and never returns an error: every failure is
    /// reported in the returned [`ConversionOutcome`].
    pub async fn invoke(
        &self,
        input: &Path,
        output: &Path,
        params: &ConversionParams,
        request_id: Option<&str>,
    ) -> ConversionOutcome {
        let start = Instant::now();
        let key = JobKey::for_job(request_id, output);
        let command = self.command_for(input, output, params);
        let command_line = command.command_line();
        debug!("Converter command for {}: {:?}", key, command_line);

        let job = match process::spawn(&command, key.clone()) {
            Ok(job) => job,
            Err(e) => {
                let failure = JobFailure::Launch {
                    program: command.program().display().to_string(),
                    detail: e.to_string(),
                };
                return self.fail(&key, failure, start);
            }
        };

        let handle = Arc::clone(job.handle());
        self.registry.register(key.clone(), Arc::clone(&handle));
        let _guard = JobGuard::new(&self.registry, key.clone(), Arc::clone(&handle));

        self.progress.on_job_start(&key, &command_line);
        info!(
            "Converting {} -> {} [{}]",
            input.display(),
            output.display(),
            key
        );

        let result = match job.supervise(self.config.timeout).await {
            Err(e) => Err(JobFailure::Supervision {
                detail: e.to_string(),
            }),
            Ok(done) if done.timed_out => Err(JobFailure::timed_out(self.config.timeout)),
            Ok(_) if handle.is_cancelled() => Err(JobFailure::Cancelled),
            Ok(done) if done.status.success() => Ok(()),
            Ok(done) => Err(JobFailure::Exited {
                code: done.status.code(),
                stderr: done.stderr.trim().to_string(),
            }),
        };

        match result {
            Ok(()) => {
                let duration_ms = start.elapsed().as_millis() as u64;
                info!("Converted {} in {}ms", key, duration_ms);
                self.progress.on_job_complete(&key, duration_ms);
                ConversionOutcome::succeeded(duration_ms)
            }
            Err(failure) => self.fail(&key, failure, start),
        }
    }

    /// Convert raw Markdown `text` into a PDF at `output`.
    ///
    /// The text is staged to a temporary `.md` file (with a UTF-8 BOM when
    /// the target language is Chinese, Japanese or Korean) that is deleted
    /// afterwards on every path.
    pub async fn invoke_from_text(
        &self,
        text: &str,
        output: &Path,
        request_id: Option<&str>,
        params: &ConversionParams,
    ) -> ConversionOutcome {
        let start = Instant::now();
        let encoding = staging::TextEncoding::for_cjk(params.is_cjk());
        let staged = match staging::stage_text(text, encoding, self.config.staging_dir.as_deref()) {
            Ok(file) => file,
            Err(e) => {
                let key = JobKey::for_job(request_id, output);
                let failure = JobFailure::Staging {
                    detail: e.to_string(),
                };
                return self.fail(&key, failure, start);
            }
        };

        let outcome = self.invoke(staged.path(), output, params, request_id).await;
        staging::discard(staged);
        outcome
    }

    /// Terminate the in-flight job registered under `request_id`.
    ///
    /// Returns `false` when nothing is registered under that key.
    pub async fn cancel(&self, request_id: &str) -> bool {
        self.registry.cancel(&JobKey::from(request_id)).await
    }

    fn fail(&self, key: &JobKey, failure: JobFailure, start: Instant) -> ConversionOutcome {
        if failure.is_cancelled() {
            info!("Conversion {} was cancelled", key);
        } else {
            warn!("Conversion {} failed: {}", key, failure);
        }
        self.progress.on_job_failed(key, &failure);
        ConversionOutcome::failed(failure, start.elapsed().as_millis() as u64)
    }
}

/// Removes a job's registry entry when dropped.
///
/// Releases by identity, so a guard outliving its key's reuse leaves the
/// newer entry alone.
struct JobGuard<'a> {
    registry: &'a ProcessRegistry,
    key: JobKey,
    handle: Arc<ProcessHandle>,
}

impl<'a> JobGuard<'a> {
    fn new(registry: &'a ProcessRegistry, key: JobKey, handle: Arc<ProcessHandle>) -> Self {
        Self {
            registry,
            key,
            handle,
        }
    }
}

impl Drop for JobGuard<'_> {
    fn drop(&mut self) {
        self.registry.release(&self.key, &self.handle);
    }
}
