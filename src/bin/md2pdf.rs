//! CLI binary for md2pdf.
//!
//! Two subcommands over the library crate:
//! * `serve`:   run the HTTP service until Ctrl-C / SIGTERM;
//! * `convert`: one-shot conversion of a file or stdin, with a spinner.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use md2pdf::server::{self, AppState};
use md2pdf::settings::usable_bin_dir;
use md2pdf::{
    presets, ConversionOutcome, ConversionParams, Converter, ConverterConfig, JobFailure, JobKey,
    JobProgressCallback, ProgressCallback, ServiceSettings,
};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal spinner that follows one conversion job.
struct CliProgressCallback {
    bar: ProgressBar,
    verbose: bool,
}

impl CliProgressCallback {
    fn new(verbose: bool) -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.set_message("staging input…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar, verbose })
    }
}

impl JobProgressCallback for CliProgressCallback {
    fn on_job_start(&self, key: &JobKey, command_line: &[String]) {
        if self.verbose {
            self.bar.println(dim(&command_line.join(" ")));
        }
        self.bar.set_prefix("Converting");
        self.bar.set_message(format!("job {key}"));
    }

    fn on_job_complete(&self, _key: &JobKey, duration_ms: u64) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} converted in {}",
            green("✔"),
            bold(&format!("{:.1}s", duration_ms as f64 / 1000.0))
        );
    }

    fn on_job_failed(&self, _key: &JobKey, failure: &JobFailure) {
        self.bar.finish_and_clear();
        let mark = if failure.is_cancelled() { "⚠" } else { "✘" };
        eprintln!("{} {}", red(mark), red(&failure.to_string()));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Run the web service on the default port (1204)
  md2pdf serve

  # Convert a file with the academic preset
  md2pdf convert paper.md -o paper.pdf --preset academic

  # Convert Chinese text from stdin
  cat notes.md | md2pdf convert - -o notes.pdf --language zh --cjk-main-font SimSun

  # Numbered sections and a table of contents
  md2pdf convert book.md -o book.pdf -N --toc --document-class book

PRESETS:
  academic, simple, book, chinese, japanese, korean

ENVIRONMENT VARIABLES:
  PANDOC_PATH            pandoc executable (default: pandoc on PATH)
  MIKTEX_BIN_DIR         directory prepended to the converter's PATH
  MD2PDF_BIND            listen address for `serve` (default 0.0.0.0:1204)
  MD2PDF_UPLOAD_DIR      upload staging directory
  MD2PDF_OUTPUT_DIR      generated PDF directory
  MD2PDF_TIMEOUT_SECS    per-job wall-clock limit (default 60)
  MD2PDF_GRACE_SECS      wait between SIGTERM and SIGKILL on cancel (default 5)
  RUST_LOG               tracing filter, overrides -v / -q
"#;

/// Convert Markdown to PDF through pandoc.
#[derive(Parser, Debug)]
#[command(
    name = "md2pdf",
    version,
    about = "Convert Markdown to PDF through pandoc and LaTeX",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// pandoc executable.
    #[arg(long, global = true, env = "PANDOC_PATH")]
    pandoc_path: Option<PathBuf>,

    /// Per-job wall-clock limit in seconds.
    #[arg(long, global = true, env = "MD2PDF_TIMEOUT_SECS")]
    timeout_secs: Option<u64>,

    /// Seconds between SIGTERM and SIGKILL when cancelling.
    #[arg(long, global = true, env = "MD2PDF_GRACE_SECS")]
    grace_secs: Option<u64>,

    /// Directory prepended to the converter's PATH (e.g. MiKTeX bin).
    #[arg(long, global = true, env = "MIKTEX_BIN_DIR")]
    miktex_bin_dir: Option<PathBuf>,

    /// Upload staging directory.
    #[arg(long, global = true, env = "MD2PDF_UPLOAD_DIR")]
    upload_dir: Option<PathBuf>,

    /// Directory generated PDFs are written to and served from.
    #[arg(long, global = true, env = "MD2PDF_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "MD2PDF_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "MD2PDF_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP service.
    Serve(ServeArgs),
    /// Convert one Markdown file (or `-` for stdin).
    Convert(ConvertArgs),
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Listen address.
    #[arg(long, env = "MD2PDF_BIND", default_value = "0.0.0.0:1204")]
    bind: std::net::SocketAddr,
}

#[derive(Args, Debug)]
struct ConvertArgs {
    /// Markdown file, or `-` to read from stdin.
    input: String,

    /// Destination PDF.
    #[arg(short, long)]
    output: PathBuf,

    /// Start from a named preset; explicit flags override it.
    #[arg(long, value_parser = ["academic", "simple", "book", "chinese", "japanese", "korean"])]
    preset: Option<String>,

    /// LaTeX engine passed to --pdf-engine.
    #[arg(long)]
    engine: Option<String>,

    #[arg(long)]
    document_class: Option<String>,

    /// Page geometry, e.g. `a4paper,margin=2cm`.
    #[arg(long)]
    geometry: Option<String>,

    #[arg(long)]
    font_size: Option<String>,

    #[arg(long)]
    main_font: Option<String>,

    #[arg(long)]
    line_stretch: Option<String>,

    /// Plain (uncoloured) hyperlinks.
    #[arg(long)]
    no_colorlinks: bool,

    /// Number sections.
    #[arg(short = 'N', long)]
    number_sections: bool,

    /// Include a table of contents.
    #[arg(long)]
    toc: bool,

    /// Document language code (zh, ja, ko, en, …).
    #[arg(long)]
    language: Option<String>,

    #[arg(long)]
    cjk_main_font: Option<String>,

    #[arg(long)]
    cjk_sans_font: Option<String>,

    #[arg(long)]
    cjk_mono_font: Option<String>,

    /// Read input as markdown+east_asian_line_breaks (default: on for stdin).
    #[arg(long)]
    east_asian_line_breaks: Option<bool>,

    /// Job key shown in logs.
    #[arg(long)]
    request_id: Option<String>,

    /// Print the outcome as JSON on stdout.
    #[arg(long)]
    json: bool,

    /// Disable the spinner.
    #[arg(long, env = "MD2PDF_NO_PROGRESS")]
    no_progress: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner is the feedback for `convert`; keep library INFO logs out
    // of its way unless asked for.
    let spinner = matches!(&cli.command, Command::Convert(args) if !args.no_progress && !args.json);
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || spinner {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let settings = build_settings(&cli)?;

    match cli.command {
        Command::Serve(ref args) => {
            let settings = ServiceSettings {
                bind: args.bind,
                ..settings
            };
            info!("Starting md2pdf v{}", env!("CARGO_PKG_VERSION"));
            server::serve(AppState::new(settings), shutdown_signal())
                .await
                .context("Server failed")?;
        }
        Command::Convert(ref args) => {
            let progress: Option<ProgressCallback> = if spinner && !cli.quiet {
                Some(CliProgressCallback::new(cli.verbose) as Arc<dyn JobProgressCallback>)
            } else {
                None
            };
            let outcome = run_convert(args, settings.converter, progress).await?;

            if args.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&outcome).context("Failed to serialise outcome")?
                );
            } else if !cli.quiet && !spinner {
                eprintln!("{} ({}ms)", outcome.message, outcome.duration_ms);
            }
            if !outcome.success {
                anyhow::bail!("Conversion failed: {}", outcome.message);
            }
            if !cli.quiet && !args.json {
                eprintln!("   {}", bold(&args.output.display().to_string()));
            }
        }
    }
    Ok(())
}

/// Environment defaults overlaid with explicit flags.
fn build_settings(cli: &Cli) -> Result<ServiceSettings> {
    let mut settings = ServiceSettings::from_env().context("Invalid environment configuration")?;
    if let Some(ref dir) = cli.upload_dir {
        settings.upload_dir = dir.clone();
    }
    if let Some(ref dir) = cli.output_dir {
        settings.output_dir = dir.clone();
    }

    let base = &settings.converter;
    let mut converter = ConverterConfig::builder()
        .pandoc_path(cli.pandoc_path.clone().unwrap_or_else(|| base.pandoc_path.clone()))
        .timeout(cli.timeout_secs.map(Duration::from_secs).unwrap_or(base.timeout))
        .grace_period(cli.grace_secs.map(Duration::from_secs).unwrap_or(base.grace_period));
    let extra = match cli.miktex_bin_dir {
        Some(ref dir) => usable_bin_dir(dir),
        None => base.extra_path_dir.clone(),
    };
    if let Some(dir) = extra {
        converter = converter.extra_path_dir(dir);
    }
    settings.converter = converter.build().context("Invalid converter configuration")?;
    Ok(settings)
}

/// Map `convert` flags to `ConversionParams`, on top of the preset if any.
fn build_params(args: &ConvertArgs, from_stdin: bool) -> Result<ConversionParams> {
    let preset = args.preset.as_deref().and_then(presets::get);
    let mut b = match preset {
        Some(p) => p.builder(),
        None => ConversionParams::builder().east_asian_line_breaks(from_stdin),
    };

    if let Some(ref v) = args.engine {
        b = b.engine(v);
    }
    if let Some(ref v) = args.document_class {
        b = b.document_class(v);
    }
    if let Some(ref v) = args.geometry {
        b = b.geometry(v);
    }
    if let Some(ref v) = args.font_size {
        b = b.font_size(v);
    }
    if let Some(ref v) = args.main_font {
        b = b.main_font(v);
    }
    if let Some(ref v) = args.line_stretch {
        b = b.line_stretch(v);
    }
    if args.no_colorlinks {
        b = b.color_links(false);
    }
    if args.number_sections {
        b = b.number_sections(true);
    }
    if args.toc {
        b = b.toc(true);
    }
    if let Some(ref v) = args.language {
        b = b.language(v);
    }
    if let Some(ref v) = args.cjk_main_font {
        b = b.cjk_main_font(v);
    }
    if let Some(ref v) = args.cjk_sans_font {
        b = b.cjk_sans_font(v);
    }
    if let Some(ref v) = args.cjk_mono_font {
        b = b.cjk_mono_font(v);
    }
    if let Some(v) = args.east_asian_line_breaks {
        b = b.east_asian_line_breaks(v);
    }
    b.build().context("Invalid conversion options")
}

/// Run one conversion on its own task; Ctrl-C cancels it through the
/// registry and the task then reports the cancellation.
async fn run_convert(
    args: &ConvertArgs,
    config: ConverterConfig,
    progress: Option<ProgressCallback>,
) -> Result<ConversionOutcome> {
    let from_stdin = args.input == "-";
    let params = build_params(args, from_stdin)?;
    let request_id = args
        .request_id
        .clone()
        .unwrap_or_else(|| format!("cli-{}", std::process::id()));

    let mut converter = Converter::new(config);
    if let Some(cb) = progress {
        converter = converter.with_progress(cb);
    }
    let registry = Arc::clone(converter.registry());
    let output = args.output.clone();

    let mut job = if from_stdin {
        let mut text = String::new();
        tokio::io::stdin()
            .read_to_string(&mut text)
            .await
            .context("Failed to read Markdown from stdin")?;
        tokio::spawn(async move {
            converter
                .invoke_from_text(&text, &output, Some(request_id.as_str()), &params)
                .await
        })
    } else {
        let input = PathBuf::from(&args.input);
        ensure_input(&input)?;
        tokio::spawn(async move {
            converter
                .invoke(&input, &output, &params, Some(request_id.as_str()))
                .await
        })
    };

    let outcome = tokio::select! {
        joined = &mut job => joined,
        _ = signal::ctrl_c() => {
            warn!("Interrupted; cancelling conversion");
            registry.cancel_all().await;
            job.await
        }
    };
    outcome.context("Conversion task panicked")
}

fn ensure_input(input: &Path) -> Result<()> {
    if !input.is_file() {
        return Err(md2pdf::Md2PdfError::InputNotFound {
            path: input.to_path_buf(),
        })
        .context("Cannot convert");
    }
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting graceful shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting graceful shutdown..."),
    }
}
