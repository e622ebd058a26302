//! Converter command-line construction.
//!
//! The argument order is fixed so that logs, tests and the progress callback
//! always see the same vector for the same parameters:
//!
//! ```text
//! pandoc <input> -o <output> --pdf-engine <engine>
//!        -V documentclass=<class>  -V geometry:<g>  -V fontsize=<f>
//!        -V mainfont=<f>  -V linestretch=<n>  -V colorlinks=true
//!        -N  --toc  -f markdown+east_asian_line_breaks
//!        -V lang=<code>  -V CJKmainfont=<f>  -V CJKsansfont=<f>  -V CJKmonofont=<f>
//! ```
//!
//! Everything after `--pdf-engine` is emitted only when the corresponding
//! field is non-empty or true, except the document class which is always
//! present after defaulting.

use crate::config::ConversionParams;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tracing::warn;

/// Input format that keeps soft line breaks between CJK characters from
/// turning into spaces.
pub const EAST_ASIAN_INPUT_FORMAT: &str = "markdown+east_asian_line_breaks";

/// A fully resolved converter invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConverterCommand {
    program: PathBuf,
    args: Vec<OsString>,
    path_prefix: Option<PathBuf>,
}

impl ConverterCommand {
    /// Build the invocation converting `input` into `output` with `params`.
    pub fn build(program: &Path, input: &Path, output: &Path, params: &ConversionParams) -> Self {
        let mut args: Vec<OsString> = vec![
            input.as_os_str().to_owned(),
            "-o".into(),
            output.as_os_str().to_owned(),
            "--pdf-engine".into(),
            params.engine.clone().into(),
        ];

        let mut var = |name: &str, sep: char, value: &str| {
            args.push("-V".into());
            args.push(format!("{name}{sep}{value}").into());
        };

        var("documentclass", '=', params.effective_document_class());
        if !params.geometry.is_empty() {
            var("geometry", ':', &params.geometry);
        }
        if !params.font_size.is_empty() {
            var("fontsize", '=', &params.font_size);
        }
        if let Some(font) = &params.main_font {
            var("mainfont", '=', font);
        }
        if let Some(stretch) = &params.line_stretch {
            var("linestretch", '=', stretch);
        }
        if params.color_links {
            var("colorlinks", '=', "true");
        }

        if params.number_sections {
            args.push("-N".into());
        }
        if params.toc {
            args.push("--toc".into());
        }
        if params.east_asian_line_breaks {
            args.push("-f".into());
            args.push(EAST_ASIAN_INPUT_FORMAT.into());
        }

        let mut var = |name: &str, value: &str| {
            args.push("-V".into());
            args.push(format!("{name}={value}").into());
        };
        let language = params.language.trim();
        if !language.is_empty() {
            var("lang", language);
        }
        if let Some(font) = &params.cjk_main_font {
            var("CJKmainfont", font);
        }
        if let Some(font) = &params.cjk_sans_font {
            var("CJKsansfont", font);
        }
        if let Some(font) = &params.cjk_mono_font {
            var("CJKmonofont", font);
        }

        Self {
            program: program.to_path_buf(),
            args,
            path_prefix: None,
        }
    }

    /// Arbitrary invocation, for running something other than pandoc.
    pub fn from_parts<I, S>(program: impl Into<PathBuf>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            path_prefix: None,
        }
    }

    /// Prepend `dir` to the child's `PATH` (e.g. a MiKTeX `bin` directory).
    ///
    /// Only the child environment is touched.
    pub fn with_path_prefix(mut self, dir: Option<&Path>) -> Self {
        self.path_prefix = dir.map(Path::to_path_buf);
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    /// Program followed by its arguments, lossily converted for display.
    pub fn command_line(&self) -> Vec<String> {
        std::iter::once(self.program.as_os_str())
            .chain(self.args.iter().map(OsString::as_os_str))
            .map(|s| s.to_string_lossy().into_owned())
            .collect()
    }

    /// Whether `flag` appears as a standalone argument.
    pub fn has_arg(&self, flag: impl AsRef<OsStr>) -> bool {
        self.args.iter().any(|a| a == flag.as_ref())
    }

    /// Tokio command ready to spawn: stdin closed, stdout/stderr piped,
    /// child in its own process group, killed if the handle is dropped.
    pub(crate) fn to_tokio(&self) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        cmd.process_group(0);

        if let Some(dir) = &self.path_prefix {
            match prefixed_path(dir) {
                Some(path) => {
                    cmd.env("PATH", path);
                }
                None => warn!("Cannot prepend {} to PATH; using inherited PATH", dir.display()),
            }
        }
        cmd
    }
}

fn prefixed_path(dir: &Path) -> Option<OsString> {
    let inherited = std::env::var_os("PATH").unwrap_or_default();
    let entries = std::iter::once(dir.to_path_buf()).chain(std::env::split_paths(&inherited));
    std::env::join_paths(entries).ok()
}
