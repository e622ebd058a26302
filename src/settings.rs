//! Service-level settings read from the environment.
//!
//! | Variable              | Default                                  |
//! |-----------------------|------------------------------------------|
//! | `PANDOC_PATH`         | `pandoc`                                 |
//! | `MIKTEX_BIN_DIR`      | unset                                    |
//! | `MD2PDF_UPLOAD_DIR`   | `<system temp>/markdown_to_pdf_uploads`  |
//! | `MD2PDF_OUTPUT_DIR`   | `<system temp>/markdown_to_pdf_outputs`  |
//! | `MD2PDF_BIND`         | `0.0.0.0:1204`                           |
//! | `MD2PDF_TIMEOUT_SECS` | `60`                                     |
//! | `MD2PDF_GRACE_SECS`   | `5`                                      |

use crate::config::{ConverterConfig, DEFAULT_GRACE_PERIOD_SECS, DEFAULT_TIMEOUT_SECS};
use crate::error::Md2PdfError;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_BIND: &str = "0.0.0.0:1204";
/// Largest accepted request body (16 MiB).
pub const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

const UPLOAD_DIR_NAME: &str = "markdown_to_pdf_uploads";
const OUTPUT_DIR_NAME: &str = "markdown_to_pdf_outputs";

/// Everything the HTTP service needs at start-up.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    /// Where uploaded Markdown files are staged.
    pub upload_dir: PathBuf,
    /// Where generated PDFs are written and served from.
    pub output_dir: PathBuf,
    pub bind: SocketAddr,
    pub max_body_bytes: usize,
    pub converter: ConverterConfig,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        let tmp = std::env::temp_dir();
        Self {
            upload_dir: tmp.join(UPLOAD_DIR_NAME),
            output_dir: tmp.join(OUTPUT_DIR_NAME),
            bind: SocketAddr::from(([0, 0, 0, 0], 1204)),
            max_body_bytes: MAX_BODY_BYTES,
            converter: ConverterConfig::default(),
        }
    }
}

impl ServiceSettings {
    /// Read settings from the process environment.
    pub fn from_env() -> Result<Self, Md2PdfError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read settings through `lookup`; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Md2PdfError> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let mut settings = Self::default();

        if let Some(dir) = get("MD2PDF_UPLOAD_DIR") {
            settings.upload_dir = PathBuf::from(dir);
        }
        if let Some(dir) = get("MD2PDF_OUTPUT_DIR") {
            settings.output_dir = PathBuf::from(dir);
        }
        if let Some(bind) = get("MD2PDF_BIND") {
            settings.bind = bind.trim().parse().map_err(|e| {
                Md2PdfError::InvalidConfig(format!("MD2PDF_BIND '{bind}': {e}"))
            })?;
        }

        let mut converter = ConverterConfig::builder();
        if let Some(path) = get("PANDOC_PATH") {
            converter = converter.pandoc_path(path);
        }
        let timeout_secs = match get("MD2PDF_TIMEOUT_SECS") {
            Some(raw) => raw.trim().parse::<u64>().map_err(|e| {
                Md2PdfError::InvalidConfig(format!("MD2PDF_TIMEOUT_SECS '{raw}': {e}"))
            })?,
            None => DEFAULT_TIMEOUT_SECS,
        };
        converter = converter.timeout(Duration::from_secs(timeout_secs));
        let grace_secs = match get("MD2PDF_GRACE_SECS") {
            Some(raw) => raw.trim().parse::<u64>().map_err(|e| {
                Md2PdfError::InvalidConfig(format!("MD2PDF_GRACE_SECS '{raw}': {e}"))
            })?,
            None => DEFAULT_GRACE_PERIOD_SECS,
        };
        converter = converter.grace_period(Duration::from_secs(grace_secs));
        if let Some(dir) = get("MIKTEX_BIN_DIR").and_then(|d| usable_bin_dir(Path::new(&d))) {
            converter = converter.extra_path_dir(dir);
        }
        settings.converter = converter.build()?;
        Ok(settings)
    }

    /// Create the upload and output directories if missing.
    pub async fn ensure_directories(&self) -> Result<(), Md2PdfError> {
        for dir in [&self.upload_dir, &self.output_dir] {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|source| Md2PdfError::DirectoryUnavailable {
                    path: dir.clone(),
                    source,
                })?;
        }
        Ok(())
    }
}

/// Accept `dir` as an extra `PATH` entry only if it is an existing directory.
pub fn usable_bin_dir(dir: &Path) -> Option<PathBuf> {
    if dir.is_dir() {
        info!("Adding {} to the converter PATH", dir.display());
        Some(dir.to_path_buf())
    } else {
        warn!("MIKTEX_BIN_DIR {} is not a directory; ignoring", dir.display());
        None
    }
}
