//! Raw-text staging: persist Markdown text to a temporary `.md` file.
//!
//! The returned [`NamedTempFile`] deletes the file when dropped, so the
//! staging file cannot outlive the job even on an early return. Callers that
//! want to observe deletion failures call [`discard`] explicitly.

use std::io::{self, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// UTF-8 byte-order mark.
pub const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

pub const STAGING_PREFIX: &str = "md2pdf-";
pub const STAGING_SUFFIX: &str = ".md";

/// Text encodings the staging step can write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Utf8,
    /// UTF-8 prefixed with a BOM; LaTeX toolchains on some platforms need it
    /// to detect CJK input reliably.
    Utf8WithBom,
}

impl TextEncoding {
    pub fn for_cjk(is_cjk: bool) -> Self {
        if is_cjk {
            Self::Utf8WithBom
        } else {
            Self::Utf8
        }
    }
}

/// Write `text` to a fresh uniquely-named file in `dir` (system temp dir
/// when `None`).
pub fn stage_text(text: &str, encoding: TextEncoding, dir: Option<&Path>) -> io::Result<NamedTempFile> {
    let mut builder = tempfile::Builder::new();
    builder.prefix(STAGING_PREFIX).suffix(STAGING_SUFFIX);
    let mut file = match dir {
        Some(dir) => builder.tempfile_in(dir)?,
        None => builder.tempfile()?,
    };

    if encoding == TextEncoding::Utf8WithBom {
        file.write_all(UTF8_BOM)?;
    }
    file.write_all(text.as_bytes())?;
    file.flush()?;
    debug!(
        "Staged {} bytes ({:?}) at {}",
        text.len(),
        encoding,
        file.path().display()
    );
    Ok(file)
}

/// Delete a staging file, logging (not returning) any failure.
pub fn discard(file: NamedTempFile) {
    let path = file.path().to_path_buf();
    if let Err(e) = file.close() {
        warn!("Failed to delete staging file {}: {}", path.display(), e);
    }
}
