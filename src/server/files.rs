//! Filename handling for uploads and downloads.

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

/// Upload extensions accepted by `/upload` (compared case-insensitively).
pub const ALLOWED_EXTENSIONS: [&str; 3] = ["md", "txt", "markdown"];

static UNSAFE_CHARS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[^A-Za-z0-9_.\-]").unwrap_or_else(|e| unreachable!("static pattern: {e}"))
});

/// True when the text after the last `.` is an allowed extension.
pub fn allowed_file(filename: &str) -> bool {
    match filename.rsplit_once('.') {
        Some((_, ext)) => ALLOWED_EXTENSIONS
            .iter()
            .any(|allowed| ext.eq_ignore_ascii_case(allowed)),
        None => false,
    }
}

/// Reduce a client-supplied filename to a safe single path component.
///
/// Non-ASCII characters are dropped, path separators and whitespace runs
/// become `_`, anything outside `[A-Za-z0-9_.-]` is removed and leading or
/// trailing `.`/`_` are stripped. May return an empty string.
pub fn sanitize_filename(filename: &str) -> String {
    let ascii: String = filename
        .chars()
        .filter(char::is_ascii)
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();
    let joined = ascii.split_whitespace().collect::<Vec<_>>().join("_");
    UNSAFE_CHARS
        .replace_all(&joined, "")
        .trim_matches(|c| c == '.' || c == '_')
        .to_string()
}

/// File stem of an already-sanitised name (`notes.md` → `notes`).
pub fn stem(filename: &str) -> &str {
    Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(filename)
}

/// True when `name` can be joined onto a directory without leaving it.
pub fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
}

/// First eight characters of a v4 UUID, used to keep staged names unique.
pub fn short_id() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(8);
    id
}
