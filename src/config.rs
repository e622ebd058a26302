//! Configuration types for Markdown-to-PDF conversion.
//!
//! Two structs, two lifetimes:
//!
//! * [`ConversionParams`]: per-job rendering options (engine, geometry,
//!   fonts, CJK settings). Built via [`ConversionParamsBuilder`], validated
//!   once at the boundary, then immutable while the job runs.
//! * [`ConverterConfig`]: per-process converter settings (which `pandoc`
//!   to run, how long to wait, where to stage text). Built once at start-up
//!   and shared by every job.
//!
//! # Design choice: builder over constructor
//! Fifteen rendering knobs, most of them optional, do not fit a constructor.
//! The builder lets callers set only what they care about and normalises
//! blank strings to the documented defaults in one place.

use crate::error::Md2PdfError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default LaTeX engine handed to `--pdf-engine`.
pub const DEFAULT_ENGINE: &str = "xelatex";
/// Baseline document class.
pub const DEFAULT_DOCUMENT_CLASS: &str = "article";
/// CJK-capable class substituted for the baseline when the language is Chinese.
pub const CJK_DOCUMENT_CLASS: &str = "ctexart";
pub const DEFAULT_GEOMETRY: &str = "margin=1in";
pub const DEFAULT_FONT_SIZE: &str = "12pt";

/// Language codes whose text needs CJK rendering.
const CJK_LANGUAGES: [&str; 3] = ["zh", "ja", "ko"];

/// Rendering options for one conversion job.
///
/// Built via [`ConversionParams::builder()`] or using
/// [`ConversionParams::default()`].
///
/// # Example
/// ```rust
/// use md2pdf::ConversionParams;
///
/// let params = ConversionParams::builder()
///     .geometry("a4paper,margin=2cm")
///     .language("zh")
///     .cjk_main_font("SimSun")
///     .build()
///     .unwrap();
/// assert_eq!(params.effective_document_class(), "ctexart");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionParams {
    /// PDF engine passed to `--pdf-engine`. Default: `xelatex`.
    ///
    /// Not checked against a list: pandoc owns the vocabulary, and an unknown
    /// engine surfaces as pandoc's own diagnostic.
    pub engine: String,

    /// LaTeX document class. Default: `article`.
    pub document_class: String,

    /// Page geometry, passed as `-V geometry:<value>`. Default: `margin=1in`.
    pub geometry: String,

    /// Base font size. Default: `12pt`.
    pub font_size: String,

    /// Main (Latin) font family.
    pub main_font: Option<String>,

    /// Line spacing multiplier, e.g. `"1.25"`.
    pub line_stretch: Option<String>,

    /// Coloured hyperlinks. Default: true.
    pub color_links: bool,

    /// Numbered sections (`-N`). Default: false.
    pub number_sections: bool,

    /// Table of contents (`--toc`). Default: false.
    pub toc: bool,

    /// Target language code (`zh`, `ja`, `en-GB`, …). Empty means unset.
    pub language: String,

    pub cjk_main_font: Option<String>,
    pub cjk_sans_font: Option<String>,
    pub cjk_mono_font: Option<String>,

    /// Read input as `markdown+east_asian_line_breaks`. Default: true.
    ///
    /// The extension drops the spurious spaces that soft line breaks would
    /// otherwise insert between CJK characters.
    pub east_asian_line_breaks: bool,
}

impl Default for ConversionParams {
    fn default() -> Self {
        Self {
            engine: DEFAULT_ENGINE.to_string(),
            document_class: DEFAULT_DOCUMENT_CLASS.to_string(),
            geometry: DEFAULT_GEOMETRY.to_string(),
            font_size: DEFAULT_FONT_SIZE.to_string(),
            main_font: None,
            line_stretch: None,
            color_links: true,
            number_sections: false,
            toc: false,
            language: String::new(),
            cjk_main_font: None,
            cjk_sans_font: None,
            cjk_mono_font: None,
            east_asian_line_breaks: true,
        }
    }
}

impl ConversionParams {
    /// Create a new builder for `ConversionParams`.
    pub fn builder() -> ConversionParamsBuilder {
        ConversionParamsBuilder {
            params: Self::default(),
        }
    }

    /// The document class actually handed to pandoc.
    ///
    /// Blank falls back to `article`; Chinese text on the baseline class is
    /// upgraded to `ctexart`. An explicitly chosen class is never touched.
    pub fn effective_document_class(&self) -> &str {
        let class = match self.document_class.trim() {
            "" => DEFAULT_DOCUMENT_CLASS,
            c => c,
        };
        if class == DEFAULT_DOCUMENT_CLASS && self.primary_language() == "zh" {
            CJK_DOCUMENT_CLASS
        } else {
            class
        }
    }

    /// True when the target language needs CJK rendering.
    pub fn is_cjk(&self) -> bool {
        CJK_LANGUAGES.contains(&self.primary_language().as_str())
    }

    /// Lower-cased primary subtag of the language code (`zh-CN` → `zh`).
    fn primary_language(&self) -> String {
        self.language
            .trim()
            .split(['-', '_'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase()
    }
}

/// Builder for [`ConversionParams`].
///
/// Blank strings for the defaulted fields restore the default; blank
/// strings for the optional fields leave them unset.
#[derive(Debug)]
pub struct ConversionParamsBuilder {
    params: ConversionParams,
}

impl ConversionParamsBuilder {
    pub fn engine(mut self, engine: impl Into<String>) -> Self {
        self.params.engine = or_default(engine.into(), DEFAULT_ENGINE);
        self
    }

    pub fn document_class(mut self, class: impl Into<String>) -> Self {
        self.params.document_class = or_default(class.into(), DEFAULT_DOCUMENT_CLASS);
        self
    }

    pub fn geometry(mut self, geometry: impl Into<String>) -> Self {
        self.params.geometry = or_default(geometry.into(), DEFAULT_GEOMETRY);
        self
    }

    pub fn font_size(mut self, size: impl Into<String>) -> Self {
        self.params.font_size = or_default(size.into(), DEFAULT_FONT_SIZE);
        self
    }

    pub fn main_font(mut self, font: impl Into<String>) -> Self {
        self.params.main_font = non_blank(font.into());
        self
    }

    pub fn line_stretch(mut self, stretch: impl Into<String>) -> Self {
        self.params.line_stretch = non_blank(stretch.into());
        self
    }

    pub fn color_links(mut self, v: bool) -> Self {
        self.params.color_links = v;
        self
    }

    pub fn number_sections(mut self, v: bool) -> Self {
        self.params.number_sections = v;
        self
    }

    pub fn toc(mut self, v: bool) -> Self {
        self.params.toc = v;
        self
    }

    pub fn language(mut self, code: impl Into<String>) -> Self {
        self.params.language = code.into().trim().to_string();
        self
    }

    pub fn cjk_main_font(mut self, font: impl Into<String>) -> Self {
        self.params.cjk_main_font = non_blank(font.into());
        self
    }

    pub fn cjk_sans_font(mut self, font: impl Into<String>) -> Self {
        self.params.cjk_sans_font = non_blank(font.into());
        self
    }

    pub fn cjk_mono_font(mut self, font: impl Into<String>) -> Self {
        self.params.cjk_mono_font = non_blank(font.into());
        self
    }

    pub fn east_asian_line_breaks(mut self, v: bool) -> Self {
        self.params.east_asian_line_breaks = v;
        self
    }

    /// Build the parameters, validating constraints.
    ///
    /// Values end up as single argv elements, so no shell quoting is
    /// involved; control characters are still rejected because pandoc's
    /// `-V key=value` parser cannot carry them.
    pub fn build(self) -> Result<ConversionParams, Md2PdfError> {
        let p = &self.params;
        let fields: [(&str, Option<&str>); 10] = [
            ("engine", Some(&p.engine)),
            ("document_class", Some(&p.document_class)),
            ("geometry", Some(&p.geometry)),
            ("fontsize", Some(&p.font_size)),
            ("mainfont", p.main_font.as_deref()),
            ("linestretch", p.line_stretch.as_deref()),
            ("language", Some(&p.language)),
            ("cjk_mainfont", p.cjk_main_font.as_deref()),
            ("cjk_sansfont", p.cjk_sans_font.as_deref()),
            ("cjk_monofont", p.cjk_mono_font.as_deref()),
        ];
        for (name, value) in fields {
            if let Some(v) = value {
                if v.chars().any(char::is_control) {
                    return Err(Md2PdfError::InvalidParams(format!(
                        "'{name}' must not contain control characters"
                    )));
                }
            }
        }
        if p.engine.chars().any(char::is_whitespace) {
            return Err(Md2PdfError::InvalidParams(format!(
                "engine must be a single word, got '{}'",
                p.engine
            )));
        }
        if let Some(ref stretch) = p.line_stretch {
            if stretch.parse::<f32>().map_or(true, |v| v <= 0.0) {
                return Err(Md2PdfError::InvalidParams(format!(
                    "linestretch must be a positive number, got '{stretch}'"
                )));
            }
        }
        Ok(self.params)
    }
}

fn or_default(value: String, default: &str) -> String {
    match value.trim() {
        "" => default.to_string(),
        v => v.to_string(),
    }
}

fn non_blank(value: String) -> Option<String> {
    match value.trim() {
        "" => None,
        v => Some(v.to_string()),
    }
}

// ── Converter settings ───────────────────────────────────────────────────

/// Wall-clock limit for one converter run.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
/// Wait between the graceful terminate and the forced kill on cancellation.
pub const DEFAULT_GRACE_PERIOD_SECS: u64 = 5;

/// Process-wide converter settings shared by every job.
///
/// # Example
/// ```rust
/// use md2pdf::ConverterConfig;
/// use std::time::Duration;
///
/// let config = ConverterConfig::builder()
///     .pandoc_path("/usr/local/bin/pandoc")
///     .timeout(Duration::from_secs(120))
///     .build()
///     .unwrap();
/// assert_eq!(config.grace_period, Duration::from_secs(5));
/// ```
#[derive(Debug, Clone)]
pub struct ConverterConfig {
    /// Executable invoked for every job. Default: `pandoc` (resolved on `PATH`).
    pub pandoc_path: PathBuf,

    /// Wall-clock limit per job. Default: 60 s.
    pub timeout: Duration,

    /// Grace period between SIGTERM and SIGKILL on cancellation. Default: 5 s.
    pub grace_period: Duration,

    /// Directory for text staging files. None → system temp directory.
    pub staging_dir: Option<PathBuf>,

    /// Directory prepended to the converter's `PATH` (e.g. a MiKTeX `bin`).
    pub extra_path_dir: Option<PathBuf>,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            pandoc_path: PathBuf::from("pandoc"),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            grace_period: Duration::from_secs(DEFAULT_GRACE_PERIOD_SECS),
            staging_dir: None,
            extra_path_dir: None,
        }
    }
}

impl ConverterConfig {
    /// Create a new builder for `ConverterConfig`.
    pub fn builder() -> ConverterConfigBuilder {
        ConverterConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ConverterConfig`].
#[derive(Debug)]
pub struct ConverterConfigBuilder {
    config: ConverterConfig,
}

impl ConverterConfigBuilder {
    pub fn pandoc_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pandoc_path = path.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn grace_period(mut self, grace: Duration) -> Self {
        self.config.grace_period = grace;
        self
    }

    pub fn staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.staging_dir = Some(dir.into());
        self
    }

    pub fn extra_path_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.extra_path_dir = Some(dir.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConverterConfig, Md2PdfError> {
        let c = &self.config;
        if c.pandoc_path.as_os_str().is_empty() {
            return Err(Md2PdfError::InvalidConfig(
                "pandoc path must not be empty".into(),
            ));
        }
        if c.timeout.is_zero() {
            return Err(Md2PdfError::InvalidConfig(
                "timeout must be greater than zero".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_boundary_contract() {
        let p = ConversionParams::default();
        assert_eq!(p.engine, "xelatex");
        assert_eq!(p.document_class, "article");
        assert_eq!(p.geometry, "margin=1in");
        assert_eq!(p.font_size, "12pt");
        assert!(p.color_links);
        assert!(!p.number_sections);
        assert!(!p.toc);
        assert!(p.east_asian_line_breaks);
    }

    #[test]
    fn blank_values_restore_defaults() {
        let p = ConversionParams::builder()
            .engine("  ")
            .document_class("")
            .geometry("")
            .font_size("")
            .main_font("   ")
            .build()
            .unwrap();
        assert_eq!(p.engine, DEFAULT_ENGINE);
        assert_eq!(p.document_class, DEFAULT_DOCUMENT_CLASS);
        assert_eq!(p.geometry, DEFAULT_GEOMETRY);
        assert_eq!(p.font_size, DEFAULT_FONT_SIZE);
        assert_eq!(p.main_font, None);
    }

    #[test]
    fn chinese_upgrades_baseline_class() {
        let p = ConversionParams::builder().language("zh").build().unwrap();
        assert_eq!(p.effective_document_class(), CJK_DOCUMENT_CLASS);

        let p = ConversionParams::builder()
            .language("zh-CN")
            .document_class("")
            .build()
            .unwrap();
        assert_eq!(p.effective_document_class(), CJK_DOCUMENT_CLASS);
    }

    #[test]
    fn chinese_keeps_explicit_class() {
        let p = ConversionParams::builder()
            .language("zh")
            .document_class("report")
            .build()
            .unwrap();
        assert_eq!(p.effective_document_class(), "report");
    }

    #[test]
    fn japanese_keeps_article() {
        let p = ConversionParams::builder().language("ja").build().unwrap();
        assert_eq!(p.effective_document_class(), "article");
        assert!(p.is_cjk());
    }

    #[test]
    fn cjk_detection() {
        for code in ["zh", "ja", "ko", "ZH", "ko-KR", "zh_TW"] {
            let p = ConversionParams::builder().language(code).build().unwrap();
            assert!(p.is_cjk(), "{code} should be CJK");
        }
        for code in ["", "en", "de-DE", "zha"] {
            let p = ConversionParams::builder().language(code).build().unwrap();
            assert!(!p.is_cjk(), "{code} should not be CJK");
        }
    }

    #[test]
    fn rejects_control_characters() {
        let err = ConversionParams::builder()
            .main_font("Evil\nFont")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("mainfont"));
    }

    #[test]
    fn rejects_multiword_engine() {
        assert!(ConversionParams::builder()
            .engine("xelatex --shell-escape")
            .build()
            .is_err());
    }

    #[test]
    fn rejects_bad_line_stretch() {
        assert!(ConversionParams::builder().line_stretch("wide").build().is_err());
        assert!(ConversionParams::builder().line_stretch("-1").build().is_err());
        assert!(ConversionParams::builder().line_stretch("1.5").build().is_ok());
    }

    #[test]
    fn converter_config_validation() {
        assert!(ConverterConfig::builder().pandoc_path("").build().is_err());
        assert!(ConverterConfig::builder()
            .timeout(Duration::ZERO)
            .build()
            .is_err());
        let c = ConverterConfig::builder().build().unwrap();
        assert_eq!(c.timeout, Duration::from_secs(60));
        assert_eq!(c.grace_period, Duration::from_secs(5));
    }
}
