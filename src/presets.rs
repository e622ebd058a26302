//! Named rendering presets offered to clients.
//!
//! The table is static and ordered; it serialises as a JSON object whose
//! keys keep declaration order (`academic`, `simple`, `book`, `chinese`,
//! `japanese`, `korean`).

use crate::config::ConversionParams;
use crate::error::Md2PdfError;
use serde::ser::{Serialize, Serializer};

/// One preset, in the field vocabulary the web client uses.
///
/// Empty strings mean "leave unset". The CJK fields are only present on the
/// language presets.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Preset {
    pub name: &'static str,
    pub pdf_engine: &'static str,
    pub document_class: &'static str,
    pub geometry: &'static str,
    pub fontsize: &'static str,
    pub mainfont: &'static str,
    pub linestretch: &'static str,
    pub colorlinks: bool,
    pub number_sections: bool,
    pub toc: bool,
    #[serde(flatten)]
    pub cjk: Option<CjkPreset>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct CjkPreset {
    pub language: &'static str,
    pub cjk_mainfont: &'static str,
    pub cjk_sansfont: &'static str,
    pub cjk_monofont: &'static str,
    pub east_asian_line_breaks: bool,
}

#[allow(clippy::too_many_arguments)]
const fn latin(
    name: &'static str,
    document_class: &'static str,
    geometry: &'static str,
    fontsize: &'static str,
    mainfont: &'static str,
    linestretch: &'static str,
    colorlinks: bool,
    number_sections: bool,
    toc: bool,
) -> Preset {
    Preset {
        name,
        pdf_engine: "xelatex",
        document_class,
        geometry,
        fontsize,
        mainfont,
        linestretch,
        colorlinks,
        number_sections,
        toc,
        cjk: None,
    }
}

const fn cjk(
    name: &'static str,
    document_class: &'static str,
    language: &'static str,
    cjk_mainfont: &'static str,
    cjk_sansfont: &'static str,
) -> Preset {
    Preset {
        cjk: Some(CjkPreset {
            language,
            cjk_mainfont,
            cjk_sansfont,
            cjk_monofont: "",
            east_asian_line_breaks: true,
        }),
        ..latin(name, document_class, "a4paper,margin=2cm", "12pt", "", "", true, false, false)
    }
}

static PRESETS: [(&str, Preset); 6] = [
    (
        "academic",
        latin(
            "Academic Paper",
            "article",
            "a4paper,margin=2.5cm",
            "11pt",
            "TeX Gyre Termes",
            "1.25",
            true,
            true,
            false,
        ),
    ),
    (
        "simple",
        latin("Simple Document", "article", "margin=1in", "12pt", "", "", true, false, false),
    ),
    (
        "book",
        latin("Book Style", "book", "margin=1.5in", "12pt", "", "1.5", false, true, true),
    ),
    ("chinese", cjk("Chinese Document", "ctexart", "zh", "SimSun", "")),
    ("japanese", cjk("Japanese Document", "article", "ja", "MS Mincho", "MS Gothic")),
    ("korean", cjk("Korean Document", "article", "ko", "Batang", "Dotum")),
];

/// The full preset table, in declaration order.
pub fn all() -> &'static [(&'static str, Preset)] {
    &PRESETS
}

/// Look up a preset by key (`"academic"`, `"chinese"`, …).
pub fn get(key: &str) -> Option<&'static Preset> {
    PRESETS.iter().find(|(k, _)| *k == key).map(|(_, p)| p)
}

/// Serialisable view of the whole table that keeps key order.
#[derive(Debug, Clone, Copy, Default)]
pub struct PresetTable;

impl Serialize for PresetTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(PRESETS.iter().map(|(k, p)| (*k, p)))
    }
}

impl Preset {
    /// Start a params builder pre-filled with this preset.
    pub fn builder(&self) -> crate::config::ConversionParamsBuilder {
        let mut b = ConversionParams::builder()
            .engine(self.pdf_engine)
            .document_class(self.document_class)
            .geometry(self.geometry)
            .font_size(self.fontsize)
            .main_font(self.mainfont)
            .line_stretch(self.linestretch)
            .color_links(self.colorlinks)
            .number_sections(self.number_sections)
            .toc(self.toc);
        if let Some(c) = &self.cjk {
            b = b
                .language(c.language)
                .cjk_main_font(c.cjk_mainfont)
                .cjk_sans_font(c.cjk_sansfont)
                .cjk_mono_font(c.cjk_monofont)
                .east_asian_line_breaks(c.east_asian_line_breaks);
        }
        b
    }

    pub fn to_params(&self) -> Result<ConversionParams, Md2PdfError> {
        self.builder().build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_serialises_in_declaration_order() {
        let json = serde_json::to_string(&PresetTable).unwrap();
        let keys = ["academic", "simple", "book", "chinese", "japanese", "korean"];
        let positions: Vec<usize> = keys
            .iter()
            .map(|k| json.find(&format!("\"{k}\":")).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "{json}");
    }

    #[test]
    fn cjk_fields_only_on_language_presets() {
        let v = serde_json::to_value(PresetTable).unwrap();
        assert!(v["academic"].get("language").is_none());
        assert_eq!(v["chinese"]["language"], "zh");
        assert_eq!(v["chinese"]["cjk_mainfont"], "SimSun");
        assert_eq!(v["japanese"]["cjk_sansfont"], "MS Gothic");
        assert_eq!(v["korean"]["east_asian_line_breaks"], true);
        assert_eq!(v["book"]["toc"], true);
        assert_eq!(v["book"]["colorlinks"], false);
    }

    #[test]
    fn presets_convert_to_valid_params() {
        for (key, preset) in all() {
            let params = preset.to_params().unwrap_or_else(|e| panic!("{key}: {e}"));
            assert_eq!(params.engine, "xelatex");
        }
        let academic = get("academic").unwrap().to_params().unwrap();
        assert_eq!(academic.main_font.as_deref(), Some("TeX Gyre Termes"));
        assert_eq!(academic.line_stretch.as_deref(), Some("1.25"));
        assert!(academic.number_sections);

        let chinese = get("chinese").unwrap().to_params().unwrap();
        assert!(chinese.is_cjk());
        assert_eq!(chinese.cjk_sans_font, None);
        assert!(get("nope").is_none());
    }
}
