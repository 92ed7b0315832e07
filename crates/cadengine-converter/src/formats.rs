//! Accepted CAD formats and header signatures.

use std::collections::HashMap;
use std::sync::LazyLock;

use serde::Serialize;

// ---------------------------------------------------------------------------
// Extension map macro
// ---------------------------------------------------------------------------

macro_rules! define_cad_formats {
    ($($variant:ident => $ext:literal),* $(,)?) => {
        static EXTENSION_MAP: LazyLock<HashMap<&'static str, CadFormat>> = LazyLock::new(|| {
            HashMap::from([$(($ext, CadFormat::$variant),)*])
        });

        impl CadFormat {
            /// All file extensions accepted for conversion.
            pub const SUPPORTED_EXTENSIONS: &'static [&'static str] = &[$($ext,)*];

            /// Canonical lowercase extension for this format.
            pub fn extension(&self) -> &'static str {
                match self {
                    $(CadFormat::$variant => $ext,)*
                }
            }
        }
    };
}

define_cad_formats! {
    Step    => "step",
    StepAlt => "stp",
    StepP21 => "p21",
    Iges    => "iges",
    IgesAlt => "igs",
}

/// Recognized input formats, one per accepted extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CadFormat {
    /// STEP (.step)
    Step,
    /// STEP alternate extension (.stp)
    StepAlt,
    /// STEP Part 21 exchange file (.p21)
    StepP21,
    /// IGES (.iges)
    Iges,
    /// IGES alternate extension (.igs)
    IgesAlt,
}

/// Format family; all members of a family share a header signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FormatFamily {
    /// ISO 10303-21 clear-text exchange structure.
    Step,
    /// Fixed 80-column IGES records.
    Iges,
}

/// STEP Part 21 files open with this keyword.
const STEP_MAGIC: &[u8] = b"ISO-10303-21;";
/// IGES section letter sits in column 73 (1-based).
const IGES_SECTION_COLUMN: usize = 72;
const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Signatures of common non-CAD payloads, for rejection messages.
const FOREIGN_SIGNATURES: &[(&[u8], &str)] = &[
    (b"\x89PNG\r\n\x1a\n", "PNG image"),
    (b"\xFF\xD8\xFF", "JPEG image"),
    (b"GIF8", "GIF image"),
    (b"%PDF-", "PDF document"),
    (b"PK\x03\x04", "ZIP archive"),
    (b"\x1F\x8B", "GZIP archive"),
    (b"\x7FELF", "ELF executable"),
    (b"MZ", "Windows executable"),
    (b"#!", "script"),
];

impl CadFormat {
    /// Look up a format by extension (case-insensitive, without dot).
    pub fn from_extension(ext: &str) -> Option<Self> {
        EXTENSION_MAP
            .get(ext.to_ascii_lowercase().as_str())
            .copied()
    }

    /// Family this format belongs to.
    pub fn family(&self) -> FormatFamily {
        match self {
            CadFormat::Step | CadFormat::StepAlt | CadFormat::StepP21 => FormatFamily::Step,
            CadFormat::Iges | CadFormat::IgesAlt => FormatFamily::Iges,
        }
    }
}

impl FormatFamily {
    /// Human-readable family name.
    pub fn label(&self) -> &'static str {
        match self {
            FormatFamily::Step => "STEP",
            FormatFamily::Iges => "IGES",
        }
    }

    /// Whether the leading bytes of a file carry this family's signature.
    pub fn matches_header(&self, header: &[u8]) -> bool {
        if header.contains(&0) {
            return false;
        }
        match self {
            FormatFamily::Step => is_step_header(header),
            FormatFamily::Iges => is_iges_header(header),
        }
    }

    /// Determine the family from header bytes alone.
    pub fn sniff(header: &[u8]) -> Option<Self> {
        [FormatFamily::Step, FormatFamily::Iges]
            .into_iter()
            .find(|family| family.matches_header(header))
    }
}

impl std::fmt::Display for FormatFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Best-effort description of what a header actually is.
pub fn describe_header(header: &[u8]) -> String {
    if header.is_empty() {
        return "empty".to_string();
    }
    if let Some(family) = FormatFamily::sniff(header) {
        return format!("{} file", family.label());
    }
    FOREIGN_SIGNATURES
        .iter()
        .find(|(magic, _)| header.starts_with(magic))
        .map(|(_, name)| (*name).to_string())
        .unwrap_or_else(|| {
            if header.contains(&0) {
                "binary data".to_string()
            } else {
                "unknown".to_string()
            }
        })
}

fn is_step_header(header: &[u8]) -> bool {
    let body = header.strip_prefix(UTF8_BOM).unwrap_or(header);
    let start = body
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(body.len());
    body[start..]
        .get(..STEP_MAGIC.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(STEP_MAGIC))
}

fn is_iges_header(header: &[u8]) -> bool {
    let line_end = header
        .iter()
        .position(|&b| b == b'\n')
        .unwrap_or(header.len());
    let line = &header[..line_end];
    let line = line.strip_suffix(b"\r").unwrap_or(line);

    if line.len() <= IGES_SECTION_COLUMN || line.len() > 80 {
        return false;
    }
    if !line.iter().all(|b| b.is_ascii() && !b.is_ascii_control()) {
        return false;
    }
    matches!(line[IGES_SECTION_COLUMN], b'S' | b'G')
}

/// Strip any directory component from a client-declared filename.
///
/// Handles both `/` and `\` since browsers on Windows may send full paths.
pub fn declared_basename(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or(name)
}

/// Lowercased extension of a declared filename, if it has one.
pub fn declared_extension(name: &str) -> Option<String> {
    let base = declared_basename(name);
    let (stem, ext) = base.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}
