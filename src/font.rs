//! Font resources and PDF font embedding.
//!
//! The user-supplied font is parsed once at intake and embedded once per
//! output document as a composite Type0/CIDFontType2 font with Identity-H
//! encoding: stamp text is written as hexadecimal glyph-id strings, and
//! the W widths array plus the ToUnicode CMap cover exactly the glyphs the
//! stamps use. Without a font resource the built-in Helvetica serves as a
//! Latin-only fallback.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::PathBuf;

use log::warn;
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use ttf_parser::{Face, GlyphId};

use crate::error::{Error, Result};

/// An embeddable TrueType font supplied by the caller.
///
/// Parsing happens here, once; a buffer ttf-parser rejects is equivalent
/// to having no font at all and surfaces as [`Error::FontUnavailable`]
/// before any assembly work starts.
pub struct FontResource {
    pub(crate) data: Vec<u8>,
    pub(crate) name: String,
    pub(crate) metrics: FontMetrics,
}

/// Descriptor metrics scaled to the 1000-unit PDF glyph space.
#[derive(Debug, Clone)]
pub(crate) struct FontMetrics {
    pub ascent: i64,
    pub descent: i64,
    pub cap_height: i64,
    pub italic_angle: f64,
    pub bbox: [i64; 4],
}

impl FontResource {
    /// Validate a font buffer and derive its PDF descriptor metrics.
    pub fn parse(data: Vec<u8>) -> Result<Self> {
        let face = Face::parse(&data, 0).map_err(|_| Error::FontUnavailable)?;
        let units_per_em = face.units_per_em().max(1);
        let scale = 1000.0 / f64::from(units_per_em);
        let em = |value: i16| (f64::from(value) * scale).round() as i64;

        let bbox = face.global_bounding_box();
        let metrics = FontMetrics {
            ascent: em(face.ascender()),
            descent: em(face.descender()),
            cap_height: em(face.capital_height().unwrap_or_else(|| face.ascender())),
            italic_angle: face.italic_angle().map(f64::from).unwrap_or(0.0),
            bbox: [em(bbox.x_min), em(bbox.y_min), em(bbox.x_max), em(bbox.y_max)],
        };
        let name = sanitize_name(&postscript_name(&face));

        Ok(FontResource {
            data,
            name,
            metrics,
        })
    }

    /// The sanitized PostScript name used as the PDF BaseFont.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for FontResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontResource")
            .field("name", &self.name)
            .field("bytes", &self.data.len())
            .finish()
    }
}

fn postscript_name(face: &Face<'_>) -> String {
    use ttf_parser::name::name_id;

    let mut family = None;
    let mut post = None;
    for entry in face.names() {
        let Some(name) = entry.to_string() else {
            continue;
        };
        match entry.name_id {
            name_id::POST_SCRIPT_NAME => {
                if post.is_none() {
                    post = Some(name);
                }
            }
            name_id::FAMILY => {
                if family.is_none() {
                    family = Some(name);
                }
            }
            _ => {}
        }
    }
    post.or(family).unwrap_or_else(|| "Embedded".to_owned())
}

fn sanitize_name(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
            out.push(ch);
        } else if ch.is_whitespace() {
            out.push('-');
        }
    }
    if out.is_empty() {
        "Embedded".to_owned()
    } else {
        out
    }
}

/// Capability supplying the session font.
///
/// The remote fetch of the original lives behind this trait so assembly
/// itself never performs network or filesystem I/O; a provider failure
/// degrades to no-font mode instead of aborting.
pub trait FontProvider {
    /// Fetch the raw font bytes, or `None` when unavailable.
    fn fetch(&self) -> Option<Vec<u8>>;
}

/// Provider over an in-memory buffer.
pub struct StaticFontProvider(pub Vec<u8>);

impl FontProvider for StaticFontProvider {
    fn fetch(&self) -> Option<Vec<u8>> {
        Some(self.0.clone())
    }
}

/// Provider reading a font file from disk on demand.
pub struct FileFontProvider(pub PathBuf);

impl FontProvider for FileFontProvider {
    fn fetch(&self) -> Option<Vec<u8>> {
        match fs::read(&self.0) {
            Ok(data) => Some(data),
            Err(err) => {
                warn!("could not read font file {:?}: {}", self.0, err);
                None
            }
        }
    }
}

/// A font materialized inside the output document, ready for stamping.
pub(crate) struct PreparedFont {
    font_id: ObjectId,
    kind: PreparedKind,
}

enum PreparedKind {
    /// Used chars mapped to `(glyph id, advance in 1000-unit space)`.
    Embedded { glyphs: BTreeMap<char, (u16, u32)> },
    Helvetica,
}

impl PreparedFont {
    pub fn font_id(&self) -> ObjectId {
        self.font_id
    }

    /// Encode stamp text as a `Tj` operand.
    pub fn encode(&self, text: &str) -> Object {
        match &self.kind {
            PreparedKind::Embedded { glyphs } => {
                let mut bytes = Vec::with_capacity(text.chars().count() * 2);
                for ch in text.chars() {
                    let gid = glyphs.get(&ch).map(|&(gid, _)| gid).unwrap_or(0);
                    bytes.extend_from_slice(&gid.to_be_bytes());
                }
                Object::String(bytes, StringFormat::Hexadecimal)
            }
            PreparedKind::Helvetica => encode_latin(text),
        }
    }

    /// Rendered width of `text` at `size` points, for right-edge alignment.
    pub fn text_width(&self, text: &str, size: f64) -> f64 {
        let milli: u32 = match &self.kind {
            PreparedKind::Embedded { glyphs } => text
                .chars()
                .map(|ch| glyphs.get(&ch).map(|&(_, adv)| adv).unwrap_or(0))
                .sum(),
            PreparedKind::Helvetica => text
                .chars()
                .map(|ch| helvetica_advance(if ch.is_ascii() { ch } else { '?' }))
                .sum(),
        };
        f64::from(milli) / 1000.0 * size
    }
}

/// Embed `font` into `doc` covering exactly the characters in `used`.
pub(crate) fn embed(
    doc: &mut Document,
    font: &FontResource,
    used: &BTreeSet<char>,
) -> Result<PreparedFont> {
    let face = Face::parse(&font.data, 0).map_err(|_| Error::FontUnavailable)?;
    let units_per_em = i64::from(face.units_per_em().max(1));

    let mut glyphs: BTreeMap<char, (u16, u32)> = BTreeMap::new();
    let mut gid_widths: BTreeMap<u16, u32> = BTreeMap::new();
    let mut gid_chars: BTreeMap<u16, String> = BTreeMap::new();
    for &ch in used {
        let gid = face.glyph_index(ch).map(|g| g.0).unwrap_or(0);
        if gid == 0 {
            warn!("font {} has no glyph for {:?}", font.name, ch);
        }
        let advance = i64::from(face.glyph_hor_advance(GlyphId(gid)).unwrap_or(0));
        let width = ((advance * 1000 + units_per_em / 2) / units_per_em) as u32;
        glyphs.insert(ch, (gid, width));
        gid_widths.insert(gid, width);
        gid_chars.insert(gid, ch.to_string());
    }

    let font_file_id = doc.add_object(Object::Stream(Stream::new(
        dictionary! { "Length1" => font.data.len() as i64 },
        font.data.clone(),
    )));

    let m = &font.metrics;
    let descriptor_id = doc.add_object(dictionary! {
        "Type" => "FontDescriptor",
        "FontName" => Object::Name(font.name.clone().into_bytes()),
        "Flags" => 4,
        "FontBBox" => vec![
            m.bbox[0].into(),
            m.bbox[1].into(),
            m.bbox[2].into(),
            m.bbox[3].into(),
        ],
        "ItalicAngle" => m.italic_angle,
        "Ascent" => m.ascent,
        "Descent" => m.descent,
        "CapHeight" => m.cap_height,
        "StemV" => 80,
        "FontFile2" => Object::Reference(font_file_id),
    });

    let mut w_array: Vec<Object> = Vec::with_capacity(gid_widths.len() * 2);
    for (&gid, &width) in &gid_widths {
        w_array.push(i64::from(gid).into());
        w_array.push(vec![Object::from(i64::from(width))].into());
    }

    let cid_font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "CIDFontType2",
        "BaseFont" => Object::Name(font.name.clone().into_bytes()),
        "CIDSystemInfo" => dictionary! {
            "Registry" => Object::string_literal("Adobe"),
            "Ordering" => Object::string_literal("Identity"),
            "Supplement" => 0,
        },
        "FontDescriptor" => Object::Reference(descriptor_id),
        "DW" => 1000,
        "W" => w_array,
        "CIDToGIDMap" => "Identity",
    });

    let to_unicode_id = doc.add_object(Object::Stream(Stream::new(
        Dictionary::new(),
        to_unicode_cmap(&gid_chars).into_bytes(),
    )));

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type0",
        "BaseFont" => Object::Name(font.name.clone().into_bytes()),
        "Encoding" => "Identity-H",
        "DescendantFonts" => vec![Object::Reference(cid_font_id)],
        "ToUnicode" => Object::Reference(to_unicode_id),
    });

    Ok(PreparedFont {
        font_id,
        kind: PreparedKind::Embedded { glyphs },
    })
}

/// Add the built-in Helvetica as the stamping font.
///
/// Base-14 font, nothing to embed; non-ASCII stamp characters will not
/// render with it (they are replaced before encoding).
pub(crate) fn fallback(doc: &mut Document) -> PreparedFont {
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    PreparedFont {
        font_id,
        kind: PreparedKind::Helvetica,
    }
}

fn encode_latin(text: &str) -> Object {
    let bytes = text
        .chars()
        .map(|ch| if ch.is_ascii() { ch as u8 } else { b'?' })
        .collect();
    Object::String(bytes, StringFormat::Literal)
}

/// Standard Helvetica advance widths for the ASCII range, in thousandths
/// of an em.
fn helvetica_advance(ch: char) -> u32 {
    match ch {
        ' ' | '!' | ',' | '.' | '/' | ':' | ';' => 278,
        '"' => 355,
        '\'' => 191,
        '(' | ')' | '-' | '`' | '[' | ']' | '\\' => 333,
        '*' => 389,
        '+' | '<' | '=' | '>' | '~' | '^' => 584,
        '%' => 889,
        '&' => 667,
        '@' => 1015,
        '0'..='9' | '#' | '$' | '?' | '_' => 556,
        'A' | 'B' | 'E' | 'K' | 'P' | 'S' | 'V' | 'X' | 'Y' => 667,
        'C' | 'D' | 'H' | 'N' | 'R' | 'U' => 722,
        'F' | 'T' | 'Z' => 611,
        'G' | 'O' | 'Q' => 778,
        'I' => 278,
        'J' => 500,
        'L' => 556,
        'M' => 833,
        'W' => 944,
        'a' | 'b' | 'd' | 'e' | 'g' | 'h' | 'n' | 'o' | 'p' | 'q' | 'u' => 556,
        'c' | 'k' | 's' | 'v' | 'x' | 'y' | 'z' => 500,
        'f' | 't' => 278,
        'r' => 333,
        'i' | 'j' | 'l' => 222,
        'm' => 833,
        'w' => 722,
        '{' | '}' => 334,
        '|' => 260,
        _ => 556,
    }
}

/// ToUnicode CMap over the used glyphs, bfchar entries batched per the
/// CMap spec's 100-entry limit, surrogate pairs for characters beyond the
/// basic plane.
fn to_unicode_cmap(glyph_map: &BTreeMap<u16, String>) -> String {
    let entries: Vec<(u16, &String)> = glyph_map.iter().map(|(g, s)| (*g, s)).collect();

    let mut out = String::new();
    out.push_str("/CIDInit /ProcSet findresource begin\n");
    out.push_str("12 dict begin\n");
    out.push_str("begincmap\n");
    out.push_str("/CIDSystemInfo << /Registry (Adobe) /Ordering (Identity) /Supplement 0 >> def\n");
    out.push_str("/CMapName /Adobe-Identity-UCS def\n");
    out.push_str("/CMapType 2 def\n");
    out.push_str("1 begincodespacerange\n<0000> <FFFF>\nendcodespacerange\n");

    let mut idx = 0usize;
    while idx < entries.len() {
        let end = (idx + 100).min(entries.len());
        out.push_str(&format!("{} beginbfchar\n", end - idx));
        for (gid, text) in &entries[idx..end] {
            let mut uni = String::new();
            for ch in text.chars() {
                let code = ch as u32;
                if code <= 0xFFFF {
                    uni.push_str(&format!("{:04X}", code));
                } else {
                    let code = code - 0x1_0000;
                    let high = 0xD800 | (code >> 10);
                    let low = 0xDC00 | (code & 0x3FF);
                    uni.push_str(&format!("{:04X}{:04X}", high, low));
                }
            }
            out.push_str(&format!("<{:04X}> <{}>\n", gid, uni));
        }
        out.push_str("endbfchar\n");
        idx = end;
    }

    out.push_str("endcmap\n");
    out.push_str("CMapName currentdict /CMap defineresource pop\n");
    out.push_str("end\nend\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cmap_lists_used_glyphs() {
        let mut map = BTreeMap::new();
        map.insert(17u16, "附".to_owned());
        map.insert(42u16, "3".to_owned());
        let cmap = to_unicode_cmap(&map);
        assert!(cmap.contains("2 beginbfchar"));
        assert!(cmap.contains("<0011> <9644>"));
        assert!(cmap.contains("<002A> <0033>"));
    }

    #[test]
    fn cmap_encodes_supplementary_plane_as_surrogates() {
        let mut map = BTreeMap::new();
        map.insert(7u16, "\u{2070E}".to_owned());
        let cmap = to_unicode_cmap(&map);
        assert!(cmap.contains("<0007> <D841DF0E>"));
    }

    #[test]
    fn latin_encoding_replaces_non_ascii() {
        let encoded = encode_latin("附件3");
        assert_eq!(
            encoded,
            Object::String(b"??3".to_vec(), StringFormat::Literal)
        );
    }

    #[test]
    fn helvetica_digits_are_uniform() {
        for ch in '0'..='9' {
            assert_eq!(helvetica_advance(ch), 556);
        }
        assert_eq!(helvetica_advance(' '), 278);
    }

    #[test]
    fn sanitize_drops_reserved_characters() {
        assert_eq!(sanitize_name("Noto Sans TC"), "Noto-Sans-TC");
        assert_eq!(sanitize_name("()/<>"), "Embedded");
    }

    #[test]
    fn unparseable_font_is_unavailable() {
        let err = FontResource::parse(vec![0u8; 16]).unwrap_err();
        assert!(matches!(err, Error::FontUnavailable));
    }
}
