//! Bundle a main document and labeled groups of supplementary PDFs into
//! one output file.
//!
//! Supplementary files ("附件" attachments and "證物" evidence) are
//! stamped with a generated corner label on their first page and a
//! running `第 n 頁 共 N 頁` caption on every page, optionally padded to
//! an even page count for duplex printing, and concatenated after the
//! main document:
//!
//! ```no_run
//! use bundle_pdf::{BundleSession, SourceFile};
//!
//! fn main() -> bundle_pdf::Result<()> {
//!     let mut session = BundleSession::new();
//!     session.main = Some(SourceFile::new("main.pdf", std::fs::read("main.pdf")?));
//!     session
//!         .attachments
//!         .push(SourceFile::new("a.pdf", std::fs::read("a.pdf")?));
//!     session.load_font(&bundle_pdf::FileFontProvider("NotoSansTC.ttf".into()));
//!
//!     let merged = session.assemble()?;
//!     std::fs::write("bundle.pdf", merged.bytes())?;
//!     Ok(())
//! }
//! ```

mod error;
mod font;
mod merge;
mod plan;
mod stamp;

pub use error::{Error, Result};
pub use font::{FileFontProvider, FontProvider, FontResource, StaticFontProvider};
pub use lopdf;
pub use plan::{caption_text, label_text};

use log::{debug, info, warn};
use lopdf::Document;

use crate::merge::MergePart;
use crate::plan::GroupInput;

/// Default label prefix for the attachment group.
pub const ATTACHMENT_PREFIX: &str = "附件";
/// Default label prefix for the evidence group.
pub const EVIDENCE_PREFIX: &str = "證物";

/// Supported label size range, in points.
pub const LABEL_SIZE_MIN: f64 = 10.0;
pub const LABEL_SIZE_MAX: f64 = 30.0;

/// One input PDF: a display name and its raw bytes.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    pub data: Vec<u8>,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
        SourceFile {
            name: name.into(),
            data,
        }
    }
}

/// An ordered group of supplementary files sharing a label prefix.
#[derive(Debug, Clone)]
pub struct FileGroup {
    /// Prefix the generated labels start with, e.g. `附件`.
    pub label_prefix: String,
    /// First label number; lets a numbering sequence continue across
    /// assembly runs. Always at least 1.
    pub start_index: u32,
    pub files: Vec<SourceFile>,
}

impl FileGroup {
    pub fn new(label_prefix: impl Into<String>) -> Self {
        FileGroup {
            label_prefix: label_prefix.into(),
            start_index: 1,
            files: Vec::new(),
        }
    }

    pub fn with_start_index(mut self, start_index: u32) -> Self {
        self.start_index = start_index.max(1);
        self
    }

    pub fn push(&mut self, file: SourceFile) {
        self.files.push(file);
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// What to do when stamping is required but no font resource is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FontFallback {
    /// Fail with [`Error::FontUnavailable`] if the stamp text needs
    /// glyphs outside the ASCII range. The default: silently corrupting
    /// CJK labels helps nobody.
    #[default]
    Deny,
    /// Stamp with the built-in Helvetica; non-Latin characters are
    /// replaced and a warning is logged.
    Latin,
}

/// Formatting options for one assembly run.
#[derive(Debug, Clone)]
pub struct BundleOptions {
    /// Label size in points, valid within 10–30.
    pub label_size_pt: f64,
    /// Pad odd-page-count files with a trailing blank page so the next
    /// file starts on a front-facing sheet under duplex printing.
    pub pad_for_duplex: bool,
    pub fallback: FontFallback,
}

impl Default for BundleOptions {
    fn default() -> Self {
        BundleOptions {
            label_size_pt: 14.0,
            pad_for_duplex: true,
            fallback: FontFallback::default(),
        }
    }
}

/// Everything one assembly run needs, as one explicit value.
///
/// The session is plain data: groups, an optional font and options. It
/// owns no UI state and can be built directly in tests.
pub struct BundleSession {
    /// The main document; copied verbatim, never stamped.
    pub main: Option<SourceFile>,
    pub attachments: FileGroup,
    pub evidence: FileGroup,
    pub font: Option<FontResource>,
    pub options: BundleOptions,
}

impl Default for BundleSession {
    fn default() -> Self {
        Self::new()
    }
}

impl BundleSession {
    pub fn new() -> Self {
        BundleSession {
            main: None,
            attachments: FileGroup::new(ATTACHMENT_PREFIX),
            evidence: FileGroup::new(EVIDENCE_PREFIX),
            font: None,
            options: BundleOptions::default(),
        }
    }

    /// Ask `provider` for a font once and keep the result on the session.
    ///
    /// Provider failure and unusable font data both degrade to no-font
    /// mode with a warning; whether assembly may then proceed is decided
    /// by [`BundleOptions::fallback`].
    pub fn load_font(&mut self, provider: &dyn FontProvider) {
        match provider.fetch() {
            Some(data) => match FontResource::parse(data) {
                Ok(font) => {
                    debug!("using font {}", font.name());
                    self.font = Some(font);
                }
                Err(_) => warn!("font provider returned an unusable font; continuing without one"),
            },
            None => warn!("font provider reported no font available; continuing without one"),
        }
    }

    /// Assemble the bundle: main pages first, then each attachment, then
    /// each evidence file, stamped and padded per the options.
    ///
    /// All-or-nothing: any malformed source aborts the run and no output
    /// is produced.
    pub fn assemble(&self) -> Result<MergedPdf> {
        if self.main.is_none() && self.attachments.is_empty() && self.evidence.is_empty() {
            return Err(Error::EmptyInput);
        }
        let label_size = self.options.label_size_pt;
        if !(LABEL_SIZE_MIN..=LABEL_SIZE_MAX).contains(&label_size) {
            return Err(Error::FontSizeOutOfRange(label_size));
        }

        // Load every source up front; a malformed file must abort before
        // any output can exist.
        let main_doc = self.main.as_ref().map(load_source).transpose()?;
        let attachment_docs = load_group(&self.attachments)?;
        let evidence_docs = load_group(&self.evidence)?;

        let main_input = self
            .main
            .as_ref()
            .zip(main_doc.as_ref())
            .map(|(file, doc)| (file.name.as_str(), doc.get_pages().len() as u32));
        let group_inputs = [
            group_input(&self.attachments, &attachment_docs),
            group_input(&self.evidence, &evidence_docs),
        ];
        let plan = plan::build(main_input, &group_inputs, self.options.pad_for_duplex);

        let mut documents: Vec<Document> = Vec::new();
        documents.extend(main_doc);
        documents.extend(attachment_docs);
        documents.extend(evidence_docs);

        let mut parts = Vec::with_capacity(documents.len());
        for (mut document, part) in documents.into_iter().zip(&plan.parts) {
            if part.padded {
                merge::append_blank_page(&mut document)?;
                debug!("padded {:?} to an even page count", part.title);
            }
            parts.push(MergePart {
                title: part.title.clone(),
                document,
            });
        }

        let mut merged = merge::concat_documents(parts)?;

        if plan.has_stamps() {
            let prepared = match (&self.font, self.options.fallback) {
                (Some(font), _) => font::embed(&mut merged, font, &plan.stamp_chars())?,
                (None, FontFallback::Latin) => {
                    if plan.needs_non_latin() {
                        warn!(
                            "no font resource; Helvetica fallback cannot render the non-Latin stamp text"
                        );
                    }
                    font::fallback(&mut merged)
                }
                (None, FontFallback::Deny) => {
                    if plan.needs_non_latin() {
                        return Err(Error::FontUnavailable);
                    }
                    font::fallback(&mut merged)
                }
            };
            stamp::apply_stamps(&mut merged, &plan, &prepared, label_size)?;
        }

        let page_count = merged.get_pages().len() as u32;
        let mut bytes = Vec::new();
        merged.save_to(&mut bytes)?;
        info!(
            "bundled {} files into {} pages ({} bytes)",
            plan.parts.len(),
            page_count,
            bytes.len()
        );

        Ok(MergedPdf { bytes, page_count })
    }
}

/// The assembled output document.
///
/// A transient artifact held for preview or download; nothing is
/// persisted by this crate.
#[derive(Debug, Clone)]
pub struct MergedPdf {
    bytes: Vec<u8>,
    page_count: u32,
}

impl MergedPdf {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

fn load_source(file: &SourceFile) -> Result<Document> {
    let document = Document::load_mem(&file.data).map_err(|source| Error::MalformedSource {
        name: file.name.clone(),
        source,
    })?;
    debug!("loaded {:?}: {} pages", file.name, document.get_pages().len());
    Ok(document)
}

fn load_group(group: &FileGroup) -> Result<Vec<Document>> {
    group.files.iter().map(load_source).collect()
}

fn group_input<'a>(group: &'a FileGroup, documents: &[Document]) -> GroupInput<'a> {
    GroupInput {
        prefix: &group.label_prefix,
        start_index: group.start_index,
        files: group
            .files
            .iter()
            .zip(documents)
            .map(|(file, doc)| (file.name.as_str(), doc.get_pages().len() as u32))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_defaults() {
        let session = BundleSession::new();
        assert_eq!(session.attachments.label_prefix, "附件");
        assert_eq!(session.evidence.label_prefix, "證物");
        assert_eq!(session.attachments.start_index, 1);
        assert!(session.options.pad_for_duplex);
        assert_eq!(session.options.fallback, FontFallback::Deny);
    }

    #[test]
    fn empty_session_is_rejected() {
        let err = BundleSession::new().assemble().unwrap_err();
        assert!(matches!(err, Error::EmptyInput));
    }

    #[test]
    fn label_size_is_validated() {
        let mut session = BundleSession::new();
        session
            .attachments
            .push(SourceFile::new("a.pdf", b"garbage".to_vec()));
        session.options.label_size_pt = 9.0;
        let err = session.assemble().unwrap_err();
        assert!(matches!(err, Error::FontSizeOutOfRange(_)));
    }

    #[test]
    fn start_index_never_drops_below_one() {
        let group = FileGroup::new("附件").with_start_index(0);
        assert_eq!(group.start_index, 1);
    }

    struct NoFont;
    impl FontProvider for NoFont {
        fn fetch(&self) -> Option<Vec<u8>> {
            None
        }
    }

    #[test]
    fn failed_provider_leaves_session_fontless() {
        let mut session = BundleSession::new();
        session.load_font(&NoFont);
        assert!(session.font.is_none());
    }

    #[test]
    fn unusable_font_data_leaves_session_fontless() {
        let mut session = BundleSession::new();
        session.load_font(&StaticFontProvider(vec![0u8; 8]));
        assert!(session.font.is_none());
    }
}
