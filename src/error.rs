//! Error types for bundle_pdf.

use thiserror::Error;

/// Result type alias for bundling operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while assembling a bundle.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error while a caller reads source files into a session.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No group contains a file, so there is nothing to assemble.
    #[error("nothing to bundle: no group contains a file")]
    EmptyInput,

    /// The stamp text needs glyphs no available font can supply.
    #[error("no usable font for non-Latin stamp text")]
    FontUnavailable,

    /// The label size is outside the supported range.
    #[error("label size {0}pt is outside the supported 10-30pt range")]
    FontSizeOutOfRange(f64),

    /// A source buffer could not be loaded as a PDF. Aborts the whole run.
    #[error("source file {name:?} is not a valid PDF: {source}")]
    MalformedSource {
        name: String,
        source: lopdf::Error,
    },

    /// The merged document ended up structurally unusable.
    #[error("corrupt document structure: {0}")]
    Corrupt(String),

    /// A PDF operation failed while stamping or serializing.
    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        assert_eq!(
            Error::EmptyInput.to_string(),
            "nothing to bundle: no group contains a file"
        );
        assert_eq!(
            Error::FontSizeOutOfRange(42.0).to_string(),
            "label size 42pt is outside the supported 10-30pt range"
        );
    }

    #[test]
    fn malformed_source_names_the_file() {
        let source = lopdf::Document::load_mem(b"not a pdf").unwrap_err();
        let err = Error::MalformedSource {
            name: "broken.pdf".to_owned(),
            source,
        };
        assert!(err.to_string().contains("broken.pdf"));
    }
}
