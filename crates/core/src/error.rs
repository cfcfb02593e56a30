//! Error types for background image cataloguing.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while extracting, normalizing and cataloguing images.
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to open or read an input file.
    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    /// The file format is not supported or could not be detected.
    #[error("Unsupported or unrecognized file format: {0}")]
    UnsupportedFormat(String),

    /// Failed to parse the PPTX package structure.
    #[error("PPTX parsing error: {0}")]
    PptxParseError(String),

    /// ZIP archive error (for PPTX).
    #[error("ZIP error: {0}")]
    ZipError(String),

    /// XML parsing error (for PPTX).
    #[error("XML parsing error: {0}")]
    XmlError(String),

    /// An embedded image blob could not be decoded.
    #[error("Image decode error: {0}")]
    DecodeError(String),

    /// A legacy metafile could not be rasterized.
    #[error("Metafile conversion error: {0}")]
    ConversionError(String),

    /// The normalized image could not be written to the destination.
    #[error("Output error: {0}")]
    OutputError(String),

    /// The catalog store could not be opened, read or written.
    #[error("Catalog store error: {0}")]
    StoreError(String),
}

impl Error {
    /// Whether this error must abort a cataloguing run.
    ///
    /// Only store failures are fatal: without a ledger there is nothing to
    /// record outcomes in. Everything else is recovered per image or per deck.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::StoreError(_))
    }
}
