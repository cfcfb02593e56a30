//! Core domain types, format normalization, and perceptual fingerprints
//! for cataloguing background images found in PowerPoint decks.

pub mod error;
pub mod fingerprint;
pub mod normalize;
pub mod types;

pub use error::{Error, Result};
pub use fingerprint::Fingerprinter;
pub use normalize::{FormatNormalizer, MagickRasterizer, NormalizedImage, Rasterizer, SourceFormat};
pub use types::{ExtractedImage, ImageRecord, Outcome, SizePolicy, SlideSize, DEFAULT_SIZE_TOLERANCE};
