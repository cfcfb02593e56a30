//! Domain types for extracted images and catalog records.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One catalogued occurrence of an extracted image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    /// Perceptual fingerprint of the pixel content.
    pub fingerprint: String,

    /// Where the canonical copy was written. Only set on the canonical row.
    pub saved_path: Option<PathBuf>,

    /// Deck this occurrence was found in.
    pub source_deck: PathBuf,

    /// True for every occurrence after the first of a fingerprint.
    pub is_duplicate: bool,
}

impl ImageRecord {
    /// Record for the first occurrence of a fingerprint, owning the saved copy.
    pub fn canonical(
        fingerprint: impl Into<String>,
        saved_path: impl Into<PathBuf>,
        source_deck: impl Into<PathBuf>,
    ) -> Self {
        Self {
            fingerprint: fingerprint.into(),
            saved_path: Some(saved_path.into()),
            source_deck: source_deck.into(),
            is_duplicate: false,
        }
    }

    /// Record for a repeated occurrence. Duplicates never own a saved path.
    pub fn duplicate(fingerprint: impl Into<String>, source_deck: impl Into<PathBuf>) -> Self {
        Self {
            fingerprint: fingerprint.into(),
            saved_path: None,
            source_deck: source_deck.into(),
            is_duplicate: true,
        }
    }

    /// Whether this record and `other` describe the same catalog row.
    pub fn same_row(&self, other: &ImageRecord) -> bool {
        self.fingerprint == other.fingerprint && self.source_deck == other.source_deck
    }

    /// Fold an incoming version of this row into the stored one.
    ///
    /// A null incoming path never clobbers a stored one, and a canonical row
    /// stays canonical: only the maintenance pass demotes rows.
    pub fn merge(&mut self, incoming: &ImageRecord) {
        if incoming.saved_path.is_some() {
            self.saved_path = incoming.saved_path.clone();
        }
        self.is_duplicate = self.is_duplicate && incoming.is_duplicate;
    }
}

/// Raw picture bytes pulled out of a deck, with where they came from.
#[derive(Debug, Clone)]
pub struct ExtractedImage {
    /// The embedded media part, untouched.
    pub bytes: Vec<u8>,

    /// Zero-based slide index in presentation order.
    pub slide_index: usize,

    /// Zero-based index among the slide's top-level shapes.
    pub shape_index: usize,

    /// Deck the picture belongs to.
    pub deck_path: PathBuf,
}

impl ExtractedImage {
    /// Deterministic file name for the canonical copy of this image.
    ///
    /// `{deck stem}_{slide#}_{shape#}.{ext}` with one-based slide and shape numbers.
    pub fn output_file_name(&self, extension: &str) -> String {
        format!(
            "{}_{}_{}.{}",
            deck_stem(&self.deck_path),
            self.slide_index + 1,
            self.shape_index + 1,
            extension
        )
    }

    /// Human-readable location used in log lines.
    pub fn location(&self) -> String {
        format!(
            "{} (slide {}, shape {})",
            self.deck_path.display(),
            self.slide_index + 1,
            self.shape_index + 1
        )
    }
}

fn deck_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "deck".to_string())
}

/// Slide canvas size in EMU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlideSize {
    pub width: i64,
    pub height: i64,
}

impl SlideSize {
    pub fn new(width: i64, height: i64) -> Self {
        Self { width, height }
    }
}

impl Default for SlideSize {
    /// PowerPoint's default 4:3 canvas, used when the package omits `p:sldSz`.
    fn default() -> Self {
        Self::new(9_144_000, 6_858_000)
    }
}

/// Default tolerance of the size-compatibility check, in EMU.
pub const DEFAULT_SIZE_TOLERANCE: i64 = 500;

/// Decides whether a picture is large enough to be a slide background.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizePolicy {
    /// Maximum absolute difference (exclusive) per axis for a near-full-bleed picture.
    pub tolerance: i64,
}

impl SizePolicy {
    /// Create a policy with the default tolerance.
    pub fn new() -> Self {
        Self {
            tolerance: DEFAULT_SIZE_TOLERANCE,
        }
    }

    /// Set the per-axis tolerance.
    pub fn with_tolerance(mut self, tolerance: i64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Accept a `width`×`height` picture on `slide` if it nearly matches the
    /// canvas on both axes, or covers it entirely.
    pub fn accepts(&self, width: i64, height: i64, slide: SlideSize) -> bool {
        let near = (width - slide.width).abs() < self.tolerance
            && (height - slide.height).abs() < self.tolerance;
        let covers = width >= slide.width && height >= slide.height;
        near || covers
    }
}

impl Default for SizePolicy {
    fn default() -> Self {
        Self::new()
    }
}

/// What the dedup engine did with one extracted image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// First occurrence: the image was written and catalogued as canonical.
    Saved {
        fingerprint: String,
        path: PathBuf,
    },
    /// The fingerprint was already known; only the occurrence was catalogued.
    Duplicate { fingerprint: String },
    /// Decoding, conversion, hashing or writing failed for this image.
    Failed { reason: String },
}

impl Outcome {
    pub fn is_saved(&self) -> bool {
        matches!(self, Outcome::Saved { .. })
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, Outcome::Duplicate { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed { .. })
    }
}
