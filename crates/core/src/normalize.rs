//! Format normalization for embedded picture blobs.
//!
//! Sniffs the real format from magic bytes, rasterizes legacy Windows
//! metafiles through an external program, decodes everything else directly,
//! and picks the format the canonical copy is written in.

use crate::{Error, Result};
use image::{DynamicImage, ImageFormat};
use std::fmt;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Placeable WMF header key.
const PLACEABLE_WMF_MAGIC: [u8; 4] = [0xD7, 0xCD, 0xC6, 0x9A];

/// EMF signature, stored at byte 40 of the header record.
const EMF_SIGNATURE: &[u8; 4] = b" EMF";

/// The format of an embedded picture, as sniffed from its bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    /// Anything the `image` crate recognizes.
    Bitmap(ImageFormat),
    /// Windows Metafile, placeable or standard.
    Wmf,
    /// Enhanced Metafile.
    Emf,
}

impl SourceFormat {
    /// Detect format from magic bytes.
    pub fn from_magic(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(&PLACEABLE_WMF_MAGIC) {
            return Some(Self::Wmf);
        }

        // Standard WMF header: type 1 (memory) or 2 (disk), header size 9 words
        if bytes.len() >= 4 && matches!(bytes[0], 1 | 2) && bytes[1..4] == [0x00, 0x09, 0x00] {
            return Some(Self::Wmf);
        }

        // EMF header record type is 1
        if bytes.len() >= 44 && bytes[0..4] == [0x01, 0x00, 0x00, 0x00] && &bytes[40..44] == EMF_SIGNATURE {
            return Some(Self::Emf);
        }

        image::guess_format(bytes).ok().map(Self::Bitmap)
    }

    /// Whether this is a vector metafile that needs rasterizing.
    pub fn is_metafile(&self) -> bool {
        matches!(self, Self::Wmf | Self::Emf)
    }

    fn metafile_extension(&self) -> &'static str {
        match self {
            Self::Emf => "emf",
            _ => "wmf",
        }
    }
}

/// Converts a metafile on disk into a PNG on disk.
pub trait Rasterizer {
    fn rasterize(&self, input: &Path, output: &Path) -> Result<()>;
}

/// Rasterizer backed by ImageMagick (`magick` or the older `convert`).
#[derive(Debug, Clone)]
pub struct MagickRasterizer {
    program: PathBuf,
}

impl MagickRasterizer {
    /// Use the given program.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Look for ImageMagick on `PATH`.
    pub fn locate() -> Option<Self> {
        which::which("magick")
            .or_else(|_| which::which("convert"))
            .ok()
            .map(Self::new)
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl Rasterizer for MagickRasterizer {
    fn rasterize(&self, input: &Path, output: &Path) -> Result<()> {
        let result = Command::new(&self.program)
            .arg(input)
            .arg(output)
            .output()
            .map_err(|e| {
                Error::ConversionError(format!(
                    "Failed to run {}: {}",
                    self.program.display(),
                    e
                ))
            })?;

        if !result.status.success() {
            return Err(Error::ConversionError(format!(
                "{} exited with {}: {}",
                self.program.display(),
                result.status,
                String::from_utf8_lossy(&result.stderr).trim()
            )));
        }

        Ok(())
    }
}

/// A decoded picture together with the format its canonical copy uses.
#[derive(Debug, Clone)]
pub struct NormalizedImage {
    /// Decoded pixels, already converted for the target format.
    pub image: DynamicImage,

    /// What the blob was before normalization.
    pub source: SourceFormat,

    /// Format the image will be encoded as.
    pub format: ImageFormat,
}

impl NormalizedImage {
    /// File extension for the canonical copy.
    pub fn extension(&self) -> &'static str {
        extension_for(self.format)
    }

    /// Encode the image in its target format.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buffer = Cursor::new(Vec::new());
        self.image
            .write_to(&mut buffer, self.format)
            .map_err(|e| Error::OutputError(format!("Failed to encode {:?}: {}", self.format, e)))?;
        Ok(buffer.into_inner())
    }
}

/// Turns raw picture blobs into decoded images ready to hash and save.
pub struct FormatNormalizer {
    rasterizer: Option<Box<dyn Rasterizer>>,
}

impl FormatNormalizer {
    /// Create a normalizer using ImageMagick if it can be found.
    pub fn new() -> Self {
        let rasterizer = MagickRasterizer::locate();
        match &rasterizer {
            Some(r) => log::debug!("Using rasterizer {}", r.program().display()),
            None => log::debug!("No metafile rasterizer found on PATH"),
        }
        Self {
            rasterizer: rasterizer.map(|r| Box::new(r) as Box<dyn Rasterizer>),
        }
    }

    /// Create a normalizer that cannot convert metafiles.
    pub fn without_rasterizer() -> Self {
        Self { rasterizer: None }
    }

    /// Use a specific rasterizer for metafiles.
    pub fn with_rasterizer(mut self, rasterizer: impl Rasterizer + 'static) -> Self {
        self.rasterizer = Some(Box::new(rasterizer));
        self
    }

    /// Whether metafiles can be converted.
    pub fn can_rasterize(&self) -> bool {
        self.rasterizer.is_some()
    }

    /// Decode a blob, rasterizing metafiles, and prepare it for saving.
    pub fn normalize(&self, bytes: &[u8]) -> Result<NormalizedImage> {
        let source = SourceFormat::from_magic(bytes)
            .ok_or_else(|| Error::UnsupportedFormat("unrecognized image data".to_string()))?;

        let (image, format) = match source {
            SourceFormat::Bitmap(format) => {
                let image = image::load_from_memory_with_format(bytes, format)
                    .map_err(|e| Error::DecodeError(format!("{:?}: {}", format, e)))?;
                (image, target_format(format))
            }
            SourceFormat::Wmf | SourceFormat::Emf => {
                (self.rasterize_metafile(bytes, source)?, ImageFormat::Png)
            }
        };

        Ok(NormalizedImage {
            image: prepare_for_sink(image, format),
            source,
            format,
        })
    }

    fn rasterize_metafile(&self, bytes: &[u8], source: SourceFormat) -> Result<DynamicImage> {
        let rasterizer = self.rasterizer.as_ref().ok_or_else(|| {
            Error::ConversionError("No rasterizer available for metafile".to_string())
        })?;

        let workdir = tempfile::tempdir()
            .map_err(|e| Error::ConversionError(format!("Failed to create temp dir: {}", e)))?;
        let input = workdir
            .path()
            .join(format!("source.{}", source.metafile_extension()));
        let output = workdir.path().join("raster.png");

        std::fs::write(&input, bytes)
            .map_err(|e| Error::ConversionError(format!("Failed to stage metafile: {}", e)))?;
        rasterizer.rasterize(&input, &output)?;

        let png = std::fs::read(&output)
            .map_err(|e| Error::ConversionError(format!("Rasterizer produced no output: {}", e)))?;
        let image = image::load_from_memory_with_format(&png, ImageFormat::Png)
            .map_err(|e| Error::ConversionError(format!("Rasterized output is unreadable: {}", e)))?;

        if let Err(e) = workdir.close() {
            log::warn!("Failed to remove metafile temporaries: {}", e);
        }

        Ok(image)
    }
}

impl Default for FormatNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FormatNormalizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormatNormalizer")
            .field("can_rasterize", &self.can_rasterize())
            .finish()
    }
}

/// Keep formats we can write back, fall back to PNG for the rest.
fn target_format(source: ImageFormat) -> ImageFormat {
    match source {
        ImageFormat::Jpeg
        | ImageFormat::Png
        | ImageFormat::Gif
        | ImageFormat::Bmp
        | ImageFormat::Tiff
        | ImageFormat::WebP => source,
        _ => ImageFormat::Png,
    }
}

fn extension_for(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Jpeg => "jpg",
        ImageFormat::Gif => "gif",
        ImageFormat::Bmp => "bmp",
        ImageFormat::Tiff => "tiff",
        ImageFormat::WebP => "webp",
        _ => "png",
    }
}

/// Convert pixel layouts the target encoder cannot take.
///
/// JPEG is a 3-channel sink: alpha, palette-expanded and 16-bit images become RGB8.
fn prepare_for_sink(image: DynamicImage, format: ImageFormat) -> DynamicImage {
    match format {
        ImageFormat::Jpeg => match image {
            DynamicImage::ImageRgb8(_) | DynamicImage::ImageLuma8(_) => image,
            other => DynamicImage::ImageRgb8(other.to_rgb8()),
        },
        ImageFormat::Gif => match image {
            DynamicImage::ImageRgba8(_) => image,
            other => DynamicImage::ImageRgba8(other.to_rgba8()),
        },
        ImageFormat::WebP => match image {
            DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_) => image,
            other if other.color().has_alpha() => DynamicImage::ImageRgba8(other.to_rgba8()),
            other => DynamicImage::ImageRgb8(other.to_rgb8()),
        },
        ImageFormat::Bmp => match image {
            DynamicImage::ImageRgb8(_)
            | DynamicImage::ImageRgba8(_)
            | DynamicImage::ImageLuma8(_)
            | DynamicImage::ImageLumaA8(_) => image,
            other if other.color().has_alpha() => DynamicImage::ImageRgba8(other.to_rgba8()),
            other => DynamicImage::ImageRgb8(other.to_rgb8()),
        },
        _ => image,
    }
}
