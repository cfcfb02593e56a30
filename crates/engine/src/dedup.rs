//! Fingerprinting and duplicate classification of extracted images.

use bgimg_catalog::CatalogStore;
use bgimg_core::{Error, ExtractedImage, Fingerprinter, FormatNormalizer, ImageRecord, Outcome, Result};
use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Default destination for canonical copies.
pub const DEFAULT_DEST_DIR: &str = "extracted_images";

/// Options for a dedup run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Directory canonical copies are written to.
    pub dest_dir: PathBuf,
}

impl EngineConfig {
    pub fn new(dest_dir: impl Into<PathBuf>) -> Self {
        Self {
            dest_dir: dest_dir.into(),
        }
    }

    pub fn with_dest_dir(mut self, dest_dir: impl Into<PathBuf>) -> Self {
        self.dest_dir = dest_dir.into();
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new(DEFAULT_DEST_DIR)
    }
}

/// Classifies extracted images as new or duplicate and records them.
///
/// Known fingerprints are seeded from the store when the engine is built and
/// grow as images are saved, so a re-run over the same decks saves nothing.
pub struct DedupEngine<'a, S: CatalogStore + ?Sized> {
    store: &'a mut S,
    known: HashSet<String>,
    normalizer: FormatNormalizer,
    hasher: Fingerprinter,
    config: EngineConfig,
}

impl<'a, S: CatalogStore + ?Sized> DedupEngine<'a, S> {
    pub fn new(store: &'a mut S, normalizer: FormatNormalizer, config: EngineConfig) -> Result<Self> {
        let known = store.known_fingerprints()?;
        log::debug!("Catalog already knows {} unique images", known.len());
        Ok(Self {
            store,
            known,
            normalizer,
            hasher: Fingerprinter::new(),
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Number of fingerprints currently treated as already saved.
    pub fn known_count(&self) -> usize {
        self.known.len()
    }

    /// Handle one extracted image.
    ///
    /// Only catalog failures come back as `Err`; anything wrong with the image
    /// itself is reported as [`Outcome::Failed`].
    pub fn process(&mut self, image: &ExtractedImage) -> Result<Outcome> {
        let normalized = match self.normalizer.normalize(&image.bytes) {
            Ok(normalized) => normalized,
            Err(e) => return Ok(failed(image, e)),
        };
        let fingerprint = self.hasher.fingerprint(&normalized.image);

        if self.known.contains(&fingerprint) {
            log::debug!("Duplicate {} at {}", fingerprint, image.location());
            self.store
                .upsert(&ImageRecord::duplicate(fingerprint.as_str(), &image.deck_path))?;
            return Ok(Outcome::Duplicate { fingerprint });
        }

        let file_name = image.output_file_name(normalized.extension());
        let path = match normalized
            .encode()
            .and_then(|bytes| write_new(&self.config.dest_dir, &file_name, &bytes))
        {
            Ok(path) => path,
            Err(e) => return Ok(failed(image, e)),
        };

        self.known.insert(fingerprint.clone());
        self.store
            .upsert(&ImageRecord::canonical(fingerprint.as_str(), &path, &image.deck_path))?;
        log::info!("Saved {} as {}", image.location(), path.display());

        Ok(Outcome::Saved { fingerprint, path })
    }

    /// Handle a batch, stopping only on catalog failures.
    pub fn process_all(&mut self, images: &[ExtractedImage]) -> Result<Vec<Outcome>> {
        images.iter().map(|image| self.process(image)).collect()
    }
}

fn failed(image: &ExtractedImage, error: Error) -> Outcome {
    log::error!("Failed to process {}: {}", image.location(), error);
    Outcome::Failed {
        reason: error.to_string(),
    }
}

/// Write `bytes` into `dir` under `file_name`, never replacing an existing file.
///
/// Decks with the same name in different folders produce the same file name,
/// so a taken name gets a numeric suffix (`deck_1_1_2.png`, `deck_1_1_3.png`, ...).
/// Returns the path actually written.
fn write_new(dir: &Path, file_name: &str, bytes: &[u8]) -> Result<PathBuf> {
    let mut staging = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| Error::OutputError(format!("Failed to stage {}: {}", file_name, e)))?;
    staging
        .write_all(bytes)
        .map_err(|e| Error::OutputError(format!("Failed to write {}: {}", file_name, e)))?;

    let name = Path::new(file_name);
    let stem = name.file_stem().unwrap_or_default().to_string_lossy();
    let extension = name.extension().unwrap_or_default().to_string_lossy();

    let mut candidate = dir.join(file_name);
    let mut suffix = 1;
    loop {
        match staging.persist_noclobber(&candidate) {
            Ok(_) => return Ok(candidate),
            Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => {
                log::debug!("{} is taken", candidate.display());
                staging = e.file;
                suffix += 1;
                candidate = dir.join(format!("{}_{}.{}", stem, suffix, extension));
            }
            Err(e) => {
                return Err(Error::OutputError(format!(
                    "Failed to save {}: {}",
                    candidate.display(),
                    e.error
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bgimg_catalog::SqliteCatalog;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    /// Half dark, half light, split down the middle or across it.
    fn png_bytes(vertical_split: bool) -> Vec<u8> {
        let image = DynamicImage::ImageRgb8(RgbImage::from_fn(64, 36, |x, y| {
            let dark = if vertical_split { x < 32 } else { y < 18 };
            if dark {
                Rgb([20, 20, 20])
            } else {
                Rgb([240, 240, 240])
            }
        }));
        let mut buffer = Cursor::new(Vec::new());
        image.write_to(&mut buffer, ImageFormat::Png).unwrap();
        buffer.into_inner()
    }

    fn extracted(bytes: Vec<u8>, deck: &str, slide: usize, shape: usize) -> ExtractedImage {
        ExtractedImage {
            bytes,
            slide_index: slide,
            shape_index: shape,
            deck_path: PathBuf::from(deck),
        }
    }

    #[test]
    fn test_first_occurrence_saved_then_duplicate() {
        let dest = tempfile::tempdir().unwrap();
        let mut store = SqliteCatalog::open_in_memory().unwrap();
        let mut engine = DedupEngine::new(
            &mut store,
            FormatNormalizer::without_rasterizer(),
            EngineConfig::new(dest.path()),
        )
        .unwrap();

        let first = engine.process(&extracted(png_bytes(true), "/decks/deckA.pptx", 0, 0)).unwrap();
        let path = match &first {
            Outcome::Saved { path, .. } => path.clone(),
            other => panic!("expected Saved, got {:?}", other),
        };
        assert_eq!(path, dest.path().join("deckA_1_1.png"));
        assert!(path.exists());

        let second = engine.process(&extracted(png_bytes(true), "/decks/deckB.pptx", 2, 4)).unwrap();
        assert!(second.is_duplicate());
        assert!(!dest.path().join("deckB_3_5.png").exists());
        assert_eq!(engine.known_count(), 1);

        let records = store.records().unwrap();
        assert_eq!(records.len(), 2);
        assert!(!records[0].is_duplicate);
        assert!(records[1].is_duplicate && records[1].saved_path.is_none());
    }

    #[test]
    fn test_corrupt_image_is_isolated() {
        let dest = tempfile::tempdir().unwrap();
        let mut store = SqliteCatalog::open_in_memory().unwrap();
        let mut engine = DedupEngine::new(
            &mut store,
            FormatNormalizer::without_rasterizer(),
            EngineConfig::new(dest.path()),
        )
        .unwrap();

        let mut corrupt = png_bytes(false);
        corrupt.truncate(40);
        let batch = vec![
            extracted(png_bytes(true), "/decks/a.pptx", 0, 0),
            extracted(corrupt, "/decks/a.pptx", 1, 0),
            extracted(png_bytes(false), "/decks/a.pptx", 2, 0),
        ];

        let outcomes = engine.process_all(&batch).unwrap();
        assert_eq!(outcomes.iter().filter(|o| o.is_failed()).count(), 1);
        assert!(outcomes[1].is_failed());
        assert_eq!(outcomes.iter().filter(|o| !o.is_failed()).count(), 2);
        assert_eq!(store.records().unwrap().len(), 2);
    }

    #[test]
    fn test_metafile_without_rasterizer_fails_softly() {
        let dest = tempfile::tempdir().unwrap();
        let mut store = SqliteCatalog::open_in_memory().unwrap();
        let mut engine = DedupEngine::new(
            &mut store,
            FormatNormalizer::without_rasterizer(),
            EngineConfig::new(dest.path()),
        )
        .unwrap();

        let mut wmf = vec![0xD7, 0xCD, 0xC6, 0x9A];
        wmf.extend_from_slice(&[0u8; 40]);
        let outcome = engine.process(&extracted(wmf, "/decks/a.pptx", 0, 0)).unwrap();
        match outcome {
            Outcome::Failed { reason } => assert!(reason.contains("rasterizer"), "{}", reason),
            other => panic!("expected Failed, got {:?}", other),
        }
    }

    #[test]
    fn test_seeded_from_store() {
        let dest = tempfile::tempdir().unwrap();
        let mut store = SqliteCatalog::open_in_memory().unwrap();
        let fingerprint = Fingerprinter::new().fingerprint(&image::load_from_memory(&png_bytes(true)).unwrap());
        store
            .upsert(&ImageRecord::canonical(fingerprint.as_str(), "/old/a_1_1.png", "/decks/a.pptx"))
            .unwrap();

        let mut engine = DedupEngine::new(
            &mut store,
            FormatNormalizer::without_rasterizer(),
            EngineConfig::new(dest.path()),
        )
        .unwrap();
        let outcome = engine.process(&extracted(png_bytes(true), "/decks/a.pptx", 0, 0)).unwrap();
        assert_eq!(outcome, Outcome::Duplicate { fingerprint });

        // The canonical row keeps its path and flag
        let records = store.records().unwrap();
        assert_eq!(records.len(), 1);
        assert!(!records[0].is_duplicate);
        assert_eq!(records[0].saved_path, Some(PathBuf::from("/old/a_1_1.png")));
    }

    #[test]
    fn test_same_named_decks_keep_separate_files() {
        let dest = tempfile::tempdir().unwrap();
        let mut store = SqliteCatalog::open_in_memory().unwrap();
        let mut engine = DedupEngine::new(
            &mut store,
            FormatNormalizer::without_rasterizer(),
            EngineConfig::new(dest.path()),
        )
        .unwrap();

        let first = engine.process(&extracted(png_bytes(true), "/decks/x/deck.pptx", 0, 0)).unwrap();
        let second = engine.process(&extracted(png_bytes(false), "/decks/y/deck.pptx", 0, 0)).unwrap();
        let (first_path, second_path) = match (&first, &second) {
            (Outcome::Saved { path: a, .. }, Outcome::Saved { path: b, .. }) => (a.clone(), b.clone()),
            other => panic!("expected two Saved outcomes, got {:?}", other),
        };
        assert_eq!(first_path, dest.path().join("deck_1_1.png"));
        assert_eq!(second_path, dest.path().join("deck_1_1_2.png"));

        // Each file still holds the image its row was fingerprinted from
        let hasher = Fingerprinter::new();
        for (outcome, path) in [(&first, &first_path), (&second, &second_path)] {
            let on_disk = hasher.fingerprint(&image::open(path).unwrap());
            match outcome {
                Outcome::Saved { fingerprint, .. } => assert_eq!(&on_disk, fingerprint),
                other => panic!("expected Saved, got {:?}", other),
            }
        }

        let records = store.records().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].saved_path.as_deref(), Some(first_path.as_path()));
        assert_eq!(records[1].saved_path.as_deref(), Some(second_path.as_path()));
    }

    #[test]
    fn test_write_new_never_replaces_existing_file() {
        let dest = tempfile::tempdir().unwrap();
        std::fs::write(dest.path().join("a_1_1.png"), b"first").unwrap();
        std::fs::write(dest.path().join("a_1_1_2.png"), b"second").unwrap();

        let path = write_new(dest.path(), "a_1_1.png", b"third").unwrap();
        assert_eq!(path, dest.path().join("a_1_1_3.png"));
        assert_eq!(std::fs::read(dest.path().join("a_1_1.png")).unwrap(), b"first");
        assert_eq!(std::fs::read(dest.path().join("a_1_1_2.png")).unwrap(), b"second");
        assert_eq!(std::fs::read(&path).unwrap(), b"third");
    }

    #[test]
    fn test_engine_config_builder() {
        let config = EngineConfig::default().with_dest_dir("/tmp/out");
        assert_eq!(config.dest_dir, PathBuf::from("/tmp/out"));
        assert_eq!(EngineConfig::default().dest_dir, PathBuf::from(DEFAULT_DEST_DIR));
    }
}
