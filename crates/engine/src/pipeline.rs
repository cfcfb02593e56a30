//! A full cataloguing run: walk, extract, dedup, record.

use crate::dedup::{DedupEngine, EngineConfig};
use crate::walker::DeckWalker;
use bgimg_catalog::CatalogStore;
use bgimg_core::{Error, FormatNormalizer, Outcome, Result};
use bgimg_pptx::PptxExtractor;
use serde::Serialize;
use std::path::Path;

/// Counts from one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Decks found under the source directory.
    pub decks: usize,
    /// Decks that could not be opened or parsed.
    pub decks_failed: usize,
    pub saved: usize,
    pub duplicates: usize,
    pub failed: usize,
}

impl RunSummary {
    fn record(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Saved { .. } => self.saved += 1,
            Outcome::Duplicate { .. } => self.duplicates += 1,
            Outcome::Failed { .. } => self.failed += 1,
        }
    }

    /// Images that reached a decision.
    pub fn images(&self) -> usize {
        self.saved + self.duplicates + self.failed
    }
}

/// Runs decks through extraction and deduplication into a catalog.
#[derive(Debug, Clone, Default)]
pub struct Cataloguer {
    extractor: PptxExtractor,
    config: EngineConfig,
}

impl Cataloguer {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            extractor: PptxExtractor::new(),
            config,
        }
    }

    /// Use a differently configured extractor, e.g. with another size policy.
    pub fn with_extractor(mut self, extractor: PptxExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Catalog every deck under `source`.
    ///
    /// Decks are processed one at a time in walk order. A deck that cannot be
    /// read is logged and skipped; a catalog failure ends the run.
    pub fn run<S: CatalogStore + ?Sized>(
        &self,
        source: &Path,
        store: &mut S,
        normalizer: FormatNormalizer,
    ) -> Result<RunSummary> {
        let dest_dir = &self.config.dest_dir;
        let dest = std::fs::create_dir_all(dest_dir)
            .and_then(|_| std::fs::canonicalize(dest_dir))
            .map_err(|e| Error::OutputError(format!("Cannot use destination {}: {}", dest_dir.display(), e)))?;
        let config = self.config.clone().with_dest_dir(dest);

        let walker = DeckWalker::new(source)?;
        log::info!(
            "Cataloguing decks under {} into {}",
            walker.root().display(),
            config.dest_dir.display()
        );

        let mut engine = DedupEngine::new(store, normalizer, config)?;
        self.run_decks(&walker, &mut engine)
    }

    fn run_decks<S: CatalogStore + ?Sized>(
        &self,
        walker: &DeckWalker,
        engine: &mut DedupEngine<'_, S>,
    ) -> Result<RunSummary> {
        let mut summary = RunSummary::default();

        for deck in walker.decks() {
            summary.decks += 1;
            let images = match self.extractor.extract_file(&deck) {
                Ok(images) => images,
                Err(e) => {
                    log::warn!("Skipping deck {}: {}", deck.display(), e);
                    summary.decks_failed += 1;
                    continue;
                }
            };

            let before = summary;
            for image in &images {
                let outcome = engine.process(image)?;
                summary.record(&outcome);
            }
            log::info!(
                "{}: {} saved, {} duplicate, {} failed",
                deck.display(),
                summary.saved - before.saved,
                summary.duplicates - before.duplicates,
                summary.failed - before.failed
            );
        }

        log::info!(
            "Processed {} decks ({} unreadable): {} saved, {} duplicates, {} failed",
            summary.decks,
            summary.decks_failed,
            summary.saved,
            summary.duplicates,
            summary.failed
        );
        Ok(summary)
    }
}
