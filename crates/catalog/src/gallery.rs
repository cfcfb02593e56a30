//! Read model for browsing the catalog: one entry per unique image.

use crate::CatalogStore;
use bgimg_core::{ImageRecord, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;

/// A unique image with every deck it appears in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GalleryEntry {
    pub fingerprint: String,
    pub image_path: PathBuf,
    pub source_decks: Vec<PathBuf>,
}

/// Group catalog rows by fingerprint, in first-seen order.
///
/// Fingerprints without a canonical saved path have nothing to show and are
/// left out.
pub fn gallery_entries(records: &[ImageRecord]) -> Vec<GalleryEntry> {
    let mut order: Vec<&str> = Vec::new();
    let mut paths: HashMap<&str, PathBuf> = HashMap::new();
    let mut decks: HashMap<&str, Vec<PathBuf>> = HashMap::new();

    for record in records {
        let fp = record.fingerprint.as_str();
        let seen = decks.entry(fp).or_insert_with(|| {
            order.push(fp);
            Vec::new()
        });
        if !seen.contains(&record.source_deck) {
            seen.push(record.source_deck.clone());
        }

        if let (false, Some(path)) = (record.is_duplicate, &record.saved_path) {
            paths.entry(fp).or_insert_with(|| path.clone());
        }
    }

    order
        .into_iter()
        .filter_map(|fp| {
            let image_path = paths.remove(fp)?;
            Some(GalleryEntry {
                fingerprint: fp.to_string(),
                image_path,
                source_decks: decks.remove(fp).unwrap_or_default(),
            })
        })
        .collect()
}

/// Gallery view over any catalog backing.
pub struct Gallery<'a, S: CatalogStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: CatalogStore + ?Sized> Gallery<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Every unique image recorded in the catalog.
    pub fn entries(&self) -> Result<Vec<GalleryEntry>> {
        Ok(gallery_entries(&self.store.records()?))
    }

    /// Only the images whose file is still on disk.
    pub fn available_entries(&self) -> Result<Vec<GalleryEntry>> {
        let entries = self.entries()?;
        let total = entries.len();
        let available: Vec<GalleryEntry> = entries.into_iter().filter(|e| e.image_path.exists()).collect();
        if available.len() < total {
            log::debug!("{} gallery images are missing on disk", total - available.len());
        }
        Ok(available)
    }
}
