//! Catalog stores for extracted background images.
//!
//! A catalog maps fingerprints to the canonical saved copy and every deck an
//! image was seen in. Two interchangeable backings share one contract: a flat
//! CSV file and a single SQLite table.

pub mod csv_store;
pub mod gallery;
mod maintenance;
pub mod sqlite_store;

pub use csv_store::CsvCatalog;
pub use gallery::{gallery_entries, Gallery, GalleryEntry};
pub use sqlite_store::SqliteCatalog;

use bgimg_core::{Error, ImageRecord, Result};
use std::collections::HashSet;
use std::fmt::Display;
use std::path::{Path, PathBuf};

/// The durable ledger the dedup engine writes to and the gallery reads from.
///
/// Every method either fully applies or leaves the store as it was. Errors
/// are always [`Error::StoreError`] and should abort a run.
pub trait CatalogStore {
    /// Fingerprints of all canonical (non-duplicate) rows.
    fn known_fingerprints(&self) -> Result<HashSet<String>>;

    /// Insert a row, or merge into the row with the same fingerprint and deck.
    fn upsert(&mut self, record: &ImageRecord) -> Result<()>;

    /// All rows in insertion order.
    fn records(&self) -> Result<Vec<ImageRecord>>;

    /// Keep the first row of each fingerprint canonical, demote the rest and
    /// delete the image files the demoted rows owned.
    fn mark_and_prune_duplicates(&mut self) -> Result<PruneReport>;

    /// Delete rows whose saved image no longer exists on disk.
    fn prune_missing(&mut self) -> Result<usize>;

    /// Delete every row of `fingerprint`, returning the canonical image path.
    fn remove(&mut self, fingerprint: &str) -> Result<Option<PathBuf>>;
}

/// What a duplicate-pruning pass changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneReport {
    /// Rows flipped from canonical to duplicate.
    pub demoted: usize,
    /// Image files removed from disk.
    pub files_deleted: usize,
}

/// Which backing a catalog path uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Csv,
    Sqlite,
}

impl Backend {
    /// `.csv` files are CSV catalogs, anything else is SQLite.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("csv") => Backend::Csv,
            _ => Backend::Sqlite,
        }
    }
}

/// Open (creating if needed) a catalog with the given backing.
pub fn open_catalog(path: &Path, backend: Backend) -> Result<Box<dyn CatalogStore>> {
    log::debug!("Opening {:?} catalog at {}", backend, path.display());
    Ok(match backend {
        Backend::Csv => Box::new(CsvCatalog::open(path)?),
        Backend::Sqlite => Box::new(SqliteCatalog::open(path)?),
    })
}

/// Attach context to backing errors, turning them into store errors.
pub(crate) trait StoreContext<T> {
    fn store_context(self, what: &str) -> Result<T>;
}

impl<T, E: Display> StoreContext<T> for std::result::Result<T, E> {
    fn store_context(self, what: &str) -> Result<T> {
        self.map_err(|e| Error::StoreError(format!("{}: {}", what, e)))
    }
}
