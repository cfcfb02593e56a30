//! Flat CSV catalog.
//!
//! One row per image occurrence under the header
//! `PPTX File,Image File,Image Hash,Is Duplicate`. New rows are appended and
//! flushed one at a time; any change to existing rows rewrites the whole file
//! through a temporary file in the same directory, renamed into place.

use crate::maintenance::{delete_files, demote_repeats, is_missing};
use crate::{CatalogStore, PruneReport, StoreContext};
use bgimg_core::{ImageRecord, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

/// Column names, in file order.
pub const HEADER: [&str; 4] = ["PPTX File", "Image File", "Image Hash", "Is Duplicate"];

/// Value older catalogs wrote into `Image File` for skipped duplicates.
const LEGACY_DUPLICATE_MARKER: &str = "Duplicate";

#[derive(Debug, Serialize, Deserialize)]
struct CsvRow {
    #[serde(rename = "PPTX File")]
    pptx_file: String,
    #[serde(rename = "Image File", default)]
    image_file: String,
    #[serde(rename = "Image Hash")]
    image_hash: String,
    #[serde(rename = "Is Duplicate", default)]
    is_duplicate: Option<String>,
}

impl CsvRow {
    fn into_record(self) -> ImageRecord {
        let image_file = self.image_file.trim();
        let is_duplicate = match self.is_duplicate.as_deref().map(str::trim) {
            Some(flag) if !flag.is_empty() => parse_flag(flag),
            // Three-column catalogs only left the image column blank or marked
            _ => image_file.is_empty() || image_file == LEGACY_DUPLICATE_MARKER,
        };
        let saved_path = if image_file.is_empty() || image_file == LEGACY_DUPLICATE_MARKER || is_duplicate {
            None
        } else {
            Some(PathBuf::from(image_file))
        };

        ImageRecord {
            fingerprint: self.image_hash.trim().to_string(),
            saved_path,
            source_deck: PathBuf::from(self.pptx_file),
            is_duplicate,
        }
    }
}

impl From<&ImageRecord> for CsvRow {
    fn from(record: &ImageRecord) -> Self {
        Self {
            pptx_file: record.source_deck.to_string_lossy().into_owned(),
            image_file: record
                .saved_path
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default(),
            image_hash: record.fingerprint.clone(),
            is_duplicate: Some(if record.is_duplicate { "1" } else { "0" }.to_string()),
        }
    }
}

fn parse_flag(flag: &str) -> bool {
    matches!(flag.to_ascii_lowercase().as_str(), "1" | "true" | "yes")
}

/// Read every row of a CSV catalog (current or legacy three-column layout).
pub fn read_rows(path: &Path) -> Result<Vec<ImageRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .store_context(&format!("Failed to open {}", path.display()))?;

    let mut records = Vec::new();
    for (line, row) in reader.deserialize::<CsvRow>().enumerate() {
        let row = row.store_context(&format!("Bad row {} in {}", line + 2, path.display()))?;
        if row.image_hash.trim().is_empty() {
            log::warn!("Row {} in {} has no hash, ignoring", line + 2, path.display());
            continue;
        }
        records.push(row.into_record());
    }
    Ok(records)
}

fn has_current_header(path: &Path) -> Result<bool> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .store_context(&format!("Failed to open {}", path.display()))?;
    let header = reader
        .headers()
        .store_context(&format!("Failed to read header of {}", path.display()))?;
    Ok(header.iter().map(str::trim).eq(HEADER))
}

/// Catalog backed by a CSV file, mirrored in memory.
#[derive(Debug)]
pub struct CsvCatalog {
    path: PathBuf,
    records: Vec<ImageRecord>,
}

impl CsvCatalog {
    /// Open a CSV catalog, creating it with a header if it does not exist.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let is_empty = std::fs::metadata(&path).map(|m| m.len() == 0).unwrap_or(true);

        if is_empty {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .store_context(&format!("Failed to create {}", parent.display()))?;
            }
            let catalog = Self {
                path,
                records: Vec::new(),
            };
            catalog.rewrite(&catalog.records)?;
            log::info!("Created CSV catalog {}", catalog.path.display());
            return Ok(catalog);
        }

        let records = read_rows(&path)?;
        log::info!("Loaded {} rows from {}", records.len(), path.display());
        let catalog = Self { path, records };

        // Appended rows carry four fields, so a three-column file is upgraded first
        if !has_current_header(&catalog.path)? {
            catalog.rewrite(&catalog.records)?;
            log::info!("Upgraded {} to the four-column layout", catalog.path.display());
        }
        Ok(catalog)
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one row and flush it.
    fn append(&self, record: &ImageRecord) -> Result<()> {
        let file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .store_context(&format!("Failed to open {}", self.path.display()))?;

        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        writer
            .serialize(CsvRow::from(record))
            .store_context("Failed to append catalog row")?;
        writer.flush().store_context("Failed to flush catalog")?;
        Ok(())
    }

    /// Replace the file contents with `records`, all or nothing.
    fn rewrite(&self, records: &[ImageRecord]) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let mut staging = tempfile::NamedTempFile::new_in(&dir)
            .store_context(&format!("Failed to stage catalog in {}", dir.display()))?;

        {
            let mut writer = csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(staging.as_file_mut());
            writer.write_record(HEADER).store_context("Failed to write header")?;
            for record in records {
                writer
                    .serialize(CsvRow::from(record))
                    .store_context("Failed to write catalog row")?;
            }
            writer.flush().store_context("Failed to flush catalog")?;
        }

        staging
            .persist(&self.path)
            .store_context(&format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }
}

impl CatalogStore for CsvCatalog {
    fn known_fingerprints(&self) -> Result<HashSet<String>> {
        Ok(self
            .records
            .iter()
            .filter(|r| !r.is_duplicate && r.saved_path.is_some())
            .map(|r| r.fingerprint.clone())
            .collect())
    }

    fn upsert(&mut self, record: &ImageRecord) -> Result<()> {
        match self.records.iter().position(|r| r.same_row(record)) {
            Some(idx) => {
                let mut merged = self.records[idx].clone();
                merged.merge(record);
                if merged == self.records[idx] {
                    return Ok(());
                }
                let mut updated = self.records.clone();
                updated[idx] = merged;
                self.rewrite(&updated)?;
                self.records = updated;
            }
            None => {
                self.append(record)?;
                self.records.push(record.clone());
            }
        }
        Ok(())
    }

    fn records(&self) -> Result<Vec<ImageRecord>> {
        Ok(self.records.clone())
    }

    fn mark_and_prune_duplicates(&mut self) -> Result<PruneReport> {
        let mut updated = self.records.clone();
        let plan = demote_repeats(&mut updated);

        if !plan.changed.is_empty() {
            self.rewrite(&updated)?;
            self.records = updated;
        }

        Ok(PruneReport {
            demoted: plan.demoted,
            files_deleted: delete_files(&plan.orphaned_files),
        })
    }

    fn prune_missing(&mut self) -> Result<usize> {
        let kept: Vec<ImageRecord> = self
            .records
            .iter()
            .filter(|r| !is_missing(r.saved_path.as_deref()))
            .cloned()
            .collect();

        let removed = self.records.len() - kept.len();
        if removed > 0 {
            self.rewrite(&kept)?;
            self.records = kept;
            log::info!("Removed {} rows with missing images from {}", removed, self.path.display());
        }
        Ok(removed)
    }

    fn remove(&mut self, fingerprint: &str) -> Result<Option<PathBuf>> {
        let canonical = self
            .records
            .iter()
            .find(|r| r.fingerprint == fingerprint && !r.is_duplicate)
            .and_then(|r| r.saved_path.clone());

        let kept: Vec<ImageRecord> = self
            .records
            .iter()
            .filter(|r| r.fingerprint != fingerprint)
            .cloned()
            .collect();

        if kept.len() != self.records.len() {
            self.rewrite(&kept)?;
            self.records = kept;
        }
        Ok(canonical)
    }
}
