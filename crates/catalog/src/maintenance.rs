//! Duplicate demotion and file cleanup shared by both backings.

use bgimg_core::ImageRecord;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Rows to rewrite and files to delete after a pruning pass.
#[derive(Debug, Default)]
pub(crate) struct DemotionPlan {
    /// Indices (into the planned slice) whose record changed.
    pub changed: Vec<usize>,
    /// Rows flipped from canonical to duplicate.
    pub demoted: usize,
    /// Files owned by demoted rows, deleted once the new flags are committed.
    pub orphaned_files: Vec<PathBuf>,
}

/// Mark all but one row per fingerprint as duplicate, in place.
///
/// The canonical row is the first, in insertion order, that owns a saved
/// file. A fingerprint with no saved file at all keeps no canonical row, so
/// the next scan saves the image again instead of treating it as known.
pub(crate) fn demote_repeats(records: &mut [ImageRecord]) -> DemotionPlan {
    let mut keepers: HashMap<String, usize> = HashMap::new();
    for (idx, record) in records.iter().enumerate() {
        if record.saved_path.is_some() {
            keepers.entry(record.fingerprint.clone()).or_insert(idx);
        }
    }

    let mut plan = DemotionPlan::default();
    let mut released = Vec::new();
    for (idx, record) in records.iter_mut().enumerate() {
        if keepers.get(&record.fingerprint) == Some(&idx) {
            if record.is_duplicate {
                record.is_duplicate = false;
                plan.changed.push(idx);
            }
            continue;
        }

        if !record.is_duplicate || record.saved_path.is_some() {
            if !record.is_duplicate {
                plan.demoted += 1;
            }
            released.extend(record.saved_path.take());
            record.is_duplicate = true;
            plan.changed.push(idx);
        }
    }

    // A file is only orphaned once no remaining row points at it
    let kept: HashSet<&Path> = records.iter().filter_map(|r| r.saved_path.as_deref()).collect();
    for path in released {
        if !kept.contains(path.as_path()) && !plan.orphaned_files.contains(&path) {
            plan.orphaned_files.push(path);
        }
    }

    plan
}

/// Delete files, logging each. Returns how many were removed.
pub(crate) fn delete_files(paths: &[PathBuf]) -> usize {
    let mut deleted = 0;
    for path in paths {
        match std::fs::remove_file(path) {
            Ok(()) => {
                log::info!("Deleted duplicate image {}", path.display());
                deleted += 1;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("Duplicate image already gone: {}", path.display());
            }
            Err(e) => log::warn!("Failed to delete {}: {}", path.display(), e),
        }
    }
    deleted
}

/// Whether a record's saved image has disappeared.
pub(crate) fn is_missing(saved_path: Option<&Path>) -> bool {
    saved_path.map(|p| !p.exists()).unwrap_or(false)
}
