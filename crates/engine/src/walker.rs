//! Finds decks under a source directory.

use bgimg_core::{Error, Result};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Prefix PowerPoint uses for lock files of open decks.
const LOCK_FILE_PREFIX: &str = "~$";

/// Walks a directory tree for `.pptx` decks.
///
/// Entries are visited in file-name order within each directory, so the walk
/// order (and with it, which occurrence of an image is canonical) is
/// deterministic. The walker holds no state besides its root; calling
/// [`DeckWalker::decks`] again starts over.
#[derive(Debug, Clone)]
pub struct DeckWalker {
    root: PathBuf,
}

impl DeckWalker {
    /// Resolve `root` to an absolute directory.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let resolved = std::fs::canonicalize(root).map_err(|e| {
            Error::IoError(std::io::Error::new(
                e.kind(),
                format!("Cannot resolve source {}: {}", root.display(), e),
            ))
        })?;
        if !resolved.is_dir() {
            return Err(Error::IoError(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("Source {} is not a directory", resolved.display()),
            )));
        }
        Ok(Self { root: resolved })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Lazily yield the absolute path of every deck under the root.
    pub fn decks(&self) -> impl Iterator<Item = PathBuf> + '_ {
        WalkDir::new(&self.root)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    log::warn!("Skipping unreadable entry under {}: {}", self.root.display(), e);
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file() && is_deck(entry.path()))
            .map(|entry| entry.into_path())
    }
}

/// `.pptx` in any case, excluding Office lock files.
pub fn is_deck(path: &Path) -> bool {
    let is_pptx = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("pptx"))
        .unwrap_or(false);
    let is_lock_file = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with(LOCK_FILE_PREFIX))
        .unwrap_or(false);
    is_pptx && !is_lock_file
}
