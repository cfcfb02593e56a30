//! SQLite catalog.
//!
//! A single table, `image_ppt_mapping`, holds one row per (fingerprint, deck)
//! pair. Multi-row maintenance runs inside a transaction; image files are only
//! deleted after the transaction commits.

use crate::maintenance::{delete_files, demote_repeats, is_missing};
use crate::{CatalogStore, PruneReport, StoreContext};
use bgimg_core::{ImageRecord, Result};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

pub const TABLE_NAME: &str = "image_ppt_mapping";

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS image_ppt_mapping (
    id            INTEGER PRIMARY KEY,
    img_hash      TEXT NOT NULL,
    img_path      TEXT,
    pptx_path     TEXT NOT NULL,
    is_duplicate  INTEGER NOT NULL DEFAULT 0,
    UNIQUE(img_hash, pptx_path)
)";

const UPSERT: &str = "INSERT INTO image_ppt_mapping (img_hash, img_path, pptx_path, is_duplicate)
    VALUES (?1, ?2, ?3, ?4)
    ON CONFLICT(img_hash, pptx_path) DO UPDATE SET
        img_path = COALESCE(excluded.img_path, image_ppt_mapping.img_path),
        is_duplicate = MIN(image_ppt_mapping.is_duplicate, excluded.is_duplicate)";

const SELECT_ROWS: &str = "SELECT id, img_hash, img_path, pptx_path, COALESCE(is_duplicate, 0)
    FROM image_ppt_mapping ORDER BY id";

/// Catalog stored in a SQLite database file.
#[derive(Debug)]
pub struct SqliteCatalog {
    conn: Connection,
    path: Option<PathBuf>,
}

impl SqliteCatalog {
    /// Open or create the database at `path` and make sure the schema is current.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .store_context(&format!("Failed to create {}", parent.display()))?;
        }

        let conn = Connection::open(&path)
            .store_context(&format!("Failed to open {}", path.display()))?;
        let mut catalog = Self {
            conn,
            path: Some(path),
        };
        catalog.init_schema()?;
        log::info!("Opened SQLite catalog {}", catalog.display_path());
        Ok(catalog)
    }

    /// A throwaway catalog, used by tests and dry runs.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().store_context("Failed to open in-memory catalog")?;
        let mut catalog = Self { conn, path: None };
        catalog.init_schema()?;
        Ok(catalog)
    }

    /// Path of the database file, `None` for in-memory catalogs.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn display_path(&self) -> String {
        self.path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| ":memory:".to_string())
    }

    fn init_schema(&mut self) -> Result<()> {
        self.conn
            .execute(CREATE_TABLE, [])
            .store_context("Failed to create catalog table")?;

        // Catalogs written before duplicate tracking lack the flag column
        if !self.has_column("is_duplicate")? {
            log::info!("Adding duplicate flags to {}", self.display_path());
            self.conn
                .execute(
                    "ALTER TABLE image_ppt_mapping ADD COLUMN is_duplicate INTEGER NOT NULL DEFAULT 0",
                    [],
                )
                .store_context("Failed to add is_duplicate column")?;
        }

        self.migrate_hash_only_unique()?;

        self.conn
            .execute(
                "CREATE UNIQUE INDEX IF NOT EXISTS idx_mapping_hash_deck
                 ON image_ppt_mapping(img_hash, pptx_path)",
                [],
            )
            .store_context("Failed to create catalog index")?;
        Ok(())
    }

    /// Older catalogs made `img_hash` unique on its own, which allows only one
    /// row per fingerprint. Rebuild such a table with the (hash, deck) key.
    fn migrate_hash_only_unique(&mut self) -> Result<()> {
        if !self.has_hash_only_unique()? {
            return Ok(());
        }
        log::info!("Migrating {} to per-deck rows", self.display_path());

        let tx = self.conn.transaction().store_context("Failed to start migration")?;
        tx.execute_batch(&format!(
            "ALTER TABLE image_ppt_mapping RENAME TO image_ppt_mapping_old;
             {CREATE_TABLE};
             INSERT INTO image_ppt_mapping (id, img_hash, img_path, pptx_path, is_duplicate)
                 SELECT id, img_hash, img_path, COALESCE(pptx_path, ''), COALESCE(is_duplicate, 0)
                 FROM image_ppt_mapping_old WHERE img_hash IS NOT NULL;
             DROP TABLE image_ppt_mapping_old;"
        ))
        .store_context("Failed to migrate catalog table")?;
        tx.commit().store_context("Failed to commit migration")?;
        Ok(())
    }

    fn has_column(&self, column: &str) -> Result<bool> {
        let count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM pragma_table_info(?1) WHERE name = ?2",
                [TABLE_NAME, column],
                |row| row.get(0),
            )
            .store_context("Failed to inspect catalog columns")?;
        Ok(count > 0)
    }

    fn has_hash_only_unique(&self) -> Result<bool> {
        let mut indexes = self
            .conn
            .prepare("SELECT name FROM pragma_index_list(?1) WHERE \"unique\" = 1")
            .store_context("Failed to list catalog indexes")?;
        let names: Vec<String> = indexes
            .query_map([TABLE_NAME], |row| row.get(0))
            .store_context("Failed to list catalog indexes")?
            .collect::<rusqlite::Result<_>>()
            .store_context("Failed to list catalog indexes")?;

        for name in names {
            let columns: Vec<String> = self
                .conn
                .prepare("SELECT name FROM pragma_index_info(?1)")
                .and_then(|mut stmt| {
                    let columns = stmt
                        .query_map([&name], |row| row.get(0))?
                        .collect::<rusqlite::Result<_>>();
                    columns
                })
                .store_context("Failed to inspect catalog index")?;
            if columns == ["img_hash"] {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Merge many rows in one transaction. Used to migrate CSV catalogs.
    pub fn import_bulk(&mut self, records: &[ImageRecord]) -> Result<usize> {
        let tx = self.conn.transaction().store_context("Failed to start import")?;
        for record in records {
            upsert_row(&tx, record)?;
        }
        tx.commit().store_context("Failed to commit import")?;
        log::info!("Imported {} rows into {}", records.len(), self.display_path());
        Ok(records.len())
    }

    fn rows_with_ids(&self) -> Result<Vec<(i64, ImageRecord)>> {
        let mut stmt = self
            .conn
            .prepare(SELECT_ROWS)
            .store_context("Failed to query catalog")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, i64>(0)?, record_from_row(row)?)))
            .store_context("Failed to query catalog")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .store_context("Failed to read catalog row")?;
        Ok(rows)
    }
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<ImageRecord> {
    Ok(ImageRecord {
        fingerprint: row.get(1)?,
        saved_path: row.get::<_, Option<String>>(2)?.map(PathBuf::from),
        source_deck: PathBuf::from(row.get::<_, String>(3)?),
        is_duplicate: row.get::<_, i64>(4)? != 0,
    })
}

fn path_text(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn upsert_row(conn: &Connection, record: &ImageRecord) -> Result<()> {
    conn.execute(
        UPSERT,
        params![
            record.fingerprint,
            record.saved_path.as_deref().map(path_text),
            path_text(&record.source_deck),
            record.is_duplicate as i64,
        ],
    )
    .store_context(&format!("Failed to upsert {}", record.fingerprint))?;
    Ok(())
}

fn delete_ids(tx: &Transaction<'_>, ids: &[i64]) -> Result<()> {
    let mut stmt = tx
        .prepare("DELETE FROM image_ppt_mapping WHERE id = ?1")
        .store_context("Failed to prepare delete")?;
    for id in ids {
        stmt.execute([id]).store_context("Failed to delete catalog row")?;
    }
    Ok(())
}

impl CatalogStore for SqliteCatalog {
    fn known_fingerprints(&self) -> Result<HashSet<String>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT DISTINCT img_hash FROM image_ppt_mapping
                 WHERE COALESCE(is_duplicate, 0) = 0 AND img_path IS NOT NULL",
            )
            .store_context("Failed to query fingerprints")?;
        let fingerprints = stmt
            .query_map([], |row| row.get(0))
            .store_context("Failed to query fingerprints")?
            .collect::<rusqlite::Result<HashSet<String>>>()
            .store_context("Failed to read fingerprint")?;
        Ok(fingerprints)
    }

    fn upsert(&mut self, record: &ImageRecord) -> Result<()> {
        upsert_row(&self.conn, record)
    }

    fn records(&self) -> Result<Vec<ImageRecord>> {
        Ok(self.rows_with_ids()?.into_iter().map(|(_, r)| r).collect())
    }

    fn mark_and_prune_duplicates(&mut self) -> Result<PruneReport> {
        let (ids, mut records): (Vec<i64>, Vec<ImageRecord>) = self.rows_with_ids()?.into_iter().unzip();
        let plan = demote_repeats(&mut records);

        if !plan.changed.is_empty() {
            let tx = self.conn.transaction().store_context("Failed to start prune")?;
            {
                let mut stmt = tx
                    .prepare("UPDATE image_ppt_mapping SET img_path = ?1, is_duplicate = ?2 WHERE id = ?3")
                    .store_context("Failed to prepare update")?;
                for &idx in &plan.changed {
                    let record = &records[idx];
                    stmt.execute(params![
                        record.saved_path.as_deref().map(path_text),
                        record.is_duplicate as i64,
                        ids[idx],
                    ])
                    .store_context("Failed to update catalog row")?;
                }
            }
            tx.commit().store_context("Failed to commit prune")?;
        }

        Ok(PruneReport {
            demoted: plan.demoted,
            files_deleted: delete_files(&plan.orphaned_files),
        })
    }

    fn prune_missing(&mut self) -> Result<usize> {
        let missing: Vec<i64> = self
            .rows_with_ids()?
            .into_iter()
            .filter(|(_, r)| is_missing(r.saved_path.as_deref()))
            .map(|(id, _)| id)
            .collect();

        if !missing.is_empty() {
            let tx = self.conn.transaction().store_context("Failed to start cleanup")?;
            delete_ids(&tx, &missing)?;
            tx.commit().store_context("Failed to commit cleanup")?;
            log::info!("Removed {} rows with missing images from {}", missing.len(), self.display_path());
        }
        Ok(missing.len())
    }

    fn remove(&mut self, fingerprint: &str) -> Result<Option<PathBuf>> {
        let tx = self.conn.transaction().store_context("Failed to start removal")?;
        let canonical: Option<String> = tx
            .query_row(
                "SELECT img_path FROM image_ppt_mapping
                 WHERE img_hash = ?1 AND is_duplicate = 0 AND img_path IS NOT NULL
                 ORDER BY id LIMIT 1",
                [fingerprint],
                |row| row.get(0),
            )
            .optional()
            .store_context(&format!("Failed to look up {}", fingerprint))?;
        tx.execute("DELETE FROM image_ppt_mapping WHERE img_hash = ?1", [fingerprint])
            .store_context(&format!("Failed to remove {}", fingerprint))?;
        tx.commit().store_context("Failed to commit removal")?;
        Ok(canonical.map(PathBuf::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_and_known_fingerprints() {
        let mut catalog = SqliteCatalog::open_in_memory().unwrap();
        catalog
            .upsert(&ImageRecord::canonical("aaaa", "/out/a_1_1.png", "/decks/a.pptx"))
            .unwrap();
        catalog.upsert(&ImageRecord::duplicate("aaaa", "/decks/b.pptx")).unwrap();
        catalog.upsert(&ImageRecord::duplicate("bbbb", "/decks/b.pptx")).unwrap();

        assert_eq!(catalog.records().unwrap().len(), 3);
        assert_eq!(
            catalog.known_fingerprints().unwrap(),
            HashSet::from(["aaaa".to_string()])
        );
    }

    #[test]
    fn test_upsert_conflict_merges() {
        let mut catalog = SqliteCatalog::open_in_memory().unwrap();
        catalog
            .upsert(&ImageRecord::canonical("aaaa", "/out/a_1_1.png", "/decks/a.pptx"))
            .unwrap();
        // A re-run sees the same image as already known
        catalog.upsert(&ImageRecord::duplicate("aaaa", "/decks/a.pptx")).unwrap();

        let records = catalog.records().unwrap();
        assert_eq!(records, vec![ImageRecord::canonical("aaaa", "/out/a_1_1.png", "/decks/a.pptx")]);
    }

    #[test]
    fn test_persists_across_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("image_gallery.db");
        {
            let mut catalog = SqliteCatalog::open(&path).unwrap();
            catalog
                .upsert(&ImageRecord::canonical("aaaa", "/out/a_1_1.png", "/decks/a.pptx"))
                .unwrap();
        }
        let catalog = SqliteCatalog::open(&path).unwrap();
        assert_eq!(catalog.records().unwrap().len(), 1);
        assert_eq!(catalog.path(), Some(path.as_path()));
    }

    #[test]
    fn test_migrates_legacy_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(
                "CREATE TABLE image_ppt_mapping (
                    id INTEGER PRIMARY KEY,
                    img_hash TEXT UNIQUE,
                    img_path TEXT,
                    pptx_path TEXT
                 );
                 INSERT INTO image_ppt_mapping (img_hash, img_path, pptx_path)
                 VALUES ('aaaa', '/out/a_1_1.png', '/decks/a.pptx');",
            )
            .unwrap();
        }

        let mut catalog = SqliteCatalog::open(&path).unwrap();
        catalog.upsert(&ImageRecord::duplicate("aaaa", "/decks/b.pptx")).unwrap();

        let records = catalog.records().unwrap();
        assert_eq!(records.len(), 2);
        assert!(!records[0].is_duplicate);
        assert!(records[1].is_duplicate);
    }

    #[test]
    fn test_flag_column_added_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("old.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(
                "CREATE TABLE image_ppt_mapping (
                    id INTEGER PRIMARY KEY,
                    img_hash TEXT NOT NULL,
                    img_path TEXT,
                    pptx_path TEXT NOT NULL,
                    UNIQUE(img_hash, pptx_path)
                 );
                 INSERT INTO image_ppt_mapping (img_hash, img_path, pptx_path)
                 VALUES ('aaaa', '/out/a_1_1.png', '/decks/a.pptx');",
            )
            .unwrap();
        }

        let catalog = SqliteCatalog::open(&path).unwrap();
        assert!(catalog.has_column("is_duplicate").unwrap());
        assert!(!catalog.has_column("no_such_column").unwrap());
        drop(catalog);

        // Reopening finds the column and leaves the rows alone
        let catalog = SqliteCatalog::open(&path).unwrap();
        assert_eq!(
            catalog.records().unwrap(),
            vec![ImageRecord::canonical("aaaa", "/out/a_1_1.png", "/decks/a.pptx")]
        );
    }

    #[test]
    fn test_known_fingerprints_need_a_saved_file() {
        let mut catalog = SqliteCatalog::open_in_memory().unwrap();
        catalog
            .upsert(&ImageRecord {
                is_duplicate: false,
                ..ImageRecord::duplicate("aaaa", "/decks/a.pptx")
            })
            .unwrap();
        catalog
            .upsert(&ImageRecord::canonical("bbbb", "/out/b_1_1.png", "/decks/b.pptx"))
            .unwrap();

        assert_eq!(catalog.known_fingerprints().unwrap(), HashSet::from(["bbbb".to_string()]));
    }

    #[test]
    fn test_mark_and_prune_duplicates_keeps_one_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut catalog = SqliteCatalog::open(dir.path().join("c.db")).unwrap();

        let mut files = Vec::new();
        for deck in ["a", "b", "c"] {
            let file = dir.path().join(format!("{deck}_1_1.png"));
            std::fs::write(&file, b"png").unwrap();
            catalog
                .upsert(&ImageRecord::canonical("ffff", &file, format!("/decks/{deck}.pptx")))
                .unwrap();
            files.push(file);
        }

        let report = catalog.mark_and_prune_duplicates().unwrap();
        assert_eq!(report, PruneReport { demoted: 2, files_deleted: 2 });

        let records = catalog.records().unwrap();
        assert_eq!(records[0].saved_path.as_deref(), Some(files[0].as_path()));
        assert!(!records[0].is_duplicate);
        assert!(records[1..].iter().all(|r| r.is_duplicate && r.saved_path.is_none()));
        assert!(files[0].exists());
        assert!(!files[1].exists() && !files[2].exists());

        // A second pass has nothing left to do
        let again = catalog.mark_and_prune_duplicates().unwrap();
        assert_eq!(again, PruneReport::default());
    }

    #[test]
    fn test_prune_missing_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("present.png");
        std::fs::write(&present, b"png").unwrap();

        let mut catalog = SqliteCatalog::open_in_memory().unwrap();
        catalog.upsert(&ImageRecord::canonical("aaaa", &present, "/decks/a.pptx")).unwrap();
        catalog.upsert(&ImageRecord::duplicate("aaaa", "/decks/b.pptx")).unwrap();
        catalog
            .upsert(&ImageRecord::canonical("bbbb", dir.path().join("gone.png"), "/decks/c.pptx"))
            .unwrap();

        assert_eq!(catalog.prune_missing().unwrap(), 1);
        assert_eq!(catalog.records().unwrap().len(), 2);

        assert_eq!(catalog.remove("aaaa").unwrap(), Some(present));
        assert!(catalog.records().unwrap().is_empty());
        assert_eq!(catalog.remove("aaaa").unwrap(), None);
    }

    #[test]
    fn test_import_bulk() {
        let mut catalog = SqliteCatalog::open_in_memory().unwrap();
        let rows = vec![
            ImageRecord::canonical("aaaa", "/out/a_1_1.png", "/decks/a.pptx"),
            ImageRecord::duplicate("aaaa", "/decks/b.pptx"),
            ImageRecord::canonical("aaaa", "/out/a_1_1.png", "/decks/a.pptx"),
        ];
        assert_eq!(catalog.import_bulk(&rows).unwrap(), 3);
        assert_eq!(catalog.records().unwrap().len(), 2);
    }
}
