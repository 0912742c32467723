//! File metadata persistence.
//!
//! A small redb database holding one row per indexed file (modification
//! time and chunk count) plus a settings table carrying the schema version.
//! The full-text side lives in [`crate::fts`]; this half is what makes
//! refreshes incremental.

use std::path::Path;

use redb::{Database, ReadableTable, TableDefinition};

use crate::error::Result;

const FILE_META: TableDefinition<&str, &[u8]> =
    TableDefinition::new("file_meta");
const SETTINGS: TableDefinition<&str, &str> = TableDefinition::new("settings");

/// Per-file bookkeeping row.
///
/// Serialized as `"mtime_ns\0chunk_count"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileMeta {
    pub mtime_ns: u64,
    pub chunk_count: usize,
}

impl FileMeta {
    pub fn serialize(&self) -> Vec<u8> {
        format!("{}\0{}", self.mtime_ns, self.chunk_count).into_bytes()
    }

    pub fn deserialize(bytes: &[u8]) -> Option<Self> {
        let s = std::str::from_utf8(bytes).ok()?;
        let (mtime, count) = s.split_once('\0')?;
        Some(Self {
            mtime_ns: mtime.parse().ok()?,
            chunk_count: count.parse().ok()?,
        })
    }
}

pub struct MetaDb {
    db: Database,
}

impl MetaDb {
    /// Open or create the metadata database. An unreadable file is treated
    /// as corruption: it is removed and recreated empty.
    pub fn open(path: &Path) -> Result<Self> {
        let db = match Database::create(path) {
            Ok(db) => db,
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "metadata database unreadable, recreating"
                );
                std::fs::remove_file(path)?;
                Database::create(path).map_err(redb::Error::from)?
            }
        };

        let txn = db.begin_write()?;
        txn.open_table(FILE_META)?;
        txn.open_table(SETTINGS)?;
        txn.commit()?;

        Ok(Self { db })
    }

    pub fn get(&self, path: &str) -> Result<Option<FileMeta>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(FILE_META)?;
        Ok(table
            .get(path)?
            .and_then(|v| FileMeta::deserialize(v.value())))
    }

    pub fn set(&self, path: &str, meta: FileMeta) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(FILE_META)?;
            table.insert(path, meta.serialize().as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    pub fn remove(&self, path: &str) -> Result<bool> {
        let txn = self.db.begin_write()?;
        let removed = {
            let mut table = txn.open_table(FILE_META)?;
            table.remove(path)?.is_some()
        };
        txn.commit()?;
        Ok(removed)
    }

    /// Set multiple rows in a single transaction.
    pub fn batch_set(&self, entries: &[(String, FileMeta)]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(FILE_META)?;
            for (path, meta) in entries {
                table.insert(path.as_str(), meta.serialize().as_slice())?;
            }
        }
        txn.commit()?;
        Ok(())
    }

    /// All (path, meta) rows in a single read transaction.
    pub fn all(&self) -> Result<Vec<(String, FileMeta)>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(FILE_META)?;
        let mut result = Vec::new();
        for entry in table.iter()? {
            let (k, v) = entry?;
            if let Some(meta) = FileMeta::deserialize(v.value()) {
                result.push((k.value().to_string(), meta));
            }
        }
        Ok(result)
    }

    /// Drop every file row.
    pub fn clear(&self) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(FILE_META)?;
            table.retain(|_, _| false)?;
        }
        txn.commit()?;
        Ok(())
    }

    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(SETTINGS)?;
        Ok(table.get(key)?.map(|v| v.value().to_string()))
    }

    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(SETTINGS)?;
            table.insert(key, value)?;
        }
        txn.commit()?;
        Ok(())
    }
}

impl std::fmt::Debug for MetaDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetaDb").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> (tempfile::TempDir, MetaDb) {
        let tmp = tempfile::tempdir().unwrap();
        let db = MetaDb::open(&tmp.path().join("meta.redb")).unwrap();
        (tmp, db)
    }

    #[test]
    fn meta_roundtrip() {
        let meta = FileMeta {
            mtime_ns: 1_700_000_000_123_456_789,
            chunk_count: 7,
        };
        assert_eq!(FileMeta::deserialize(&meta.serialize()), Some(meta));
        assert_eq!(FileMeta::deserialize(b"garbage"), None);
    }

    #[test]
    fn crud() {
        let (_tmp, db) = test_db();

        assert_eq!(db.get("src/a.py").unwrap(), None);

        let meta = FileMeta {
            mtime_ns: 100,
            chunk_count: 2,
        };
        db.set("src/a.py", meta).unwrap();
        assert_eq!(db.get("src/a.py").unwrap(), Some(meta));

        let all = db.all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].0, "src/a.py");

        assert!(db.remove("src/a.py").unwrap());
        assert!(!db.remove("src/a.py").unwrap());
        assert_eq!(db.get("src/a.py").unwrap(), None);
    }

    #[test]
    fn batch_set_and_clear() {
        let (_tmp, db) = test_db();

        let entries: Vec<(String, FileMeta)> = (0..5)
            .map(|i| {
                (
                    format!("f{i}.md"),
                    FileMeta {
                        mtime_ns: i,
                        chunk_count: 1,
                    },
                )
            })
            .collect();
        db.batch_set(&entries).unwrap();
        assert_eq!(db.all().unwrap().len(), 5);

        db.clear().unwrap();
        assert!(db.all().unwrap().is_empty());
    }

    #[test]
    fn settings_survive_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("meta.redb");

        {
            let db = MetaDb::open(&path).unwrap();
            db.set_setting("schema_version", "1").unwrap();
            db.set(
                "a.md",
                FileMeta {
                    mtime_ns: 5,
                    chunk_count: 1,
                },
            )
            .unwrap();
        }

        {
            let db = MetaDb::open(&path).unwrap();
            assert_eq!(
                db.get_setting("schema_version").unwrap(),
                Some("1".to_string())
            );
            assert_eq!(db.get("a.md").unwrap().unwrap().mtime_ns, 5);
        }
    }

    #[test]
    fn corrupt_file_is_recreated() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("meta.redb");
        std::fs::write(&path, b"this is not a redb file").unwrap();

        let db = MetaDb::open(&path).unwrap();
        assert!(db.all().unwrap().is_empty());
    }
}
