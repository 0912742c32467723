//! The persistent index store.
//!
//! [`IndexStore`] owns all persisted rows: file metadata in redb and
//! full-text-indexed chunks in Tantivy, both living under one database
//! directory that is safe to delete while the service is down.
//!
//! Writes are staged on the store's single writer and become visible
//! atomically at [`IndexStore::commit`]; metadata is flushed only after the
//! chunk commit succeeds, so a crash can leave stale metadata (which the
//! next refresh reconciles by re-chunking) but never metadata describing
//! chunks that were lost.

use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
    sync::Mutex,
};

use tantivy::IndexWriter;

use crate::{
    chunker::Chunk,
    error::Result,
    fts::{ChunkIndex, ExtensionFilter, ScoredChunk},
    meta_db::{FileMeta, MetaDb},
};

/// Bumped whenever the chunk schema or metadata layout changes; a stored
/// index with a different version is dropped and rebuilt from disk.
const SCHEMA_VERSION: &str = "1";
const SCHEMA_VERSION_KEY: &str = "schema_version";

const WRITER_MEMORY_BUDGET: usize = 15_000_000;

enum PendingMeta {
    Set(String, FileMeta),
    Remove(String),
}

pub struct IndexStore {
    fts: ChunkIndex,
    meta: MetaDb,
    writer: Mutex<IndexWriter>,
    pending_meta: Mutex<Vec<PendingMeta>>,
    db_root: PathBuf,
}

impl IndexStore {
    /// Open or create the store under `db_root` (a directory).
    pub fn open(db_root: &Path) -> Result<Self> {
        std::fs::create_dir_all(db_root)?;
        let db_root = db_root.canonicalize()?;
        let meta = MetaDb::open(&db_root.join("meta.redb"))?;
        let fts = ChunkIndex::open(&db_root.join("fts"))?;
        let writer = fts.writer(WRITER_MEMORY_BUDGET)?;

        let store = Self {
            fts,
            meta,
            writer: Mutex::new(writer),
            pending_meta: Mutex::new(Vec::new()),
            db_root,
        };
        store.ensure_schema_version()?;
        Ok(store)
    }

    fn ensure_schema_version(&self) -> Result<()> {
        let stored = self.meta.get_setting(SCHEMA_VERSION_KEY)?;
        if stored.as_deref() != Some(SCHEMA_VERSION) {
            if stored.is_some() {
                tracing::warn!(
                    stored = stored.as_deref().unwrap_or(""),
                    current = SCHEMA_VERSION,
                    "index schema version changed, clearing store"
                );
            }
            self.clear()?;
            self.meta.set_setting(SCHEMA_VERSION_KEY, SCHEMA_VERSION)?;
        }
        Ok(())
    }

    /// The directory holding all persisted state.
    pub fn db_root(&self) -> &Path {
        &self.db_root
    }

    pub fn get_file_meta(&self, path: &str) -> Result<Option<FileMeta>> {
        self.meta.get(path)
    }

    /// Every indexed path.
    pub fn all_paths(&self) -> Result<BTreeSet<String>> {
        Ok(self.meta.all()?.into_iter().map(|(path, _)| path).collect())
    }

    /// Every indexed path with its metadata row.
    pub fn all_file_meta(&self) -> Result<Vec<(String, FileMeta)>> {
        self.meta.all()
    }

    /// Total chunk count across all files, from metadata.
    pub fn chunk_count(&self) -> Result<usize> {
        Ok(self
            .meta
            .all()?
            .iter()
            .map(|(_, meta)| meta.chunk_count)
            .sum())
    }

    /// Replace a file's chunks and metadata. Staged until [`commit`].
    ///
    /// [`commit`]: IndexStore::commit
    pub fn upsert_file(
        &self,
        path: &str,
        mtime_ns: u64,
        chunks: &[Chunk],
    ) -> Result<()> {
        {
            let writer = self.writer.lock().expect("index writer lock");
            self.fts.add_chunks(&writer, path, chunks)?;
        }
        self.pending_meta
            .lock()
            .expect("pending meta lock")
            .push(PendingMeta::Set(
                path.to_string(),
                FileMeta {
                    mtime_ns,
                    chunk_count: chunks.len(),
                },
            ));
        Ok(())
    }

    /// Delete a file's chunks and metadata. Staged until [`commit`].
    ///
    /// [`commit`]: IndexStore::commit
    pub fn delete_file(&self, path: &str) -> Result<()> {
        {
            let writer = self.writer.lock().expect("index writer lock");
            self.fts.delete_file(&writer, path);
        }
        self.pending_meta
            .lock()
            .expect("pending meta lock")
            .push(PendingMeta::Remove(path.to_string()));
        Ok(())
    }

    /// Commit staged chunk writes, then flush the matching metadata.
    pub fn commit(&self) -> Result<()> {
        {
            let mut writer = self.writer.lock().expect("index writer lock");
            writer.commit()?;
        }

        let pending = std::mem::take(
            &mut *self.pending_meta.lock().expect("pending meta lock"),
        );
        let mut sets = Vec::new();
        for op in &pending {
            match op {
                PendingMeta::Set(path, meta) => {
                    sets.push((path.clone(), *meta));
                }
                PendingMeta::Remove(path) => {
                    self.meta.remove(path)?;
                }
            }
        }
        self.meta.batch_set(&sets)?;
        Ok(())
    }

    /// Drop all rows. Metadata goes first so an interruption leaves the
    /// store looking empty to the indexer, which then re-inserts.
    pub fn clear(&self) -> Result<()> {
        self.pending_meta.lock().expect("pending meta lock").clear();
        self.meta.clear()?;
        let mut writer = self.writer.lock().expect("index writer lock");
        self.fts.clear(&mut writer)?;
        writer.commit()?;
        Ok(())
    }

    /// Execute a full-text query. See [`ChunkIndex::search`].
    pub fn search(
        &self,
        query_expression: &str,
        extensions: &ExtensionFilter,
        limit: usize,
    ) -> Result<Vec<ScoredChunk>> {
        self.fts.search(query_expression, extensions, limit)
    }
}

impl std::fmt::Debug for IndexStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexStore")
            .field("db_root", &self.db_root)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::ChunkType;

    fn test_store() -> (tempfile::TempDir, IndexStore) {
        let tmp = tempfile::tempdir().unwrap();
        let store = IndexStore::open(&tmp.path().join("db")).unwrap();
        (tmp, store)
    }

    fn md_chunk(content: &str) -> Chunk {
        Chunk {
            chunk_type: ChunkType::MarkdownSection,
            symbol_name: String::new(),
            content: content.to_string(),
            line_start: 1,
            line_end: content.lines().count().max(1),
            is_doc_file: false,
        }
    }

    #[test]
    fn upsert_commits_chunks_and_metadata_together() {
        let (_tmp, store) = test_store();

        store
            .upsert_file("a.md", 100, &[md_chunk("hello"), md_chunk("world")])
            .unwrap();
        store.commit().unwrap();

        let meta = store.get_file_meta("a.md").unwrap().unwrap();
        assert_eq!(meta.mtime_ns, 100);
        assert_eq!(meta.chunk_count, 2);
        assert_eq!(store.chunk_count().unwrap(), 2);

        let results = store
            .search("hello", &ExtensionFilter::All, 10)
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].file_path, "a.md");
    }

    #[test]
    fn upsert_replaces_en_bloc() {
        let (_tmp, store) = test_store();

        store
            .upsert_file("a.md", 100, &[md_chunk("first"), md_chunk("extra")])
            .unwrap();
        store.commit().unwrap();

        store.upsert_file("a.md", 200, &[md_chunk("second")]).unwrap();
        store.commit().unwrap();

        assert!(
            store
                .search("first", &ExtensionFilter::All, 10)
                .unwrap()
                .is_empty()
        );
        assert_eq!(store.get_file_meta("a.md").unwrap().unwrap().chunk_count, 1);
        assert_eq!(store.chunk_count().unwrap(), 1);
    }

    #[test]
    fn delete_file_removes_both_sides() {
        let (_tmp, store) = test_store();

        store.upsert_file("a.md", 100, &[md_chunk("hello")]).unwrap();
        store.commit().unwrap();

        store.delete_file("a.md").unwrap();
        store.commit().unwrap();

        assert_eq!(store.get_file_meta("a.md").unwrap(), None);
        assert!(store.all_paths().unwrap().is_empty());
        assert!(
            store
                .search("hello", &ExtensionFilter::All, 10)
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn staged_writes_are_invisible_before_commit() {
        let (_tmp, store) = test_store();

        store.upsert_file("a.md", 100, &[md_chunk("hello")]).unwrap();

        assert!(
            store
                .search("hello", &ExtensionFilter::All, 10)
                .unwrap()
                .is_empty()
        );
        assert_eq!(store.get_file_meta("a.md").unwrap(), None);

        store.commit().unwrap();
        assert_eq!(
            store.search("hello", &ExtensionFilter::All, 10).unwrap().len(),
            1
        );
    }

    #[test]
    fn clear_empties_the_store() {
        let (_tmp, store) = test_store();

        store.upsert_file("a.md", 100, &[md_chunk("hello")]).unwrap();
        store.upsert_file("b.md", 200, &[md_chunk("world")]).unwrap();
        store.commit().unwrap();

        store.clear().unwrap();

        assert!(store.all_paths().unwrap().is_empty());
        assert_eq!(store.chunk_count().unwrap(), 0);
        assert!(
            store
                .search("hello", &ExtensionFilter::All, 10)
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn reopen_preserves_state() {
        let tmp = tempfile::tempdir().unwrap();
        let db_root = tmp.path().join("db");

        {
            let store = IndexStore::open(&db_root).unwrap();
            store.upsert_file("a.md", 100, &[md_chunk("hello")]).unwrap();
            store.commit().unwrap();
        }

        {
            let store = IndexStore::open(&db_root).unwrap();
            assert_eq!(store.all_paths().unwrap().len(), 1);
            assert_eq!(
                store.search("hello", &ExtensionFilter::All, 10).unwrap().len(),
                1
            );
        }
    }

    #[test]
    fn schema_version_change_clears_store() {
        let tmp = tempfile::tempdir().unwrap();
        let db_root = tmp.path().join("db");

        {
            let store = IndexStore::open(&db_root).unwrap();
            store.upsert_file("a.md", 100, &[md_chunk("hello")]).unwrap();
            store.commit().unwrap();
            store
                .meta
                .set_setting(SCHEMA_VERSION_KEY, "0-obsolete")
                .unwrap();
        }

        {
            let store = IndexStore::open(&db_root).unwrap();
            assert!(store.all_paths().unwrap().is_empty());
            assert!(
                store
                    .search("hello", &ExtensionFilter::All, 10)
                    .unwrap()
                    .is_empty()
            );
        }
    }
}
