//! Incremental index maintenance.
//!
//! [`Indexer::refresh`] brings the persistent store into agreement with the
//! filesystem: files are diffed by modification time, changed ones are
//! re-chunked, vanished ones are purged. Per-file failures are logged and
//! skipped so one unreadable file never aborts a refresh.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
    time::Instant,
};

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::{
    chunker::{self, Chunk},
    error::Result,
    store::IndexStore,
    walker::{self, DiscoveredFile},
};

/// Outcome of one [`Indexer::refresh`].
#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct RefreshStats {
    pub files_new: usize,
    pub files_modified: usize,
    pub files_deleted: usize,
    pub files_unchanged: usize,
    pub chunks_created: usize,
    pub chunks_removed: usize,
    pub duration_ms: u64,
}

impl RefreshStats {
    pub fn files_seen(&self) -> usize {
        self.files_new + self.files_modified + self.files_unchanged
    }
}

/// Outcome of one [`Indexer::rebuild`], shaped for the rebuild operation's
/// response.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RebuildStats {
    pub indexed_files: usize,
    pub chunks: usize,
    pub elapsed_ms: u64,
}

pub struct Indexer {
    project_root: PathBuf,
    store: Arc<IndexStore>,
}

impl Indexer {
    pub fn new(project_root: PathBuf, store: Arc<IndexStore>) -> Self {
        Self {
            project_root,
            store,
        }
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Reconcile the store with the filesystem.
    ///
    /// New and modified files are re-chunked, deleted files purged,
    /// unchanged files (matching mtime) skipped. All staged writes become
    /// visible together when the final commit lands.
    pub fn refresh(&self) -> Result<RefreshStats> {
        let started = Instant::now();
        let mut stats = RefreshStats::default();

        let on_disk = walker::discover_files(
            &self.project_root,
            Some(self.store.db_root()),
        )?;
        let stored: HashMap<String, (u64, usize)> = self
            .store
            .all_file_meta()?
            .into_iter()
            .map(|(path, meta)| (path, (meta.mtime_ns, meta.chunk_count)))
            .collect();

        // Purge files that are gone from disk.
        let mut dirty = false;
        let disk_paths: std::collections::HashSet<&str> =
            on_disk.iter().map(|f| f.rel_path.as_str()).collect();
        for (path, (_, chunk_count)) in &stored {
            if !disk_paths.contains(path.as_str()) {
                self.store.delete_file(path)?;
                stats.files_deleted += 1;
                stats.chunks_removed += chunk_count;
                dirty = true;
            }
        }

        // Partition the on-disk set.
        let mut to_index: Vec<&DiscoveredFile> = Vec::new();
        for file in &on_disk {
            match stored.get(&file.rel_path) {
                None => {
                    stats.files_new += 1;
                    to_index.push(file);
                }
                Some((mtime_ns, chunk_count)) => {
                    if *mtime_ns != file.mtime_ns {
                        stats.files_modified += 1;
                        stats.chunks_removed += chunk_count;
                        to_index.push(file);
                    } else {
                        stats.files_unchanged += 1;
                    }
                }
            }
        }

        // Read and chunk in parallel; unreadable files keep whatever rows
        // they already have.
        let chunked: Vec<(&DiscoveredFile, Vec<Chunk>)> = to_index
            .par_iter()
            .filter_map(|file| match std::fs::read(&file.abs_path) {
                Ok(bytes) => {
                    Some((*file, chunker::chunk(&file.rel_path, &bytes)))
                }
                Err(e) => {
                    warn!(
                        path = %file.rel_path,
                        error = %e,
                        "skipping unreadable file"
                    );
                    None
                }
            })
            .collect();

        for (file, chunks) in &chunked {
            self.store
                .upsert_file(&file.rel_path, file.mtime_ns, chunks)?;
            stats.chunks_created += chunks.len();
            dirty = true;
        }

        if dirty {
            self.store.commit()?;
        }

        stats.duration_ms = started.elapsed().as_millis() as u64;
        debug!(
            new = stats.files_new,
            modified = stats.files_modified,
            deleted = stats.files_deleted,
            unchanged = stats.files_unchanged,
            chunks = stats.chunks_created,
            time_ms = stats.duration_ms,
            "refresh complete"
        );

        Ok(stats)
    }

    /// Drop everything and index from scratch.
    pub fn rebuild(&self) -> Result<RebuildStats> {
        let started = Instant::now();
        self.store.clear()?;
        let stats = self.refresh()?;

        Ok(RebuildStats {
            indexed_files: stats.files_seen(),
            chunks: stats.chunks_created,
            elapsed_ms: started.elapsed().as_millis() as u64,
        })
    }
}

impl std::fmt::Debug for Indexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Indexer")
            .field("project_root", &self.project_root)
            .finish_non_exhaustive()
    }
}
