//! Snapshot-versioned vector store.
//!
//! Layout under the store directory:
//!
//! ```text
//! current.json              metadata of the current snapshot (the pointer)
//! snapshots/<id>.json       chunks of one rebuild pass
//! ```
//!
//! A rebuild writes its snapshot file completely before the pointer is
//! replaced, and both writes go through a temp file and a rename. Readers
//! therefore only ever see a fully written snapshot.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use chrono::Utc;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use super::snapshot::Snapshot;
use super::{dot, normalize_vector, Embedder, ScoredChunk, SnapshotId, SnapshotMeta, StoredChunk};
use crate::chunker::{chunk_checksum, chunk_content, ChunkLimits};
use crate::error::{Result, SnapragError};
use crate::knowledge::KnowledgeEntry;
use crate::state;

const POINTER_FILE: &str = "current.json";
const SNAPSHOT_DIR: &str = "snapshots";

/// Inputs of one rebuild pass besides the entries themselves.
#[derive(Debug, Clone)]
pub struct RebuildParams<'a> {
    pub embedding_model: &'a str,
    pub system_prompt: &'a str,
    pub limits: ChunkLimits,
}

pub struct VectorStore {
    dir: PathBuf,
    /// Last snapshot loaded from disk, reused while it stays current.
    cache: RwLock<Option<Arc<Snapshot>>>,
}

impl VectorStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            cache: RwLock::new(None),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn pointer_path(&self) -> PathBuf {
        self.dir.join(POINTER_FILE)
    }

    fn snapshot_path(&self, id: &SnapshotId) -> PathBuf {
        self.dir.join(SNAPSHOT_DIR).join(format!("{}.json", id))
    }

    /// Metadata of the current snapshot, if a rebuild ever succeeded.
    pub fn current(&self) -> Result<Option<SnapshotMeta>> {
        state::read_json(&self.pointer_path())
    }

    /// On-disk size of the current snapshot file, in bytes.
    pub fn current_size(&self) -> Result<Option<u64>> {
        let Some(meta) = self.current()? else {
            return Ok(None);
        };
        match std::fs::metadata(self.snapshot_path(&meta.snapshot_id)) {
            Ok(m) => Ok(Some(m.len())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Re-embed every active entry into a fresh snapshot and make it current.
    ///
    /// Chunks are embedded one at a time. The first embedding failure aborts
    /// the pass before anything is written, so the previous snapshot stays
    /// current.
    pub async fn rebuild(
        &self,
        entries: &[KnowledgeEntry],
        embedder: &dyn Embedder,
        params: &RebuildParams<'_>,
    ) -> Result<SnapshotMeta> {
        self.rebuild_with_progress(entries, embedder, params, &|_, _| {})
            .await
    }

    /// Like [`rebuild`](Self::rebuild), reporting `(done, total)` chunk
    /// counts after each embedding.
    pub async fn rebuild_with_progress(
        &self,
        entries: &[KnowledgeEntry],
        embedder: &dyn Embedder,
        params: &RebuildParams<'_>,
        on_progress: &(dyn Fn(usize, usize) + Sync),
    ) -> Result<SnapshotMeta> {
        params.limits.validate()?;

        let snapshot_id = SnapshotId::generate();
        let active: Vec<&KnowledgeEntry> = entries.iter().filter(|e| e.is_active()).collect();

        let planned: Vec<(&KnowledgeEntry, crate::chunker::Chunk)> = active
            .iter()
            .flat_map(|entry| {
                chunk_content(&entry.title, &entry.content, &params.limits)
                    .into_iter()
                    .map(move |chunk| (*entry, chunk))
            })
            .collect();
        let total = planned.len();

        info!(
            snapshot = %snapshot_id,
            entries = active.len(),
            chunks = total,
            model = params.embedding_model,
            "rebuilding embeddings"
        );

        let mut chunks: Vec<StoredChunk> = Vec::with_capacity(total);
        let mut dimension = 0usize;

        for (done, (entry, chunk)) in planned.into_iter().enumerate() {
            let raw = embedder
                .embed(&chunk.text, params.embedding_model)
                .await
                .map_err(|e| {
                    warn!(
                        snapshot = %snapshot_id,
                        entry = entry.id,
                        chunk = chunk.index,
                        "embedding failed, rebuild aborted: {}",
                        e
                    );
                    e
                })?;

            if dimension == 0 {
                dimension = raw.len();
            } else if raw.len() != dimension {
                return Err(SnapragError::VectorSizeMismatch {
                    got: raw.len(),
                    want: dimension,
                });
            }

            chunks.push(StoredChunk {
                id: done as u64,
                entry_id: entry.id,
                source_type: entry.source_type,
                source_title: entry.title.clone(),
                source_url: entry.source_url.clone(),
                source_category: entry.category.clone(),
                chunk_index: chunk.index,
                checksum: chunk_checksum(&entry.content_hash, chunk.index, &chunk.text),
                text: chunk.text,
                embedding: normalize_vector(&raw),
            });
            on_progress(done + 1, total);
        }

        let meta = SnapshotMeta {
            snapshot_id: snapshot_id.clone(),
            embedding_model: params.embedding_model.to_string(),
            generated_at: Utc::now(),
            entry_count: active.len(),
            chunk_count: chunks.len(),
            dimension,
            system_prompt: params.system_prompt.to_string(),
        };
        let snapshot = Snapshot {
            meta: meta.clone(),
            chunks,
        };

        let snapshot_path = self.snapshot_path(&snapshot_id);
        state::write_json_atomic(&snapshot_path, &snapshot, false)?;
        if let Err(e) = state::write_json_atomic(&self.pointer_path(), &meta, true) {
            let _ = std::fs::remove_file(&snapshot_path);
            return Err(e);
        }

        if let Ok(mut cache) = self.cache.write() {
            *cache = Some(Arc::new(snapshot));
        }

        info!(
            snapshot = %snapshot_id,
            chunks = meta.chunk_count,
            dimension,
            "snapshot is now current"
        );
        Ok(meta)
    }

    /// Load the current snapshot, from cache when the pointer still names it.
    fn load_current(&self) -> Result<Option<Arc<Snapshot>>> {
        let Some(meta) = self.current()? else {
            return Ok(None);
        };

        if let Ok(cache) = self.cache.read() {
            if let Some(snap) = cache.as_ref() {
                if snap.meta.snapshot_id == meta.snapshot_id {
                    return Ok(Some(Arc::clone(snap)));
                }
            }
        }

        let path = self.snapshot_path(&meta.snapshot_id);
        let Some(snapshot) = state::read_json::<Snapshot>(&path)? else {
            warn!(snapshot = %meta.snapshot_id, "current snapshot file is missing");
            return Ok(None);
        };
        let snapshot = Arc::new(snapshot);
        debug!(snapshot = %meta.snapshot_id, chunks = snapshot.chunks.len(), "loaded snapshot");

        if let Ok(mut cache) = self.cache.write() {
            *cache = Some(Arc::clone(&snapshot));
        }
        Ok(Some(snapshot))
    }

    /// Rank every chunk of the current snapshot against `query_vector`.
    ///
    /// The query is normalized first, so the dot product with the stored
    /// unit vectors is the cosine similarity. Equal scores are ordered by
    /// chunk id. No snapshot, or an empty query, gives an empty result.
    pub fn query(&self, query_vector: &[f32], limit: usize) -> Result<Vec<ScoredChunk>> {
        if query_vector.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let Some(snapshot) = self.load_current()? else {
            return Ok(Vec::new());
        };

        let query = normalize_vector(query_vector);
        let mut scored: Vec<(f32, &StoredChunk)> = snapshot
            .chunks
            .par_iter()
            .filter_map(|chunk| dot(&query, &chunk.embedding).map(|score| (score, chunk)))
            .filter(|(score, _)| score.is_finite())
            .collect();

        if scored.len() < snapshot.chunks.len() {
            debug!(
                skipped = snapshot.chunks.len() - scored.len(),
                "chunks skipped for dimension mismatch"
            );
        }

        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.1.id.cmp(&b.1.id))
        });

        Ok(scored
            .into_iter()
            .take(limit)
            .map(|(score, chunk)| ScoredChunk {
                score,
                chunk: chunk.clone(),
            })
            .collect())
    }

    /// Delete snapshot files that are not current, plus stray temp files.
    ///
    /// Files modified after the pointer belong to a pass that has not
    /// swapped the pointer yet and are kept. Without a pointer nothing is
    /// collected.
    pub fn garbage_collect(&self) -> Result<usize> {
        let dir = self.dir.join(SNAPSHOT_DIR);
        if !dir.exists() {
            return Ok(0);
        }
        let Some(current) = self.current()? else {
            return Ok(0);
        };
        let current_path = self.snapshot_path(&current.snapshot_id);
        let pointer_modified = std::fs::metadata(self.pointer_path())?.modified()?;

        let mut removed = 0;
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if path == current_path || !path.is_file() {
                continue;
            }
            if entry.metadata()?.modified()? > pointer_modified {
                debug!(path = %path.display(), "keeping snapshot file newer than the pointer");
                continue;
            }
            std::fs::remove_file(&path)?;
            debug!(path = %path.display(), "removed stale snapshot file");
            removed += 1;
        }
        Ok(removed)
    }
}
