//! One handle over the knowledge base, the vector store and the embedder.
//!
//! Content changes are saved immediately and, when auto-rebuild is on,
//! schedule a debounced rebuild. Rebuilds are serialized by an async lock
//! so only one pass writes snapshots at a time.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::{Config, Settings};
use crate::embeddings::store::RebuildParams;
use crate::embeddings::{Embedder, ScoredChunk, SnapshotMeta, VectorStore};
use crate::error::Result;
use crate::knowledge::{
    AddOutcome, EntryOptions, EntryStatus, EntryUpdate, ImportReport, KeywordHit, KnowledgeBase,
    KnowledgeEntry, KnowledgeStats, SourceType, SyncReport,
};
use crate::retrieval::{assemble_context, KnowledgeContext};
use crate::scheduler::RebuildScheduler;

/// Snapshot of the engine state for `status` output.
#[derive(Debug, Clone)]
pub struct EngineStatus {
    pub knowledge: KnowledgeStats,
    pub snapshot: Option<SnapshotMeta>,
    pub snapshot_bytes: Option<u64>,
    pub configured_model: String,
    pub knowledge_enabled: bool,
    pub rebuild_pending: bool,
}

impl EngineStatus {
    /// The current snapshot was embedded with a different model than the
    /// configured one, so queries would compare incompatible vectors.
    pub fn model_mismatch(&self) -> bool {
        self.snapshot
            .as_ref()
            .is_some_and(|s| s.dimension > 0 && s.embedding_model != self.configured_model)
    }

    /// Knowledge changed after the current snapshot was generated.
    pub fn is_stale(&self) -> bool {
        match (&self.snapshot, self.knowledge.last_updated) {
            (None, Some(_)) => true,
            (Some(snap), Some(updated)) => updated > snap.generated_at,
            _ => false,
        }
    }
}

struct Inner {
    config: Config,
    settings: RwLock<Settings>,
    kb: Mutex<KnowledgeBase>,
    store: VectorStore,
    embedder: Arc<dyn Embedder>,
    rebuild_lock: tokio::sync::Mutex<()>,
    scheduler: Option<RebuildScheduler>,
}

#[derive(Clone)]
pub struct Engine {
    inner: Arc<Inner>,
}

impl Engine {
    /// Open the engine without automatic rebuilds.
    pub fn open(config: Config, embedder: Arc<dyn Embedder>) -> Result<Self> {
        Self::build(config, embedder, None)
    }

    /// Open the engine and rebuild `delay` after the last burst of changes.
    pub fn with_auto_rebuild(
        config: Config,
        embedder: Arc<dyn Embedder>,
        delay: Duration,
    ) -> Result<Self> {
        Self::build(config, embedder, Some(RebuildScheduler::new(delay)))
    }

    fn build(
        config: Config,
        embedder: Arc<dyn Embedder>,
        scheduler: Option<RebuildScheduler>,
    ) -> Result<Self> {
        config.settings.validate()?;
        let kb = KnowledgeBase::load(&config.entries_path())?;
        let store = VectorStore::new(config.vectors_dir());
        debug!(data_dir = %config.data_dir.display(), entries = kb.list().len(), "engine opened");

        Ok(Self {
            inner: Arc::new(Inner {
                settings: RwLock::new(config.settings.clone()),
                config,
                kb: Mutex::new(kb),
                store,
                embedder,
                rebuild_lock: tokio::sync::Mutex::new(()),
                scheduler,
            }),
        })
    }

    fn kb(&self) -> MutexGuard<'_, KnowledgeBase> {
        self.inner.kb.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn settings(&self) -> Settings {
        match self.inner.settings.read() {
            Ok(s) => s.clone(),
            Err(e) => e.into_inner().clone(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.inner.config.data_dir
    }

    pub fn rebuild_pending(&self) -> bool {
        self.inner
            .scheduler
            .as_ref()
            .is_some_and(RebuildScheduler::is_pending)
    }

    /// Queue a rebuild if auto-rebuild is on. Returns whether one was queued.
    pub fn schedule_rebuild(&self) -> bool {
        let Some(scheduler) = &self.inner.scheduler else {
            return false;
        };
        let engine = self.clone();
        scheduler.schedule(move || async move {
            if let Err(e) = engine.rebuild_now().await {
                warn!("scheduled rebuild failed: {}", e);
            }
        })
    }

    fn after_change(&self, changed: bool) {
        if changed {
            self.schedule_rebuild();
        }
    }

    // --- knowledge base ---

    /// Apply `change` to the knowledge base and save it when `changed` says
    /// so. On any error the in-memory state is restored, so memory never
    /// holds changes the file lacks.
    fn mutate<T>(
        &self,
        change: impl FnOnce(&mut KnowledgeBase) -> Result<T>,
        changed: impl Fn(&T) -> bool,
    ) -> Result<T> {
        let result = {
            let mut kb = self.kb();
            let before = kb.clone();
            let result = match change(&mut *kb) {
                Ok(result) => result,
                Err(e) => {
                    *kb = before;
                    return Err(e);
                }
            };
            if changed(&result) {
                if let Err(e) = kb.save() {
                    warn!("saving knowledge base failed, change rolled back: {}", e);
                    *kb = before;
                    return Err(e);
                }
            }
            result
        };
        self.after_change(changed(&result));
        Ok(result)
    }

    pub fn add_content(&self, title: &str, content: &str, options: EntryOptions) -> Result<AddOutcome> {
        self.mutate(
            |kb| Ok(kb.add_content(title, content, options)),
            |outcome| matches!(outcome, AddOutcome::Added(_)),
        )
    }

    pub fn update_content(&self, id: u64, title: &str, content: &str, update: EntryUpdate) -> Result<bool> {
        self.mutate(|kb| kb.update_content(id, title, content, update), |changed| *changed)
    }

    pub fn delete_content(&self, id: u64) -> Result<KnowledgeEntry> {
        self.mutate(|kb| kb.delete_content(id), |_| true)
    }

    pub fn set_status(&self, id: u64, status: EntryStatus) -> Result<bool> {
        self.mutate(|kb| kb.set_status(id, status), |changed| *changed)
    }

    pub fn clear_all(&self, source_type: Option<SourceType>) -> Result<usize> {
        self.mutate(|kb| Ok(kb.clear_all(source_type)), |removed| *removed > 0)
    }

    pub fn import_file(&self, path: &Path, options: &EntryOptions) -> Result<ImportReport> {
        self.mutate(|kb| kb.import_file(path, options), ImportReport::changed)
    }

    pub fn sync_directory(&self, dir: &Path, options: &EntryOptions) -> Result<SyncReport> {
        self.mutate(|kb| kb.sync_directory(dir, options), SyncReport::changed)
    }

    pub fn entries(&self) -> Vec<KnowledgeEntry> {
        self.kb().list().to_vec()
    }

    pub fn get(&self, id: u64) -> Option<KnowledgeEntry> {
        self.kb().get(id).cloned()
    }

    pub fn stats(&self) -> KnowledgeStats {
        self.kb().stats()
    }

    pub fn export_json(&self) -> Result<String> {
        self.kb().export_json()
    }

    pub fn keyword_search(&self, query: &str, limit: usize) -> Vec<KeywordHit> {
        self.kb().keyword_search(query, limit)
    }

    // --- settings ---

    /// Validate, persist and apply new settings. Returns whether the change
    /// invalidates the current snapshot; a rebuild is queued if so.
    pub fn update_settings(&self, next: Settings) -> Result<bool> {
        next.validate()?;
        let previous = self.settings();
        let requires_rebuild = previous.requires_rebuild(&next);

        let config = Config {
            settings: next.clone(),
            ..self.inner.config.clone()
        };
        config.save_settings()?;
        match self.inner.settings.write() {
            Ok(mut s) => *s = next,
            Err(e) => *e.into_inner() = next,
        }

        info!(requires_rebuild, "settings updated");
        self.after_change(requires_rebuild);
        Ok(requires_rebuild)
    }

    // --- embeddings ---

    pub async fn rebuild_now(&self) -> Result<SnapshotMeta> {
        self.rebuild_with_progress(&|_, _| {}).await
    }

    /// Rebuild the snapshot from the active entries, waiting for any rebuild
    /// already in progress.
    pub async fn rebuild_with_progress(
        &self,
        on_progress: &(dyn Fn(usize, usize) + Sync),
    ) -> Result<SnapshotMeta> {
        let _guard = self.inner.rebuild_lock.lock().await;

        let settings = self.settings();
        let entries = self.indexable_entries(&settings);

        let params = RebuildParams {
            embedding_model: settings.model(),
            system_prompt: settings.system_prompt(),
            limits: settings.chunking,
        };
        self.inner
            .store
            .rebuild_with_progress(&entries, self.inner.embedder.as_ref(), &params, on_progress)
            .await
    }

    fn indexable_entries(&self, settings: &Settings) -> Vec<KnowledgeEntry> {
        if settings.knowledge_enabled {
            self.kb().active_entries()
        } else {
            debug!("knowledge base disabled, rebuilding an empty snapshot");
            Vec::new()
        }
    }

    /// Embed `message` and rank the current snapshot against it.
    pub async fn query_text(&self, message: &str, limit: usize) -> Result<Vec<ScoredChunk>> {
        let message = message.trim();
        if message.is_empty() {
            return Ok(Vec::new());
        }
        let settings = self.settings();
        if let Some(meta) = self.inner.store.current()? {
            if meta.dimension > 0 && meta.embedding_model != settings.model() {
                warn!(
                    snapshot_model = %meta.embedding_model,
                    configured_model = settings.model(),
                    "snapshot was built with another model, rebuild to refresh it"
                );
            }
        }

        let vector = self.inner.embedder.embed(message, settings.model()).await?;
        self.inner.store.query(&vector, limit)
    }

    /// Knowledge for one user message. Never fails: an empty message, a
    /// disabled knowledge base or any retrieval error gives an empty context.
    pub async fn retrieve_context(&self, message: &str) -> KnowledgeContext {
        let settings = self.settings();
        if message.trim().is_empty() || !settings.knowledge_enabled {
            return KnowledgeContext::default();
        }

        match self.query_text(message, settings.retrieval.match_limit).await {
            Ok(matches) => {
                let ctx = assemble_context(matches, &settings.retrieval);
                debug!(
                    matches = ctx.matches.len(),
                    top_score = ctx.top_score,
                    low_confidence = ctx.low_confidence,
                    "context assembled"
                );
                ctx
            }
            Err(e) => {
                warn!("knowledge retrieval failed, continuing without context: {}", e);
                KnowledgeContext::default()
            }
        }
    }

    /// System messages for one user message: the configured system prompt
    /// followed by the knowledge guidance.
    pub async fn prompt_messages(&self, message: &str) -> Vec<String> {
        let settings = self.settings();
        let mut messages = vec![settings.system_prompt().to_string()];
        if settings.knowledge_enabled {
            let ctx = self.retrieve_context(message).await;
            messages.extend(ctx.guidance(settings.retrieval.effective_threshold()));
        }
        messages
    }

    pub fn status(&self) -> Result<EngineStatus> {
        let settings = self.settings();
        Ok(EngineStatus {
            knowledge: self.stats(),
            snapshot: self.inner.store.current()?,
            snapshot_bytes: self.inner.store.current_size()?,
            configured_model: settings.model().to_string(),
            knowledge_enabled: settings.knowledge_enabled,
            rebuild_pending: self.rebuild_pending(),
        })
    }

    /// Remove snapshot files other than the current one. Waits for any
    /// rebuild in progress so its snapshot is never collected mid-pass.
    pub async fn garbage_collect(&self) -> Result<usize> {
        let _guard = self.inner.rebuild_lock.lock().await;
        self.inner.store.garbage_collect()
    }
}
