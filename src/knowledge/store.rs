use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
    content_hash, EntryOptions, EntryStatus, EntryUpdate, KnowledgeEntry, SourceType,
    DEFAULT_PRIORITY,
};
use crate::error::{Result, SnapragError};
use crate::state;
use crate::text;

const EXCERPT_WORDS: usize = 150;
const MAX_KEYWORDS: usize = 20;
/// Only the first few query terms take part in keyword search.
const MAX_SEARCH_TERMS: usize = 5;

#[derive(Debug, Default, Serialize, Deserialize)]
struct KnowledgeFile {
    next_id: u64,
    entries: Vec<KnowledgeEntry>,
}

/// Result of adding content that may already exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added(u64),
    /// Identical content was already stored under this id.
    Existing(u64),
}

impl AddOutcome {
    pub fn id(&self) -> u64 {
        match self {
            AddOutcome::Added(id) | AddOutcome::Existing(id) => *id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct KnowledgeStats {
    pub total_active: usize,
    pub total_inactive: usize,
    pub by_source_type: BTreeMap<String, usize>,
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct KeywordHit {
    pub entry_id: u64,
    pub title: String,
    pub excerpt: String,
    pub source_url: Option<String>,
    pub relevance: usize,
}

/// Knowledge entries persisted as one JSON file.
#[derive(Clone)]
pub struct KnowledgeBase {
    path: PathBuf,
    next_id: u64,
    entries: Vec<KnowledgeEntry>,
}

impl KnowledgeBase {
    /// Load from file if it exists, otherwise start empty
    pub fn load(path: &Path) -> Result<Self> {
        let file: KnowledgeFile = state::read_json(path)?.unwrap_or_default();
        let next_id = file
            .entries
            .iter()
            .map(|e| e.id + 1)
            .max()
            .unwrap_or(1)
            .max(file.next_id);
        Ok(Self {
            path: path.to_path_buf(),
            next_id,
            entries: file.entries,
        })
    }

    pub fn save(&self) -> Result<()> {
        let file = KnowledgeFile {
            next_id: self.next_id,
            entries: self.entries.clone(),
        };
        state::write_json_atomic(&self.path, &file, true)
    }

    /// Add an entry unless identical content is already stored.
    pub fn add_content(&mut self, title: &str, content: &str, options: EntryOptions) -> AddOutcome {
        let hash = content_hash(content);
        if let Some(existing) = self.entries.iter().find(|e| e.content_hash == hash) {
            debug!(id = existing.id, "content already in knowledge base");
            return AddOutcome::Existing(existing.id);
        }

        let now = Utc::now();
        let id = self.next_id;
        self.next_id += 1;

        self.entries.push(KnowledgeEntry {
            id,
            title: title.trim().to_string(),
            content: content.to_string(),
            content_hash: hash,
            source_type: options.source_type,
            source_id: options.source_id,
            source_url: options.source_url,
            category: options.category.filter(|c| !c.trim().is_empty()),
            priority: options.priority.unwrap_or(DEFAULT_PRIORITY),
            status: EntryStatus::Active,
            excerpt: text::excerpt(content, EXCERPT_WORDS),
            keywords: text::extract_keywords(&format!("{} {}", title, content), MAX_KEYWORDS),
            created_at: now,
            updated_at: now,
        });
        debug!(id, title, "added knowledge entry");
        AddOutcome::Added(id)
    }

    /// Replace an entry's title and content. Returns whether anything changed.
    pub fn update_content(
        &mut self,
        id: u64,
        title: &str,
        content: &str,
        update: EntryUpdate,
    ) -> Result<bool> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(SnapragError::EntryNotFound(id))?;

        let hash = content_hash(content);
        let title = title.trim();
        let mut changed = false;

        if entry.content_hash != hash || entry.title != title {
            entry.title = title.to_string();
            entry.content = content.to_string();
            entry.content_hash = hash;
            entry.excerpt = text::excerpt(content, EXCERPT_WORDS);
            entry.keywords = text::extract_keywords(&format!("{} {}", title, content), MAX_KEYWORDS);
            changed = true;
        }
        if let Some(category) = update.category {
            let category = Some(category).filter(|c| !c.trim().is_empty());
            if entry.category != category {
                entry.category = category;
                changed = true;
            }
        }
        if let Some(priority) = update.priority {
            if entry.priority != priority {
                entry.priority = priority;
                changed = true;
            }
        }
        if let Some(status) = update.status {
            if entry.status != status {
                entry.status = status;
                changed = true;
            }
        }

        if changed {
            entry.updated_at = Utc::now();
        }
        Ok(changed)
    }

    pub fn delete_content(&mut self, id: u64) -> Result<KnowledgeEntry> {
        let pos = self
            .entries
            .iter()
            .position(|e| e.id == id)
            .ok_or(SnapragError::EntryNotFound(id))?;
        Ok(self.entries.remove(pos))
    }

    /// Flip an entry between active and inactive. Returns whether it changed.
    pub fn set_status(&mut self, id: u64, status: EntryStatus) -> Result<bool> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(SnapragError::EntryNotFound(id))?;
        if entry.status == status {
            return Ok(false);
        }
        entry.status = status;
        entry.updated_at = Utc::now();
        Ok(true)
    }

    pub fn get(&self, id: u64) -> Option<&KnowledgeEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn find_by_source_url(&self, url: &str) -> Option<&KnowledgeEntry> {
        self.entries
            .iter()
            .find(|e| e.source_url.as_deref() == Some(url))
    }

    pub fn list(&self) -> &[KnowledgeEntry] {
        &self.entries
    }

    pub fn active_entries(&self) -> Vec<KnowledgeEntry> {
        self.entries.iter().filter(|e| e.is_active()).cloned().collect()
    }

    /// Remove every entry, or only those of one source type.
    pub fn clear_all(&mut self, source_type: Option<SourceType>) -> usize {
        let before = self.entries.len();
        match source_type {
            Some(st) => self.entries.retain(|e| e.source_type != st),
            None => self.entries.clear(),
        }
        before - self.entries.len()
    }

    pub fn stats(&self) -> KnowledgeStats {
        let mut stats = KnowledgeStats {
            total_active: 0,
            total_inactive: 0,
            by_source_type: BTreeMap::new(),
            last_updated: self.entries.iter().map(|e| e.updated_at).max(),
        };

        for entry in &self.entries {
            if entry.is_active() {
                stats.total_active += 1;
                *stats
                    .by_source_type
                    .entry(entry.source_type.to_string())
                    .or_insert(0) += 1;
            } else {
                stats.total_inactive += 1;
            }
        }

        stats
    }

    /// Active entries as pretty JSON, highest priority first, newest first
    /// within a priority.
    pub fn export_json(&self) -> Result<String> {
        let mut active: Vec<&KnowledgeEntry> = self.entries.iter().filter(|e| e.is_active()).collect();
        active.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });

        #[derive(Serialize)]
        struct Exported<'a> {
            title: &'a str,
            content: &'a str,
            source_type: SourceType,
            category: Option<&'a str>,
            priority: i32,
            created_at: DateTime<Utc>,
        }

        let rows: Vec<Exported> = active
            .into_iter()
            .map(|e| Exported {
                title: &e.title,
                content: &e.content,
                source_type: e.source_type,
                category: e.category.as_deref(),
                priority: e.priority,
                created_at: e.created_at,
            })
            .collect();
        Ok(serde_json::to_string_pretty(&rows)?)
    }

    /// Lexical search over active entries, used when no embedding snapshot
    /// is available. Scores by term occurrences in title, keywords and
    /// content; ties go to higher priority, then lower id.
    pub fn keyword_search(&self, query: &str, limit: usize) -> Vec<KeywordHit> {
        let terms: Vec<String> = text::search_terms(query)
            .into_iter()
            .take(MAX_SEARCH_TERMS)
            .collect();
        if terms.is_empty() || limit == 0 {
            return Vec::new();
        }

        let mut scored: Vec<(usize, &KnowledgeEntry)> = self
            .entries
            .iter()
            .filter(|e| e.is_active())
            .filter_map(|e| {
                let title = e.title.to_lowercase();
                let content = e.content.to_lowercase();
                let score: usize = terms
                    .iter()
                    .map(|t| {
                        let in_title = title.matches(t.as_str()).count() * 3;
                        let in_keywords = e.keywords.iter().filter(|k| *k == t).count() * 2;
                        in_title + in_keywords + content.matches(t.as_str()).count()
                    })
                    .sum();
                (score > 0).then_some((score, e))
            })
            .collect();

        scored.sort_by(|a, b| {
            b.0.cmp(&a.0)
                .then_with(|| b.1.priority.cmp(&a.1.priority))
                .then_with(|| a.1.id.cmp(&b.1.id))
        });

        scored
            .into_iter()
            .take(limit)
            .map(|(relevance, e)| KeywordHit {
                entry_id: e.id,
                title: e.title.clone(),
                excerpt: e.excerpt.clone(),
                source_url: e.source_url.clone(),
                relevance,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn kb(dir: &TempDir) -> KnowledgeBase {
        KnowledgeBase::load(&dir.path().join("entries.json")).unwrap()
    }

    #[test]
    fn test_add_assigns_ids_and_dedups_by_hash() {
        let dir = TempDir::new().unwrap();
        let mut kb = kb(&dir);

        let a = kb.add_content("Refunds", "Refunds take five days.", EntryOptions::default());
        let b = kb.add_content("Shipping", "We ship worldwide.", EntryOptions::default());
        let dup = kb.add_content("Other title", "Refunds take five days.", EntryOptions::default());

        assert_eq!(a, AddOutcome::Added(1));
        assert_eq!(b, AddOutcome::Added(2));
        assert_eq!(dup, AddOutcome::Existing(1));
        assert_eq!(kb.list().len(), 2);

        let entry = kb.get(1).unwrap();
        assert_eq!(entry.priority, DEFAULT_PRIORITY);
        assert_eq!(entry.status, EntryStatus::Active);
        assert_eq!(entry.content_hash.len(), 64);
        assert!(entry.keywords.contains(&"refunds".to_string()));
    }

    #[test]
    fn test_save_and_reload_keeps_next_id() {
        let dir = TempDir::new().unwrap();
        let mut kb1 = kb(&dir);
        kb1.add_content("A", "first", EntryOptions::default());
        kb1.add_content("B", "second", EntryOptions::default());
        kb1.delete_content(2).unwrap();
        kb1.save().unwrap();

        let mut kb2 = kb(&dir);
        assert_eq!(kb2.list().len(), 1);
        // Ids are never reused after a delete.
        assert_eq!(kb2.add_content("C", "third", EntryOptions::default()), AddOutcome::Added(3));
    }

    #[test]
    fn test_update_content_detects_changes() {
        let dir = TempDir::new().unwrap();
        let mut kb = kb(&dir);
        let id = kb.add_content("A", "old body", EntryOptions::default()).id();
        let old_hash = kb.get(id).unwrap().content_hash.clone();

        assert!(!kb.update_content(id, "A", "old body", EntryUpdate::default()).unwrap());
        assert!(kb.update_content(id, "A", "new body", EntryUpdate::default()).unwrap());
        assert_ne!(kb.get(id).unwrap().content_hash, old_hash);

        let update = EntryUpdate {
            priority: Some(70),
            category: Some("faq".into()),
            status: None,
        };
        assert!(kb.update_content(id, "A", "new body", update).unwrap());
        assert_eq!(kb.get(id).unwrap().priority, 70);
        assert_eq!(kb.get(id).unwrap().category.as_deref(), Some("faq"));

        assert!(matches!(
            kb.update_content(99, "x", "y", EntryUpdate::default()),
            Err(SnapragError::EntryNotFound(99))
        ));
    }

    #[test]
    fn test_status_flip_filters_active_entries() {
        let dir = TempDir::new().unwrap();
        let mut kb = kb(&dir);
        let a = kb.add_content("A", "alpha", EntryOptions::default()).id();
        kb.add_content("B", "beta", EntryOptions::default());

        assert!(kb.set_status(a, EntryStatus::Inactive).unwrap());
        assert!(!kb.set_status(a, EntryStatus::Inactive).unwrap());

        let active = kb.active_entries();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].title, "B");

        let stats = kb.stats();
        assert_eq!(stats.total_active, 1);
        assert_eq!(stats.total_inactive, 1);
    }

    #[test]
    fn test_clear_all_by_source_type() {
        let dir = TempDir::new().unwrap();
        let mut kb = kb(&dir);
        kb.add_content("A", "a", EntryOptions::default());
        kb.add_content(
            "B",
            "b",
            EntryOptions {
                source_type: SourceType::File,
                ..Default::default()
            },
        );

        assert_eq!(kb.clear_all(Some(SourceType::File)), 1);
        assert_eq!(kb.list().len(), 1);
        assert_eq!(kb.clear_all(None), 1);
        assert!(kb.list().is_empty());
    }

    #[test]
    fn test_export_json_orders_by_priority() {
        let dir = TempDir::new().unwrap();
        let mut kb = kb(&dir);
        kb.add_content("Low", "low priority", EntryOptions::default());
        kb.add_content(
            "High",
            "high priority",
            EntryOptions {
                priority: Some(90),
                ..Default::default()
            },
        );
        let id = kb.add_content("Hidden", "inactive", EntryOptions::default()).id();
        kb.set_status(id, EntryStatus::Inactive).unwrap();

        let json = kb.export_json().unwrap();
        let rows: Vec<serde_json::Value> = serde_json::from_str(&json).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["title"], "High");
        assert_eq!(rows[1]["title"], "Low");
    }

    #[test]
    fn test_keyword_search_ranks_title_matches() {
        let dir = TempDir::new().unwrap();
        let mut kb = kb(&dir);
        kb.add_content("Shipping", "Orders ship in two days. Refund questions go to support.", EntryOptions::default());
        kb.add_content("Refund Policy", "A refund is issued within 14 days of the return.", EntryOptions::default());

        let hits = kb.keyword_search("How do I get a refund?", 5);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].title, "Refund Policy");
        assert!(hits[0].relevance > hits[1].relevance);

        assert!(kb.keyword_search("the and of", 5).is_empty());
        assert!(kb.keyword_search("warranty", 5).is_empty());
    }
}
