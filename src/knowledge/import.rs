//! File import and directory sync into the knowledge base.

use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::{AddOutcome, EntryOptions, EntryUpdate, KnowledgeBase, SourceType};
use crate::error::{Result, SnapragError};
use crate::text;

/// Synced documents shorter than this (in chars) are not worth indexing.
pub const MIN_SYNC_CONTENT_CHARS: usize = 100;

/// A titled piece of text read from a file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Document {
    pub title: String,
    pub content: String,
    /// Stable identity of the document within its source, used to match
    /// it against existing entries on re-sync.
    #[serde(skip)]
    pub source_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileFormat {
    Text,
    Markdown,
    Json,
}

impl FileFormat {
    fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "txt" => Some(FileFormat::Text),
            "md" | "markdown" => Some(FileFormat::Markdown),
            "json" => Some(FileFormat::Json),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub added: Vec<u64>,
    pub existing: Vec<u64>,
}

impl ImportReport {
    pub fn changed(&self) -> bool {
        !self.added.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub added: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped: usize,
}

impl SyncReport {
    pub fn changed(&self) -> bool {
        self.added + self.updated > 0
    }
}

/// Read the documents contained in one file.
///
/// `.txt` is taken as-is, markdown is reduced to plain text and `.json`
/// must be an array of `{title, content}` objects.
pub fn read_documents(path: &Path) -> Result<Vec<Document>> {
    let format = FileFormat::from_path(path)
        .ok_or_else(|| SnapragError::UnsupportedFormat(path.display().to_string()))?;
    let raw = std::fs::read_to_string(path)?;
    let url = path.display().to_string();
    let title = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();

    let docs = match format {
        FileFormat::Text => vec![Document {
            title,
            content: raw.trim().to_string(),
            source_url: url,
        }],
        FileFormat::Markdown => vec![Document {
            title,
            content: text::markdown_to_text(&raw),
            source_url: url,
        }],
        FileFormat::Json => {
            let items: Vec<serde_json::Value> = serde_json::from_str(&raw)
                .map_err(|_| SnapragError::InvalidImport(format!("{}: expected a JSON array", url)))?;
            items
                .into_iter()
                .enumerate()
                .filter_map(|(i, item)| {
                    let mut doc: Document = serde_json::from_value(item).ok()?;
                    doc.source_url = format!("{}#{}", url, i);
                    Some(doc)
                })
                .collect()
        }
    };

    Ok(docs
        .into_iter()
        .filter(|d| !d.content.trim().is_empty())
        .collect())
}

impl KnowledgeBase {
    /// Import every document in `path` as a `file` entry.
    pub fn import_file(&mut self, path: &Path, options: &EntryOptions) -> Result<ImportReport> {
        let docs = read_documents(path)?;
        if docs.is_empty() {
            return Err(SnapragError::InvalidImport(format!(
                "no content extracted from {}",
                path.display()
            )));
        }

        let mut report = ImportReport::default();
        for doc in docs {
            let opts = EntryOptions {
                source_type: SourceType::File,
                source_url: Some(doc.source_url.clone()),
                ..options.clone()
            };
            match self.add_content(&doc.title, &doc.content, opts) {
                AddOutcome::Added(id) => report.added.push(id),
                AddOutcome::Existing(id) => report.existing.push(id),
            }
        }
        debug!(
            path = %path.display(),
            added = report.added.len(),
            existing = report.existing.len(),
            "imported file"
        );
        Ok(report)
    }

    /// Walk `dir` and bring every supported file into the knowledge base,
    /// updating entries whose content changed since the last sync.
    pub fn sync_directory(&mut self, dir: &Path, options: &EntryOptions) -> Result<SyncReport> {
        let mut report = SyncReport::default();

        let mut files: Vec<_> = WalkDir::new(dir)
            .follow_links(false)
            .into_iter()
            .filter_map(|e| match e {
                Ok(entry) => Some(entry),
                Err(err) => {
                    warn!("skipping unreadable path during sync: {}", err);
                    None
                }
            })
            .filter(|e| e.file_type().is_file() && FileFormat::from_path(e.path()).is_some())
            .map(|e| e.into_path())
            .collect();
        files.sort();

        for path in files {
            let docs = match read_documents(&path) {
                Ok(docs) => docs,
                Err(e) => {
                    warn!(path = %path.display(), "skipping file: {}", e);
                    report.skipped += 1;
                    continue;
                }
            };

            for doc in docs {
                if doc.content.chars().count() < MIN_SYNC_CONTENT_CHARS {
                    report.skipped += 1;
                    continue;
                }

                let existing = self.find_by_source_url(&doc.source_url).map(|e| e.id);
                match existing {
                    Some(id) => {
                        if self.update_content(id, &doc.title, &doc.content, EntryUpdate::default())? {
                            report.updated += 1;
                        } else {
                            report.unchanged += 1;
                        }
                    }
                    None => {
                        let opts = EntryOptions {
                            source_type: SourceType::File,
                            source_url: Some(doc.source_url.clone()),
                            ..options.clone()
                        };
                        match self.add_content(&doc.title, &doc.content, opts) {
                            AddOutcome::Added(_) => report.added += 1,
                            AddOutcome::Existing(_) => report.unchanged += 1,
                        }
                    }
                }
            }
        }

        info!(
            dir = %dir.display(),
            added = report.added,
            updated = report.updated,
            unchanged = report.unchanged,
            skipped = report.skipped,
            "directory sync finished"
        );
        Ok(report)
    }
}
