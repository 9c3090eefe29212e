//! The knowledge base: documents the retrieval engine indexes.

pub mod import;
pub mod store;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub use import::{ImportReport, SyncReport};
pub use store::{AddOutcome, KeywordHit, KnowledgeBase, KnowledgeStats};

/// Default priority for entries that do not set one.
pub const DEFAULT_PRIORITY: i32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    #[default]
    Custom,
    File,
    Post,
    Product,
}

impl SourceType {
    pub fn from_str_loose(s: &str) -> Option<SourceType> {
        match s.to_lowercase().as_str() {
            "custom" | "manual" => Some(SourceType::Custom),
            "file" => Some(SourceType::File),
            "post" | "page" => Some(SourceType::Post),
            "product" => Some(SourceType::Product),
            _ => None,
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceType::Custom => write!(f, "custom"),
            SourceType::File => write!(f, "file"),
            SourceType::Post => write!(f, "post"),
            SourceType::Product => write!(f, "product"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    #[default]
    Active,
    Inactive,
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryStatus::Active => write!(f, "active"),
            EntryStatus::Inactive => write!(f, "inactive"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    pub id: u64,
    pub title: String,
    pub content: String,
    /// SHA-256 of `content`; dedup key and chunk checksum base.
    pub content_hash: String,
    pub source_type: SourceType,
    pub source_id: Option<u64>,
    pub source_url: Option<String>,
    pub category: Option<String>,
    pub priority: i32,
    pub status: EntryStatus,
    #[serde(default)]
    pub excerpt: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl KnowledgeEntry {
    pub fn is_active(&self) -> bool {
        self.status == EntryStatus::Active
    }
}

/// Optional source metadata for a new entry.
#[derive(Debug, Clone, Default)]
pub struct EntryOptions {
    pub source_type: SourceType,
    pub source_id: Option<u64>,
    pub source_url: Option<String>,
    pub category: Option<String>,
    pub priority: Option<i32>,
}

/// Metadata changes applied together with a content update.
#[derive(Debug, Clone, Default)]
pub struct EntryUpdate {
    pub category: Option<String>,
    pub priority: Option<i32>,
    pub status: Option<EntryStatus>,
}

/// SHA-256 hex digest of entry content.
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}
