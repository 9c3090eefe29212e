use std::fmt;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::knowledge::SourceType;

/// Opaque identifier of one rebuild pass, e.g. `snap_3f0c…`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnapshotId(String);

impl SnapshotId {
    pub fn generate() -> Self {
        let bytes: [u8; 16] = rand::thread_rng().gen();
        let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
        Self(format!("snap_{}", hex))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Accepts only ids this crate could have generated, so an id can be
    /// used as a file name without escaping.
    pub fn parse(s: &str) -> Option<Self> {
        let hex = s.strip_prefix("snap_")?;
        if hex.len() == 32 && hex.chars().all(|c| c.is_ascii_hexdigit()) {
            Some(Self(s.to_string()))
        } else {
            None
        }
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Metadata persisted alongside the current-snapshot pointer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    pub snapshot_id: SnapshotId,
    pub embedding_model: String,
    pub generated_at: DateTime<Utc>,
    pub entry_count: usize,
    pub chunk_count: usize,
    /// Vector dimension shared by every chunk; 0 for an empty snapshot.
    pub dimension: usize,
    pub system_prompt: String,
}

/// One embedded chunk row of a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredChunk {
    /// Position within the snapshot; doubles as the ranking tie-breaker.
    pub id: u64,
    pub entry_id: u64,
    pub source_type: SourceType,
    pub source_title: String,
    pub source_url: Option<String>,
    pub source_category: Option<String>,
    pub chunk_index: usize,
    pub text: String,
    pub checksum: String,
    /// Unit-normalized.
    pub embedding: Vec<f32>,
}

/// Full on-disk form of a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub meta: SnapshotMeta,
    pub chunks: Vec<StoredChunk>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredChunk {
    pub score: f32,
    pub chunk: StoredChunk,
}
