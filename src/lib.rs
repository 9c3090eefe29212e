// Library interface for snaprag
#![allow(dead_code)]

pub mod chunker;
pub mod cli;
pub mod config;
pub mod embeddings;
pub mod engine;
pub mod error;
pub mod knowledge;
pub mod retrieval;
pub mod scheduler;
pub mod state;
pub mod text;

// Re-export commonly used types
pub use config::{Config, Settings};
pub use embeddings::{Embedder, EmbeddingClient, Provider, ScoredChunk, SnapshotMeta, VectorStore};
pub use engine::{Engine, EngineStatus};
pub use error::{EmbeddingError, Result, SnapragError};
pub use knowledge::{EntryOptions, EntryStatus, KnowledgeBase, KnowledgeEntry, SourceType};
pub use retrieval::{KnowledgeContext, RetrievalSettings};
