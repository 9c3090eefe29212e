pub mod embeddings;
pub mod knowledge;
pub mod settings;

use colored::Colorize;

use crate::error::{Result, SnapragError};
use crate::knowledge::SourceType;

/// Commands run on a fresh single-threaded runtime.
pub fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| SnapragError::Config(format!("tokio runtime: {}", e)))
}

pub fn parse_source_type(raw: &str) -> Result<SourceType> {
    SourceType::from_str_loose(raw)
        .ok_or_else(|| SnapragError::Config(format!("Unknown source type: {}", raw)))
}

fn rebuild_hint() {
    println!(
        "  Run {} to refresh embeddings.",
        "snaprag rebuild".cyan()
    );
}
