use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

use super::runtime;
use crate::embeddings::SnapshotMeta;
use crate::engine::Engine;
use crate::error::Result;
use crate::text;

/// Rebuild with a progress bar on stderr.
pub async fn rebuild_with_bar(engine: &Engine) -> Result<SnapshotMeta> {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
    );
    pb.set_message("embedding chunks");

    let result = engine
        .rebuild_with_progress(&|done, total| {
            pb.set_length(total as u64);
            pb.set_position(done as u64);
        })
        .await;

    match &result {
        Ok(_) => pb.finish_and_clear(),
        Err(_) => pb.abandon(),
    }
    result
}

pub fn print_snapshot(meta: &SnapshotMeta) {
    println!(
        "{} Snapshot {} is current:",
        "Done!".green().bold(),
        meta.snapshot_id.to_string().cyan()
    );
    println!("  Entries:   {}", meta.entry_count);
    println!("  Chunks:    {}", meta.chunk_count);
    println!("  Dimension: {}", meta.dimension);
    println!("  Model:     {}", meta.embedding_model);
}

pub fn cmd_rebuild(engine: &Engine) -> Result<()> {
    let rt = runtime()?;
    rt.block_on(async {
        println!("{} Rebuilding embeddings...", "Embedding".green().bold());
        let meta = rebuild_with_bar(engine).await?;
        print_snapshot(&meta);
        Ok(())
    })
}

pub fn cmd_query(engine: &Engine, message: &str, limit: usize) -> Result<()> {
    let rt = runtime()?;
    rt.block_on(async {
        let threshold = engine.settings().retrieval.effective_threshold();
        let results = engine.query_text(message, limit).await?;

        if results.is_empty() {
            println!("{}", "No matches. Has a snapshot been built?".yellow());
            return Ok(());
        }

        println!(
            "{} Matches for '{}':\n",
            "Query".green().bold(),
            message
        );
        for hit in results {
            let marker = if hit.score >= threshold {
                ">".green()
            } else {
                "-".dimmed()
            };
            println!(
                "  {} {} #{} chunk {} ({:.1}%)",
                marker,
                hit.chunk.source_title.cyan(),
                hit.chunk.entry_id,
                hit.chunk.chunk_index,
                hit.score * 100.0
            );
            println!(
                "    {}\n",
                text::truncate_chars(&text::single_line(&hit.chunk.text), 150)
            );
        }
        Ok(())
    })
}

pub fn cmd_context(engine: &Engine, message: &str, json: bool) -> Result<()> {
    let rt = runtime()?;
    rt.block_on(async {
        if json {
            let ctx = engine.retrieve_context(message).await;
            println!("{}", serde_json::to_string_pretty(&ctx)?);
            return Ok(());
        }

        for (i, msg) in engine.prompt_messages(message).await.iter().enumerate() {
            println!("{} {}", format!("[system {}]", i + 1).cyan().bold(), msg);
            println!();
        }
        Ok(())
    })
}

pub fn cmd_status(engine: &Engine) -> Result<()> {
    let status = engine.status()?;
    let settings = engine.settings();

    println!("{}", "Snaprag Status".green().bold());
    println!("{}", "=".repeat(40));
    println!(
        "  Data directory:    {}",
        engine.data_dir().display().to_string().cyan()
    );
    println!(
        "  Knowledge base:    {}",
        if status.knowledge_enabled {
            "enabled".green()
        } else {
            "disabled".yellow()
        }
    );
    println!("  Active entries:    {}", status.knowledge.total_active);
    println!("  Inactive entries:  {}", status.knowledge.total_inactive);
    for (source, count) in &status.knowledge.by_source_type {
        println!("    {}: {}", source, count);
    }
    println!(
        "  Provider / model:  {} / {}",
        settings.provider.to_string().cyan(),
        status.configured_model.cyan()
    );

    match &status.snapshot {
        Some(meta) => {
            println!("  Snapshot:          {}", meta.snapshot_id);
            println!(
                "  Generated:         {}",
                meta.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
            );
            println!(
                "  Chunks:            {} ({} dims)",
                meta.chunk_count, meta.dimension
            );
            if let Some(bytes) = status.snapshot_bytes {
                println!(
                    "  Snapshot size:     {}",
                    humansize::format_size(bytes, humansize::BINARY)
                );
            }
        }
        None => println!("  Snapshot:          {}", "none".yellow()),
    }

    if status.model_mismatch() {
        println!(
            "\n{} snapshot was built with a different model; run {}",
            "Warning:".yellow().bold(),
            "snaprag rebuild".cyan()
        );
    } else if status.is_stale() {
        println!(
            "\n{} knowledge changed since the last rebuild; run {}",
            "Note:".yellow(),
            "snaprag rebuild".cyan()
        );
    }
    Ok(())
}

pub fn cmd_gc(engine: &Engine) -> Result<()> {
    let removed = runtime()?.block_on(engine.garbage_collect())?;
    println!(
        "{} Removed {} stale snapshot file(s)",
        "Done!".green().bold(),
        removed
    );
    Ok(())
}
