use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;

use super::embeddings::{print_snapshot, rebuild_with_bar};
use super::{parse_source_type, rebuild_hint, runtime};
use crate::config::Config;
use crate::embeddings::Embedder;
use crate::engine::Engine;
use crate::error::{Result, SnapragError};
use crate::knowledge::{AddOutcome, EntryOptions, EntryStatus, EntryUpdate, SourceType};

fn finish(engine: &Engine, changed: bool, rebuild: bool) -> Result<()> {
    if !changed {
        return Ok(());
    }
    if rebuild {
        let rt = runtime()?;
        let meta = rt.block_on(rebuild_with_bar(engine))?;
        print_snapshot(&meta);
    } else {
        rebuild_hint();
    }
    Ok(())
}

fn read_text(file: &str) -> Result<String> {
    let path = shellexpand::tilde(file);
    Ok(std::fs::read_to_string(path.as_ref())?)
}

pub struct AddArgs<'a> {
    pub title: &'a str,
    pub content: Option<&'a str>,
    pub file: Option<&'a str>,
    pub category: Option<String>,
    pub priority: Option<i32>,
    pub url: Option<String>,
    pub source_type: &'a str,
    pub rebuild: bool,
}

pub fn cmd_add(engine: &Engine, args: AddArgs<'_>) -> Result<()> {
    let content = match (args.content, args.file) {
        (_, Some(file)) => read_text(file)?,
        (Some(text), None) => text.to_string(),
        (None, None) => return Err(SnapragError::Config("Provide content or --file".into())),
    };
    if content.trim().is_empty() {
        return Err(SnapragError::Config("Content is empty".into()));
    }

    let options = EntryOptions {
        source_type: parse_source_type(args.source_type)?,
        source_url: args.url,
        category: args.category,
        priority: args.priority,
        ..EntryOptions::default()
    };

    match engine.add_content(args.title, &content, options)? {
        AddOutcome::Added(id) => {
            println!("{} Added entry #{}: {}", "Done!".green().bold(), id, args.title.cyan());
            finish(engine, true, args.rebuild)
        }
        AddOutcome::Existing(id) => {
            println!(
                "{} Identical content already stored as entry #{}",
                "Skipped:".yellow(),
                id
            );
            Ok(())
        }
    }
}

pub struct UpdateArgs<'a> {
    pub id: u64,
    pub title: Option<&'a str>,
    pub content: Option<&'a str>,
    pub file: Option<&'a str>,
    pub category: Option<String>,
    pub priority: Option<i32>,
    pub rebuild: bool,
}

pub fn cmd_update(engine: &Engine, args: UpdateArgs<'_>) -> Result<()> {
    let entry = engine
        .get(args.id)
        .ok_or(SnapragError::EntryNotFound(args.id))?;

    let content = match (args.content, args.file) {
        (_, Some(file)) => read_text(file)?,
        (Some(text), None) => text.to_string(),
        (None, None) => entry.content.clone(),
    };
    let title = args.title.unwrap_or(&entry.title);

    let update = EntryUpdate {
        category: args.category,
        priority: args.priority,
        status: None,
    };
    let changed = engine.update_content(args.id, title, &content, update)?;
    if changed {
        println!("{} Updated entry #{}", "Done!".green().bold(), args.id);
    } else {
        println!("{}", "Nothing changed.".yellow());
    }
    finish(engine, changed, args.rebuild)
}

pub fn cmd_import(engine: &Engine, path: &str, category: Option<String>, rebuild: bool) -> Result<()> {
    let expanded = shellexpand::tilde(path);
    let options = EntryOptions {
        category,
        ..EntryOptions::default()
    };
    let report = engine.import_file(Path::new(expanded.as_ref()), &options)?;

    println!(
        "{} Imported {}: {} added, {} already present",
        "Done!".green().bold(),
        path.cyan(),
        report.added.len(),
        report.existing.len()
    );
    finish(engine, report.changed(), rebuild)
}

pub struct SyncArgs<'a> {
    pub dir: &'a str,
    pub category: Option<String>,
    pub watch: bool,
    pub interval: u64,
    pub rebuild: bool,
}

/// One-shot sync uses `engine`; watch mode opens its own engine from
/// `config` with the rebuild scheduler attached.
pub fn cmd_sync(
    engine: &Engine,
    args: SyncArgs<'_>,
    config: Config,
    embedder: Arc<dyn Embedder>,
) -> Result<()> {
    let expanded = shellexpand::tilde(args.dir).to_string();
    let dir = Path::new(&expanded);
    if !dir.is_dir() {
        return Err(SnapragError::Config(format!("Not a directory: {}", dir.display())));
    }
    let options = EntryOptions {
        source_type: SourceType::File,
        category: args.category,
        ..EntryOptions::default()
    };

    if !args.watch {
        let report = engine.sync_directory(dir, &options)?;
        println!(
            "{} Synced {}: {} added, {} updated, {} unchanged, {} skipped",
            "Done!".green().bold(),
            dir.display().to_string().cyan(),
            report.added,
            report.updated,
            report.unchanged,
            report.skipped
        );
        return finish(engine, report.changed(), args.rebuild);
    }

    let interval = args.interval;
    let delay = config.settings.rebuild_delay();
    let rt = runtime()?;
    rt.block_on(async {
        let engine = Engine::with_auto_rebuild(config, embedder, delay)?;
        println!(
            "{} Watching {} every {}s (Ctrl-C to stop)",
            "Sync".green().bold(),
            dir.display().to_string().cyan(),
            interval
        );

        let mut ticker = tokio::time::interval(Duration::from_secs(interval.max(1)));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match engine.sync_directory(dir, &options) {
                        Ok(report) if report.changed() => println!(
                            "  {} {} added, {} updated; rebuild scheduled",
                            ">".green(),
                            report.added,
                            report.updated
                        ),
                        Ok(_) => {}
                        Err(e) => eprintln!("  {} {}", "sync failed:".red(), e),
                    }
                }
                _ = tokio::signal::ctrl_c() => break,
            }
        }

        if engine.rebuild_pending() {
            println!("  Finishing pending rebuild...");
            let meta = engine.rebuild_now().await?;
            print_snapshot(&meta);
        }
        Ok(())
    })
}

pub fn cmd_list(engine: &Engine, all: bool, source_type: Option<&str>) -> Result<()> {
    let filter = source_type.map(parse_source_type).transpose()?;
    let entries: Vec<_> = engine
        .entries()
        .into_iter()
        .filter(|e| all || e.is_active())
        .filter(|e| filter.map_or(true, |st| e.source_type == st))
        .collect();

    if entries.is_empty() {
        println!("{}", "No entries.".yellow());
        return Ok(());
    }

    for e in &entries {
        let status = match e.status {
            EntryStatus::Active => "active".green(),
            EntryStatus::Inactive => "inactive".dimmed(),
        };
        println!(
            "  #{:<5} {} [{}] {} {}",
            e.id,
            e.title.cyan(),
            e.source_type,
            status,
            e.category
                .as_deref()
                .map(|c| format!("({})", c))
                .unwrap_or_default()
                .dimmed()
        );
    }
    println!("\n  {} entries", entries.len());
    Ok(())
}

pub fn cmd_show(engine: &Engine, id: u64) -> Result<()> {
    let e = engine.get(id).ok_or(SnapragError::EntryNotFound(id))?;

    println!("{} {}", format!("#{}", e.id).green().bold(), e.title.bold());
    println!("  Status:    {}", e.status);
    println!("  Source:    {}", e.source_type);
    if let Some(url) = &e.source_url {
        println!("  URL:       {}", url);
    }
    if let Some(cat) = &e.category {
        println!("  Category:  {}", cat);
    }
    println!("  Priority:  {}", e.priority);
    println!("  Updated:   {}", e.updated_at.format("%Y-%m-%d %H:%M:%S UTC"));
    if !e.keywords.is_empty() {
        println!("  Keywords:  {}", e.keywords.join(", ").dimmed());
    }
    println!("\n{}", e.content);
    Ok(())
}

pub fn cmd_remove(
    engine: &Engine,
    id: Option<u64>,
    all: bool,
    source_type: Option<&str>,
    rebuild: bool,
) -> Result<()> {
    if all {
        let filter = source_type.map(parse_source_type).transpose()?;
        let removed = engine.clear_all(filter)?;
        println!("{} Removed {} entries", "Done!".green().bold(), removed);
        return finish(engine, removed > 0, rebuild);
    }

    let id = id.ok_or_else(|| SnapragError::Config("Provide an entry id or --all".into()))?;
    let removed = engine.delete_content(id)?;
    println!(
        "{} Removed entry #{}: {}",
        "Done!".green().bold(),
        id,
        removed.title.cyan()
    );
    finish(engine, true, rebuild)
}

pub fn cmd_set_status(engine: &Engine, id: u64, status: &str, rebuild: bool) -> Result<()> {
    let status = match status {
        "inactive" => EntryStatus::Inactive,
        _ => EntryStatus::Active,
    };
    let changed = engine.set_status(id, status)?;
    if changed {
        println!("{} Entry #{} is now {}", "Done!".green().bold(), id, status);
    } else {
        println!("Entry #{} is already {}", id, status);
    }
    finish(engine, changed, rebuild)
}

pub fn cmd_export(engine: &Engine, output: Option<&str>) -> Result<()> {
    let json = engine.export_json()?;
    match output {
        Some(path) => {
            let path = shellexpand::tilde(path);
            std::fs::write(path.as_ref(), json)?;
            println!("{} Exported to {}", "Done!".green().bold(), path.cyan());
        }
        None => println!("{}", json),
    }
    Ok(())
}

pub fn cmd_search(engine: &Engine, query: &str, limit: usize) -> Result<()> {
    let hits = engine.keyword_search(query, limit);
    if hits.is_empty() {
        println!("{}", "No matches.".yellow());
        return Ok(());
    }

    println!("{} Keyword matches for '{}':\n", "Search".green().bold(), query);
    for hit in hits {
        println!(
            "  {} #{} {} (relevance {})",
            ">".green(),
            hit.entry_id,
            hit.title.cyan(),
            hit.relevance
        );
        if let Some(url) = &hit.source_url {
            println!("    {}", url.dimmed());
        }
        println!("    {}\n", crate::text::truncate_chars(&hit.excerpt, 150));
    }
    Ok(())
}
