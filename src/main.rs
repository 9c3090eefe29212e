#![allow(dead_code)]
mod chunker;
mod cli;
mod commands;
mod config;
mod embeddings;
mod engine;
mod error;
mod knowledge;
mod retrieval;
mod scheduler;
mod state;
mod text;

use std::sync::Arc;

use clap::Parser;
use cli::{Cli, Commands, SettingsCommand};
use colored::Colorize;
use config::Config;
use engine::Engine;
use error::Result;
use tracing_subscriber::EnvFilter;

use commands::embeddings::{cmd_context, cmd_gc, cmd_query, cmd_rebuild, cmd_status};
use commands::knowledge::{
    cmd_add, cmd_export, cmd_import, cmd_list, cmd_remove, cmd_search, cmd_set_status, cmd_show,
    cmd_sync, cmd_update, AddArgs, SyncArgs, UpdateArgs,
};
use commands::settings::{cmd_settings_set, cmd_settings_show};

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "snaprag=debug" } else { "snaprag=warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.data_dir.as_deref())?;
    let embedder: Arc<dyn embeddings::Embedder> = Arc::new(config.embedding_client());

    let engine = Engine::open(config.clone(), Arc::clone(&embedder))?;

    match cli.command {
        Commands::Add {
            title,
            content,
            file,
            category,
            priority,
            url,
            source_type,
            rebuild,
        } => cmd_add(
            &engine,
            AddArgs {
                title: &title,
                content: content.as_deref(),
                file: file.as_deref(),
                category,
                priority,
                url,
                source_type: &source_type,
                rebuild,
            },
        ),
        Commands::Update {
            id,
            title,
            content,
            file,
            category,
            priority,
            rebuild,
        } => cmd_update(
            &engine,
            UpdateArgs {
                id,
                title: title.as_deref(),
                content: content.as_deref(),
                file: file.as_deref(),
                category,
                priority,
                rebuild,
            },
        ),
        Commands::Import {
            path,
            category,
            rebuild,
        } => cmd_import(&engine, &path, category, rebuild),
        Commands::Sync {
            dir,
            category,
            watch,
            interval,
            rebuild,
        } => cmd_sync(
            &engine,
            SyncArgs {
                dir: &dir,
                category,
                watch,
                interval,
                rebuild,
            },
            config,
            embedder,
        ),
        Commands::List { all, source_type } => cmd_list(&engine, all, source_type.as_deref()),
        Commands::Show { id } => cmd_show(&engine, id),
        Commands::Remove {
            id,
            all,
            source_type,
            rebuild,
        } => cmd_remove(&engine, id, all, source_type.as_deref(), rebuild),
        Commands::SetStatus {
            id,
            status,
            rebuild,
        } => cmd_set_status(&engine, id, &status, rebuild),
        Commands::Rebuild => cmd_rebuild(&engine),
        Commands::Query { message, limit } => cmd_query(&engine, &message, limit),
        Commands::Context { message, json } => cmd_context(&engine, &message, json),
        Commands::Status => cmd_status(&engine),
        Commands::Gc => cmd_gc(&engine),
        Commands::Export { output } => cmd_export(&engine, output.as_deref()),
        Commands::Search { query, limit } => cmd_search(&engine, &query, limit),
        Commands::Settings { command } => match command {
            Some(SettingsCommand::Set { key, value }) => cmd_settings_set(&engine, &key, &value),
            Some(SettingsCommand::Show) | None => cmd_settings_show(&engine),
        },
    }
}
