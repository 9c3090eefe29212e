use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "snaprag",
    about = "Knowledge base with snapshot-versioned embedding retrieval",
    version
)]
pub struct Cli {
    /// Enable verbose output
    #[arg(global = true, long, short)]
    pub verbose: bool,

    /// Data directory (defaults to $SNAPRAG_DATA_DIR or the platform data dir)
    #[arg(global = true, long)]
    pub data_dir: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Add a knowledge entry
    Add {
        /// Entry title
        title: String,

        /// Entry text (use --file to read it from a file)
        #[arg(required_unless_present = "file")]
        content: Option<String>,

        /// Read the entry text from a file
        #[arg(long, conflicts_with = "content")]
        file: Option<String>,

        #[arg(long)]
        category: Option<String>,

        /// Higher priority entries export first
        #[arg(long)]
        priority: Option<i32>,

        /// Link shown in the source line of retrieved snippets
        #[arg(long)]
        url: Option<String>,

        /// Source type (custom, file, post, product)
        #[arg(long, default_value = "custom")]
        source_type: String,

        /// Rebuild embeddings afterwards
        #[arg(long)]
        rebuild: bool,
    },

    /// Replace an entry's title and text
    Update {
        id: u64,

        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        content: Option<String>,

        /// Read the new text from a file
        #[arg(long, conflicts_with = "content")]
        file: Option<String>,

        #[arg(long)]
        category: Option<String>,

        #[arg(long)]
        priority: Option<i32>,

        #[arg(long)]
        rebuild: bool,
    },

    /// Import a .txt, .md or .json file
    Import {
        path: String,

        #[arg(long)]
        category: Option<String>,

        #[arg(long)]
        rebuild: bool,
    },

    /// Sync a directory of documents into the knowledge base
    Sync {
        dir: String,

        #[arg(long)]
        category: Option<String>,

        /// Keep running, re-syncing and rebuilding as files change
        #[arg(long)]
        watch: bool,

        /// Seconds between scans in watch mode
        #[arg(long, default_value = "5")]
        interval: u64,

        #[arg(long)]
        rebuild: bool,
    },

    /// List knowledge entries
    List {
        /// Include inactive entries
        #[arg(long)]
        all: bool,

        /// Only this source type
        #[arg(long)]
        source_type: Option<String>,
    },

    /// Show one entry in full
    Show { id: u64 },

    /// Delete an entry, or every entry with --all
    Remove {
        #[arg(required_unless_present = "all")]
        id: Option<u64>,

        #[arg(long, conflicts_with = "id")]
        all: bool,

        /// With --all, only remove entries of this source type
        #[arg(long, requires = "all")]
        source_type: Option<String>,

        #[arg(long)]
        rebuild: bool,
    },

    /// Activate or deactivate an entry
    SetStatus {
        id: u64,

        #[arg(value_parser = ["active", "inactive"])]
        status: String,

        #[arg(long)]
        rebuild: bool,
    },

    /// Re-embed all active entries into a new snapshot
    Rebuild,

    /// Rank snapshot chunks against a message
    Query {
        message: String,

        #[arg(short, long, default_value = "8")]
        limit: usize,
    },

    /// Print the system messages assembled for a message
    Context {
        message: String,

        /// Print the raw context as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show knowledge base and snapshot status
    Status,

    /// Delete snapshot files that are no longer current
    Gc,

    /// Export active entries as JSON
    Export {
        /// Write to a file instead of stdout
        #[arg(long, short)]
        output: Option<String>,
    },

    /// Keyword search without embeddings
    Search {
        query: String,

        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Show or change settings
    Settings {
        #[command(subcommand)]
        command: Option<SettingsCommand>,
    },
}

#[derive(Subcommand)]
pub enum SettingsCommand {
    /// Print the effective settings
    Show,

    /// Change one setting (e.g. retrieval.similarity_threshold 0.7)
    Set {
        key: String,
        value: String,
    },
}
