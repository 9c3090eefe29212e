use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::chunker::ChunkLimits;
use crate::embeddings::{EmbeddingClient, Provider};
use crate::error::{Result, SnapragError};
use crate::retrieval::RetrievalSettings;
use crate::state;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";
/// Seconds between a content change and the rebuild it triggers
pub const DEFAULT_REBUILD_DEBOUNCE_SECS: u64 = 10;

const SETTINGS_FILE: &str = "settings.json";
const ENTRIES_FILE: &str = "entries.json";
const VECTORS_DIR: &str = "vectors";

/// User-editable settings persisted in `settings.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub provider: Provider,
    /// Empty means the provider's default model.
    pub embedding_model: String,
    pub embedding_endpoint: Option<String>,
    pub system_prompt: String,
    pub knowledge_enabled: bool,
    pub chunking: ChunkLimits,
    pub retrieval: RetrievalSettings,
    pub rebuild_debounce_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            embedding_model: String::new(),
            embedding_endpoint: None,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            knowledge_enabled: true,
            chunking: ChunkLimits::default(),
            retrieval: RetrievalSettings::default(),
            rebuild_debounce_secs: DEFAULT_REBUILD_DEBOUNCE_SECS,
        }
    }
}

impl Settings {
    pub fn model(&self) -> &str {
        if self.embedding_model.trim().is_empty() {
            self.provider.default_model()
        } else {
            self.embedding_model.trim()
        }
    }

    pub fn endpoint(&self) -> &str {
        self.embedding_endpoint
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .unwrap_or_else(|| self.provider.default_endpoint())
    }

    pub fn system_prompt(&self) -> &str {
        if self.system_prompt.trim().is_empty() {
            DEFAULT_SYSTEM_PROMPT
        } else {
            &self.system_prompt
        }
    }

    pub fn rebuild_delay(&self) -> Duration {
        Duration::from_secs(self.rebuild_debounce_secs)
    }

    pub fn validate(&self) -> Result<()> {
        self.chunking.validate()?;
        self.retrieval.validate()
    }

    /// Whether moving from `self` to `next` invalidates the current snapshot.
    pub fn requires_rebuild(&self, next: &Settings) -> bool {
        self.system_prompt() != next.system_prompt()
            || self.knowledge_enabled != next.knowledge_enabled
            || self.provider != next.provider
            || self.model() != next.model()
            || self.chunking != next.chunking
    }

    /// Set one setting from its dotted key, as typed on the command line.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let bad = |what: &str| SnapragError::Config(format!("invalid value for {}: {}", what, value));
        match key {
            "provider" => {
                self.provider = Provider::from_str_loose(value).ok_or_else(|| bad(key))?;
            }
            "embedding_model" => self.embedding_model = value.trim().to_string(),
            "embedding_endpoint" => {
                let v = value.trim();
                self.embedding_endpoint = (!v.is_empty()).then(|| v.to_string());
            }
            "system_prompt" => self.system_prompt = value.to_string(),
            "knowledge_enabled" => self.knowledge_enabled = value.parse().map_err(|_| bad(key))?,
            "rebuild_debounce_secs" => {
                self.rebuild_debounce_secs = value.parse().map_err(|_| bad(key))?
            }
            "chunking.max_chars" => self.chunking.max_chars = value.parse().map_err(|_| bad(key))?,
            "chunking.min_chars" => self.chunking.min_chars = value.parse().map_err(|_| bad(key))?,
            "retrieval.similarity_threshold" => {
                self.retrieval.similarity_threshold = value.parse().map_err(|_| bad(key))?
            }
            "retrieval.match_limit" => {
                self.retrieval.match_limit = value.parse().map_err(|_| bad(key))?
            }
            "retrieval.max_context_chars" => {
                self.retrieval.max_context_chars = value.parse().map_err(|_| bad(key))?
            }
            "retrieval.snippet_chars" => {
                self.retrieval.snippet_chars = value.parse().map_err(|_| bad(key))?
            }
            "retrieval.max_backup_blocks" => {
                self.retrieval.max_backup_blocks = value.parse().map_err(|_| bad(key))?
            }
            "retrieval.max_blocks" => {
                self.retrieval.max_blocks = value.parse().map_err(|_| bad(key))?
            }
            _ => return Err(SnapragError::Config(format!("unknown setting: {}", key))),
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Root of all persisted state
    pub data_dir: PathBuf,
    pub settings: Settings,
    /// Provider credential, only ever read from the environment
    pub api_key: Option<String>,
}

impl Config {
    /// Resolve the data directory, read `settings.json` and apply
    /// environment overrides.
    pub fn load(data_dir_override: Option<&str>) -> Result<Self> {
        let data_dir = resolve_data_dir(data_dir_override)?;
        let mut settings: Settings =
            state::read_json(&data_dir.join(SETTINGS_FILE))?.unwrap_or_default();

        if let Some(provider) = env_nonempty("SNAPRAG_PROVIDER") {
            settings.provider = Provider::from_str_loose(&provider).ok_or_else(|| {
                SnapragError::Config(format!("SNAPRAG_PROVIDER: unknown provider {}", provider))
            })?;
        }
        if let Some(model) = env_nonempty("SNAPRAG_EMBEDDING_MODEL") {
            settings.embedding_model = model;
        }
        if let Some(endpoint) = env_nonempty("SNAPRAG_EMBEDDING_ENDPOINT") {
            settings.embedding_endpoint = Some(endpoint);
        }
        settings.validate()?;

        let api_key = env_nonempty(settings.provider.env_var_name());

        Ok(Config {
            data_dir,
            settings,
            api_key,
        })
    }

    pub fn settings_path(&self) -> PathBuf {
        self.data_dir.join(SETTINGS_FILE)
    }

    pub fn entries_path(&self) -> PathBuf {
        self.data_dir.join(ENTRIES_FILE)
    }

    pub fn vectors_dir(&self) -> PathBuf {
        self.data_dir.join(VECTORS_DIR)
    }

    pub fn save_settings(&self) -> Result<()> {
        state::write_json_atomic(&self.settings_path(), &self.settings, true)
    }

    pub fn embedding_client(&self) -> EmbeddingClient {
        EmbeddingClient::new(
            self.settings.provider,
            self.settings.endpoint(),
            self.api_key.clone(),
        )
    }
}

fn env_nonempty(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// `--data-dir`, then `SNAPRAG_DATA_DIR`, then the platform data directory.
pub fn resolve_data_dir(data_dir_override: Option<&str>) -> Result<PathBuf> {
    let explicit = data_dir_override
        .map(str::to_string)
        .or_else(|| env_nonempty("SNAPRAG_DATA_DIR"));

    if let Some(raw) = explicit {
        let expanded = shellexpand::tilde(&raw);
        return Ok(Path::new(expanded.as_ref()).to_path_buf());
    }

    dirs::data_dir()
        .map(|d| d.join("snaprag"))
        .ok_or_else(|| SnapragError::Config("Could not determine data directory".into()))
}
