use anyhow::{Context, Result};
use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::env;
use std::time::Duration;

use crate::search::SearchMethod;

pub type Number = f32;

pub const EPSILON: f32 = 1e-6;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8000;
const DEFAULT_MODEL_DIR: &str = "models";
const DEFAULT_EMBEDDING_PROVIDER: &str = "fastembed";
const DEFAULT_EMBEDDING_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";
const DEFAULT_DIMENSIONS: usize = 384;
const DEFAULT_CHUNK_SIZE: usize = 1000;
const DEFAULT_CHUNK_OVERLAP: usize = 200;
const DEFAULT_TOP_K: usize = 3;
const DEFAULT_ANN_PROJECTIONS: usize = 8;
const DEFAULT_ANN_TABLES: usize = 4;
const DEFAULT_MAX_TOKENS: usize = 256;
const DEFAULT_TEMPERATURE: f32 = 0.7;
const DEFAULT_GENERATION_TIMEOUT_SECS: u64 = 120;
const DEFAULT_HISTORY_TURNS: usize = 4;
const DEFAULT_SESSION_TTL_SECS: u64 = 3600;
const DEFAULT_MAX_SESSIONS: usize = 1024;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// Raw view of the layered configuration. Every key is optional; missing
/// keys fall back to the defaults in [`Settings`].
#[derive(Deserialize, Default)]
pub struct DocchatConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub model_dir: Option<String>,
    pub embedding_provider: Option<String>,
    pub embedding_model: Option<String>,
    pub dimensions: Option<usize>,
    pub chunk_size: Option<usize>,
    pub chunk_overlap: Option<usize>,
    pub top_k: Option<usize>,
    pub search_method: Option<String>,
    pub ann_num_projections: Option<usize>,
    pub ann_num_tables: Option<usize>,
    pub llm_url: Option<String>,
    pub llm_model: Option<String>,
    pub max_tokens: Option<usize>,
    pub temperature: Option<f32>,
    pub generation_timeout_secs: Option<u64>,
    pub history_turns: Option<usize>,
    pub snapshot_dir: Option<String>,
    pub session_ttl_secs: Option<u64>,
    pub max_sessions: Option<usize>,
    pub max_upload_bytes: Option<usize>,
}

/// A missing key is `None`; a present but malformed value is an error.
fn optional<T: DeserializeOwned>(config: &Config, key: &str) -> Result<Option<T>, ConfigError> {
    match config.get::<T>(key) {
        Ok(value) => Ok(Some(value)),
        Err(ConfigError::NotFound(_)) => Ok(None),
        Err(err) => Err(err),
    }
}

impl DocchatConfig {
    pub fn try_from(config: &Config) -> Result<Self, ConfigError> {
        Ok(DocchatConfig {
            host: optional(config, "host")?,
            port: optional(config, "port")?,
            model_dir: optional(config, "model_dir")?,
            embedding_provider: optional(config, "embedding_provider")?,
            embedding_model: optional(config, "embedding_model")?,
            dimensions: optional(config, "dimensions")?,
            chunk_size: optional(config, "chunk_size")?,
            chunk_overlap: optional(config, "chunk_overlap")?,
            top_k: optional(config, "top_k")?,
            search_method: optional(config, "search_method")?,
            ann_num_projections: optional(config, "ann_num_projections")?,
            ann_num_tables: optional(config, "ann_num_tables")?,
            llm_url: optional(config, "llm_url")?,
            llm_model: optional(config, "llm_model")?,
            max_tokens: optional(config, "max_tokens")?,
            temperature: optional(config, "temperature")?,
            generation_timeout_secs: optional(config, "generation_timeout_secs")?,
            history_turns: optional(config, "history_turns")?,
            snapshot_dir: optional(config, "snapshot_dir")?,
            session_ttl_secs: optional(config, "session_ttl_secs")?,
            max_sessions: optional(config, "max_sessions")?,
            max_upload_bytes: optional(config, "max_upload_bytes")?,
        })
    }
}

/// Resolved runtime settings shared by the server and the CLI.
#[derive(Debug, Clone)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub model_dir: String,
    pub embedding_provider: String,
    pub embedding_model: String,
    pub dimensions: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
    pub search_method: SearchMethod,
    pub ann_num_projections: usize,
    pub ann_num_tables: usize,
    pub llm_url: Option<String>,
    pub llm_model: Option<String>,
    pub max_tokens: usize,
    pub temperature: f32,
    pub generation_timeout_secs: u64,
    pub history_turns: usize,
    pub snapshot_dir: Option<String>,
    pub session_ttl_secs: u64,
    pub max_sessions: usize,
    pub max_upload_bytes: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            model_dir: DEFAULT_MODEL_DIR.to_string(),
            embedding_provider: DEFAULT_EMBEDDING_PROVIDER.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            dimensions: DEFAULT_DIMENSIONS,
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            top_k: DEFAULT_TOP_K,
            search_method: SearchMethod::Exact,
            ann_num_projections: DEFAULT_ANN_PROJECTIONS,
            ann_num_tables: DEFAULT_ANN_TABLES,
            llm_url: None,
            llm_model: None,
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            generation_timeout_secs: DEFAULT_GENERATION_TIMEOUT_SECS,
            history_turns: DEFAULT_HISTORY_TURNS,
            snapshot_dir: None,
            session_ttl_secs: DEFAULT_SESSION_TTL_SECS,
            max_sessions: DEFAULT_MAX_SESSIONS,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl Settings {
    /// Loads `docchat_config.*` (optional) overlaid with `DOCCHAT_*` variables.
    pub fn new() -> Result<Self> {
        let config = Config::builder()
            .add_source(ConfigFile::with_name("docchat_config").required(false))
            .add_source(Environment::with_prefix("DOCCHAT"))
            .build()
            .context("failed to read docchat configuration")?;

        Self::from_config(&config)
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let raw = DocchatConfig::try_from(config)?;
        let defaults = Settings::default();

        // Container platforms hand the port over as a bare PORT variable.
        let port = raw
            .port
            .or_else(|| env::var("PORT").ok().and_then(|s| s.parse().ok()))
            .unwrap_or(defaults.port);

        let search_method = match raw.search_method {
            Some(method) => method
                .parse::<SearchMethod>()
                .map_err(|e| anyhow::anyhow!(e))
                .context("invalid DOCCHAT_SEARCH_METHOD")?,
            None => defaults.search_method,
        };

        let settings = Self {
            host: raw.host.unwrap_or(defaults.host),
            port,
            model_dir: raw.model_dir.unwrap_or(defaults.model_dir),
            embedding_provider: raw
                .embedding_provider
                .unwrap_or(defaults.embedding_provider)
                .to_lowercase(),
            embedding_model: raw.embedding_model.unwrap_or(defaults.embedding_model),
            dimensions: raw.dimensions.unwrap_or(defaults.dimensions),
            chunk_size: raw.chunk_size.unwrap_or(defaults.chunk_size),
            chunk_overlap: raw.chunk_overlap.unwrap_or(defaults.chunk_overlap),
            top_k: raw.top_k.unwrap_or(defaults.top_k),
            search_method,
            ann_num_projections: raw.ann_num_projections.unwrap_or(defaults.ann_num_projections),
            ann_num_tables: raw.ann_num_tables.unwrap_or(defaults.ann_num_tables),
            llm_url: raw.llm_url.filter(|url| !url.trim().is_empty()),
            llm_model: raw.llm_model.filter(|model| !model.trim().is_empty()),
            max_tokens: raw.max_tokens.unwrap_or(defaults.max_tokens),
            temperature: raw.temperature.unwrap_or(defaults.temperature),
            generation_timeout_secs: raw
                .generation_timeout_secs
                .unwrap_or(defaults.generation_timeout_secs),
            history_turns: raw.history_turns.unwrap_or(defaults.history_turns),
            snapshot_dir: raw.snapshot_dir.filter(|dir| !dir.trim().is_empty()),
            session_ttl_secs: raw.session_ttl_secs.unwrap_or(defaults.session_ttl_secs),
            max_sessions: raw.max_sessions.unwrap_or(defaults.max_sessions),
            max_upload_bytes: raw.max_upload_bytes.unwrap_or(defaults.max_upload_bytes),
        };

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            anyhow::bail!("DOCCHAT_CHUNK_SIZE must be at least 1.");
        }
        if self.top_k == 0 {
            anyhow::bail!("DOCCHAT_TOP_K must be at least 1.");
        }
        if self.dimensions == 0 {
            anyhow::bail!("DOCCHAT_DIMENSIONS must be at least 1.");
        }
        if self.max_sessions == 0 {
            anyhow::bail!("DOCCHAT_MAX_SESSIONS must be at least 1.");
        }
        match self.embedding_provider.as_str() {
            "fastembed" | "hashing" => {}
            other => anyhow::bail!("Unknown embedding provider: {}", other),
        }
        if self.chunk_overlap >= self.chunk_size {
            tracing::warn!(
                chunk_size = self.chunk_size,
                chunk_overlap = self.chunk_overlap,
                "chunk overlap is not smaller than chunk size; chunks will not overlap"
            );
        }
        Ok(())
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs.max(1))
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn print_config(&self) {
        println!("host={}", self.host);
        println!("port={}", self.port);
        println!("model_dir={}", self.model_dir);
        println!("embedding_provider={}", self.embedding_provider);
        println!("embedding_model={}", self.embedding_model);
        println!("dimensions={}", self.dimensions);
        println!("chunk_size={}", self.chunk_size);
        println!("chunk_overlap={}", self.chunk_overlap);
        println!("top_k={}", self.top_k);
        println!("search_method={}", self.search_method);
        println!("ann_num_projections={}", self.ann_num_projections);
        println!("ann_num_tables={}", self.ann_num_tables);
        println!("llm_url={}", self.llm_url.as_deref().unwrap_or("<none>"));
        println!("llm_model={}", self.llm_model.as_deref().unwrap_or("<none>"));
        println!("max_tokens={}", self.max_tokens);
        println!("temperature={}", self.temperature);
        println!("generation_timeout_secs={}", self.generation_timeout_secs);
        println!("history_turns={}", self.history_turns);
        println!("snapshot_dir={}", self.snapshot_dir.as_deref().unwrap_or("<none>"));
        println!("session_ttl_secs={}", self.session_ttl_secs);
        println!("max_sessions={}", self.max_sessions);
        println!("max_upload_bytes={}", self.max_upload_bytes);
    }
}
