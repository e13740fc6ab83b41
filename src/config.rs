//! Configuration: the TOML application config and the per-repository
//! settings snapshot.
//!
//! Application settings (where indexes live, which providers to call) come
//! from an optional TOML file passed with `--config`. Settings that decide
//! whether a cached embedding is reusable (model, dimensions) and the stable
//! repository identity live in the repository's own git config under the
//! `semblame.` section, so every clone of the repo that shares notes agrees on
//! them.

use anyhow::{bail, Context};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::repo::Repository;

pub const DEFAULT_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_DIMENSIONS: u32 = 512;
pub const DEFAULT_WRITE_NOTES: bool = true;

const KEY_MODEL: &str = "model";
const KEY_DIMENSIONS: &str = "dimensions";
const KEY_WRITE_NOTES: &str = "write-notes";
const KEY_UUID: &str = "uuid";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct IndexConfig {
    /// Directory holding one SQLite index per repository identity.
    /// Falls back to `$HOME/.sblame` when unset.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_chunk_chars")]
    pub chunk_chars: usize,
    #[serde(default = "default_embed_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            base_url: default_base_url(),
            chunk_chars: default_chunk_chars(),
            timeout_secs: default_embed_timeout_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_chat_model")]
    pub model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_chat_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_chat_model(),
            base_url: default_base_url(),
            max_attempts: default_max_attempts(),
            timeout_secs: default_chat_timeout_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_n")]
    pub top_n: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_n: default_top_n(),
        }
    }
}

fn default_provider() -> String {
    "openai".to_string()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_chunk_chars() -> usize {
    512
}
fn default_embed_timeout_secs() -> u64 {
    30
}
fn default_chat_model() -> String {
    "gpt-4.1-mini".to_string()
}
fn default_max_attempts() -> u32 {
    3
}
fn default_chat_timeout_secs() -> u64 {
    60
}
fn default_top_n() -> usize {
    crate::search::DEFAULT_TOP_N
}

impl Config {
    /// Resolve the directory that holds per-repository indexes.
    pub fn index_dir(&self) -> anyhow::Result<PathBuf> {
        if let Some(dir) = &self.index.dir {
            return Ok(dir.clone());
        }
        let home = std::env::var_os("HOME")
            .context("index.dir is not set and HOME is not available")?;
        Ok(PathBuf::from(home).join(".sblame"))
    }
}

/// Load and validate the application config.
///
/// A missing file is not an error: every setting has a default.
pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    if !path.exists() {
        debug!(path = %path.display(), "config file not found, using defaults");
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

pub fn parse_config(content: &str) -> anyhow::Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.embedding.chunk_chars == 0 {
        bail!("embedding.chunk_chars must be > 0");
    }

    if config.retrieval.top_n < 1 {
        bail!("retrieval.top_n must be >= 1");
    }

    if config.chat.max_attempts < 1 {
        bail!("chat.max_attempts must be >= 1");
    }

    for (section, provider) in [
        ("embedding", &config.embedding.provider),
        ("chat", &config.chat.provider),
    ] {
        match provider.as_str() {
            "disabled" | "openai" => {}
            other => bail!(
                "Unknown {} provider: '{}'. Must be disabled or openai.",
                section,
                other
            ),
        }
    }

    Ok(config)
}

/// Repository-scoped settings, read once per run.
///
/// Newly computed embeddings are tagged with `model` and `dimensions`;
/// cached ones are reusable only if both match exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSnapshot {
    pub model: String,
    pub dimensions: u32,
    pub write_notes: bool,
    pub repo_id: Uuid,
}

impl ConfigSnapshot {
    /// Read every setting, writing the default for any that are unset.
    pub async fn load(repo: &dyn Repository) -> Result<Self> {
        let model = get_or_init(repo, KEY_MODEL, DEFAULT_MODEL.to_string(), |s| {
            Ok(s.to_string())
        })
        .await?;

        let dimensions = get_or_init(repo, KEY_DIMENSIONS, DEFAULT_DIMENSIONS, |s| {
            match s.parse::<u32>() {
                Ok(0) => Err("dimensions must be > 0".to_string()),
                Ok(d) => Ok(d),
                Err(e) => Err(e.to_string()),
            }
        })
        .await?;

        let write_notes = get_or_init(repo, KEY_WRITE_NOTES, DEFAULT_WRITE_NOTES, parse_bool).await?;

        let repo_id = get_or_init(repo, KEY_UUID, Uuid::new_v4(), |s| {
            Uuid::parse_str(s).map_err(|e| e.to_string())
        })
        .await?;

        Ok(Self {
            model,
            dimensions,
            write_notes,
            repo_id,
        })
    }
}

async fn get_or_init<T, F>(repo: &dyn Repository, key: &str, default: T, parse: F) -> Result<T>
where
    T: ToString,
    F: Fn(&str) -> std::result::Result<T, String>,
{
    match repo.config_get(key).await? {
        Some(raw) if !raw.is_empty() => {
            parse(&raw).map_err(|e| Error::Config(format!("{} = '{}': {}", key, raw, e)))
        }
        _ => {
            debug!(key, "initialising repository setting with default");
            repo.config_set(key, &default.to_string()).await?;
            Ok(default)
        }
    }
}

/// Accepts the spellings git itself understands for booleans.
fn parse_bool(s: &str) -> std::result::Result<bool, String> {
    match s.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        other => Err(format!("not a boolean: {}", other)),
    }
}
