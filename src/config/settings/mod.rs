
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

use crate::database::schema::DEFAULT_VECTOR_DIMENSION;

pub const REDIS_URL_ENV: &str = "REDIS_URL";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default = "StoreConfig::chat_history")]
    pub chat_history: StoreConfig,
    #[serde(default = "StoreConfig::llm_cache")]
    pub llm_cache: StoreConfig,
    #[serde(default = "StoreConfig::retriever")]
    pub retriever: StoreConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RedisConfig {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub db: u32,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Upper bound for a single engine command; unset waits indefinitely
    pub command_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OllamaConfig {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub model: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IndexConfig {
    pub poll_interval_ms: u64,
    pub max_poll_attempts: u32,
    pub vector_dimension: usize,
}

/// Index and key prefix binding of one entity store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreConfig {
    pub index_name: String,
    pub key_prefix: String,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

const fn default_page_size() -> usize {
    100
}

impl Default for Config {
    fn default() -> Self {
        Self {
            redis: RedisConfig::default(),
            ollama: OllamaConfig::default(),
            index: IndexConfig::default(),
            chat_history: StoreConfig::chat_history(),
            llm_cache: StoreConfig::llm_cache(),
            retriever: StoreConfig::retriever(),
            base_dir: PathBuf::new(),
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            protocol: "redis".to_string(),
            host: "localhost".to_string(),
            port: 6379,
            db: 0,
            username: None,
            password: None,
            command_timeout_ms: None,
        }
    }
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            protocol: "http".to_string(),
            host: "localhost".to_string(),
            port: 11434,
            model: "bge-m3:latest".to_string(),
            timeout_secs: 30,
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            max_poll_attempts: 600,
            vector_dimension: DEFAULT_VECTOR_DIMENSION,
        }
    }
}

impl StoreConfig {
    #[inline]
    pub fn new(index_name: &str, key_prefix: &str) -> Self {
        Self {
            index_name: index_name.to_string(),
            key_prefix: key_prefix.to_string(),
            page_size: default_page_size(),
        }
    }

    #[inline]
    pub fn chat_history() -> Self {
        Self::new("idx:chat_history", "doc:chat_history")
    }

    #[inline]
    pub fn llm_cache() -> Self {
        Self::new("idx:llm_cache", "doc:llm_cache")
    }

    #[inline]
    pub fn retriever() -> Self {
        Self::new("idx:retriever", "doc:retriever")
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.index_name.trim().is_empty() {
            return Err(ConfigError::InvalidIndexName(self.index_name.clone()));
        }
        if self.key_prefix.trim().is_empty()
            || self.key_prefix.contains(['*', '?', '[', ']', '\\'])
        {
            return Err(ConfigError::InvalidKeyPrefix(self.key_prefix.clone()));
        }
        if !(1..=10_000).contains(&self.page_size) {
            return Err(ConfigError::InvalidPageSize(self.page_size));
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid port: {0} (must be between 1 and 65535)")]
    InvalidPort(u16),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid protocol: {0} (expected one of {1})")]
    InvalidProtocol(String, &'static str),
    #[error("Invalid timeout: {0} (must be between 1 and 600 seconds)")]
    InvalidTimeout(u64),
    #[error("Invalid command timeout: {0}ms (must be at least 1)")]
    InvalidCommandTimeout(u64),
    #[error("Invalid embedding dimension: {0} (must be between 1 and 32768)")]
    InvalidEmbeddingDimension(usize),
    #[error("Invalid poll interval: {0}ms (must be between 1 and 60000)")]
    InvalidPollInterval(u64),
    #[error("Invalid poll attempts: {0} (must be at least 1)")]
    InvalidPollAttempts(u32),
    #[error("Invalid index name: {0:?} (cannot be empty)")]
    InvalidIndexName(String),
    #[error("Invalid key prefix: {0:?} (cannot be empty or contain glob characters)")]
    InvalidKeyPrefix(String),
    #[error("Invalid page size: {0} (must be between 1 and 10000)")]
    InvalidPageSize(usize),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    /// Default configuration directory, `~/.redis-rag`
    #[inline]
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::home_dir()
            .map(|home| home.join(".redis-rag"))
            .or_else(|| dirs::data_dir().map(|data| data.join("redis-rag")))
            .ok_or(ConfigError::DirectoryError)
    }

    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join("config.toml");

        if !config_path.exists() {
            return Ok(Self {
                base_dir: config_dir.as_ref().to_path_buf(),
                ..Self::default()
            });
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.base_dir = config_dir.as_ref().to_path_buf();

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    /// Load from the default directory and apply `REDIS_URL` if it is set
    #[inline]
    pub fn load_default() -> Result<Self> {
        let config_dir = Self::config_dir().context("Failed to determine config directory")?;
        let mut config = Self::load(config_dir)?;
        if let Ok(url) = std::env::var(REDIS_URL_ENV) {
            config
                .redis
                .apply_url(&url)
                .with_context(|| format!("Invalid {}", REDIS_URL_ENV))?;
        }
        Ok(config)
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        let config_dir = self.get_base_dir();

        fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        let config_path = self.config_file_path();
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    #[inline]
    pub fn get_base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.get_base_dir().join("config.toml")
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.redis.validate()?;
        self.ollama.validate()?;
        self.index.validate()?;
        self.chat_history.validate()?;
        self.llm_cache.validate()?;
        self.retriever.validate()?;
        Ok(())
    }
}

impl RedisConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.protocol != "redis" && self.protocol != "rediss" {
            return Err(ConfigError::InvalidProtocol(
                self.protocol.clone(),
                "'redis' or 'rediss'",
            ));
        }

        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port));
        }

        if self.command_timeout_ms == Some(0) {
            return Err(ConfigError::InvalidCommandTimeout(0));
        }

        self.connection_url()?;
        Ok(())
    }

    /// `redis[s]://[user[:password]@]host:port/db`
    pub fn connection_url(&self) -> Result<Url, ConfigError> {
        let url_str = format!("{}://{}:{}/{}", self.protocol, self.host, self.port, self.db);
        let mut url = Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str.clone()))?;
        if url.host_str().is_none_or(str::is_empty) {
            return Err(ConfigError::InvalidUrl(url_str));
        }

        if let Some(username) = &self.username {
            url.set_username(username)
                .map_err(|()| ConfigError::InvalidUrl(url_str.clone()))?;
        }
        if let Some(password) = &self.password {
            url.set_password(Some(password))
                .map_err(|()| ConfigError::InvalidUrl(url_str.clone()))?;
        }
        Ok(url)
    }

    /// Take connection details from a URL such as `redis://:pw@host:6380/2`.
    /// A bare `host:port` is accepted as well.
    pub fn apply_url(&mut self, raw: &str) -> Result<(), ConfigError> {
        let with_scheme = if raw.contains("://") {
            raw.to_string()
        } else {
            format!("redis://{}", raw)
        };
        let url = Url::parse(&with_scheme).map_err(|_| ConfigError::InvalidUrl(raw.to_string()))?;

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| ConfigError::InvalidUrl(raw.to_string()))?;
        let db = match url.path().trim_start_matches('/') {
            "" => 0,
            db => db
                .parse()
                .map_err(|_| ConfigError::InvalidUrl(raw.to_string()))?,
        };

        let updated = Self {
            protocol: url.scheme().to_string(),
            host: host.to_string(),
            port: url.port().unwrap_or(6379),
            db,
            username: Some(url.username())
                .filter(|u| !u.is_empty())
                .map(str::to_string),
            password: url.password().map(str::to_string),
            command_timeout_ms: self.command_timeout_ms,
        };
        updated.validate()?;
        *self = updated;
        Ok(())
    }
}

impl OllamaConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.protocol != "http" && self.protocol != "https" {
            return Err(ConfigError::InvalidProtocol(
                self.protocol.clone(),
                "'http' or 'https'",
            ));
        }

        let url_str = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))?;

        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port));
        }

        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model.clone()));
        }

        if !(1..=600).contains(&self.timeout_secs) {
            return Err(ConfigError::InvalidTimeout(self.timeout_secs));
        }

        Ok(())
    }

    pub fn ollama_url(&self) -> Result<Url, ConfigError> {
        let url_str = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))
    }
}

impl IndexConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=60_000).contains(&self.poll_interval_ms) {
            return Err(ConfigError::InvalidPollInterval(self.poll_interval_ms));
        }
        if self.max_poll_attempts == 0 {
            return Err(ConfigError::InvalidPollAttempts(self.max_poll_attempts));
        }
        if !(1..=32_768).contains(&self.vector_dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(
                self.vector_dimension,
            ));
        }
        Ok(())
    }
}
