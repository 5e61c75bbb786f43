// Configuration management module
// TOML settings for the Redis connection, the embedding backend and each store

pub mod settings;

#[cfg(test)]
mod tests;

pub use settings::{Config, ConfigError, IndexConfig, OllamaConfig, RedisConfig, StoreConfig};

/// Get the configuration directory path
#[inline]
pub fn get_config_dir() -> Result<std::path::PathBuf, ConfigError> {
    Config::config_dir()
}
