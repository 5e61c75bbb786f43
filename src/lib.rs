use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Index {index} still indexing after {attempts} status checks")]
    IndexNotReady { index: String, attempts: u32 },

    #[error("Cancelled while {0}")]
    Cancelled(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl From<config::ConfigError> for RagError {
    #[inline]
    fn from(error: config::ConfigError) -> Self {
        Self::Config(error.to_string())
    }
}

pub mod codec;
pub mod config;
pub mod database;
pub mod embeddings;
pub mod stores;

pub use embeddings::{Embedder, FnEmbedder};
pub use stores::{ChatHistory, ChatMessage, Document, LlmCache, QueryAnswer, Retriever};
