// Embeddings module
// Text-to-vector providers injected into every write and semantic read


pub mod ollama;

use async_trait::async_trait;

use crate::{RagError, Result};

pub use ollama::OllamaClient;

/// Turns text into an embedding vector
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f64>>;
}

/// [`Embedder`] backed by a plain function or closure
#[derive(Clone)]
pub struct FnEmbedder<F> {
    embed_fn: F,
}

impl<F> FnEmbedder<F>
where
    F: Fn(&str) -> Result<Vec<f64>> + Send + Sync,
{
    #[inline]
    pub fn new(embed_fn: F) -> Self {
        Self { embed_fn }
    }
}

#[async_trait]
impl<F> Embedder for FnEmbedder<F>
where
    F: Fn(&str) -> Result<Vec<f64>> + Send + Sync,
{
    async fn embed(&self, text: &str) -> Result<Vec<f64>> {
        (self.embed_fn)(text)
    }
}

#[async_trait]
impl<E: Embedder + ?Sized> Embedder for std::sync::Arc<E> {
    async fn embed(&self, text: &str) -> Result<Vec<f64>> {
        (**self).embed(text).await
    }
}

/// Check that an embedding can be stored in a field of `dimension` elements
#[inline]
pub fn validate_embedding(vector: &[f64], dimension: usize) -> Result<()> {
    if vector.len() != dimension {
        return Err(RagError::Embedding(format!(
            "expected {} dimensions, got {}",
            dimension,
            vector.len()
        )));
    }
    if let Some(position) = vector.iter().position(|v| !v.is_finite()) {
        return Err(RagError::Embedding(format!(
            "element {} is not a finite number",
            position
        )));
    }
    Ok(())
}
