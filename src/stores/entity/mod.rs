// Generic entity store
// Embed, validate and write records; list, search and delete them through the engine

#[cfg(test)]
mod tests;

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::record::Record;
use crate::codec::encode_vector;
use crate::config::StoreConfig;
use crate::database::engine::{JsonWrite, SearchEngine, SearchRequest};
use crate::database::index::{self, Readiness};
use crate::database::query::{Filter, Query};
use crate::database::schema::IndexDefinition;
use crate::embeddings::{Embedder, validate_embedding};
use crate::{RagError, Result};

/// Binding of one record type to an index, a key prefix and an engine
pub struct EntityStore<R> {
    index_name: String,
    key_prefix: String,
    engine: Arc<dyn SearchEngine>,
    dimension: usize,
    page_size: usize,
    record: PhantomData<fn() -> R>,
}

impl<R> Clone for EntityStore<R> {
    fn clone(&self) -> Self {
        Self {
            index_name: self.index_name.clone(),
            key_prefix: self.key_prefix.clone(),
            engine: Arc::clone(&self.engine),
            dimension: self.dimension,
            page_size: self.page_size,
            record: PhantomData,
        }
    }
}

impl<R> fmt::Debug for EntityStore<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityStore")
            .field("index_name", &self.index_name)
            .field("key_prefix", &self.key_prefix)
            .field("dimension", &self.dimension)
            .field("page_size", &self.page_size)
            .finish_non_exhaustive()
    }
}

impl<R: Record> EntityStore<R> {
    #[inline]
    pub fn new(engine: Arc<dyn SearchEngine>, config: &StoreConfig, dimension: usize) -> Self {
        Self {
            index_name: config.index_name.clone(),
            key_prefix: config.key_prefix.clone(),
            engine,
            dimension,
            page_size: config.page_size.max(1),
            record: PhantomData,
        }
    }

    #[inline]
    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    #[inline]
    pub fn key_prefix(&self) -> &str {
        &self.key_prefix
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    pub fn engine(&self) -> &Arc<dyn SearchEngine> {
        &self.engine
    }

    /// `prefix:suffix`
    #[inline]
    pub fn key_for(&self, suffix: &str) -> String {
        format!("{}:{}", self.key_prefix, suffix)
    }

    /// Index over every key below this store's prefix
    #[inline]
    pub fn index_definition(&self) -> IndexDefinition {
        IndexDefinition::new(
            self.index_name.clone(),
            vec![format!("{}:", self.key_prefix)],
            R::schema(self.dimension),
        )
    }

    /// Create the index and wait for it to become ready
    #[inline]
    pub async fn create_index(&self, readiness: Readiness, cancel: &CancellationToken) -> Result<()> {
        index::create_index(self.engine.as_ref(), &self.index_definition(), readiness, cancel).await
    }

    /// Drop the index, optionally deleting every stored record
    #[inline]
    pub async fn drop_index(&self, delete_documents: bool) -> Result<()> {
        index::drop_index(self.engine.as_ref(), &self.index_name, delete_documents).await
    }

    /// Embed the record's text and write document and vector as one batch.
    /// Nothing is written when embedding or validation fails.
    #[inline]
    pub async fn put(&self, record: &R, embedder: &dyn Embedder) -> Result<String> {
        let vector = embedder.embed(record.embedded_text()).await?;
        validate_embedding(&vector, self.dimension)?;

        let key = self.key_for(&record.key_suffix());
        let vector_path = format!("$.{}", R::VECTOR_FIELD);
        let writes = [
            JsonWrite::new(&key, "$", record.to_document()),
            JsonWrite::new(&key, &vector_path, Value::from(vector)),
        ];

        debug!("Writing {} to index {}", key, self.index_name);
        self.engine.write_batch(&writes).await?;
        Ok(key)
    }

    /// Every record matching `filter`, paging until the reported total is read
    #[inline]
    pub async fn list(&self, filter: Filter, sort_field: Option<&str>) -> Result<Vec<R>> {
        let query = Query::filter(filter);
        let mut records = Vec::new();
        let mut offset = 0;

        loop {
            let mut request =
                SearchRequest::new(query.clone(), R::return_fields()).page(offset, self.page_size);
            if let Some(field) = sort_field {
                request = request.sorted_by(field, true);
            }

            let response = self.engine.search(&self.index_name, &request).await?;
            let fetched = response.docs.len();
            for doc in &response.docs {
                records.push(R::from_fields(&doc.fields)?);
            }

            offset += fetched;
            if fetched == 0 || offset as u64 >= response.total {
                break;
            }
        }

        debug!(
            "Listed {} records from index {} with {}",
            records.len(),
            self.index_name,
            query
        );
        Ok(records)
    }

    /// The `k` records nearest to the embedding of `text` among those matching `filter`,
    /// closest first
    #[inline]
    pub async fn nearest(
        &self,
        filter: Filter,
        text: &str,
        k: usize,
        embedder: &dyn Embedder,
    ) -> Result<Vec<R>> {
        self.nearest_where(filter, text, k, embedder, |_| true).await
    }

    /// Like [`nearest`](Self::nearest), keeping only records accepted by `keep`.
    ///
    /// The KNN window doubles until `k` records are kept or the engine has no
    /// more candidates, so rejected neighbours never crowd out accepted ones.
    #[inline]
    pub async fn nearest_where<F>(
        &self,
        filter: Filter,
        text: &str,
        k: usize,
        embedder: &dyn Embedder,
        keep: F,
    ) -> Result<Vec<R>>
    where
        F: Fn(&R) -> bool + Send + Sync,
    {
        if k == 0 {
            return Ok(Vec::new());
        }
        let vector = embedder.embed(text).await?;
        let blob = encode_vector(&vector);

        let mut window = k;
        loop {
            let request = SearchRequest::new(
                Query::nearest(filter.clone(), window, R::VECTOR_FIELD),
                R::return_fields(),
            )
            .with_vector(blob.clone())
            .page(0, window);

            let response = self.engine.search(&self.index_name, &request).await?;
            debug!(
                "KNN {} on index {} returned {} of {} hits",
                window,
                self.index_name,
                response.docs.len(),
                response.total
            );

            let fetched = response.docs.len();
            let mut records = Vec::with_capacity(k);
            for doc in &response.docs {
                let record = R::from_fields(&doc.fields)?;
                if keep(&record) {
                    records.push(record);
                    if records.len() == k {
                        break;
                    }
                }
            }

            if records.len() == k || fetched < window {
                return Ok(records);
            }
            window = window.saturating_mul(2);
        }
    }

    /// Delete every key matching a glob pattern below this store's prefix
    #[inline]
    pub async fn delete_matching(&self, pattern: &str) -> Result<u64> {
        if !pattern.starts_with(&self.key_prefix) {
            return Err(RagError::Config(format!(
                "Pattern {} is outside prefix {}",
                pattern, self.key_prefix
            )));
        }

        let keys = self.engine.scan_keys(pattern).await?;
        if keys.is_empty() {
            debug!("No keys match {}", pattern);
            return Ok(0);
        }

        let deleted = self.engine.delete_keys(&keys).await?;
        info!("Deleted {} keys matching {}", deleted, pattern);
        Ok(deleted)
    }
}

/// Escape glob metacharacters so `value` matches only itself in a key pattern
#[inline]
pub fn escape_glob(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
