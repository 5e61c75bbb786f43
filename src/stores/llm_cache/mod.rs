// LLM answer cache
// Question/answer pairs keyed by a digest of the question, with exact and semantic lookup


use std::sync::Arc;

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::entity::EntityStore;
use super::record::{FieldMapping, Record, string_value};
use crate::Result;
use crate::config::StoreConfig;
use crate::database::engine::SearchEngine;
use crate::database::index::Readiness;
use crate::database::query::Filter;
use crate::database::schema::{FieldSchema, IndexDefinition, IndexSchema, VectorParams};
use crate::embeddings::Embedder;

pub const TAG_FIELD: &str = "tag";
pub const QUERY_FIELD: &str = "query";
pub const ANSWER_FIELD: &str = "answer";
pub const QUERY_VEC_FIELD: &str = "query_vec";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryAnswer {
    /// Comma separated tags
    pub tag: String,
    pub query: String,
    pub answer: String,
}

impl QueryAnswer {
    #[inline]
    pub fn new(tag: &str, query: &str, answer: &str) -> Self {
        Self {
            tag: tag.to_string(),
            query: query.to_string(),
            answer: answer.to_string(),
        }
    }
}

impl Record for QueryAnswer {
    const FIELDS: &'static [FieldMapping<Self>] = &[
        FieldMapping {
            name: TAG_FIELD,
            encode: |qa| string_value(&qa.tag),
            decode: |qa, value| {
                qa.tag = value.to_string();
                Ok(())
            },
        },
        FieldMapping {
            name: QUERY_FIELD,
            encode: |qa| string_value(&qa.query),
            decode: |qa, value| {
                qa.query = value.to_string();
                Ok(())
            },
        },
        FieldMapping {
            name: ANSWER_FIELD,
            encode: |qa| string_value(&qa.answer),
            decode: |qa, value| {
                qa.answer = value.to_string();
                Ok(())
            },
        },
    ];

    const VECTOR_FIELD: &'static str = QUERY_VEC_FIELD;

    fn schema(dimension: usize) -> IndexSchema {
        IndexSchema::new(vec![
            FieldSchema::tag(TAG_FIELD, ','),
            FieldSchema::text(QUERY_FIELD).no_stem(),
            FieldSchema::text(ANSWER_FIELD).no_index(),
            FieldSchema::vector(QUERY_VEC_FIELD, VectorParams::cosine(dimension)),
        ])
    }

    fn embedded_text(&self) -> &str {
        &self.query
    }

    fn key_suffix(&self) -> String {
        cache_key(&self.query)
    }
}

/// Lowercase hex MD5 of the query text
#[inline]
pub fn cache_key(query: &str) -> String {
    hex::encode(Md5::digest(query.as_bytes()))
}

/// Answers stored under `prefix:md5(query)`
#[derive(Debug, Clone)]
pub struct LlmCache {
    store: EntityStore<QueryAnswer>,
}

impl LlmCache {
    #[inline]
    pub fn new(engine: Arc<dyn SearchEngine>, config: &StoreConfig, dimension: usize) -> Self {
        Self {
            store: EntityStore::new(engine, config, dimension),
        }
    }

    #[inline]
    pub fn schema(dimension: usize) -> IndexSchema {
        QueryAnswer::schema(dimension)
    }

    #[inline]
    pub fn index_definition(&self) -> IndexDefinition {
        self.store.index_definition()
    }

    #[inline]
    pub async fn create_index(&self, readiness: Readiness, cancel: &CancellationToken) -> Result<()> {
        self.store.create_index(readiness, cancel).await
    }

    /// Drop the index; with `delete_documents` every cached answer goes too
    #[inline]
    pub async fn drop_index(&self, delete_documents: bool) -> Result<()> {
        self.store.drop_index(delete_documents).await
    }

    /// Store `qa`, replacing any earlier answer to the same query
    #[inline]
    pub async fn cache(&self, qa: &QueryAnswer, embedder: &dyn Embedder) -> Result<()> {
        let key = self.store.put(qa, embedder).await?;
        debug!("Cached answer under {}", key);
        Ok(())
    }

    /// The cached answer whose query equals `query` exactly
    #[inline]
    pub async fn lookup(&self, query: &str) -> Result<Option<QueryAnswer>> {
        if query.is_empty() {
            return Ok(None);
        }
        let answers = self
            .store
            .list(Filter::text(QUERY_FIELD, query), None)
            .await?;
        Ok(answers.into_iter().find(|qa| qa.query == query))
    }

    /// The cached answer whose query is closest in meaning to `query`, among
    /// entries sharing a tag with `tag`. An empty `tag` considers every entry.
    #[inline]
    pub async fn semantic_search(
        &self,
        tag: &str,
        query: &str,
        embedder: &dyn Embedder,
    ) -> Result<Option<QueryAnswer>> {
        let answers = self
            .store
            .nearest(Filter::tags(TAG_FIELD, tag), query, 1, embedder)
            .await?;
        Ok(answers.into_iter().next())
    }
}
