// Document retriever
// Tagged documents searched by semantic similarity of their content


use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::entity::EntityStore;
use super::record::{FieldMapping, Record, string_value};
use crate::Result;
use crate::config::StoreConfig;
use crate::database::engine::SearchEngine;
use crate::database::index::Readiness;
use crate::database::query::Filter;
use crate::database::schema::{FieldSchema, IndexDefinition, IndexSchema, VectorParams};
use crate::embeddings::Embedder;

pub const ID_FIELD: &str = "id";
pub const TAG_FIELD: &str = "tag";
pub const CONTENT_FIELD: &str = "content";
pub const PAYLOAD_FIELD: &str = "payload";
pub const CONTENT_VEC_FIELD: &str = "content_vec";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    /// Comma separated tags
    pub tag: String,
    pub content: String,
    /// Opaque caller data returned with the document
    pub payload: String,
}

impl Document {
    #[inline]
    pub fn new(id: &str, tag: &str, content: &str, payload: &str) -> Self {
        Self {
            id: id.to_string(),
            tag: tag.to_string(),
            content: content.to_string(),
            payload: payload.to_string(),
        }
    }
}

impl Record for Document {
    const FIELDS: &'static [FieldMapping<Self>] = &[
        FieldMapping {
            name: ID_FIELD,
            encode: |doc| string_value(&doc.id),
            decode: |doc, value| {
                doc.id = value.to_string();
                Ok(())
            },
        },
        FieldMapping {
            name: TAG_FIELD,
            encode: |doc| string_value(&doc.tag),
            decode: |doc, value| {
                doc.tag = value.to_string();
                Ok(())
            },
        },
        FieldMapping {
            name: CONTENT_FIELD,
            encode: |doc| string_value(&doc.content),
            decode: |doc, value| {
                doc.content = value.to_string();
                Ok(())
            },
        },
        FieldMapping {
            name: PAYLOAD_FIELD,
            encode: |doc| string_value(&doc.payload),
            decode: |doc, value| {
                doc.payload = value.to_string();
                Ok(())
            },
        },
    ];

    const VECTOR_FIELD: &'static str = CONTENT_VEC_FIELD;

    fn schema(dimension: usize) -> IndexSchema {
        IndexSchema::new(vec![
            FieldSchema::text(ID_FIELD).no_index(),
            FieldSchema::tag(TAG_FIELD, ','),
            FieldSchema::text(CONTENT_FIELD),
            FieldSchema::text(PAYLOAD_FIELD).no_index(),
            FieldSchema::vector(CONTENT_VEC_FIELD, VectorParams::cosine(dimension)),
        ])
    }

    fn embedded_text(&self) -> &str {
        &self.content
    }

    fn key_suffix(&self) -> String {
        self.id.clone()
    }
}

/// Documents stored under `prefix:id`
#[derive(Debug, Clone)]
pub struct Retriever {
    store: EntityStore<Document>,
}

impl Retriever {
    #[inline]
    pub fn new(engine: Arc<dyn SearchEngine>, config: &StoreConfig, dimension: usize) -> Self {
        Self {
            store: EntityStore::new(engine, config, dimension),
        }
    }

    #[inline]
    pub fn schema(dimension: usize) -> IndexSchema {
        Document::schema(dimension)
    }

    #[inline]
    pub fn index_definition(&self) -> IndexDefinition {
        self.store.index_definition()
    }

    #[inline]
    pub async fn create_index(&self, readiness: Readiness, cancel: &CancellationToken) -> Result<()> {
        self.store.create_index(readiness, cancel).await
    }

    #[inline]
    pub async fn drop_index(&self, delete_documents: bool) -> Result<()> {
        self.store.drop_index(delete_documents).await
    }

    /// Embed and store `doc`, replacing any document with the same id
    #[inline]
    pub async fn store(&self, doc: &Document, embedder: &dyn Embedder) -> Result<()> {
        self.store.put(doc, embedder).await.map(|_| ())
    }

    /// Up to `top_k` documents closest in meaning to `content`, nearest first.
    /// A non-empty `tag` restricts the search to documents sharing one of its tags.
    #[inline]
    pub async fn retrieve(
        &self,
        content: &str,
        tag: &str,
        top_k: usize,
        embedder: &dyn Embedder,
    ) -> Result<Vec<Document>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        self.store
            .nearest(Filter::tags(TAG_FIELD, tag), content, top_k, embedder)
            .await
    }
}
