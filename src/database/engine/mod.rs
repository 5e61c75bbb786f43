// Search engine abstraction
// The commands the storage layer needs from a JSON + vector search engine


use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use super::query::{DIALECT, Query, SCORE_FIELD, VECTOR_PARAM};
use super::schema::IndexDefinition;
use crate::Result;

/// A single `JSON.SET key path value` operation
#[derive(Debug, Clone, PartialEq)]
pub struct JsonWrite {
    pub key: String,
    pub path: String,
    pub value: Value,
}

impl JsonWrite {
    #[inline]
    pub fn new(key: &str, path: &str, value: Value) -> Self {
        Self {
            key: key.to_string(),
            path: path.to_string(),
            value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortBy<'a> {
    pub field: &'a str,
    pub ascending: bool,
}

/// Arguments of one `FT.SEARCH` call
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest<'a> {
    pub query: Query,
    pub return_fields: Vec<&'a str>,
    pub params: Vec<(&'a str, Vec<u8>)>,
    pub sort_by: Option<SortBy<'a>>,
    pub offset: usize,
    pub limit: usize,
    pub dialect: u8,
}

impl<'a> SearchRequest<'a> {
    #[inline]
    pub fn new(query: Query, return_fields: Vec<&'a str>) -> Self {
        Self {
            query,
            return_fields,
            params: Vec::new(),
            sort_by: None,
            offset: 0,
            limit: 10,
            dialect: DIALECT,
        }
    }

    /// Attach the encoded query vector and rank by ascending distance
    #[inline]
    #[must_use]
    pub fn with_vector(mut self, blob: Vec<u8>) -> Self {
        self.params.push((VECTOR_PARAM, blob));
        self.sort_by = Some(SortBy {
            field: SCORE_FIELD,
            ascending: true,
        });
        if !self.return_fields.contains(&SCORE_FIELD) {
            self.return_fields.push(SCORE_FIELD);
        }
        self
    }

    #[inline]
    #[must_use]
    pub fn sorted_by(mut self, field: &'a str, ascending: bool) -> Self {
        self.sort_by = Some(SortBy { field, ascending });
        self
    }

    #[inline]
    #[must_use]
    pub fn page(mut self, offset: usize, limit: usize) -> Self {
        self.offset = offset;
        self.limit = limit;
        self
    }

    /// Textual arguments following the `FT.SEARCH` command name. `PARAMS` and
    /// `DIALECT` are appended by the engine because parameter values are binary.
    #[inline]
    pub fn to_args(&self, index: &str) -> Vec<String> {
        let mut args = vec![index.to_string(), self.query.to_string()];
        if !self.return_fields.is_empty() {
            args.push("RETURN".to_string());
            args.push(self.return_fields.len().to_string());
            args.extend(self.return_fields.iter().map(|f| (*f).to_string()));
        }
        if let Some(sort) = self.sort_by {
            args.push("SORTBY".to_string());
            args.push(sort.field.to_string());
            args.push(if sort.ascending { "ASC" } else { "DESC" }.to_string());
        }
        args.push("LIMIT".to_string());
        args.push(self.offset.to_string());
        args.push(self.limit.to_string());
        args
    }
}

/// One hit: document key plus the returned fields
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SearchDocument {
    pub key: String,
    pub fields: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SearchResponse {
    /// Total number of matches, which may exceed `docs.len()`
    pub total: u64,
    pub docs: Vec<SearchDocument>,
}

/// Progress of an index as reported by `FT.INFO`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndexStatus {
    pub indexing: bool,
    pub num_docs: u64,
    pub percent_indexed: f64,
}

/// Engine commands used by the index manager and the entity stores.
///
/// Implementations surface every engine failure as `RagError::Engine` with the
/// engine's message preserved.
#[async_trait]
pub trait SearchEngine: Send + Sync {
    /// `FT.CREATE`; fails if the index already exists
    async fn create_index(&self, definition: &IndexDefinition) -> Result<()>;

    /// `FT.INFO`
    async fn index_status(&self, index: &str) -> Result<IndexStatus>;

    /// `FT.DROPINDEX`, optionally deleting the indexed documents
    async fn drop_index(&self, index: &str, delete_documents: bool) -> Result<()>;

    /// Apply the writes in order as one atomic batch
    async fn write_batch(&self, writes: &[JsonWrite]) -> Result<()>;

    /// `FT.SEARCH`
    async fn search(&self, index: &str, request: &SearchRequest<'_>) -> Result<SearchResponse>;

    /// All keys matching a glob pattern
    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>>;

    /// Delete keys, returning how many existed
    async fn delete_keys(&self, keys: &[String]) -> Result<u64>;
}
