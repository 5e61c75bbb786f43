// Chat history store
// Messages keyed by user, session and timestamp with per-user and per-session access


use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::entity::{EntityStore, escape_glob};
use super::record::{FieldMapping, Record, parse_i64, string_value};
use crate::{RagError, Result};
use crate::config::StoreConfig;
use crate::database::engine::SearchEngine;
use crate::database::index::Readiness;
use crate::database::query::Filter;
use crate::database::schema::{FieldSchema, IndexDefinition, IndexSchema, VectorParams};
use crate::embeddings::Embedder;

pub const USER_ID_FIELD: &str = "user_id";
pub const SESSION_ID_FIELD: &str = "session_id";
pub const TYPE_FIELD: &str = "type";
pub const CONTENT_FIELD: &str = "content";
pub const TIMESTAMP_FIELD: &str = "timestamp";
pub const CONTENT_VEC_FIELD: &str = "content_vec";

const KEY_SEPARATOR: char = ':';

/// One turn of a conversation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(rename = "type")]
    pub message_type: String,
    pub user_id: String,
    pub session_id: String,
    pub content: String,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

impl ChatMessage {
    #[inline]
    pub fn new(
        message_type: &str,
        user_id: &str,
        session_id: &str,
        content: &str,
        timestamp: i64,
    ) -> Self {
        Self {
            message_type: message_type.to_string(),
            user_id: user_id.to_string(),
            session_id: session_id.to_string(),
            content: content.to_string(),
            timestamp,
        }
    }

    /// Message stamped with the current time
    #[inline]
    pub fn now(message_type: &str, user_id: &str, session_id: &str, content: &str) -> Self {
        Self::new(
            message_type,
            user_id,
            session_id,
            content,
            Utc::now().timestamp_millis(),
        )
    }
}

impl Record for ChatMessage {
    const FIELDS: &'static [FieldMapping<Self>] = &[
        FieldMapping {
            name: TYPE_FIELD,
            encode: |msg| string_value(&msg.message_type),
            decode: |msg, value| {
                msg.message_type = value.to_string();
                Ok(())
            },
        },
        FieldMapping {
            name: USER_ID_FIELD,
            encode: |msg| string_value(&msg.user_id),
            decode: |msg, value| {
                msg.user_id = value.to_string();
                Ok(())
            },
        },
        FieldMapping {
            name: SESSION_ID_FIELD,
            encode: |msg| string_value(&msg.session_id),
            decode: |msg, value| {
                msg.session_id = value.to_string();
                Ok(())
            },
        },
        FieldMapping {
            name: CONTENT_FIELD,
            encode: |msg| string_value(&msg.content),
            decode: |msg, value| {
                msg.content = value.to_string();
                Ok(())
            },
        },
        FieldMapping {
            name: TIMESTAMP_FIELD,
            encode: |msg| Value::from(msg.timestamp),
            decode: |msg, value| {
                msg.timestamp = parse_i64(TIMESTAMP_FIELD, value)?;
                Ok(())
            },
        },
    ];

    const VECTOR_FIELD: &'static str = CONTENT_VEC_FIELD;

    fn schema(dimension: usize) -> IndexSchema {
        IndexSchema::new(vec![
            FieldSchema::text(USER_ID_FIELD).no_stem(),
            FieldSchema::text(SESSION_ID_FIELD),
            FieldSchema::tag(TYPE_FIELD, ','),
            FieldSchema::text(CONTENT_FIELD),
            FieldSchema::numeric(TIMESTAMP_FIELD).sortable(),
            FieldSchema::vector(CONTENT_VEC_FIELD, VectorParams::cosine(dimension)),
        ])
    }

    fn embedded_text(&self) -> &str {
        &self.content
    }

    fn key_suffix(&self) -> String {
        format!("{}:{}:{}", self.user_id, self.session_id, self.timestamp)
    }
}

/// Field a conversation is grouped by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Owner {
    User,
    Session,
}

impl Owner {
    fn field(self) -> &'static str {
        match self {
            Self::User => USER_ID_FIELD,
            Self::Session => SESSION_ID_FIELD,
        }
    }

    fn value(self, msg: &ChatMessage) -> &str {
        match self {
            Self::User => &msg.user_id,
            Self::Session => &msg.session_id,
        }
    }

    fn filter(self, id: &str, from: i64) -> Filter {
        Filter::text(self.field(), id).and(Filter::at_least(TIMESTAMP_FIELD, from))
    }
}

/// Chat messages stored under `prefix:user_id:session_id:timestamp`
#[derive(Debug, Clone)]
pub struct ChatHistory {
    store: EntityStore<ChatMessage>,
}

impl ChatHistory {
    #[inline]
    pub fn new(engine: Arc<dyn SearchEngine>, config: &StoreConfig, dimension: usize) -> Self {
        Self {
            store: EntityStore::new(engine, config, dimension),
        }
    }

    /// Index schema for content embeddings of `dimension` elements
    #[inline]
    pub fn schema(dimension: usize) -> IndexSchema {
        ChatMessage::schema(dimension)
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

    /// Embed the message content and store it. A message with the same user,
    /// session and timestamp is replaced. User and session ids containing `:`
    /// are rejected with [`RagError::InvalidInput`].
    #[inline]
    pub async fn add(&self, msg: &ChatMessage, embedder: &dyn Embedder) -> Result<()> {
        check_key_segment(USER_ID_FIELD, &msg.user_id)?;
        check_key_segment(SESSION_ID_FIELD, &msg.session_id)?;
        self.store.put(msg, embedder).await.map(|_| ())
    }

    /// Messages of `user_id` with `timestamp >= from`, oldest first
    #[inline]
    pub async fn list_by_user_id(&self, from: i64, user_id: &str) -> Result<Vec<ChatMessage>> {
        self.list(Owner::User, from, user_id).await
    }

    /// Messages of `session_id` with `timestamp >= from`, oldest first
    #[inline]
    pub async fn list_by_session_id(
        &self,
        from: i64,
        session_id: &str,
    ) -> Result<Vec<ChatMessage>> {
        self.list(Owner::Session, from, session_id).await
    }

    /// The message of `user_id` since `from` closest in meaning to `text`
    #[inline]
    pub async fn search_with_user_id(
        &self,
        from: i64,
        user_id: &str,
        text: &str,
        embedder: &dyn Embedder,
    ) -> Result<Vec<ChatMessage>> {
        self.search(Owner::User, from, user_id, text, embedder)
            .await
    }

    /// The message of `session_id` since `from` closest in meaning to `text`
    #[inline]
    pub async fn search_with_session_id(
        &self,
        from: i64,
        session_id: &str,
        text: &str,
        embedder: &dyn Embedder,
    ) -> Result<Vec<ChatMessage>> {
        self.search(Owner::Session, from, session_id, text, embedder)
            .await
    }

    /// Delete every message of `user_id`, returning how many were removed.
    ///
    /// Keys are matched by segment, so an id containing `:` could also match
    /// other users' keys and is rejected.
    #[inline]
    pub async fn delete_by_user_id(&self, user_id: &str) -> Result<u64> {
        check_key_segment(USER_ID_FIELD, user_id)?;
        let pattern = format!("{}:{}:*", self.store.key_prefix(), escape_glob(user_id));
        self.store.delete_matching(&pattern).await
    }

    /// Delete every message of `session_id`, returning how many were removed.
    /// Ids containing `:` are rejected as for [`delete_by_user_id`](Self::delete_by_user_id).
    #[inline]
    pub async fn delete_by_session_id(&self, session_id: &str) -> Result<u64> {
        check_key_segment(SESSION_ID_FIELD, session_id)?;
        let pattern = format!(
            "{}:*:{}:*",
            self.store.key_prefix(),
            escape_glob(session_id)
        );
        self.store.delete_matching(&pattern).await
    }

    async fn list(&self, owner: Owner, from: i64, id: &str) -> Result<Vec<ChatMessage>> {
        if id.is_empty() {
            return Ok(Vec::new());
        }
        let mut messages = self
            .store
            .list(owner.filter(id, from), Some(TIMESTAMP_FIELD))
            .await?;
        messages.retain(|msg| owner.value(msg) == id);
        Ok(messages)
    }

    async fn search(
        &self,
        owner: Owner,
        from: i64,
        id: &str,
        text: &str,
        embedder: &dyn Embedder,
    ) -> Result<Vec<ChatMessage>> {
        if id.is_empty() {
            return Ok(Vec::new());
        }
        self.store
            .nearest_where(owner.filter(id, from), text, 1, embedder, |msg| {
                owner.value(msg) == id
            })
            .await
    }
}

/// Key segments are separated by `:`, so ids must not contain one
fn check_key_segment(field: &str, id: &str) -> Result<()> {
    if id.contains(KEY_SEPARATOR) {
        return Err(RagError::InvalidInput(format!(
            "{} {:?} must not contain '{}'",
            field, id, KEY_SEPARATOR
        )));
    }
    Ok(())
}
