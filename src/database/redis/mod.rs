// Redis Stack engine
// RedisJSON documents indexed by RediSearch, over a multiplexed async connection

#[cfg(test)]
mod tests;

use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{Cmd, RedisResult, Value};
use tracing::{debug, info};

use super::engine::{
    IndexStatus, JsonWrite, SearchDocument, SearchEngine, SearchRequest, SearchResponse,
};
use super::schema::IndexDefinition;
use crate::config::RedisConfig;
use crate::{RagError, Result};

const SCAN_COUNT: usize = 1000;
const DELETE_CHUNK: usize = 500;

/// [`SearchEngine`] backed by a Redis Stack server
#[derive(Clone)]
pub struct RedisEngine {
    connection: MultiplexedConnection,
    command_timeout: Option<Duration>,
}

impl RedisEngine {
    /// Connect using the given configuration
    #[inline]
    pub async fn connect(config: &RedisConfig) -> Result<Self> {
        let url = config
            .connection_url()
            .map_err(|e| RagError::Config(format!("Invalid Redis configuration: {}", e)))?;
        let client = redis::Client::open(url.as_str())
            .map_err(|e| RagError::Engine(format!("Invalid Redis connection info: {}", e)))?;

        debug!("Connecting to Redis at {}:{}", config.host, config.port);
        let command_timeout = config.command_timeout_ms.map(Duration::from_millis);
        let connect = client.get_multiplexed_async_connection();
        let connection = match command_timeout {
            Some(limit) => tokio::time::timeout(limit, connect)
                .await
                .map_err(|_| RagError::Timeout("connect".to_string()))?,
            None => connect.await,
        }
        .map_err(|e| RagError::Engine(format!("Failed to connect to Redis: {}", e)))?;

        info!("Connected to Redis at {}:{}", config.host, config.port);
        Ok(Self {
            connection,
            command_timeout,
        })
    }

    /// Wrap an already established connection
    #[inline]
    pub fn from_connection(connection: MultiplexedConnection) -> Self {
        Self {
            connection,
            command_timeout: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = Some(timeout);
        self
    }

    async fn run<T, F>(&self, operation: &str, command: F) -> Result<T>
    where
        T: Send,
        F: Future<Output = RedisResult<T>> + Send,
    {
        let result = match self.command_timeout {
            Some(limit) => tokio::time::timeout(limit, command)
                .await
                .map_err(|_| RagError::Timeout(operation.to_string()))?,
            None => command.await,
        };
        result.map_err(|e| RagError::Engine(format!("{} failed: {}", operation, e)))
    }
}

#[async_trait]
impl SearchEngine for RedisEngine {
    async fn create_index(&self, definition: &IndexDefinition) -> Result<()> {
        let mut cmd = redis::cmd("FT.CREATE");
        for arg in definition.to_args() {
            cmd.arg(arg);
        }

        debug!("Creating index {}", definition.name);
        let mut conn = self.connection.clone();
        let _: () = self.run("FT.CREATE", cmd.query_async(&mut conn)).await?;
        Ok(())
    }

    async fn index_status(&self, index: &str) -> Result<IndexStatus> {
        let mut cmd = redis::cmd("FT.INFO");
        cmd.arg(index);

        let mut conn = self.connection.clone();
        let reply: Value = self.run("FT.INFO", cmd.query_async(&mut conn)).await?;
        parse_index_status(reply)
    }

    async fn drop_index(&self, index: &str, delete_documents: bool) -> Result<()> {
        let mut cmd = redis::cmd("FT.DROPINDEX");
        cmd.arg(index);
        if delete_documents {
            cmd.arg("DD");
        }

        let mut conn = self.connection.clone();
        let _: () = self.run("FT.DROPINDEX", cmd.query_async(&mut conn)).await?;
        info!("Dropped index {} (delete documents: {})", index, delete_documents);
        Ok(())
    }

    async fn write_batch(&self, writes: &[JsonWrite]) -> Result<()> {
        if writes.is_empty() {
            return Ok(());
        }

        let mut pipe = redis::pipe();
        pipe.atomic();
        for write in writes {
            let json = serde_json::to_string(&write.value)?;
            pipe.cmd("JSON.SET")
                .arg(&write.key)
                .arg(&write.path)
                .arg(json)
                .ignore();
        }

        debug!("Writing batch of {} JSON operations", writes.len());
        let mut conn = self.connection.clone();
        let _: () = self.run("JSON.SET", pipe.query_async(&mut conn)).await?;
        Ok(())
    }

    async fn search(&self, index: &str, request: &SearchRequest<'_>) -> Result<SearchResponse> {
        let cmd = search_command(index, request);

        debug!("FT.SEARCH {} {}", index, request.query);
        let mut conn = self.connection.clone();
        let reply: Value = self.run("FT.SEARCH", cmd.query_async(&mut conn)).await?;
        parse_search_reply(reply)
    }

    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>> {
        let mut keys = BTreeSet::new();
        let mut cursor: u64 = 0;
        loop {
            let mut cmd = redis::cmd("SCAN");
            cmd.arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT);

            let mut conn = self.connection.clone();
            let (next, batch): (u64, Vec<String>) =
                self.run("SCAN", cmd.query_async(&mut conn)).await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        debug!("SCAN {} matched {} keys", pattern, keys.len());
        Ok(keys.into_iter().collect())
    }

    async fn delete_keys(&self, keys: &[String]) -> Result<u64> {
        let mut removed = 0;
        for chunk in keys.chunks(DELETE_CHUNK) {
            let mut cmd = redis::cmd("DEL");
            cmd.arg(chunk);

            let mut conn = self.connection.clone();
            let count: u64 = self.run("DEL", cmd.query_async(&mut conn)).await?;
            removed += count;
        }
        Ok(removed)
    }
}

fn search_command(index: &str, request: &SearchRequest<'_>) -> Cmd {
    let mut cmd = redis::cmd("FT.SEARCH");
    for arg in request.to_args(index) {
        cmd.arg(arg);
    }
    if !request.params.is_empty() {
        cmd.arg("PARAMS").arg(request.params.len() * 2);
        for (name, blob) in &request.params {
            cmd.arg(*name).arg(blob.as_slice());
        }
    }
    cmd.arg("DIALECT").arg(request.dialect.to_string());
    cmd
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::BulkString(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
        Value::SimpleString(s) => Some(s.clone()),
        Value::Int(i) => Some(i.to_string()),
        Value::Double(d) => Some(d.to_string()),
        Value::Okay => Some("OK".to_string()),
        _ => None,
    }
}

fn value_to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Int(i) => Some(*i as f64),
        Value::Double(d) => Some(*d),
        other => value_to_string(other).and_then(|s| s.trim().parse().ok()),
    }
}

/// Flatten a RESP2 key/value array or a RESP3 map into pairs
fn into_pairs(value: Value) -> Option<Vec<(Value, Value)>> {
    match value {
        Value::Array(items) => {
            let mut pairs = Vec::with_capacity(items.len() / 2);
            let mut iter = items.into_iter();
            while let (Some(key), Some(val)) = (iter.next(), iter.next()) {
                pairs.push((key, val));
            }
            Some(pairs)
        }
        Value::Map(map) => Some(map),
        _ => None,
    }
}

/// Parse an `FT.SEARCH` reply.
///
/// RESP2 replies are `[total, key, [field, value, ...], key, ...]`; RESP3
/// replies are a map with `total_results` and `results`, one map per document
/// holding its `id` and `extra_attributes`.
pub(crate) fn parse_search_reply(reply: Value) -> Result<SearchResponse> {
    let items = match reply {
        Value::Array(items) => items,
        Value::Map(entries) => return parse_search_map(entries),
        other => {
            return Err(RagError::Engine(format!(
                "Unexpected FT.SEARCH reply: {:?}",
                other
            )));
        }
    };

    let mut iter = items.into_iter();
    let total = iter
        .next()
        .as_ref()
        .and_then(value_to_f64)
        .ok_or_else(|| RagError::Engine("FT.SEARCH reply is missing the total".to_string()))?
        as u64;

    let mut docs = Vec::new();
    while let Some(key) = iter.next() {
        let key = value_to_string(&key)
            .ok_or_else(|| RagError::Engine(format!("Unexpected document key: {:?}", key)))?;
        let fields = iter.next().map(collect_fields).unwrap_or_default();
        docs.push(SearchDocument { key, fields });
    }

    Ok(SearchResponse { total, docs })
}

fn parse_search_map(entries: Vec<(Value, Value)>) -> Result<SearchResponse> {
    let mut total = None;
    let mut results = Vec::new();
    for (name, value) in entries {
        match value_to_string(&name).as_deref() {
            Some("total_results") => total = value_to_f64(&value),
            Some("results") => {
                if let Value::Array(items) = value {
                    results = items;
                }
            }
            _ => {}
        }
    }
    let total = total
        .ok_or_else(|| RagError::Engine("FT.SEARCH reply is missing total_results".to_string()))?
        as u64;

    let mut docs = Vec::with_capacity(results.len());
    for result in results {
        let entries = into_pairs(result)
            .ok_or_else(|| RagError::Engine("Unexpected FT.SEARCH result entry".to_string()))?;
        let mut key = None;
        let mut fields = HashMap::new();
        for (name, value) in entries {
            match value_to_string(&name).as_deref() {
                Some("id") => key = value_to_string(&value),
                Some("extra_attributes") => fields = collect_fields(value),
                _ => {}
            }
        }
        let key = key
            .ok_or_else(|| RagError::Engine("FT.SEARCH result is missing its id".to_string()))?;
        docs.push(SearchDocument { key, fields });
    }

    Ok(SearchResponse { total, docs })
}

fn collect_fields(value: Value) -> HashMap<String, String> {
    into_pairs(value)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(name, value)| Some((value_to_string(&name)?, value_to_string(&value)?)))
        .collect()
}

/// Pull indexing progress out of an `FT.INFO` reply
pub(crate) fn parse_index_status(reply: Value) -> Result<IndexStatus> {
    let pairs = into_pairs(reply)
        .ok_or_else(|| RagError::Engine("Unexpected FT.INFO reply".to_string()))?;

    let mut indexing = None;
    let mut num_docs = 0;
    let mut percent_indexed = 1.0;
    for (key, value) in &pairs {
        match value_to_string(key).as_deref() {
            Some("indexing") => indexing = value_to_f64(value).map(|v| v != 0.0),
            Some("num_docs") => num_docs = value_to_f64(value).map_or(0, |v| v as u64),
            Some("percent_indexed") => percent_indexed = value_to_f64(value).unwrap_or(1.0),
            _ => {}
        }
    }

    let indexing = indexing.ok_or_else(|| {
        RagError::Engine("FT.INFO reply is missing the indexing flag".to_string())
    })?;
    Ok(IndexStatus {
        indexing,
        num_docs,
        percent_indexed,
    })
}
