// In-process search engine
// Evaluates the typed queries directly over JSON documents held in memory

#[cfg(test)]
mod tests;

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::debug;

use super::engine::{
    IndexStatus, JsonWrite, SearchDocument, SearchEngine, SearchRequest, SearchResponse,
};
use super::query::{Filter, SCORE_FIELD, VECTOR_PARAM};
use super::schema::{DistanceMetric, FieldType, IndexDefinition, IndexSchema};
use crate::codec::decode_vector;
use crate::{RagError, Result};

/// [`SearchEngine`] keeping documents and indexes in process memory.
///
/// Indexing is synchronous, so a freshly created index is immediately ready
/// unless [`MemoryEngine::with_indexing_polls`] says otherwise.
#[derive(Debug, Default)]
pub struct MemoryEngine {
    state: Mutex<State>,
}

#[derive(Debug, Default)]
struct State {
    documents: BTreeMap<String, Value>,
    indexes: HashMap<String, IndexDefinition>,
    pending_polls: HashMap<String, u32>,
    indexing_polls: u32,
    failing_command: Option<String>,
    commands: Vec<String>,
}

struct Hit {
    key: String,
    fields: HashMap<String, String>,
    score: Option<f64>,
}

impl MemoryEngine {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Report new indexes as still indexing for the first `polls` status checks
    #[inline]
    #[must_use]
    pub fn with_indexing_polls(self, polls: u32) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.indexing_polls = polls;
        }
        self
    }

    /// Make every later call of `command` fail, e.g. `"FT.SEARCH"`
    #[inline]
    pub fn fail_command(&self, command: &str) {
        if let Ok(mut state) = self.state.lock() {
            state.failing_command = Some(command.to_string());
        }
    }

    /// Names of the commands received so far, in order
    #[inline]
    pub fn command_log(&self) -> Vec<String> {
        self.state
            .lock()
            .map(|state| state.commands.clone())
            .unwrap_or_default()
    }

    /// Raw JSON document stored under `key`
    #[inline]
    pub fn document(&self, key: &str) -> Option<Value> {
        self.state
            .lock()
            .ok()
            .and_then(|state| state.documents.get(key).cloned())
    }

    /// All stored keys in lexical order
    #[inline]
    pub fn keys(&self) -> Vec<String> {
        self.state
            .lock()
            .map(|state| state.documents.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn begin(&self, command: &str) -> Result<MutexGuard<'_, State>> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| RagError::Engine("memory engine state is poisoned".to_string()))?;
        state.commands.push(command.to_string());
        if state.failing_command.as_deref() == Some(command) {
            return Err(RagError::Engine(format!("{} failed: injected failure", command)));
        }
        Ok(state)
    }
}

#[async_trait]
impl SearchEngine for MemoryEngine {
    async fn create_index(&self, definition: &IndexDefinition) -> Result<()> {
        let mut state = self.begin("FT.CREATE")?;
        if state.indexes.contains_key(&definition.name) {
            return Err(RagError::Engine(
                "FT.CREATE failed: Index already exists".to_string(),
            ));
        }
        let polls = state.indexing_polls;
        state.pending_polls.insert(definition.name.clone(), polls);
        state
            .indexes
            .insert(definition.name.clone(), definition.clone());
        debug!("Created in-memory index {}", definition.name);
        Ok(())
    }

    async fn index_status(&self, index: &str) -> Result<IndexStatus> {
        let mut state = self.begin("FT.INFO")?;
        let definition = state
            .indexes
            .get(index)
            .ok_or_else(|| RagError::Engine(format!("FT.INFO failed: {}: no such index", index)))?;
        let prefixes = definition.prefixes.clone();
        let num_docs = state
            .documents
            .keys()
            .filter(|key| prefixes.iter().any(|p| key.starts_with(p.as_str())))
            .count() as u64;

        let pending = state.pending_polls.entry(index.to_string()).or_insert(0);
        let indexing = *pending > 0;
        *pending = pending.saturating_sub(1);

        Ok(IndexStatus {
            indexing,
            num_docs,
            percent_indexed: if indexing { 0.0 } else { 1.0 },
        })
    }

    async fn drop_index(&self, index: &str, delete_documents: bool) -> Result<()> {
        let mut state = self.begin("FT.DROPINDEX")?;
        let definition = state
            .indexes
            .remove(index)
            .ok_or_else(|| RagError::Engine("FT.DROPINDEX failed: Unknown Index name".to_string()))?;
        state.pending_polls.remove(index);
        if delete_documents {
            state
                .documents
                .retain(|key, _| !definition.prefixes.iter().any(|p| key.starts_with(p.as_str())));
        }
        Ok(())
    }

    async fn write_batch(&self, writes: &[JsonWrite]) -> Result<()> {
        let mut state = self.begin("JSON.SET")?;

        // Stage every write first so a failing one leaves nothing behind
        let mut staged: BTreeMap<String, Value> = BTreeMap::new();
        for write in writes {
            let current = staged
                .get(&write.key)
                .or_else(|| state.documents.get(&write.key))
                .cloned();
            let updated = apply_json_set(current, &write.path, write.value.clone())?;
            staged.insert(write.key.clone(), updated);
        }
        state.documents.extend(staged);
        Ok(())
    }

    async fn search(&self, index: &str, request: &SearchRequest<'_>) -> Result<SearchResponse> {
        let state = self.begin("FT.SEARCH")?;
        let definition = state
            .indexes
            .get(index)
            .ok_or_else(|| RagError::Engine(format!("FT.SEARCH failed: {}: no such index", index)))?;

        let query_vector = request
            .params
            .iter()
            .find(|(name, _)| *name == VECTOR_PARAM)
            .map(|(_, blob)| decode_vector(blob))
            .transpose()?;

        let knn = match (&request.query.knn, query_vector) {
            (Some(knn), Some(vector)) => {
                let metric = match definition.schema.field(&knn.field).map(|f| &f.field_type) {
                    Some(FieldType::Vector(params)) => params.metric,
                    _ => {
                        return Err(RagError::Engine(format!(
                            "FT.SEARCH failed: {} is not a vector field",
                            knn.field
                        )));
                    }
                };
                Some((knn, vector, metric))
            }
            (Some(_), None) => {
                return Err(RagError::Engine(
                    "FT.SEARCH failed: missing vector parameter".to_string(),
                ));
            }
            (None, _) => None,
        };

        let mut hits = Vec::new();
        for (key, doc) in &state.documents {
            if !definition.prefixes.iter().any(|p| key.starts_with(p.as_str())) {
                continue;
            }
            let fields = indexed_fields(&definition.schema, doc);
            if !matches(&request.query.filter, &definition.schema, &fields) {
                continue;
            }

            let score = match &knn {
                Some((knn, vector, metric)) => {
                    match stored_vector(doc, &knn.field).filter(|v| v.len() == vector.len()) {
                        Some(stored) => Some(distance(*metric, vector, &stored)),
                        None => continue,
                    }
                }
                None => None,
            };
            hits.push(Hit {
                key: key.clone(),
                fields,
                score,
            });
        }

        if let Some((knn, _, _)) = &knn {
            hits.sort_by(|a, b| compare_scores(a.score, b.score));
            hits.truncate(knn.k);
        }

        if let Some(sort) = request.sort_by {
            hits.sort_by(|a, b| {
                let ordering = if sort.field == SCORE_FIELD {
                    compare_scores(a.score, b.score)
                } else {
                    compare_values(a.fields.get(sort.field), b.fields.get(sort.field))
                };
                if sort.ascending {
                    ordering
                } else {
                    ordering.reverse()
                }
            });
        }

        let total = hits.len() as u64;
        let docs = hits
            .into_iter()
            .skip(request.offset)
            .take(request.limit)
            .map(|hit| project(hit, &request.return_fields))
            .collect();

        Ok(SearchResponse { total, docs })
    }

    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>> {
        let state = self.begin("SCAN")?;
        let pattern: Vec<char> = pattern.chars().collect();
        Ok(state
            .documents
            .keys()
            .filter(|key| glob_match(&pattern, &key.chars().collect::<Vec<_>>()))
            .cloned()
            .collect())
    }

    async fn delete_keys(&self, keys: &[String]) -> Result<u64> {
        let mut state = self.begin("DEL")?;
        let mut removed = 0;
        for key in keys {
            if state.documents.remove(key).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

fn apply_json_set(current: Option<Value>, path: &str, value: Value) -> Result<Value> {
    if path == "$" {
        return Ok(value);
    }

    let field = path
        .strip_prefix("$.")
        .filter(|f| !f.is_empty() && !f.contains('.'))
        .ok_or_else(|| RagError::Engine(format!("JSON.SET failed: unsupported path {}", path)))?;

    match current {
        Some(Value::Object(mut object)) => {
            object.insert(field.to_string(), value);
            Ok(Value::Object(object))
        }
        Some(_) => Err(RagError::Engine(format!(
            "JSON.SET failed: path {} does not exist",
            path
        ))),
        None => Err(RagError::Engine(
            "JSON.SET failed: new objects must be created at the root".to_string(),
        )),
    }
}

fn json_field<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    let object: &Map<String, Value> = doc.as_object()?;
    object.get(path.strip_prefix("$.")?)
}

/// Non-vector schema fields of a document, keyed by alias
fn indexed_fields(schema: &IndexSchema, doc: &Value) -> HashMap<String, String> {
    let mut fields = HashMap::new();
    for field in schema.fields() {
        if matches!(field.field_type, FieldType::Vector(_)) {
            continue;
        }
        let value = match json_field(doc, &field.path) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => continue,
            Some(other) => other.to_string(),
        };
        fields.insert(field.alias.clone(), value);
    }
    fields
}

fn stored_vector(doc: &Value, field: &str) -> Option<Vec<f64>> {
    json_field(doc, &format!("$.{}", field))?
        .as_array()?
        .iter()
        .map(Value::as_f64)
        .collect()
}

fn matches(filter: &Filter, schema: &IndexSchema, fields: &HashMap<String, String>) -> bool {
    match filter {
        Filter::All => true,
        Filter::And(filters) => filters.iter().all(|f| matches(f, schema, fields)),
        Filter::Text { field, value } => {
            let searchable = matches!(
                schema.field(field).map(|f| &f.field_type),
                Some(FieldType::Text {
                    no_index: false,
                    ..
                })
            );
            searchable && fields.get(field).is_some_and(|stored| phrase_match(stored, value))
        }
        Filter::Range { field, min, max } => fields
            .get(field)
            .and_then(|stored| stored.parse::<f64>().ok())
            .is_some_and(|n| n >= *min as f64 && max.is_none_or(|max| n <= max as f64)),
        Filter::AnyTag { field, tags } => {
            let separator = match schema.field(field).map(|f| &f.field_type) {
                Some(FieldType::Tag { separator }) => *separator,
                _ => return false,
            };
            fields.get(field).is_some_and(|stored| {
                stored
                    .split(separator)
                    .map(str::trim)
                    .any(|s| tags.iter().any(|t| t.eq_ignore_ascii_case(s)))
            })
        }
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Tokens of `phrase` appear contiguously in `text`
fn phrase_match(text: &str, phrase: &str) -> bool {
    let haystack = tokenize(text);
    let needle = tokenize(phrase);
    if needle.is_empty() {
        return false;
    }
    haystack.windows(needle.len()).any(|w| w == needle.as_slice())
}

fn distance(metric: DistanceMetric, a: &[f64], b: &[f64]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    match metric {
        DistanceMetric::Cosine => {
            let norm_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
            let norm_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();
            if norm_a == 0.0 || norm_b == 0.0 {
                1.0
            } else {
                1.0 - dot / (norm_a * norm_b)
            }
        }
        DistanceMetric::L2 => a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum(),
        DistanceMetric::InnerProduct => 1.0 - dot,
    }
}

fn compare_scores(a: Option<f64>, b: Option<f64>) -> Ordering {
    a.unwrap_or(f64::INFINITY)
        .total_cmp(&b.unwrap_or(f64::INFINITY))
}

fn compare_values(a: Option<&String>, b: Option<&String>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => match (a.parse::<f64>(), b.parse::<f64>()) {
            (Ok(x), Ok(y)) => x.total_cmp(&y),
            _ => a.cmp(b),
        },
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn project(hit: Hit, return_fields: &[&str]) -> SearchDocument {
    let Hit {
        key,
        mut fields,
        score,
    } = hit;
    if let Some(score) = score {
        fields.insert(SCORE_FIELD.to_string(), score.to_string());
    }
    if !return_fields.is_empty() {
        fields.retain(|name, _| return_fields.contains(&name.as_str()));
    }
    SearchDocument { key, fields }
}

/// Redis-style glob: `*`, `?` and backslash escapes
fn glob_match(pattern: &[char], text: &[char]) -> bool {
    let (mut p, mut t) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        let step = match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, t));
                p += 1;
                continue;
            }
            Some('?') => Some(1),
            Some('\\') if p + 1 < pattern.len() => (pattern[p + 1] == text[t]).then_some(2),
            Some(c) => (*c == text[t]).then_some(1),
            None => None,
        };

        match step {
            Some(width) => {
                p += width;
                t += 1;
            }
            None => match backtrack {
                Some((star, matched)) => {
                    p = star + 1;
                    t = matched + 1;
                    backtrack = Some((star, matched + 1));
                }
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|c| *c == '*')
}
