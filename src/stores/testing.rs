use std::sync::Arc;

use crate::Result;
use crate::database::engine::SearchEngine;
use crate::database::memory::MemoryEngine;
use crate::embeddings::FnEmbedder;

pub(crate) const DIMENSION: usize = 4;

const TOPICS: [&[&str]; 3] = [
    &["weather", "rain", "sunny", "forecast"],
    &["football", "match", "goal", "league"],
    &["pizza", "pasta", "recipe", "dinner"],
];

/// One axis per topic plus a fallback axis for text with no known keyword
pub(crate) fn topic_embedding(text: &str) -> Result<Vec<f64>> {
    let text = text.to_lowercase();
    let mut vector = vec![0.0; DIMENSION];
    for (axis, keywords) in TOPICS.iter().enumerate() {
        vector[axis] = keywords.iter().filter(|k| text.contains(**k)).count() as f64;
    }
    if vector.iter().all(|v| *v == 0.0) {
        vector[DIMENSION - 1] = 1.0;
    }
    Ok(vector)
}

pub(crate) fn topic_embedder() -> FnEmbedder<fn(&str) -> Result<Vec<f64>>> {
    FnEmbedder::new(topic_embedding as fn(&str) -> Result<Vec<f64>>)
}

pub(crate) fn memory_engine() -> (Arc<MemoryEngine>, Arc<dyn SearchEngine>) {
    let engine = Arc::new(MemoryEngine::new());
    let shared: Arc<dyn SearchEngine> = Arc::clone(&engine) as Arc<dyn SearchEngine>;
    (engine, shared)
}
