use super::*;
use crate::database::memory::MemoryEngine;
use crate::database::schema::{FieldSchema, IndexSchema, VectorParams};
use crate::embeddings::FnEmbedder;
use crate::stores::record::{FieldMapping, parse_i64, string_value};

const DIMENSION: usize = 3;

#[derive(Debug, Default, Clone, PartialEq)]
struct Note {
    name: String,
    rank: i64,
}

impl Record for Note {
    const FIELDS: &'static [FieldMapping<Self>] = &[
        FieldMapping {
            name: "name",
            encode: |note| string_value(&note.name),
            decode: |note, value| {
                note.name = value.to_string();
                Ok(())
            },
        },
        FieldMapping {
            name: "rank",
            encode: |note| Value::from(note.rank),
            decode: |note, value| {
                note.rank = parse_i64("rank", value)?;
                Ok(())
            },
        },
    ];

    const VECTOR_FIELD: &'static str = "name_vec";

    fn schema(dimension: usize) -> IndexSchema {
        IndexSchema::new(vec![
            FieldSchema::text("name"),
            FieldSchema::numeric("rank").sortable(),
            FieldSchema::vector(Self::VECTOR_FIELD, VectorParams::cosine(dimension)),
        ])
    }

    fn embedded_text(&self) -> &str {
        &self.name
    }

    fn key_suffix(&self) -> String {
        self.name.clone()
    }
}

fn note(name: &str, rank: i64) -> Note {
    Note {
        name: name.to_string(),
        rank,
    }
}

/// Maps the first letter onto one of three axes
fn axis_embedding(text: &str) -> crate::Result<Vec<f64>> {
    Ok(match text.chars().next() {
        Some('a') => vec![1.0, 0.0, 0.0],
        Some('b') => vec![0.0, 1.0, 0.0],
        _ => vec![0.0, 0.0, 1.0],
    })
}

async fn store_with(engine: &Arc<MemoryEngine>, page_size: usize) -> EntityStore<Note> {
    let config = StoreConfig {
        page_size,
        ..StoreConfig::new("idx:notes", "doc:notes")
    };
    let shared: Arc<dyn SearchEngine> = Arc::clone(engine) as Arc<dyn SearchEngine>;
    let store = EntityStore::new(shared, &config, DIMENSION);
    store
        .create_index(Readiness::default(), &CancellationToken::new())
        .await
        .expect("should create index");
    store
}

#[test]
fn index_definition_covers_prefix() {
    let engine: Arc<dyn SearchEngine> = Arc::new(MemoryEngine::new());
    let store: EntityStore<Note> =
        EntityStore::new(engine, &StoreConfig::new("idx:notes", "doc:notes"), DIMENSION);

    let definition = store.index_definition();
    assert_eq!(definition.name, "idx:notes");
    assert_eq!(definition.prefixes, vec!["doc:notes:".to_string()]);
    assert_eq!(store.key_for("abc"), "doc:notes:abc");
    assert_eq!(store.dimension(), DIMENSION);
}

#[tokio::test]
async fn put_writes_document_and_vector() {
    let engine = Arc::new(MemoryEngine::new());
    let store = store_with(&engine, 10).await;
    let embedder = FnEmbedder::new(axis_embedding);

    let key = store
        .put(&note("alpha", 3), &embedder)
        .await
        .expect("should write");

    assert_eq!(key, "doc:notes:alpha");
    assert_eq!(
        engine.document(&key),
        Some(serde_json::json!({"name": "alpha", "rank": 3, "name_vec": [1.0, 0.0, 0.0]}))
    );
}

#[tokio::test]
async fn embedding_failure_writes_nothing() {
    let engine = Arc::new(MemoryEngine::new());
    let store = store_with(&engine, 10).await;
    let failing =
        FnEmbedder::new(|_: &str| Err(RagError::Embedding("provider down".to_string())));

    let result = store.put(&note("alpha", 1), &failing).await;

    assert!(matches!(result, Err(RagError::Embedding(_))));
    assert_eq!(engine.command_log(), vec!["FT.CREATE", "FT.INFO"]);
    assert!(engine.keys().is_empty());
}

#[tokio::test]
async fn invalid_vectors_write_nothing() {
    let engine = Arc::new(MemoryEngine::new());
    let store = store_with(&engine, 10).await;

    let short = FnEmbedder::new(|_: &str| Ok(vec![1.0, 0.0]));
    let result = store.put(&note("alpha", 1), &short).await;
    assert!(matches!(result, Err(RagError::Embedding(_))));

    let not_finite = FnEmbedder::new(|_: &str| Ok(vec![1.0, f64::NAN, 0.0]));
    let result = store.put(&note("alpha", 1), &not_finite).await;
    assert!(matches!(result, Err(RagError::Embedding(_))));

    assert!(!engine.command_log().contains(&"JSON.SET".to_string()));
}

#[tokio::test]
async fn list_pages_through_every_match() {
    let engine = Arc::new(MemoryEngine::new());
    let store = store_with(&engine, 2).await;
    let embedder = FnEmbedder::new(axis_embedding);

    for (name, rank) in [("e", 5), ("c", 3), ("a", 1), ("d", 4), ("b", 2)] {
        store
            .put(&note(name, rank), &embedder)
            .await
            .expect("should write");
    }

    let listed = store
        .list(Filter::at_least("rank", 2), Some("rank"))
        .await
        .expect("should list");

    let ranks: Vec<i64> = listed.iter().map(|n| n.rank).collect();
    assert_eq!(ranks, vec![2, 3, 4, 5]);

    let searches = engine
        .command_log()
        .iter()
        .filter(|c| *c == "FT.SEARCH")
        .count();
    assert_eq!(searches, 2);
}

#[tokio::test]
async fn list_without_matches_is_empty() {
    let engine = Arc::new(MemoryEngine::new());
    let store = store_with(&engine, 10).await;

    let listed = store
        .list(Filter::text("name", "nobody"), None)
        .await
        .expect("should list");

    assert!(listed.is_empty());
}

#[tokio::test]
async fn nearest_orders_by_distance() {
    let engine = Arc::new(MemoryEngine::new());
    let store = store_with(&engine, 10).await;
    let embedder = FnEmbedder::new(axis_embedding);

    for name in ["apple", "banana", "cherry"] {
        store
            .put(&note(name, 0), &embedder)
            .await
            .expect("should write");
    }

    let hits = store
        .nearest(Filter::All, "bread", 2, &embedder)
        .await
        .expect("should search");

    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].name, "banana");
}

#[tokio::test]
async fn nearest_propagates_engine_errors() {
    let engine = Arc::new(MemoryEngine::new());
    let store = store_with(&engine, 10).await;
    engine.fail_command("FT.SEARCH");

    let result = store
        .nearest(Filter::All, "apple", 1, &FnEmbedder::new(axis_embedding))
        .await;

    assert!(matches!(result, Err(RagError::Engine(message)) if message.contains("FT.SEARCH")));
}

#[tokio::test]
async fn delete_matching_counts_removed_keys() {
    let engine = Arc::new(MemoryEngine::new());
    let store = store_with(&engine, 10).await;
    let embedder = FnEmbedder::new(axis_embedding);

    for name in ["a1", "a2", "b1"] {
        store
            .put(&note(name, 0), &embedder)
            .await
            .expect("should write");
    }

    let deleted = store
        .delete_matching("doc:notes:a*")
        .await
        .expect("should delete");
    assert_eq!(deleted, 2);
    assert_eq!(engine.keys(), vec!["doc:notes:b1".to_string()]);

    let deleted = store
        .delete_matching("doc:notes:zzz*")
        .await
        .expect("should be a no-op");
    assert_eq!(deleted, 0);
    assert_eq!(
        engine.command_log().last().map(String::as_str),
        Some("SCAN")
    );
}

#[tokio::test]
async fn delete_outside_prefix_is_rejected() {
    let engine = Arc::new(MemoryEngine::new());
    let store = store_with(&engine, 10).await;

    let result = store.delete_matching("doc:other:*").await;

    assert!(matches!(result, Err(RagError::Config(_))));
}

#[test]
fn glob_escaping() {
    assert_eq!(escape_glob("plain-id"), "plain-id");
    assert_eq!(escape_glob("a*b?c[d]e\\"), "a\\*b\\?c\\[d\\]e\\\\");
}
