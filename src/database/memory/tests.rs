use serde_json::json;

use super::*;
use crate::codec::encode_vector;
use crate::database::query::Query;
use crate::database::schema::{FieldSchema, VectorParams};

fn test_definition() -> IndexDefinition {
    IndexDefinition::new(
        "idx:test",
        vec!["doc:test".to_string()],
        IndexSchema::new(vec![
            FieldSchema::text("name").no_stem(),
            FieldSchema::tag("tag", ','),
            FieldSchema::numeric("rank").sortable(),
            FieldSchema::text("note").no_index(),
            FieldSchema::vector("vec", VectorParams::cosine(2)),
        ]),
    )
}

async fn seeded_engine() -> MemoryEngine {
    let engine = MemoryEngine::new();
    engine
        .create_index(&test_definition())
        .await
        .expect("should create index");

    let rows = [
        ("doc:test:1", "alpha one", "red,blue", 3, [1.0, 0.0]),
        ("doc:test:2", "beta two", "green", 1, [0.0, 1.0]),
        ("doc:test:3", "gamma three", "blue", 2, [0.7, 0.7]),
    ];
    let mut writes = Vec::new();
    for (key, name, tag, rank, vec) in rows {
        writes.push(JsonWrite::new(
            key,
            "$",
            json!({"name": name, "tag": tag, "rank": rank, "note": "n"}),
        ));
        writes.push(JsonWrite::new(key, "$.vec", json!(vec)));
    }
    // outside the index prefix
    writes.push(JsonWrite::new("other:1", "$", json!({"name": "alpha one"})));
    engine.write_batch(&writes).await.expect("should write seed data");
    engine
}

fn keys(response: &SearchResponse) -> Vec<&str> {
    response.docs.iter().map(|d| d.key.as_str()).collect()
}

#[test]
fn glob_patterns() {
    let m = |p: &str, t: &str| {
        glob_match(
            &p.chars().collect::<Vec<_>>(),
            &t.chars().collect::<Vec<_>>(),
        )
    };
    assert!(m("chat:u1:*", "chat:u1:s1:10"));
    assert!(!m("chat:u1:*", "chat:u10:s1:10"));
    assert!(m("chat:*:s1:*", "chat:u1:s1:10"));
    assert!(!m("chat:*:s1:*", "chat:u1:s10:10"));
    assert!(m("a?c", "abc"));
    assert!(m("a\\*c", "a*c"));
    assert!(!m("a\\*c", "abc"));
    assert!(m("*", ""));
}

#[tokio::test]
async fn duplicate_index_is_rejected() {
    let engine = MemoryEngine::new();
    engine
        .create_index(&test_definition())
        .await
        .expect("should create index");
    let err = engine
        .create_index(&test_definition())
        .await
        .expect_err("duplicate should fail");
    assert!(err.to_string().contains("already exists"));
}

#[tokio::test]
async fn write_batch_is_all_or_nothing() {
    let engine = MemoryEngine::new();
    let writes = vec![
        JsonWrite::new("doc:test:ok", "$", json!({"name": "x"})),
        JsonWrite::new("doc:test:missing", "$.vec", json!([1.0, 2.0])),
    ];
    assert!(engine.write_batch(&writes).await.is_err());
    assert!(engine.document("doc:test:ok").is_none());
}

#[tokio::test]
async fn field_write_extends_root_document() {
    let engine = MemoryEngine::new();
    let writes = vec![
        JsonWrite::new("k", "$", json!({"name": "x"})),
        JsonWrite::new("k", "$.vec", json!([1.0])),
    ];
    engine.write_batch(&writes).await.expect("should write");
    assert_eq!(
        engine.document("k"),
        Some(json!({"name": "x", "vec": [1.0]}))
    );
}

#[tokio::test]
async fn text_range_and_tag_filters() {
    let engine = seeded_engine().await;

    let request = SearchRequest::new(Query::filter(Filter::text("name", "alpha")), vec![]);
    let response = engine.search("idx:test", &request).await.expect("search");
    assert_eq!(keys(&response), vec!["doc:test:1"]);

    let request = SearchRequest::new(Query::filter(Filter::at_least("rank", 2)), vec![])
        .sorted_by("rank", true);
    let response = engine.search("idx:test", &request).await.expect("search");
    assert_eq!(keys(&response), vec!["doc:test:3", "doc:test:1"]);

    let request = SearchRequest::new(Query::filter(Filter::tags("tag", "BLUE,green")), vec![])
        .sorted_by("rank", false);
    let response = engine.search("idx:test", &request).await.expect("search");
    assert_eq!(keys(&response), vec!["doc:test:1", "doc:test:3", "doc:test:2"]);
}

#[tokio::test]
async fn unindexed_text_is_not_searchable() {
    let engine = seeded_engine().await;
    let request = SearchRequest::new(Query::filter(Filter::text("note", "n")), vec![]);
    let response = engine.search("idx:test", &request).await.expect("search");
    assert_eq!(response.total, 0);
}

#[tokio::test]
async fn knn_ranks_by_cosine_distance() {
    let engine = seeded_engine().await;
    let request = SearchRequest::new(Query::nearest(Filter::All, 2, "vec"), vec!["name"])
        .with_vector(encode_vector(&[1.0, 0.1]))
        .page(0, 2);

    let response = engine.search("idx:test", &request).await.expect("search");
    assert_eq!(response.total, 2);
    assert_eq!(keys(&response), vec!["doc:test:1", "doc:test:3"]);

    let first = &response.docs[0].fields;
    assert_eq!(first.get("name").map(String::as_str), Some("alpha one"));
    let score: f64 = first
        .get("score")
        .and_then(|s| s.parse().ok())
        .expect("score should be returned");
    assert!(score < 0.01);
    assert!(!first.contains_key("tag"));
}

#[tokio::test]
async fn knn_respects_prefilter() {
    let engine = seeded_engine().await;
    let request = SearchRequest::new(Query::nearest(Filter::tags("tag", "green"), 5, "vec"), vec![])
        .with_vector(encode_vector(&[1.0, 0.0]));

    let response = engine.search("idx:test", &request).await.expect("search");
    assert_eq!(keys(&response), vec!["doc:test:2"]);
}

#[tokio::test]
async fn knn_without_vector_parameter_fails() {
    let engine = seeded_engine().await;
    let request = SearchRequest::new(Query::nearest(Filter::All, 1, "vec"), vec![]);
    assert!(engine.search("idx:test", &request).await.is_err());
}

#[tokio::test]
async fn paging_reports_full_total() {
    let engine = seeded_engine().await;
    let request = SearchRequest::new(Query::filter(Filter::All), vec![])
        .sorted_by("rank", true)
        .page(1, 1);
    let response = engine.search("idx:test", &request).await.expect("search");
    assert_eq!(response.total, 3);
    assert_eq!(keys(&response), vec!["doc:test:3"]);
}

#[tokio::test]
async fn indexing_polls_count_down() {
    let engine = MemoryEngine::new().with_indexing_polls(2);
    engine
        .create_index(&test_definition())
        .await
        .expect("should create index");

    assert!(engine.index_status("idx:test").await.expect("status").indexing);
    assert!(engine.index_status("idx:test").await.expect("status").indexing);
    assert!(!engine.index_status("idx:test").await.expect("status").indexing);
    assert!(engine.index_status("idx:missing").await.is_err());
}

#[tokio::test]
async fn drop_index_with_documents() {
    let engine = seeded_engine().await;
    engine
        .drop_index("idx:test", true)
        .await
        .expect("should drop index");
    assert_eq!(engine.keys(), vec!["other:1"]);
    assert!(engine.drop_index("idx:test", false).await.is_err());
}

#[tokio::test]
async fn scan_and_delete() {
    let engine = seeded_engine().await;
    let keys = engine.scan_keys("doc:test:*").await.expect("scan");
    assert_eq!(keys.len(), 3);

    let removed = engine.delete_keys(&keys).await.expect("delete");
    assert_eq!(removed, 3);
    assert_eq!(engine.delete_keys(&keys).await.expect("delete"), 0);
}

#[tokio::test]
async fn injected_failures_and_command_log() {
    let engine = seeded_engine().await;
    engine.fail_command("FT.SEARCH");

    let request = SearchRequest::new(Query::filter(Filter::All), vec![]);
    let err = engine
        .search("idx:test", &request)
        .await
        .expect_err("search should fail");
    assert!(matches!(err, RagError::Engine(_)));
    assert_eq!(
        engine.command_log(),
        vec!["FT.CREATE", "JSON.SET", "FT.SEARCH"]
    );
}
