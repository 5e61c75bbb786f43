use super::*;
use crate::codec::encode_vector;
use crate::database::query::{Filter, Query};

fn bulk(s: &str) -> Value {
    Value::BulkString(s.as_bytes().to_vec())
}

#[test]
fn parse_search_reply_with_documents() {
    let reply = Value::Array(vec![
        Value::Int(2),
        bulk("doc:chat:u1:s1:1"),
        Value::Array(vec![bulk("user_id"), bulk("u1"), bulk("timestamp"), bulk("1")]),
        bulk("doc:chat:u1:s1:2"),
        Value::Array(vec![bulk("user_id"), bulk("u1"), bulk("timestamp"), bulk("2")]),
    ]);

    let response = parse_search_reply(reply).expect("should parse reply");
    assert_eq!(response.total, 2);
    assert_eq!(response.docs.len(), 2);
    assert_eq!(response.docs[0].key, "doc:chat:u1:s1:1");
    assert_eq!(response.docs[1].fields.get("timestamp").map(String::as_str), Some("2"));
}

#[test]
fn parse_empty_search_reply() {
    let response = parse_search_reply(Value::Array(vec![Value::Int(0)])).expect("should parse");
    assert_eq!(response.total, 0);
    assert!(response.docs.is_empty());
}

#[test]
fn parse_search_reply_rejects_garbage() {
    assert!(parse_search_reply(Value::Nil).is_err());
    assert!(parse_search_reply(Value::Array(Vec::new())).is_err());
}

#[test]
fn parse_search_reply_resp3_map() {
    let result = |key: &str, timestamp: &str| {
        Value::Map(vec![
            (bulk("id"), bulk(key)),
            (
                bulk("extra_attributes"),
                Value::Map(vec![
                    (bulk("user_id"), bulk("u1")),
                    (bulk("timestamp"), bulk(timestamp)),
                ]),
            ),
            (bulk("values"), Value::Array(Vec::new())),
        ])
    };
    let reply = Value::Map(vec![
        (bulk("attributes"), Value::Array(Vec::new())),
        (bulk("format"), Value::SimpleString("STRING".to_string())),
        (
            bulk("results"),
            Value::Array(vec![result("doc:chat:u1:s1:1", "1"), result("doc:chat:u1:s1:2", "2")]),
        ),
        (bulk("total_results"), Value::Int(2)),
        (bulk("warning"), Value::Array(Vec::new())),
    ]);

    let response = parse_search_reply(reply).expect("should parse reply");
    assert_eq!(response.total, 2);
    assert_eq!(response.docs.len(), 2);
    assert_eq!(response.docs[0].key, "doc:chat:u1:s1:1");
    assert_eq!(response.docs[0].fields.get("user_id").map(String::as_str), Some("u1"));
    assert_eq!(response.docs[1].fields.get("timestamp").map(String::as_str), Some("2"));
}

#[test]
fn parse_search_reply_resp3_requires_total() {
    let reply = Value::Map(vec![(bulk("results"), Value::Array(Vec::new()))]);
    assert!(parse_search_reply(reply).is_err());
}

#[test]
fn parse_index_status_resp2() {
    let reply = Value::Array(vec![
        bulk("index_name"),
        bulk("idx"),
        bulk("num_docs"),
        bulk("42"),
        bulk("indexing"),
        Value::Int(1),
        bulk("percent_indexed"),
        bulk("0.5"),
    ]);

    let status = parse_index_status(reply).expect("should parse status");
    assert!(status.indexing);
    assert_eq!(status.num_docs, 42);
    assert!((status.percent_indexed - 0.5).abs() < f64::EPSILON);
}

#[test]
fn parse_index_status_resp3_map() {
    let reply = Value::Map(vec![
        (Value::SimpleString("indexing".to_string()), Value::Double(0.0)),
        (Value::SimpleString("num_docs".to_string()), Value::Int(3)),
    ]);

    let status = parse_index_status(reply).expect("should parse status");
    assert!(!status.indexing);
    assert_eq!(status.num_docs, 3);
}

#[test]
fn parse_index_status_requires_indexing_flag() {
    let reply = Value::Array(vec![bulk("num_docs"), bulk("1")]);
    assert!(parse_index_status(reply).is_err());
}

#[test]
fn search_command_carries_binary_vector() {
    let blob = encode_vector(&[1.0, 2.0]);
    let request = SearchRequest::new(
        Query::nearest(Filter::tags("tag", "news"), 1, "content_vec"),
        vec!["id"],
    )
    .with_vector(blob.clone())
    .page(0, 1);

    let packed = search_command("idx:docs", &request).get_packed_command();
    let contains = |needle: &[u8]| packed.windows(needle.len()).any(|w| w == needle);

    assert!(contains(b"FT.SEARCH"));
    assert!(contains(b"(@tag:{news})=>[KNN 1 @content_vec $vec AS score]"));
    assert!(contains(b"PARAMS"));
    assert!(contains(&blob));
    assert!(contains(b"DIALECT"));
}
