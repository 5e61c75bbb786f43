use super::*;

#[test]
fn text_filter_renders_quoted_phrase() {
    assert_eq!(Filter::text("user_id", "alice").to_string(), "@user_id:\"alice\"");
    assert_eq!(
        Filter::text("query", "say \"hi\"").to_string(),
        "@query:\"say \\\"hi\\\"\""
    );
}

#[test]
fn range_filter() {
    assert_eq!(
        Filter::at_least("timestamp", 1_700_000_000_000).to_string(),
        "@timestamp:[1700000000000 inf]"
    );
    let bounded = Filter::Range {
        field: "n".to_string(),
        min: -5,
        max: Some(10),
    };
    assert_eq!(bounded.to_string(), "@n:[-5 10]");
}

#[test]
fn tag_filter_joins_alternatives() {
    assert_eq!(Filter::tags("tag", "news").to_string(), "@tag:{news}");
    assert_eq!(
        Filter::tags("tag", "news, sports,,weather ").to_string(),
        "@tag:{news|sports|weather}"
    );
}

#[test]
fn empty_tag_input_matches_everything() {
    assert_eq!(Filter::tags("tag", ""), Filter::All);
    assert_eq!(Filter::tags("tag", " , ").to_string(), "*");
}

#[test]
fn tag_values_are_escaped() {
    assert_eq!(escape_tag("c++ lang"), "c\\+\\+\\ lang");
    assert_eq!(escape_tag("plain_tag"), "plain_tag");
    assert_eq!(escape_tag("新闻"), "新闻");
}

#[test]
fn conjunction_skips_match_all_terms() {
    let filter = Filter::text("user_id", "u1").and(Filter::at_least("timestamp", 5));
    assert_eq!(filter.to_string(), "@user_id:\"u1\" @timestamp:[5 inf]");

    let filter = Filter::All.and(Filter::tags("tag", "a"));
    assert_eq!(filter.to_string(), "@tag:{a}");

    assert_eq!(Filter::All.and(Filter::All).to_string(), "*");
}

#[test]
fn knn_query_rendering() {
    let query = Query::nearest(Filter::tags("tag", "a,b"), 3, "content_vec");
    assert_eq!(
        query.to_string(),
        "(@tag:{a|b})=>[KNN 3 @content_vec $vec AS score]"
    );

    let query = Query::nearest(Filter::All, 1, "query_vec");
    assert_eq!(query.to_string(), "(*)=>[KNN 1 @query_vec $vec AS score]");
}

#[test]
fn plain_query_rendering() {
    let query = Query::filter(Filter::text("session_id", "s1"));
    assert_eq!(query.to_string(), "@session_id:\"s1\"");
}

#[test]
fn parse_tags_trims_and_drops_empty() {
    assert_eq!(parse_tags(" a ,b,, c"), vec!["a", "b", "c"]);
    assert!(parse_tags("").is_empty());
}
