// Typed RediSearch queries
// Filters are built as values and rendered to the dialect 2 query syntax

#[cfg(test)]
mod tests;

use std::fmt;

/// Name of the query parameter carrying the encoded vector
pub const VECTOR_PARAM: &str = "vec";
/// Alias the KNN operator assigns to the distance of each hit
pub const SCORE_FIELD: &str = "score";
/// Query dialect required by the KNN syntax
pub const DIALECT: u8 = 2;

/// Boolean pre-filter over indexed fields
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Matches every document (`*`)
    All,
    /// Text field containing the exact phrase `value`
    Text { field: String, value: String },
    /// Numeric field inside `[min, max]`; a missing `max` is unbounded
    Range {
        field: String,
        min: i64,
        max: Option<i64>,
    },
    /// Tag field holding at least one of `tags`
    AnyTag { field: String, tags: Vec<String> },
    /// Intersection of all inner filters
    And(Vec<Filter>),
}

impl Filter {
    #[inline]
    pub fn text(field: &str, value: &str) -> Self {
        Self::Text {
            field: field.to_string(),
            value: value.to_string(),
        }
    }

    #[inline]
    pub fn at_least(field: &str, min: i64) -> Self {
        Self::Range {
            field: field.to_string(),
            min,
            max: None,
        }
    }

    /// Tag membership from comma separated input. Empty input matches everything.
    #[inline]
    pub fn tags(field: &str, input: &str) -> Self {
        let tags = parse_tags(input);
        if tags.is_empty() {
            Self::All
        } else {
            Self::AnyTag {
                field: field.to_string(),
                tags,
            }
        }
    }

    #[inline]
    #[must_use]
    pub fn and(self, other: Filter) -> Self {
        match self {
            Self::And(mut filters) => {
                filters.push(other);
                Self::And(filters)
            }
            first => Self::And(vec![first, other]),
        }
    }

    fn is_all(&self) -> bool {
        match self {
            Self::All => true,
            Self::And(filters) => filters.iter().all(Filter::is_all),
            _ => false,
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            _ if self.is_all() => f.write_str("*"),
            Self::Text { field, value } => write!(f, "@{}:\"{}\"", field, escape_phrase(value)),
            Self::Range { field, min, max } => match max {
                Some(max) => write!(f, "@{}:[{} {}]", field, min, max),
                None => write!(f, "@{}:[{} inf]", field, min),
            },
            Self::AnyTag { field, tags } => {
                let escaped: Vec<String> = tags.iter().map(|t| escape_tag(t)).collect();
                write!(f, "@{}:{{{}}}", field, escaped.join("|"))
            }
            Self::And(filters) => {
                let mut first = true;
                for filter in filters.iter().filter(|inner| !inner.is_all()) {
                    if !first {
                        f.write_str(" ")?;
                    }
                    write!(f, "{}", filter)?;
                    first = false;
                }
                Ok(())
            }
            Self::All => f.write_str("*"),
        }
    }
}

/// K-nearest-neighbour operator applied after the pre-filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Knn {
    pub k: usize,
    pub field: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub filter: Filter,
    pub knn: Option<Knn>,
}

impl Query {
    #[inline]
    pub fn filter(filter: Filter) -> Self {
        Self { filter, knn: None }
    }

    #[inline]
    pub fn nearest(filter: Filter, k: usize, field: &str) -> Self {
        Self {
            filter,
            knn: Some(Knn {
                k,
                field: field.to_string(),
            }),
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.knn {
            Some(knn) => write!(
                f,
                "({})=>[KNN {} @{} ${} AS {}]",
                self.filter, knn.k, knn.field, VECTOR_PARAM, SCORE_FIELD
            ),
            None => write!(f, "{}", self.filter),
        }
    }
}

/// Split comma separated tags, trimming blanks
#[inline]
pub fn parse_tags(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect()
}

/// Escape a tag value for use inside `{...}`
#[inline]
pub fn escape_tag(tag: &str) -> String {
    let mut escaped = String::with_capacity(tag.len());
    for c in tag.chars() {
        if c.is_ascii_punctuation() || c.is_whitespace() {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Escape a value for use inside a quoted phrase
#[inline]
pub fn escape_phrase(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if c == '"' || c == '\\' {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
