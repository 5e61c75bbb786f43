// Record field mappings
// One table per record type drives document building, row mapping and RETURN projection


use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::database::schema::IndexSchema;
use crate::{RagError, Result};

/// How one record field is written to and read back from the engine
pub struct FieldMapping<R> {
    /// JSON property name, also the index alias
    pub name: &'static str,
    pub encode: fn(&R) -> Value,
    pub decode: fn(&mut R, &str) -> Result<()>,
}

/// A record type persisted as one JSON document plus its embedding
pub trait Record: Default + Send + Sync + 'static {
    /// Every stored non-vector field, in document order
    const FIELDS: &'static [FieldMapping<Self>];

    /// JSON property holding the embedding
    const VECTOR_FIELD: &'static str;

    /// Index schema for embeddings of `dimension` elements
    fn schema(dimension: usize) -> IndexSchema;

    /// Text the stored embedding is derived from
    fn embedded_text(&self) -> &str;

    /// Key suffix appended to the store's prefix
    fn key_suffix(&self) -> String;

    /// JSON document without the embedding
    #[inline]
    fn to_document(&self) -> Value {
        let object: Map<String, Value> = Self::FIELDS
            .iter()
            .map(|field| (field.name.to_string(), (field.encode)(self)))
            .collect();
        Value::Object(object)
    }

    /// Build a record from the fields of a search hit. Absent fields keep their default.
    #[inline]
    fn from_fields(fields: &HashMap<String, String>) -> Result<Self> {
        let mut record = Self::default();
        for field in Self::FIELDS {
            if let Some(value) = fields.get(field.name) {
                (field.decode)(&mut record, value)?;
            }
        }
        Ok(record)
    }

    /// Field names to request in `RETURN`
    #[inline]
    fn return_fields() -> Vec<&'static str> {
        Self::FIELDS.iter().map(|field| field.name).collect()
    }
}

#[inline]
pub fn string_value(value: &str) -> Value {
    Value::String(value.to_string())
}

/// Parse a returned integer field
#[inline]
pub fn parse_i64(field: &str, value: &str) -> Result<i64> {
    value
        .trim()
        .parse()
        .map_err(|e| RagError::Decode(format!("Field {} is not an integer ({:?}): {}", field, value, e)))
}
