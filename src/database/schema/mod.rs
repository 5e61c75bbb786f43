// Index schema description
// Field specs are plain values handed to the index builder


use serde::{Deserialize, Serialize};

/// Default embedding dimension for all stores
pub const DEFAULT_VECTOR_DIMENSION: usize = 1024;

/// Element type of stored vectors. Only `FLOAT64` is written by this crate.
pub const VECTOR_ELEMENT_TYPE: &str = "FLOAT64";

/// Distance metric used by a vector field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    #[default]
    Cosine,
    L2,
    InnerProduct,
}

impl DistanceMetric {
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cosine => "COSINE",
            Self::L2 => "L2",
            Self::InnerProduct => "IP",
        }
    }
}

/// Parameters of a FLAT vector index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VectorParams {
    pub dimension: usize,
    pub metric: DistanceMetric,
}

impl VectorParams {
    #[inline]
    pub fn cosine(dimension: usize) -> Self {
        Self {
            dimension,
            metric: DistanceMetric::Cosine,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    Text { no_stem: bool, no_index: bool },
    Tag { separator: char },
    Numeric { sortable: bool },
    Vector(VectorParams),
}

/// One field of an index schema: JSON path, exposed alias and type options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSchema {
    pub path: String,
    pub alias: String,
    pub field_type: FieldType,
}

impl FieldSchema {
    fn new(alias: &str, field_type: FieldType) -> Self {
        Self {
            path: format!("$.{}", alias),
            alias: alias.to_string(),
            field_type,
        }
    }

    #[inline]
    pub fn text(alias: &str) -> Self {
        Self::new(
            alias,
            FieldType::Text {
                no_stem: false,
                no_index: false,
            },
        )
    }

    #[inline]
    pub fn tag(alias: &str, separator: char) -> Self {
        Self::new(alias, FieldType::Tag { separator })
    }

    #[inline]
    pub fn numeric(alias: &str) -> Self {
        Self::new(alias, FieldType::Numeric { sortable: false })
    }

    #[inline]
    pub fn vector(alias: &str, params: VectorParams) -> Self {
        Self::new(alias, FieldType::Vector(params))
    }

    /// Disable stemming on a text field
    #[inline]
    #[must_use]
    pub fn no_stem(mut self) -> Self {
        if let FieldType::Text { no_stem, .. } = &mut self.field_type {
            *no_stem = true;
        }
        self
    }

    /// Store a text field without indexing it
    #[inline]
    #[must_use]
    pub fn no_index(mut self) -> Self {
        if let FieldType::Text { no_index, .. } = &mut self.field_type {
            *no_index = true;
        }
        self
    }

    #[inline]
    #[must_use]
    pub fn sortable(mut self) -> Self {
        if let FieldType::Numeric { sortable } = &mut self.field_type {
            *sortable = true;
        }
        self
    }

    /// Arguments describing this field inside `FT.CREATE ... SCHEMA`
    #[inline]
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![self.path.clone(), "AS".to_string(), self.alias.clone()];
        match &self.field_type {
            FieldType::Text { no_stem, no_index } => {
                args.push("TEXT".to_string());
                if *no_stem {
                    args.push("NOSTEM".to_string());
                }
                if *no_index {
                    args.push("NOINDEX".to_string());
                }
            }
            FieldType::Tag { separator } => {
                args.push("TAG".to_string());
                args.push("SEPARATOR".to_string());
                args.push(separator.to_string());
            }
            FieldType::Numeric { sortable } => {
                args.push("NUMERIC".to_string());
                if *sortable {
                    args.push("SORTABLE".to_string());
                }
            }
            FieldType::Vector(params) => {
                let dimension = params.dimension.to_string();
                args.extend(
                    [
                        "VECTOR",
                        "FLAT",
                        "6",
                        "TYPE",
                        VECTOR_ELEMENT_TYPE,
                        "DIM",
                        dimension.as_str(),
                        "DISTANCE_METRIC",
                        params.metric.as_str(),
                    ]
                    .map(String::from),
                );
            }
        }
        args
    }
}

/// Ordered set of field specs
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IndexSchema {
    fields: Vec<FieldSchema>,
}

impl IndexSchema {
    #[inline]
    pub fn new(fields: Vec<FieldSchema>) -> Self {
        Self { fields }
    }

    #[inline]
    pub fn fields(&self) -> &[FieldSchema] {
        &self.fields
    }

    /// Look a field up by alias
    #[inline]
    pub fn field(&self, alias: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.alias == alias)
    }

    /// The first vector field, with its parameters
    #[inline]
    pub fn vector_field(&self) -> Option<(&FieldSchema, VectorParams)> {
        self.fields.iter().find_map(|f| match f.field_type {
            FieldType::Vector(params) => Some((f, params)),
            _ => None,
        })
    }
}

/// Everything needed to create an index over JSON documents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDefinition {
    pub name: String,
    pub prefixes: Vec<String>,
    pub schema: IndexSchema,
}

impl IndexDefinition {
    #[inline]
    pub fn new(name: impl Into<String>, prefixes: Vec<String>, schema: IndexSchema) -> Self {
        Self {
            name: name.into(),
            prefixes,
            schema,
        }
    }

    /// Arguments following the `FT.CREATE` command name
    #[inline]
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            self.name.clone(),
            "ON".to_string(),
            "JSON".to_string(),
            "PREFIX".to_string(),
            self.prefixes.len().to_string(),
        ];
        args.extend(self.prefixes.iter().cloned());
        args.push("SCHEMA".to_string());
        for field in self.schema.fields() {
            args.extend(field.to_args());
        }
        args
    }
}
