// Database module
// Redis Stack access: index schemas, typed queries and the engine implementations

pub mod engine;
pub mod index;
pub mod memory;
pub mod query;
pub mod redis;
pub mod schema;

pub use engine::{
    IndexStatus, JsonWrite, SearchDocument, SearchEngine, SearchRequest, SearchResponse,
};
pub use index::{Readiness, create_index, drop_index, wait_until_ready};
pub use memory::MemoryEngine;
pub use query::{Filter, Query};
pub use self::redis::RedisEngine;
pub use schema::{DistanceMetric, FieldSchema, FieldType, IndexDefinition, IndexSchema, VectorParams};
