// Entity stores
// Chat history, LLM answer cache and document retriever over one generic store

pub mod chat_history;
pub mod entity;
pub mod llm_cache;
pub mod record;
pub mod retriever;

#[cfg(test)]
mod testing;

pub use chat_history::ChatHistory;
pub use chat_history::ChatMessage;
pub use entity::EntityStore;
pub use llm_cache::{LlmCache, QueryAnswer};
pub use record::{FieldMapping, Record};
pub use retriever::{Document, Retriever};
