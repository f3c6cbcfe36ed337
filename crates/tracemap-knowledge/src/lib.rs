pub mod json_store;
pub mod store;

pub use json_store::JsonKnowledgeStore;
pub use store::{KnowledgeStore, StoreError, StoreResult};
