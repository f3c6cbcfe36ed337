use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;
use tracemap_core::{FunctionExplanation, TraceId, TraceRecord, TraceSummary};

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Knowledge file {path} is corrupt: {reason}")]
    Corrupt { path: String, reason: String },
}

impl From<StoreError> for tracemap_core::TraceMapError {
    fn from(err: StoreError) -> Self {
        tracemap_core::TraceMapError::Store(err.to_string())
    }
}

/// Everything learned about a project across recording sessions.
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// The cached project overview, `None` while it was never generated
    async fn project_overview(&self) -> StoreResult<Option<String>>;

    async fn save_project_overview(&self, overview: &str) -> StoreResult<()>;

    /// A stored trace whose call order equals `functions` exactly
    async fn find_matching_trace(&self, functions: &[String])
        -> StoreResult<Option<TraceRecord>>;

    async fn add_trace(
        &self,
        functions: &[String],
        explanations: &HashMap<String, String>,
    ) -> StoreResult<TraceId>;

    /// Merge entries into the cumulative function index, later entries win
    async fn save_function_explanations(&self, entries: &[FunctionExplanation])
        -> StoreResult<()>;

    /// Newest first
    async fn list_traces(&self) -> StoreResult<Vec<TraceSummary>>;

    async fn get_trace(&self, id: TraceId) -> StoreResult<Option<TraceRecord>>;

    async fn function_explanation(&self, function_name: &str) -> StoreResult<Option<String>>;
}
