use crate::report::NO_EXPLANATION;
use serde::Serialize;
use std::sync::Arc;
use tracemap_core::{TraceId, TraceRecord, TraceSummary};
use tracemap_knowledge::{KnowledgeStore, StoreResult};

/// A function of a stored trace with the explanation to display for it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExplainedFunction {
    pub function_name: String,
    pub explanation: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TraceDetail {
    pub summary: TraceSummary,
    pub functions: Vec<ExplainedFunction>,
}

/// Read-only access to stored traces
#[derive(Clone)]
pub struct TraceReview {
    store: Arc<dyn KnowledgeStore>,
}

impl TraceReview {
    pub fn new(store: Arc<dyn KnowledgeStore>) -> Self {
        Self { store }
    }

    /// Newest first
    pub async fn list_traces(&self) -> StoreResult<Vec<TraceSummary>> {
        self.store.list_traces().await
    }

    pub async fn get_trace(&self, id: TraceId) -> StoreResult<Option<TraceRecord>> {
        self.store.get_trace(id).await
    }

    pub async fn function_explanation(&self, function_name: &str) -> StoreResult<Option<String>> {
        self.store.function_explanation(function_name).await
    }

    /// The trace's own explanation, else the cumulative index, else a placeholder
    pub async fn explanation_for(
        &self,
        trace: &TraceRecord,
        function_name: &str,
    ) -> StoreResult<String> {
        if let Some(explanation) = trace.explanations.get(function_name) {
            return Ok(explanation.clone());
        }
        Ok(self
            .store
            .function_explanation(function_name)
            .await?
            .unwrap_or_else(|| NO_EXPLANATION.to_string()))
    }

    pub async fn detail(&self, id: TraceId) -> StoreResult<Option<TraceDetail>> {
        let Some(trace) = self.store.get_trace(id).await? else {
            return Ok(None);
        };
        let mut functions = Vec::with_capacity(trace.functions.len());
        for name in &trace.functions {
            functions.push(ExplainedFunction {
                function_name: name.clone(),
                explanation: self.explanation_for(&trace, name).await?,
            });
        }
        Ok(Some(TraceDetail {
            summary: trace.summary(),
            functions,
        }))
    }
}
