// ABOUTME: Explain-and-persist pass run once per stopped recording
// ABOUTME: Reuses identical stored traces, caches the project overview, tolerates per-function AI failures

use crate::report::EXPLANATION_FAILED;
use std::collections::HashMap;
use std::sync::Arc;
use tracemap_ai::{prompts, AiService};
use tracemap_core::{FunctionExplanation, TraceId};
use tracemap_knowledge::KnowledgeStore;
use tracemap_locator::SourceLocator;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkflowOutcome {
    pub reused: bool,
    pub trace_id: Option<TraceId>,
    pub failed_functions: Vec<String>,
    pub persist_error: Option<String>,
}

pub struct ExplainWorkflow {
    ai: AiService,
    store: Arc<dyn KnowledgeStore>,
    locator: Arc<SourceLocator>,
}

impl ExplainWorkflow {
    pub fn new(ai: AiService, store: Arc<dyn KnowledgeStore>, locator: Arc<SourceLocator>) -> Self {
        Self { ai, store, locator }
    }

    pub fn store(&self) -> &Arc<dyn KnowledgeStore> {
        &self.store
    }

    pub fn ai(&self) -> &AiService {
        &self.ai
    }

    pub async fn run(&self, functions: &[String]) -> WorkflowOutcome {
        match self.store.find_matching_trace(functions).await {
            Ok(Some(existing)) => {
                info!(
                    "Matched stored trace {}, reusing its explanations",
                    existing.id
                );
                return WorkflowOutcome {
                    reused: true,
                    trace_id: Some(existing.id),
                    ..WorkflowOutcome::default()
                };
            }
            Ok(None) => {}
            Err(e) => warn!("Trace lookup failed, explaining from scratch: {}", e),
        }

        let overview = self.ensure_project_overview().await;
        let trace_context = prompts::trace_context(functions);

        let mut explanations = HashMap::with_capacity(functions.len());
        let mut failed_functions = Vec::new();
        for function in functions {
            let code = self
                .locator
                .find_function_code(function)
                .await
                .unwrap_or_default();
            if code.is_empty() {
                debug!("No source for {}, explaining by name only", function);
            }

            let explanation = match self
                .ai
                .explain_function(&code, function, &overview, &trace_context)
                .await
            {
                Ok(text) => text,
                Err(e) => {
                    warn!("Failed to explain {}: {}", function, e);
                    failed_functions.push(function.clone());
                    EXPLANATION_FAILED.to_string()
                }
            };
            explanations.insert(function.clone(), explanation);
        }

        let mut outcome = WorkflowOutcome {
            failed_functions,
            ..WorkflowOutcome::default()
        };

        match self.store.add_trace(functions, &explanations).await {
            Ok(id) => outcome.trace_id = Some(id),
            Err(e) => {
                warn!("Failed to store trace: {}", e);
                outcome.persist_error = Some(e.to_string());
            }
        }

        let entries: Vec<FunctionExplanation> = functions
            .iter()
            .filter_map(|f| {
                explanations.get(f).map(|e| FunctionExplanation {
                    function_name: f.clone(),
                    explanation: e.clone(),
                })
            })
            .collect();
        if let Err(e) = self.store.save_function_explanations(&entries).await {
            warn!("Failed to update function index: {}", e);
            outcome.persist_error.get_or_insert_with(|| e.to_string());
        }

        outcome
    }

    /// Stored overview, generating and caching it on first use.
    /// Empty when generation fails; a failed overview is not cached.
    pub async fn ensure_project_overview(&self) -> String {
        match self.store.project_overview().await {
            Ok(Some(overview)) => return overview,
            Ok(None) => {}
            Err(e) => warn!("Could not read project overview: {}", e),
        }

        if !self.locator.has_workspace() {
            warn!("No workspace folder; project overview will only list dependencies");
        }
        let structure = self.locator.workspace_structure().await;
        let dependencies = self.locator.project_dependencies().await;

        match self
            .ai
            .generate_project_overview(&structure, &dependencies)
            .await
        {
            Ok(overview) => {
                info!("Generated project overview ({} chars)", overview.len());
                if let Err(e) = self.store.save_project_overview(&overview).await {
                    warn!("Failed to cache project overview: {}", e);
                }
                overview
            }
            Err(e) => {
                warn!("Failed to generate project overview: {}", e);
                String::new()
            }
        }
    }
}
