use crate::llm_provider::{LLMProvider, LLMResult};
use crate::openai_compatible_provider::{OpenAICompatibleConfig, OpenAICompatibleProvider};
use crate::prompts;
use crate::request_queue::{QueueConfig, QueueStats, RequestQueue};
use serde_json::Value;
use std::sync::Arc;
use tracemap_core::AiConfig;
use tracing::{debug, info};

/// Project-level AI operations, all funnelled through one [`RequestQueue`].
#[derive(Clone)]
pub struct AiService {
    queue: RequestQueue,
    provider_name: String,
    model_name: String,
}

impl AiService {
    pub fn new(provider: Arc<dyn LLMProvider>, config: QueueConfig) -> Self {
        let provider_name = provider.provider_name().to_string();
        let model_name = provider.model_name().to_string();
        Self {
            queue: RequestQueue::new(provider, config),
            provider_name,
            model_name,
        }
    }

    /// Build the HTTP-backed service described by `config`
    pub fn from_config(config: &AiConfig) -> LLMResult<Self> {
        let provider = OpenAICompatibleProvider::new(OpenAICompatibleConfig::from(config))?;
        info!(
            "AI service using model {} at {}",
            config.model, config.api_url
        );
        Ok(Self::new(Arc::new(provider), QueueConfig::from(config)))
    }

    pub async fn generate_project_overview(
        &self,
        structure: &Value,
        dependencies: &Value,
    ) -> LLMResult<String> {
        debug!("Requesting project overview");
        self.queue
            .submit(prompts::project_overview_prompt(structure, dependencies))
            .await
    }

    pub async fn explain_function(
        &self,
        code: &str,
        function_name: &str,
        project_overview: &str,
        trace_context: &str,
    ) -> LLMResult<String> {
        debug!("Requesting explanation for {}", function_name);
        self.queue
            .submit(prompts::explain_function_prompt(
                code,
                function_name,
                project_overview,
                trace_context,
            ))
            .await
    }

    /// Submit a raw prompt
    pub async fn submit(&self, prompt: impl Into<String>) -> LLMResult<String> {
        self.queue.submit(prompt).await
    }

    pub fn queue(&self) -> &RequestQueue {
        &self.queue
    }

    pub fn stats(&self) -> QueueStats {
        self.queue.stats()
    }

    pub fn provider_name(&self) -> &str {
        &self.provider_name
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }
}
