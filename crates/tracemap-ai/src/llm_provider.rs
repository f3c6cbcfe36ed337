use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type for LLM operations
pub type LLMResult<T> = Result<T, LLMError>;

#[derive(Debug, Clone, Error)]
pub enum LLMError {
    /// The endpoint answered with a non-success status
    #[error("API error ({status}): {body}")]
    Http { status: u16, body: String },

    /// The request never produced an HTTP response
    #[error("Transport error: {0}")]
    Transport(String),

    /// The response body did not have the expected shape
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The queue worker went away before answering
    #[error("Request queue closed before the request completed")]
    QueueClosed,
}

impl LLMError {
    pub fn status(&self) -> Option<u16> {
        match self {
            LLMError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// HTTP 429 is the only condition worth retrying
    pub fn is_rate_limited(&self) -> bool {
        self.status() == Some(429)
    }
}

impl From<LLMError> for tracemap_core::TraceMapError {
    fn from(err: LLMError) -> Self {
        tracemap_core::TraceMapError::Ai(err.to_string())
    }
}

/// Configuration for generation parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Temperature for sampling (0.0 to 2.0)
    pub temperature: f32,
    /// Maximum tokens to generate
    pub max_tokens: Option<usize>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            max_tokens: None,
        }
    }
}

/// A message in the conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

/// Role of a message in the conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// Response from the LLM
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMResponse {
    /// Generated text content
    pub content: String,
    /// Total tokens used in the request
    pub total_tokens: Option<usize>,
    /// Finish reason (e.g., "stop", "length")
    pub finish_reason: Option<String>,
    /// Model used for generation
    pub model: String,
}

/// Main trait for LLM providers
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Generate a completion for a single prompt
    async fn generate(&self, prompt: &str) -> LLMResult<LLMResponse> {
        self.generate_with_config(prompt, &GenerationConfig::default())
            .await
    }

    /// Generate a completion with custom configuration
    async fn generate_with_config(
        &self,
        prompt: &str,
        config: &GenerationConfig,
    ) -> LLMResult<LLMResponse> {
        let messages = vec![Message {
            role: MessageRole::User,
            content: prompt.to_string(),
        }];
        self.generate_chat(&messages, config).await
    }

    /// Generate a chat completion with message history
    async fn generate_chat(
        &self,
        messages: &[Message],
        config: &GenerationConfig,
    ) -> LLMResult<LLMResponse>;

    /// Get the name of this provider
    fn provider_name(&self) -> &str;

    /// Get the model identifier
    fn model_name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_detection() {
        let limited = LLMError::Http {
            status: 429,
            body: "slow down".into(),
        };
        assert!(limited.is_rate_limited());

        let server = LLMError::Http {
            status: 500,
            body: "boom".into(),
        };
        assert!(!server.is_rate_limited());
        assert_eq!(server.status(), Some(500));

        assert!(!LLMError::Transport("refused".into()).is_rate_limited());
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let msg = Message {
            role: MessageRole::User,
            content: "hi".into(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "user");
    }
}
