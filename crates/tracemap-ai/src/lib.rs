pub mod llm_provider;
pub mod openai_compatible_provider;
pub mod prompts;
pub mod request_queue;
pub mod service;

pub use llm_provider::*;
pub use openai_compatible_provider::{OpenAICompatibleConfig, OpenAICompatibleProvider};
pub use request_queue::{QueueConfig, QueueStats, RequestQueue, RetryPolicy};
pub use service::AiService;
