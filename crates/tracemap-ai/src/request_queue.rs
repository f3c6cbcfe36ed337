// ABOUTME: Single-flight FIFO in front of the LLM endpoint
// ABOUTME: Enforces a minimum gap between requests and retries HTTP 429 with exponential backoff

use crate::llm_provider::{GenerationConfig, LLMError, LLMProvider, LLMResult};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracemap_core::AiConfig;
use tracing::{debug, error, info, warn};

/// Backoff applied to rate-limited requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_backoff: Duration::from_millis(2000),
        }
    }
}

impl RetryPolicy {
    /// Wait before retry number `retry` (0-based): initial * 2^retry
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.initial_backoff
            .saturating_mul(2u32.saturating_pow(retry))
    }
}

#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Gap enforced between the end of one request and the start of the next
    pub min_request_interval: Duration,
    pub retry: RetryPolicy,
    pub generation: GenerationConfig,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            min_request_interval: Duration::from_millis(1000),
            retry: RetryPolicy::default(),
            generation: GenerationConfig::default(),
        }
    }
}

impl From<&AiConfig> for QueueConfig {
    fn from(config: &AiConfig) -> Self {
        Self {
            min_request_interval: Duration::from_millis(config.min_request_interval_ms),
            retry: RetryPolicy {
                max_retries: config.max_retries,
                initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            },
            generation: GenerationConfig {
                temperature: config.temperature,
                max_tokens: None,
            },
        }
    }
}

/// Counters exposed for logging and tests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub submitted: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub rate_limit_retries: u64,
}

struct QueueEntry {
    prompt: Arc<str>,
    responder: oneshot::Sender<LLMResult<String>>,
}

#[derive(Default)]
struct QueueState {
    entries: VecDeque<QueueEntry>,
    worker_running: bool,
    last_request_at: Option<Instant>,
}

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    rate_limit_retries: AtomicU64,
}

struct Shared {
    provider: Arc<dyn LLMProvider>,
    config: QueueConfig,
    state: Mutex<QueueState>,
    counters: Counters,
}

/// FIFO request queue with exactly one request in flight.
///
/// The worker task is spawned lazily on submission and exits once the queue
/// drains. Entries stay at the head of the queue until they resolve, retries
/// included.
#[derive(Clone)]
pub struct RequestQueue {
    shared: Arc<Shared>,
}

impl RequestQueue {
    pub fn new(provider: Arc<dyn LLMProvider>, config: QueueConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                provider,
                config,
                state: Mutex::new(QueueState::default()),
                counters: Counters::default(),
            }),
        }
    }

    /// Queue `prompt` and wait for its trimmed completion text.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn submit(&self, prompt: impl Into<String>) -> LLMResult<String> {
        let prompt: String = prompt.into();
        if prompt.trim().is_empty() {
            return Err(LLMError::InvalidRequest("prompt is empty".to_string()));
        }

        let (tx, rx) = oneshot::channel();
        let spawn_worker = {
            let mut state = self.shared.state.lock();
            state.entries.push_back(QueueEntry {
                prompt: Arc::from(prompt),
                responder: tx,
            });
            debug!("Queued AI request ({} pending)", state.entries.len());
            if state.worker_running {
                false
            } else {
                state.worker_running = true;
                true
            }
        };
        self.shared.counters.submitted.fetch_add(1, Ordering::Relaxed);

        if spawn_worker {
            tokio::spawn(Self::run_worker(Arc::clone(&self.shared)));
        }

        rx.await.map_err(|_| LLMError::QueueClosed)?
    }

    /// Requests waiting or in flight
    pub fn pending(&self) -> usize {
        self.shared.state.lock().entries.len()
    }

    pub fn is_worker_running(&self) -> bool {
        self.shared.state.lock().worker_running
    }

    pub fn stats(&self) -> QueueStats {
        let c = &self.shared.counters;
        QueueStats {
            submitted: c.submitted.load(Ordering::Relaxed),
            succeeded: c.succeeded.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
            rate_limit_retries: c.rate_limit_retries.load(Ordering::Relaxed),
        }
    }

    async fn run_worker(shared: Arc<Shared>) {
        debug!("AI request worker started");
        loop {
            // Peek, do not pop: the head leaves the queue only once it resolves.
            let (prompt, not_before) = {
                let mut state = shared.state.lock();
                match state.entries.front() {
                    Some(entry) => (
                        Arc::clone(&entry.prompt),
                        state
                            .last_request_at
                            .map(|t| t + shared.config.min_request_interval),
                    ),
                    None => {
                        state.worker_running = false;
                        debug!("AI request worker idle, exiting");
                        return;
                    }
                }
            };

            if let Some(deadline) = not_before {
                if deadline > Instant::now() {
                    debug!(
                        "Throttling AI request for {:?}",
                        deadline.saturating_duration_since(Instant::now())
                    );
                    tokio::time::sleep_until(deadline).await;
                }
            }

            let result = shared
                .request_with_retry(&prompt)
                .await
                .map(|text| text.trim().to_string());

            let entry = {
                let mut state = shared.state.lock();
                state.last_request_at = Some(Instant::now());
                state.entries.pop_front()
            };

            match &result {
                Ok(_) => {
                    shared.counters.succeeded.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    shared.counters.failed.fetch_add(1, Ordering::Relaxed);
                    error!("AI request failed permanently: {}", e);
                }
            }

            if let Some(entry) = entry {
                if entry.responder.send(result).is_err() {
                    debug!("AI request caller went away before completion");
                }
            }
        }
    }
}

impl Shared {
    async fn request_with_retry(&self, prompt: &str) -> LLMResult<String> {
        let policy = self.config.retry;
        let mut retry = 0u32;

        loop {
            match self
                .provider
                .generate_with_config(prompt, &self.config.generation)
                .await
            {
                Ok(response) => {
                    if retry > 0 {
                        info!("AI request succeeded after {} retries", retry);
                    }
                    return Ok(response.content);
                }
                Err(e) if e.is_rate_limited() && retry < policy.max_retries => {
                    let delay = policy.delay_for(retry);
                    warn!(
                        "{} rate limited (retry {}/{}), backing off {:?}",
                        self.provider.provider_name(),
                        retry + 1,
                        policy.max_retries,
                        delay
                    );
                    self.counters
                        .rate_limit_retries
                        .fetch_add(1, Ordering::Relaxed);
                    tokio::time::sleep(delay).await;
                    retry += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
