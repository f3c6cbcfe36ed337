use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracemap_ai::*;

/// Provider that replays a script of outcomes and records when it was called
struct ScriptedProvider {
    started: Instant,
    script: Mutex<VecDeque<LLMResult<String>>>,
    calls: Mutex<Vec<(u64, String)>>,
}

impl ScriptedProvider {
    fn new(script: Vec<LLMResult<String>>) -> Arc<Self> {
        Arc::new(Self {
            started: Instant::now(),
            script: Mutex::new(script.into()),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn call_times_ms(&self) -> Vec<u64> {
        self.calls.lock().iter().map(|(t, _)| *t).collect()
    }

    fn prompts(&self) -> Vec<String> {
        self.calls.lock().iter().map(|(_, p)| p.clone()).collect()
    }
}

#[async_trait]
impl LLMProvider for ScriptedProvider {
    async fn generate_chat(
        &self,
        messages: &[Message],
        _config: &GenerationConfig,
    ) -> LLMResult<LLMResponse> {
        let prompt = messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        let elapsed = Instant::now().duration_since(self.started).as_millis() as u64;
        self.calls.lock().push((elapsed, prompt.clone()));

        let outcome = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(format!("  answer to {}  \n", prompt)));

        outcome.map(|content| LLMResponse {
            content,
            total_tokens: None,
            finish_reason: Some("stop".into()),
            model: "scripted".into(),
        })
    }

    fn provider_name(&self) -> &str {
        "scripted"
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

fn rate_limited() -> LLMResult<String> {
    Err(LLMError::Http {
        status: 429,
        body: "Too Many Requests".into(),
    })
}

fn queue_with(provider: Arc<ScriptedProvider>, max_retries: u32) -> RequestQueue {
    RequestQueue::new(
        provider,
        QueueConfig {
            retry: RetryPolicy {
                max_retries,
                initial_backoff: Duration::from_millis(2000),
            },
            ..QueueConfig::default()
        },
    )
}

#[tokio::test(start_paused = true)]
async fn test_requests_are_spaced_by_min_interval() {
    let provider = ScriptedProvider::new(vec![]);
    let queue = queue_with(provider.clone(), 5);

    let (a, b, c) = tokio::join!(
        queue.submit("first"),
        queue.submit("second"),
        queue.submit("third")
    );

    assert_eq!(a.unwrap(), "answer to first");
    assert_eq!(b.unwrap(), "answer to second");
    assert_eq!(c.unwrap(), "answer to third");
    assert_eq!(provider.call_times_ms(), vec![0, 1000, 2000]);
}

#[tokio::test(start_paused = true)]
async fn test_fifo_order_is_preserved() {
    let provider = ScriptedProvider::new(vec![]);
    let queue = queue_with(provider.clone(), 5);

    let (_, _, _, _) = tokio::join!(
        queue.submit("p1"),
        queue.submit("p2"),
        queue.submit("p3"),
        queue.submit("p4")
    );

    assert_eq!(provider.prompts(), vec!["p1", "p2", "p3", "p4"]);
    assert_eq!(queue.pending(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_backoff_doubles_then_fails_permanently() {
    let provider = ScriptedProvider::new(vec![
        rate_limited(),
        rate_limited(),
        rate_limited(),
        rate_limited(),
    ]);
    let queue = queue_with(provider.clone(), 3);

    let err = queue.submit("explain").await.unwrap_err();

    assert!(err.is_rate_limited());
    // Waits of 2000, 4000 and 8000 ms between the four attempts
    assert_eq!(provider.call_times_ms(), vec![0, 2000, 6000, 14000]);
    let stats = queue.stats();
    assert_eq!(stats.rate_limit_retries, 3);
    assert_eq!(stats.failed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_recovers_within_retry_budget() {
    let provider = ScriptedProvider::new(vec![rate_limited(), rate_limited()]);
    let queue = queue_with(provider.clone(), 5);

    let text = queue.submit("explain").await.unwrap();

    assert_eq!(text, "answer to explain");
    assert_eq!(provider.call_times_ms(), vec![0, 2000, 6000]);
    assert_eq!(queue.stats().succeeded, 1);
}

#[tokio::test(start_paused = true)]
async fn test_non_rate_limit_error_is_not_retried() {
    let provider = ScriptedProvider::new(vec![Err(LLMError::Http {
        status: 500,
        body: "boom".into(),
    })]);
    let queue = queue_with(provider.clone(), 5);

    let (failed, next) = tokio::join!(queue.submit("bad"), queue.submit("good"));

    assert_eq!(failed.unwrap_err().status(), Some(500));
    assert_eq!(next.unwrap(), "answer to good");
    // The failed entry was removed and still counted against the interval
    assert_eq!(provider.call_times_ms(), vec![0, 1000]);
}

#[tokio::test(start_paused = true)]
async fn test_worker_stops_when_drained_and_restarts_lazily() {
    let provider = ScriptedProvider::new(vec![]);
    let queue = queue_with(provider.clone(), 5);

    queue.submit("one").await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(!queue.is_worker_running());

    tokio::time::sleep(Duration::from_secs(5)).await;
    queue.submit("two").await.unwrap();

    // Interval already elapsed, so the second request goes out immediately
    assert_eq!(provider.call_times_ms(), vec![0, 5010]);
}

#[tokio::test]
async fn test_empty_prompt_is_rejected() {
    let provider = ScriptedProvider::new(vec![]);
    let queue = queue_with(provider.clone(), 5);

    let err = queue.submit("   ").await.unwrap_err();
    assert!(matches!(err, LLMError::InvalidRequest(_)));
    assert!(provider.call_times_ms().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_service_routes_prompts_through_queue() {
    let provider = ScriptedProvider::new(vec![]);
    let service = AiService::new(provider.clone(), QueueConfig::default());

    let overview = service
        .generate_project_overview(
            &serde_json::json!({"/ws": ["app.py"]}),
            &serde_json::json!({}),
        )
        .await
        .unwrap();
    let explanation = service
        .explain_function("def run(): pass", "run", &overview, "main -> run")
        .await
        .unwrap();

    assert!(overview.starts_with("answer to Generate a comprehensive overview"));
    assert!(explanation.contains("Name: run"));
    assert_eq!(provider.call_times_ms(), vec![0, 1000]);
    assert_eq!(service.stats().submitted, 2);
}
