//! One external classification with bounded retries.
//!
//! The executor owns the retry discipline and nothing else: it does not
//! touch the cache or the permit pool. The orchestrator holds a permit for
//! the whole `execute` call, so backoff waits keep the slot occupied.

use backon::{BackoffBuilder, ExponentialBackoff, ExponentialBuilder};
use std::sync::Arc;
use std::time::Duration;

use sieve_core::{parse_classification, ClassificationResult, Item};

use crate::config::ClassifierConfig;
use crate::error::ClassificationError;
use crate::prompts;
use crate::providers::{
    ApiCredential, ChatMessage, ClassificationService, CompletionConfig, CredentialProvider,
    TokenUsage,
};
use crate::stats::RunStats;

/// Retry limits and backoff shape.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,

    /// Delay before the first retry
    pub base_delay: Duration,

    /// Growth factor between retries
    pub multiplier: f32,

    /// Cap on any single delay
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Policy from session config.
    pub fn from_config(config: &ClassifierConfig) -> Self {
        Self {
            max_attempts: config.max_retry_attempts,
            base_delay: config.retry_base_delay,
            multiplier: config.backoff_multiplier,
            max_delay: config.max_retry_delay,
        }
    }

    /// Delays between attempts: `base * multiplier^(k-1)` before retry k.
    pub fn backoff(&self) -> ExponentialBackoff {
        ExponentialBuilder::default()
            .with_min_delay(self.base_delay)
            .with_max_delay(self.max_delay)
            .with_factor(self.multiplier)
            .with_max_times(self.max_attempts.saturating_sub(1) as usize)
            .build()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&ClassifierConfig::default())
    }
}

/// Progress of one `execute` call.
#[derive(Debug, Default)]
struct RetryState {
    attempt: u32,
    last_error: Option<ClassificationError>,
}

/// A successful execution.
#[derive(Debug, Clone)]
pub struct Execution {
    /// Validated, unrouted result
    pub result: ClassificationResult,

    /// Calls made, including the successful one
    pub attempts: u32,

    /// Token usage summed over every attempt that returned a body
    pub usage: TokenUsage,
}

/// Calls the classification service with retries.
pub struct RequestExecutor {
    service: Arc<dyn ClassificationService>,
    credentials: Arc<dyn CredentialProvider>,
    policy: RetryPolicy,
    completion: CompletionConfig,
    categories: Vec<String>,
    strict_categories: bool,
    stats: Option<Arc<RunStats>>,
}

impl RequestExecutor {
    /// Create an executor from session config.
    pub fn new(
        service: Arc<dyn ClassificationService>,
        credentials: Arc<dyn CredentialProvider>,
        config: &ClassifierConfig,
    ) -> Self {
        Self {
            service,
            credentials,
            policy: RetryPolicy::from_config(config),
            completion: config.completion(),
            categories: config.categories.clone(),
            strict_categories: config.strict_categories,
            stats: None,
        }
    }

    /// Record every call and its token usage into `stats`.
    pub fn with_stats(mut self, stats: Arc<RunStats>) -> Self {
        self.stats = Some(stats);
        self
    }

    /// The active retry policy.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Classify one item against the service.
    ///
    /// # Errors
    /// - `NoCredential` before any call if the credential provider fails
    /// - `Authentication`, `Rejected`, `Configuration` immediately (terminal)
    /// - `RetriesExhausted` wrapping the last retryable error after
    ///   `max_attempts` calls
    pub async fn execute(&self, item: &Item) -> Result<Execution, ClassificationError> {
        let credential = self.credentials.credential().await.map_err(|e| {
            tracing::warn!(error = %e, "Credential unavailable");
            ClassificationError::NoCredential(e.to_string())
        })?;

        let messages = prompts::classification_messages(&self.categories, &item.text);
        let mut delays = self.policy.backoff();
        let mut state = RetryState::default();
        let mut usage = TokenUsage::default();

        loop {
            state.attempt += 1;

            if let Some(stats) = &self.stats {
                stats.record_call(state.attempt > 1);
            }

            let error = match self.attempt(&credential, &messages, &mut usage).await {
                Ok(result) => {
                    if let Some(previous) = &state.last_error {
                        tracing::debug!(
                            attempt = state.attempt,
                            recovered_from = %previous,
                            "Classification succeeded after retry"
                        );
                    }
                    return Ok(Execution {
                        result,
                        attempts: state.attempt,
                        usage,
                    });
                }
                Err(error) => error,
            };

            if !error.is_retryable() {
                tracing::warn!(
                    attempt = state.attempt,
                    error = %error,
                    "Terminal classification failure"
                );
                return Err(error);
            }

            if state.attempt >= self.policy.max_attempts {
                tracing::warn!(
                    attempts = state.attempt,
                    error = %error,
                    "Retries exhausted"
                );
                return Err(ClassificationError::RetriesExhausted {
                    attempts: state.attempt,
                    last: Box::new(error),
                });
            }

            let scheduled = delays.next().unwrap_or(self.policy.max_delay);
            let delay = match error.retry_after() {
                Some(hint) => hint.max(scheduled).min(self.policy.max_delay),
                None => scheduled,
            };

            tracing::warn!(
                attempt = state.attempt,
                max_attempts = self.policy.max_attempts,
                delay = ?delay,
                error = %error,
                "Retryable failure, backing off"
            );
            state.last_error = Some(error);
            tokio::time::sleep(delay).await;
        }
    }

    /// One bounded call plus response validation.
    async fn attempt(
        &self,
        credential: &ApiCredential,
        messages: &[ChatMessage],
        usage: &mut TokenUsage,
    ) -> Result<ClassificationResult, ClassificationError> {
        let timeout = self.completion.timeout;
        let call = self
            .service
            .complete(credential, messages.to_vec(), &self.completion);

        let response = match tokio::time::timeout(timeout, call).await {
            Ok(response) => response?,
            Err(_) => {
                return Err(ClassificationError::TransientNetwork(format!(
                    "attempt timed out after {:?}",
                    timeout
                )))
            }
        };

        usage.prompt_tokens += response.usage.prompt_tokens;
        usage.completion_tokens += response.usage.completion_tokens;
        if let Some(stats) = &self.stats {
            stats.record_usage(&response.usage);
        }

        let result = parse_classification(
            &response.content,
            &self.categories,
            self.strict_categories,
        )?;
        Ok(result)
    }
}

impl std::fmt::Debug for RequestExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestExecutor")
            .field("service", &self.service.name())
            .field("policy", &self.policy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{CompletionResponse, ProviderError, StaticCredentialProvider};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Replays scripted outcomes, then repeats the last one.
    struct ScriptedService {
        script: Mutex<VecDeque<Result<String, ProviderError>>>,
        last: Mutex<Option<Result<String, ProviderError>>>,
        calls: AtomicU32,
        delay: Duration,
    }

    impl ScriptedService {
        fn new(script: Vec<Result<&str, ProviderError>>) -> Self {
            Self {
                script: Mutex::new(
                    script
                        .into_iter()
                        .map(|r| r.map(|s| s.to_string()))
                        .collect(),
                ),
                last: Mutex::new(None),
                calls: AtomicU32::new(0),
                delay: Duration::ZERO,
            }
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ClassificationService for ScriptedService {
        async fn complete(
            &self,
            _credential: &ApiCredential,
            _messages: Vec<ChatMessage>,
            _config: &CompletionConfig,
        ) -> Result<CompletionResponse, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let next = self.script.lock().pop_front();
            let outcome = match next {
                Some(outcome) => {
                    *self.last.lock() = Some(outcome.clone());
                    outcome
                }
                None => self.last.lock().clone().expect("empty script"),
            };
            outcome.map(|content| CompletionResponse {
                content,
                usage: TokenUsage {
                    prompt_tokens: 10,
                    completion_tokens: 5,
                },
                model: "scripted".to_string(),
            })
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    /// Backoff factors are f32, so scheduled delays are exact only to a few ns.
    fn assert_close(actual: Duration, expected: Duration) {
        let diff = if actual > expected {
            actual - expected
        } else {
            expected - actual
        };
        assert!(
            diff < Duration::from_millis(1),
            "expected ~{:?}, got {:?}",
            expected,
            actual
        );
    }

    const GOOD: &str = r#"{"category": "Business", "confidence": 0.9, "reasoning": "markets"}"#;

    fn config(attempts: u32) -> ClassifierConfig {
        ClassifierConfig {
            max_retry_attempts: attempts,
            retry_base_delay: Duration::from_millis(100),
            max_retry_delay: Duration::from_secs(10),
            attempt_timeout: Duration::from_secs(1),
            ..Default::default()
        }
    }

    fn executor(service: Arc<ScriptedService>, attempts: u32) -> RequestExecutor {
        RequestExecutor::new(
            service,
            Arc::new(StaticCredentialProvider::new("sk-test", "Test key")),
            &config(attempts),
        )
    }

    fn transient() -> ProviderError {
        ProviderError::HttpError("connection reset".to_string())
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_attempt_success() {
        let service = Arc::new(ScriptedService::new(vec![Ok(GOOD)]));
        let execution = executor(service.clone(), 3).execute(&Item::new("x")).await.unwrap();

        assert_eq!(execution.result.category, "Business");
        assert_eq!(execution.attempts, 1);
        assert_eq!(execution.usage.total(), 15);
        assert_eq!(service.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_retries() {
        let service = Arc::new(ScriptedService::new(vec![Err(transient()), Err(transient()), Ok(GOOD)]));
        let execution = executor(service.clone(), 3).execute(&Item::new("x")).await.unwrap();

        assert_eq!(execution.attempts, 3);
        assert_eq!(service.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_retryable_failure_exhausts() {
        let service = Arc::new(ScriptedService::new(vec![Err(transient())]));
        let result = executor(service.clone(), 4).execute(&Item::new("x")).await;

        match result {
            Err(ClassificationError::RetriesExhausted { attempts, last }) => {
                assert_eq!(attempts, 4);
                assert!(matches!(*last, ClassificationError::TransientNetwork(_)));
            }
            other => panic!("expected RetriesExhausted, got {:?}", other),
        }
        assert_eq!(service.calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_authentication_is_not_retried() {
        let service = Arc::new(ScriptedService::new(vec![Err(ProviderError::AuthError)]));
        let result = executor(service.clone(), 3).execute(&Item::new("x")).await;

        assert!(matches!(result, Err(ClassificationError::Authentication(_))));
        assert_eq!(service.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_responses_are_retried() {
        let service = Arc::new(ScriptedService::new(vec![
            Ok("not json"),
            Ok(r#"{"category": "", "confidence": 0.9}"#),
            Ok(r#"{"category": "Business", "confidence": 7}"#),
        ]));
        let result = executor(service.clone(), 3).execute(&Item::new("x")).await;

        match result {
            Err(ClassificationError::RetriesExhausted { attempts: 3, last }) => {
                assert!(matches!(*last, ClassificationError::MalformedResponse(_)));
            }
            other => panic!("expected RetriesExhausted, got {:?}", other),
        }
        assert_eq!(service.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_delays_grow() {
        let service = Arc::new(ScriptedService::new(vec![Err(transient()), Err(transient()), Ok(GOOD)]));
        let start = tokio::time::Instant::now();
        executor(service, 3).execute(&Item::new("x")).await.unwrap();

        // 100ms before retry 1, 200ms before retry 2
        assert_close(start.elapsed(), Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_hint_raises_delay() {
        let service = Arc::new(ScriptedService::new(vec![
            Err(ProviderError::RateLimited {
                retry_after: Some(Duration::from_secs(2)),
            }),
            Ok(GOOD),
        ]));
        let start = tokio::time::Instant::now();
        executor(service, 3).execute(&Item::new("x")).await.unwrap();

        assert_close(start.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_timeout_is_transient() {
        let service = Arc::new(ScriptedService::new(vec![Ok(GOOD)]).with_delay(Duration::from_secs(5)));
        let result = executor(service.clone(), 2).execute(&Item::new("x")).await;

        match result {
            Err(ClassificationError::RetriesExhausted { attempts: 2, last }) => {
                assert!(last.to_string().contains("timed out"));
            }
            other => panic!("expected RetriesExhausted, got {:?}", other),
        }
        assert_eq!(service.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stats_count_every_call() {
        let service = Arc::new(ScriptedService::new(vec![Err(transient()), Err(ProviderError::AuthError)]));
        let stats = Arc::new(RunStats::new());
        let result = executor(service, 3)
            .with_stats(stats.clone())
            .execute(&Item::new("x"))
            .await;

        assert!(matches!(result, Err(ClassificationError::Authentication(_))));
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.external_calls, 2);
        assert_eq!(snapshot.retries, 1);
        assert_eq!(snapshot.usage.total_tokens, 0);
    }

    #[tokio::test]
    async fn test_missing_credential_makes_no_call() {
        let service = Arc::new(ScriptedService::new(vec![Ok(GOOD)]));
        let executor = RequestExecutor::new(
            service.clone(),
            Arc::new(StaticCredentialProvider::new("", "Test key")),
            &config(3),
        );

        let result = executor.execute(&Item::new("x")).await;
        assert!(matches!(result, Err(ClassificationError::NoCredential(_))));
        assert_eq!(service.calls(), 0);
    }

    #[test]
    fn test_backoff_schedule() {
        let policy = RetryPolicy {
            max_attempts: 4,
            base_delay: Duration::from_millis(100),
            multiplier: 3.0,
            max_delay: Duration::from_secs(1),
        };
        let delays: Vec<Duration> = policy.backoff().collect();
        assert_eq!(delays.len(), 3);
        assert_close(delays[0], Duration::from_millis(100));
        assert_close(delays[1], Duration::from_millis(300));
        assert_close(delays[2], Duration::from_millis(900));
    }

    #[test]
    fn test_backoff_respects_cap() {
        let policy = RetryPolicy {
            max_attempts: 6,
            base_delay: Duration::from_millis(400),
            multiplier: 2.0,
            max_delay: Duration::from_secs(1),
        };
        for delay in policy.backoff() {
            assert!(delay <= Duration::from_secs(1));
        }
    }
}
