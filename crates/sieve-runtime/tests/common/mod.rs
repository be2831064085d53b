//! Shared test doubles for orchestration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sieve_runtime::providers::{
    ApiCredential, ChatMessage, ClassificationService, CompletionConfig, CompletionResponse,
    ProviderError, StaticCredentialProvider, TokenUsage,
};
use sieve_runtime::{ClassifierConfig, Orchestrator, OrchestratorBuilder};

type Responder = dyn Fn(&str, u32) -> Result<String, ProviderError> + Send + Sync;

/// Classification service driven by a closure of (article, call number).
///
/// Tracks how many calls are in progress at once so tests can check the
/// permit bound from the service's side.
pub struct ScriptedService {
    respond: Box<Responder>,
    latency: Duration,
    calls: AtomicU32,
    active: AtomicUsize,
    peak_active: AtomicUsize,
}

impl ScriptedService {
    pub fn new(
        respond: impl Fn(&str, u32) -> Result<String, ProviderError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            respond: Box::new(respond),
            latency: Duration::ZERO,
            calls: AtomicU32::new(0),
            active: AtomicUsize::new(0),
            peak_active: AtomicUsize::new(0),
        }
    }

    /// Always answers with `category` at `confidence`.
    pub fn answering(category: &'static str, confidence: f64) -> Self {
        Self::new(move |_, _| Ok(answer(category, confidence)))
    }

    /// Sleep this long inside every call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn peak_active(&self) -> usize {
        self.peak_active.load(Ordering::SeqCst)
    }
}

struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ClassificationService for ScriptedService {
    async fn complete(
        &self,
        _credential: &ApiCredential,
        messages: Vec<ChatMessage>,
        _config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_active.fetch_max(now, Ordering::SeqCst);
        let _active = ActiveGuard(&self.active);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let article = messages
            .last()
            .map(|m| m.content.as_str())
            .unwrap_or_default();
        (self.respond)(article, call).map(|content| CompletionResponse {
            content,
            usage: TokenUsage {
                prompt_tokens: 100,
                completion_tokens: 20,
            },
            model: "scripted".to_string(),
        })
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// A well-formed service answer.
pub fn answer(category: &str, confidence: f64) -> String {
    format!(
        r#"Sure. {{"category": "{}", "confidence": {}, "reasoning": "scripted"}}"#,
        category, confidence
    )
}

pub fn transient() -> ProviderError {
    ProviderError::ApiError {
        status: 503,
        message: "overloaded".to_string(),
    }
}

/// Config with short, test-friendly delays.
pub fn fast_config() -> ClassifierConfig {
    ClassifierConfig {
        retry_base_delay: Duration::from_millis(10),
        max_retry_delay: Duration::from_millis(100),
        attempt_timeout: Duration::from_secs(5),
        ..Default::default()
    }
}

pub fn builder(service: Arc<ScriptedService>, config: ClassifierConfig) -> OrchestratorBuilder {
    Orchestrator::builder()
        .service(service)
        .credentials(Arc::new(StaticCredentialProvider::new("sk-test", "Test key")))
        .config(config)
}

pub fn orchestrator(service: Arc<ScriptedService>, config: ClassifierConfig) -> Orchestrator {
    builder(service, config).build().expect("valid test config")
}
