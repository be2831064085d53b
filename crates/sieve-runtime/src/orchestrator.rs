//! Classification orchestrator.
//!
//! Ties the pipeline together for one item:
//! normalize -> cache -> permit -> executor -> router -> cache -> validation.
//!
//! Batches fan out one task per item and fan back in by position, so a
//! batch result always has exactly one slot per input, in input order.

use futures::FutureExt;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, OnceLock};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::task::JoinSet;

use sieve_core::{derive_key, normalize, CacheKey, ClassificationResult, ConfidenceRouter, Item};

use crate::cache::CacheStore;
use crate::config::{ClassifierConfig, ConfigError};
use crate::error::ClassificationError;
use crate::executor::RequestExecutor;
use crate::limiter::{ConcurrencyLimiter, Permit};
use crate::providers::{ClassificationService, CredentialProvider};
use crate::stats::{RunStats, StatsSnapshot};
use crate::validation::{Feedback, ValidationSink, ValidationTicket};

/// Reasoning stored with a manually corrected result.
pub const MANUAL_REASONING: &str = "Manually validated";

/// Per-item outcome.
pub type ItemOutcome = Result<ClassificationResult, ClassificationError>;

/// Result of a batch run.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    /// One slot per input item, in input order
    pub results: Vec<ItemOutcome>,

    /// The credential failure that stopped queued items, if one occurred
    pub credential_failure: Option<ClassificationError>,
}

impl BatchOutcome {
    /// Items that produced a result.
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_ok()).count()
    }

    /// Items that produced an error.
    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }
}

/// First credential failure seen in a batch.
///
/// Set while the failing task still holds its permit, so any item that
/// was queued behind it observes the trip once it is granted a slot.
#[derive(Debug, Clone, Default)]
struct CredentialTrip(Arc<OnceLock<ClassificationError>>);

impl CredentialTrip {
    fn trip(&self, cause: &ClassificationError) {
        if self.0.set(cause.clone()).is_ok() {
            tracing::error!(error = %cause, "Credential failure, skipping queued items");
        }
    }

    fn cause(&self) -> Option<&ClassificationError> {
        self.0.get()
    }
}

type GateTable = Mutex<HashMap<CacheKey, Arc<AsyncMutex<()>>>>;

/// Membership in the set of tasks working on one key.
///
/// The table entry is removed when the last member leaves, including
/// members whose future is dropped mid-wait.
struct InFlightGate<'a> {
    table: &'a GateTable,
    key: CacheKey,
    gate: Arc<AsyncMutex<()>>,
    held: Option<OwnedMutexGuard<()>>,
}

impl<'a> InFlightGate<'a> {
    fn join(table: &'a GateTable, key: &CacheKey) -> Self {
        let gate = table.lock().entry(key.clone()).or_default().clone();
        Self {
            table,
            key: key.clone(),
            gate,
            held: None,
        }
    }

    async fn lock(&mut self) {
        self.held = Some(self.gate.clone().lock_owned().await);
    }
}

impl Drop for InFlightGate<'_> {
    fn drop(&mut self) {
        self.held.take();
        let mut table = self.table.lock();
        // One reference in the table, one here: nobody else is waiting.
        if Arc::strong_count(&self.gate) == 2 {
            table.remove(&self.key);
        }
    }
}

struct Inner {
    executor: RequestExecutor,
    cache: Arc<CacheStore>,
    limiter: ConcurrencyLimiter,
    router: ConfidenceRouter,
    sink: Option<Arc<dyn ValidationSink>>,
    stats: Arc<RunStats>,
    config: ClassifierConfig,
    in_flight: GateTable,
}

/// Classifies items with caching, bounded concurrency and retries.
///
/// Cloning is cheap and shares every component.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    /// Start building an orchestrator.
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    /// Classify a single item.
    ///
    /// # Errors
    /// - `EmptyItem` if the text normalizes to nothing
    /// - any executor error for a cache miss
    pub async fn classify_one(&self, item: &Item) -> ItemOutcome {
        self.classify_tracked(item, None).await
    }

    /// Classify many items concurrently.
    ///
    /// Results are positionally aligned with `items`. One item's failure
    /// never removes or reorders another's result.
    pub async fn classify_batch(&self, items: Vec<Item>) -> Vec<ItemOutcome> {
        self.run_batch(items).await.results
    }

    /// Classify many items and report the batch-wide credential failure.
    ///
    /// Dropping the returned future aborts every unfinished item. Permits
    /// held by aborted items are released and completed cache writes stay.
    pub async fn run_batch(&self, items: Vec<Item>) -> BatchOutcome {
        let total = items.len();
        let trip = CredentialTrip::default();
        let short_circuit = self.inner.config.short_circuit_on_credential_failure;

        tracing::info!(items = total, "Starting batch");

        let mut tasks = JoinSet::new();
        for (index, item) in items.into_iter().enumerate() {
            let this = self.clone();
            let trip = short_circuit.then(|| trip.clone());
            tasks.spawn(async move {
                let outcome = AssertUnwindSafe(this.classify_tracked(&item, trip.as_ref()))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| {
                        let message = panic_message(&*panic);
                        tracing::error!(index, panic_msg = %message, "Classification task panicked");
                        this.inner.stats.record_failure();
                        Err(ClassificationError::TaskFailed(message))
                    });
                (index, outcome)
            });
        }

        let mut slots: Vec<Option<ItemOutcome>> = (0..total).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, outcome)) => slots[index] = Some(outcome),
                Err(e) => tracing::error!(error = %e, "Classification task did not complete"),
            }
        }

        let results: Vec<ItemOutcome> = slots
            .into_iter()
            .map(|slot| slot.unwrap_or(Err(ClassificationError::Cancelled)))
            .collect();

        let outcome = BatchOutcome {
            results,
            credential_failure: trip.cause().cloned(),
        };
        tracing::info!(
            items = total,
            succeeded = outcome.succeeded(),
            failed = outcome.failed(),
            "Batch complete"
        );
        outcome
    }

    /// Store a reviewer's correction as a new cache entry.
    ///
    /// The corrected result has full confidence and replaces whatever the
    /// cache held for that key.
    pub fn apply_feedback(&self, feedback: &Feedback) -> ClassificationResult {
        let corrected = self.inner.router.route(ClassificationResult::new(
            feedback.corrected_category.clone(),
            1.0,
            MANUAL_REASONING,
        ));
        self.inner.cache.put(feedback.key.clone(), corrected.clone());
        tracing::info!(
            key = %feedback.key.short(),
            category = %corrected.category,
            "Applied validation feedback"
        );
        corrected
    }

    /// The shared result cache.
    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.inner.cache
    }

    /// The shared permit pool.
    pub fn limiter(&self) -> &ConcurrencyLimiter {
        &self.inner.limiter
    }

    /// Counters for this orchestrator.
    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot()
    }

    /// Active configuration.
    pub fn config(&self) -> &ClassifierConfig {
        &self.inner.config
    }

    async fn classify_tracked(&self, item: &Item, trip: Option<&CredentialTrip>) -> ItemOutcome {
        self.inner.stats.record_item();
        let outcome = self.classify_inner(item, trip).await;
        if let Err(e) = &outcome {
            self.inner.stats.record_failure();
            tracing::debug!(item_id = ?item.id, kind = e.kind(), error = %e, "Item failed");
        }
        outcome
    }

    async fn classify_inner(&self, item: &Item, trip: Option<&CredentialTrip>) -> ItemOutcome {
        let canonical = normalize(&item.text);
        if canonical.is_empty() {
            return Err(ClassificationError::EmptyItem);
        }
        let key = derive_key(&canonical);

        if let Some(hit) = self.inner.cache.get(&key) {
            self.inner.stats.record_hit();
            tracing::debug!(key = %key.short(), "Cache hit");
            return Ok(self.inner.router.route(hit));
        }
        self.inner.stats.record_miss();

        if !self.inner.config.coalesce_in_flight {
            return self.classify_miss(item, &key, trip).await;
        }

        let mut gate = InFlightGate::join(&self.inner.in_flight, &key);
        gate.lock().await;

        // A concurrent request for the same key may have finished while we waited.
        if let Some(hit) = self.inner.cache.get(&key) {
            self.inner.stats.record_coalesced();
            tracing::debug!(key = %key.short(), "Coalesced with in-flight request");
            return Ok(self.inner.router.route(hit));
        }
        // Waiting on the gate counts as queueing, same as waiting on a permit.
        if let Some(cause) = trip.and_then(CredentialTrip::cause) {
            return Err(ClassificationError::ShortCircuited(Box::new(cause.clone())));
        }

        self.classify_miss(item, &key, trip).await
    }

    async fn classify_miss(
        &self,
        item: &Item,
        key: &CacheKey,
        trip: Option<&CredentialTrip>,
    ) -> ItemOutcome {
        let _permit = self.permit(trip).await?;

        let execution = match self.inner.executor.execute(item).await {
            Ok(execution) => execution,
            Err(e) => {
                if e.is_credential_failure() {
                    if let Some(trip) = trip {
                        trip.trip(&e);
                    }
                }
                return Err(e);
            }
        };

        let result = self.inner.router.route(execution.result);
        self.inner.cache.put(key.clone(), result.clone());

        tracing::debug!(
            key = %key.short(),
            category = %result.category,
            confidence = result.confidence,
            attempts = execution.attempts,
            "Classified"
        );

        if result.needs_validation {
            self.flag(item, key, &result);
        }

        Ok(result)
    }

    /// Take a slot, preferring one that is free now.
    ///
    /// An item that had to wait is skipped if the batch's credential failed
    /// in the meantime.
    async fn permit(&self, trip: Option<&CredentialTrip>) -> Result<Permit, ClassificationError> {
        if let Some(permit) = self.inner.limiter.try_acquire() {
            return Ok(permit);
        }

        let permit = self.inner.limiter.acquire().await?;
        if let Some(cause) = trip.and_then(CredentialTrip::cause) {
            return Err(ClassificationError::ShortCircuited(Box::new(cause.clone())));
        }
        Ok(permit)
    }

    fn flag(&self, item: &Item, key: &CacheKey, result: &ClassificationResult) {
        self.inner.stats.record_flagged();
        tracing::info!(
            key = %key.short(),
            confidence = result.confidence,
            threshold = self.inner.router.threshold(),
            "Flagged for manual validation"
        );

        if let Some(sink) = &self.inner.sink {
            sink.submit(ValidationTicket {
                key: key.clone(),
                item_id: item.id.clone(),
                text: item.text.clone(),
                result: result.clone(),
                queued_at: chrono::Utc::now(),
            });
        }
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("executor", &self.inner.executor)
            .field("cache", &self.inner.cache)
            .field("limiter", &self.inner.limiter)
            .finish_non_exhaustive()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

/// Builder for [`Orchestrator`].
pub struct OrchestratorBuilder {
    service: Option<Arc<dyn ClassificationService>>,
    credentials: Option<Arc<dyn CredentialProvider>>,
    config: ClassifierConfig,
    cache: Option<Arc<CacheStore>>,
    limiter: Option<ConcurrencyLimiter>,
    sink: Option<Arc<dyn ValidationSink>>,
}

impl OrchestratorBuilder {
    /// Create a new builder with default configuration.
    pub fn new() -> Self {
        Self {
            service: None,
            credentials: None,
            config: ClassifierConfig::default(),
            cache: None,
            limiter: None,
            sink: None,
        }
    }

    /// Set the classification service.
    pub fn service(mut self, service: Arc<dyn ClassificationService>) -> Self {
        self.service = Some(service);
        self
    }

    /// Set the credential provider.
    pub fn credentials(mut self, credentials: Arc<dyn CredentialProvider>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Set the configuration.
    pub fn config(mut self, config: ClassifierConfig) -> Self {
        self.config = config;
        self
    }

    /// Share an existing cache instead of creating one from config.
    pub fn cache(mut self, cache: Arc<CacheStore>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Share an existing permit pool instead of creating one from config.
    pub fn limiter(mut self, limiter: ConcurrencyLimiter) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// Send low-confidence results to `sink`.
    pub fn validation_sink(mut self, sink: Arc<dyn ValidationSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Build the orchestrator.
    pub fn build(self) -> Result<Orchestrator, ConfigError> {
        self.config.validate()?;

        let service = self.service.ok_or(ConfigError::Missing("classification service"))?;
        let credentials = self.credentials.ok_or(ConfigError::Missing("credential provider"))?;
        let router = ConfidenceRouter::new(self.config.confidence_threshold)
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        let stats = Arc::new(RunStats::new());
        let executor =
            RequestExecutor::new(service, credentials, &self.config).with_stats(stats.clone());
        let cache = self.cache.unwrap_or_else(|| {
            Arc::new(CacheStore::new(
                self.config.cache_capacity,
                self.config.cache_ttl,
            ))
        });
        let limiter = self
            .limiter
            .unwrap_or_else(|| ConcurrencyLimiter::new(self.config.concurrency_limit));

        tracing::debug!(
            concurrency_limit = limiter.limit(),
            cache_capacity = cache.capacity(),
            threshold = router.threshold(),
            "Orchestrator ready"
        );

        Ok(Orchestrator {
            inner: Arc::new(Inner {
                executor,
                cache,
                limiter,
                router,
                sink: self.sink,
                stats,
                config: self.config,
                in_flight: Mutex::new(HashMap::new()),
            }),
        })
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
