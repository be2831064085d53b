//! # sieve-runtime
//!
//! Concurrent classification for Sieve.
//!
//! `sieve-core` decides *what* a result means (normalization, cache keys,
//! response validation, confidence routing). This crate decides *how* items
//! get classified: a bounded, TTL-expiring result cache, a permit pool that
//! caps simultaneous external calls, retries with exponential backoff, and
//! a queue for results that need a human.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use sieve_runtime::{
//!     AnthropicService, ClassifierConfig, EnvCredentialProvider, Item, Orchestrator,
//!     ANTHROPIC_API_KEY_ENV,
//! };
//!
//! let orchestrator = Orchestrator::builder()
//!     .service(Arc::new(AnthropicService::new()))
//!     .credentials(Arc::new(EnvCredentialProvider::new(ANTHROPIC_API_KEY_ENV, "Anthropic API key")))
//!     .config(ClassifierConfig::default())
//!     .build()?;
//!
//! let results = orchestrator
//!     .classify_batch(vec![Item::new("Stocks rise on rate cut hopes")])
//!     .await;
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod executor;
pub mod limiter;
pub mod orchestrator;
pub mod prompts;
pub mod providers;
pub mod stats;
pub mod validation;

pub use cache::{CacheStats, CacheStore};
pub use config::{ClassifierConfig, ConfigError, DEFAULT_CATEGORIES};
pub use error::ClassificationError;
pub use executor::{Execution, RequestExecutor, RetryPolicy};
pub use limiter::{ConcurrencyLimiter, Permit};
pub use orchestrator::{BatchOutcome, ItemOutcome, Orchestrator, OrchestratorBuilder};
pub use providers::{
    ApiCredential, ClassificationService, CredentialProvider, EnvCredentialProvider,
    ProviderError, ProviderRegistry, StaticCredentialProvider,
};
pub use stats::{RunStats, StatsSnapshot, UsageTotals};
pub use validation::{Feedback, ValidationQueue, ValidationSink, ValidationTicket};

#[cfg(feature = "anthropic")]
pub use providers::{AnthropicService, ANTHROPIC_API_KEY_ENV};

pub use sieve_core::{ClassificationResult, Item};
