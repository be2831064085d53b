//! Classifier configuration.
//!
//! Values are read-only for the lifetime of an [`Orchestrator`](crate::Orchestrator).
//! Durations are written as human-readable strings in YAML (`"24h"`,
//! `"500ms"`).
//!
//! ```yaml
//! concurrency_limit: 5
//! cache_ttl: 24h
//! cache_capacity: 1000
//! max_retry_attempts: 3
//! retry_base_delay: 1s
//! confidence_threshold: 0.8
//! categories: [Politics, Business, Technology]
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;

use crate::providers::CompletionConfig;

/// Errors loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),

    #[error("Missing component: {0}")]
    Missing(&'static str),
}

mod duration_human {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(serde::de::Error::custom)
    }
}

/// Default article categories offered to the classifier.
pub const DEFAULT_CATEGORIES: &[&str] = &[
    "Politics",
    "Business",
    "Technology",
    "Science",
    "Health",
    "Sports",
    "Entertainment",
    "World",
];

/// Configuration for a classification session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Maximum simultaneous external calls
    pub concurrency_limit: usize,

    /// How long a cached result stays valid
    #[serde(with = "duration_human")]
    pub cache_ttl: Duration,

    /// Maximum cached results before LRU eviction
    pub cache_capacity: usize,

    /// Total attempts per item, including the first
    pub max_retry_attempts: u32,

    /// Delay before the first retry
    #[serde(with = "duration_human")]
    pub retry_base_delay: Duration,

    /// Growth factor between successive retry delays
    pub backoff_multiplier: f32,

    /// Upper bound on any single retry delay
    #[serde(with = "duration_human")]
    pub max_retry_delay: Duration,

    /// Per-attempt timeout for the external call
    #[serde(with = "duration_human")]
    pub attempt_timeout: Duration,

    /// Results below this confidence go to manual validation
    pub confidence_threshold: f64,

    /// Collapse simultaneous misses for one key into one external call
    pub coalesce_in_flight: bool,

    /// Skip queued batch items once the credential is known to be dead
    pub short_circuit_on_credential_failure: bool,

    /// Categories offered to the classifier
    pub categories: Vec<String>,

    /// Reject answers outside `categories`
    pub strict_categories: bool,

    /// Model name passed to the service
    pub model: String,

    /// Maximum tokens per response
    pub max_tokens: u32,

    /// Sampling temperature (0.0 for deterministic)
    pub temperature: f32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        let completion = CompletionConfig::default();
        Self {
            concurrency_limit: 5,
            cache_ttl: Duration::from_secs(24 * 60 * 60),
            cache_capacity: 1000,
            max_retry_attempts: 3,
            retry_base_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            max_retry_delay: Duration::from_secs(30),
            attempt_timeout: Duration::from_secs(30),
            confidence_threshold: 0.8,
            coalesce_in_flight: true,
            short_circuit_on_credential_failure: true,
            categories: DEFAULT_CATEGORIES.iter().map(|c| c.to_string()).collect(),
            strict_categories: false,
            model: completion.model,
            max_tokens: completion.max_tokens,
            temperature: completion.temperature,
        }
    }
}

impl ClassifierConfig {
    /// Parse from YAML and validate.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: ClassifierConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse from a YAML file and validate.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Render as YAML.
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Check invariants the pipeline relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency_limit == 0 {
            return Err(ConfigError::Invalid(
                "concurrency_limit must be at least 1".to_string(),
            ));
        }
        if self.concurrency_limit > Semaphore::MAX_PERMITS {
            return Err(ConfigError::Invalid(format!(
                "concurrency_limit must be at most {}, got {}",
                Semaphore::MAX_PERMITS,
                self.concurrency_limit
            )));
        }
        if self.max_retry_attempts == 0 {
            return Err(ConfigError::Invalid(
                "max_retry_attempts must be at least 1".to_string(),
            ));
        }
        if !self.confidence_threshold.is_finite()
            || !(0.0..=1.0).contains(&self.confidence_threshold)
        {
            return Err(ConfigError::Invalid(format!(
                "confidence_threshold must be within [0, 1], got {}",
                self.confidence_threshold
            )));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(ConfigError::Invalid(format!(
                "backoff_multiplier must be >= 1.0, got {}",
                self.backoff_multiplier
            )));
        }
        if self.attempt_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "attempt_timeout must be greater than zero".to_string(),
            ));
        }
        if self.categories.iter().any(|c| c.trim().is_empty()) {
            return Err(ConfigError::Invalid(
                "categories must not contain empty names".to_string(),
            ));
        }
        if self.strict_categories && self.categories.is_empty() {
            return Err(ConfigError::Invalid(
                "strict_categories requires at least one category".to_string(),
            ));
        }
        Ok(())
    }

    /// Completion settings for one attempt.
    pub fn completion(&self) -> CompletionConfig {
        CompletionConfig {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            timeout: self.attempt_timeout,
        }
    }
}
