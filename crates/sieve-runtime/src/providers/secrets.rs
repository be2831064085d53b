//! Secure credential handling for classification services.
//!
//! Credentials reach the executor through a [`CredentialProvider`], which
//! may read the environment, a JSON config block, or hold a value supplied
//! programmatically. Whatever the source, the value is wrapped in
//! [`ApiCredential`] immediately, so:
//!
//! - **No accidental logging**: Credentials cannot appear in Debug/Display output
//! - **Memory safety**: Credentials are zeroed on drop
//! - **Explicit exposure**: The raw value is only reachable via `.expose()`
//!
//! ## Usage
//!
//! ```ignore
//! use sieve_runtime::providers::{CredentialProvider, EnvCredentialProvider};
//!
//! let provider = EnvCredentialProvider::new("ANTHROPIC_API_KEY", "Anthropic API key");
//! let cred = provider.credential().await?;
//!
//! // Use in HTTP header (explicit exposure)
//! request.header("x-api-key", cred.expose());
//! ```

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value as JsonValue;
use std::fmt;

use super::ProviderError;

/// Where a credential was loaded from.
///
/// Useful for debugging configuration issues without exposing the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    /// Loaded from configuration file/JSON
    Config,
    /// Loaded from environment variable
    Environment,
    /// Provided programmatically
    Programmatic,
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialSource::Config => write!(f, "config"),
            CredentialSource::Environment => write!(f, "environment"),
            CredentialSource::Programmatic => write!(f, "programmatic"),
        }
    }
}

/// A securely-stored API credential.
///
/// - Safe Debug implementation that shows `[REDACTED]`
/// - Memory zeroing on drop via `secrecy` crate
/// - Explicit exposure via `.expose()` method
/// - Source tracking for debugging
pub struct ApiCredential {
    value: SecretString,
    source: CredentialSource,
    name: &'static str,
}

impl ApiCredential {
    /// Create a new credential from a string value.
    ///
    /// The value is immediately wrapped in SecretString and cannot
    /// be accidentally logged after this point.
    pub fn new(value: impl Into<String>, source: CredentialSource, name: &'static str) -> Self {
        Self {
            value: SecretString::from(value.into()),
            source,
            name,
        }
    }

    /// Load credential from an environment variable.
    pub fn from_env(env_var: &str, name: &'static str) -> Result<Self, ProviderError> {
        std::env::var(env_var)
            .map(|v| Self::new(v, CredentialSource::Environment, name))
            .map_err(|_| {
                ProviderError::NotConfigured(format!(
                    "{} not set: configure '{}' environment variable",
                    name, env_var
                ))
            })
    }

    /// Load credential from JSON config, falling back to environment variable.
    ///
    /// 1. Check if `config_key` exists in the JSON config
    /// 2. If not, fall back to `env_var` environment variable
    /// 3. Return error if neither is set
    pub fn from_config_or_env(
        config: &JsonValue,
        config_key: &str,
        env_var: &str,
        name: &'static str,
    ) -> Result<Self, ProviderError> {
        if let Some(value) = config[config_key].as_str() {
            return Ok(Self::new(value, CredentialSource::Config, name));
        }

        if let Ok(value) = std::env::var(env_var) {
            return Ok(Self::new(value, CredentialSource::Environment, name));
        }

        Err(ProviderError::NotConfigured(format!(
            "{} required: set '{}' in config or {} environment variable",
            name, config_key, env_var
        )))
    }

    /// Expose the credential value for use in API calls.
    ///
    /// Only call this where the credential is actually needed (e.g. setting
    /// an HTTP header). Never store the exposed value.
    pub fn expose(&self) -> &str {
        self.value.expose_secret()
    }

    /// Check if the credential is empty.
    pub fn is_empty(&self) -> bool {
        self.value.expose_secret().is_empty()
    }

    /// Get the source of this credential.
    pub fn source(&self) -> CredentialSource {
        self.source
    }

    /// Get the human-readable name of this credential.
    pub fn name(&self) -> &'static str {
        self.name
    }

    fn duplicate(&self) -> Self {
        Self::new(self.expose(), self.source, self.name)
    }
}

impl fmt::Debug for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredential")
            .field("value", &"[REDACTED]")
            .field("source", &self.source)
            .field("name", &self.name)
            .finish()
    }
}

impl fmt::Display for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} from {} [REDACTED]", self.name, self.source)
    }
}

/// Supplies the secret used to authenticate outbound calls.
///
/// Called once per external classification (cache hits never ask). A
/// failure here surfaces as `NoCredential` before any call is attempted.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Return the current credential.
    async fn credential(&self) -> Result<ApiCredential, ProviderError>;
}

/// A credential fixed at construction.
#[derive(Debug)]
pub struct StaticCredentialProvider {
    credential: ApiCredential,
}

impl StaticCredentialProvider {
    /// Wrap a programmatically supplied key.
    pub fn new(value: impl Into<String>, name: &'static str) -> Self {
        Self {
            credential: ApiCredential::new(value, CredentialSource::Programmatic, name),
        }
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentialProvider {
    async fn credential(&self) -> Result<ApiCredential, ProviderError> {
        if self.credential.is_empty() {
            return Err(ProviderError::NotConfigured(format!(
                "{} is empty",
                self.credential.name()
            )));
        }
        Ok(self.credential.duplicate())
    }
}

/// Reads the credential from an environment variable on every call.
///
/// Rotating the variable takes effect on the next external call.
#[derive(Debug, Clone)]
pub struct EnvCredentialProvider {
    env_var: String,
    name: &'static str,
}

impl EnvCredentialProvider {
    /// Create a provider for the given variable.
    pub fn new(env_var: impl Into<String>, name: &'static str) -> Self {
        Self {
            env_var: env_var.into(),
            name,
        }
    }
}

#[async_trait]
impl CredentialProvider for EnvCredentialProvider {
    async fn credential(&self) -> Result<ApiCredential, ProviderError> {
        let credential = ApiCredential::from_env(&self.env_var, self.name)?;
        if credential.is_empty() {
            return Err(ProviderError::NotConfigured(format!(
                "{} is empty: '{}' environment variable is blank",
                self.name, self.env_var
            )));
        }
        Ok(credential)
    }
}

/// Reads `config_key` from a JSON config block, falling back to `env_var`.
pub struct ConfigCredentialProvider {
    config_value: Option<ApiCredential>,
    env_var: String,
    config_key: String,
    name: &'static str,
}

impl ConfigCredentialProvider {
    /// Capture the config value (if any); the environment is read lazily.
    pub fn new(
        config: &JsonValue,
        config_key: impl Into<String>,
        env_var: impl Into<String>,
        name: &'static str,
    ) -> Self {
        let config_key = config_key.into();
        let config_value = config[config_key.as_str()]
            .as_str()
            .map(|v| ApiCredential::new(v, CredentialSource::Config, name));
        Self {
            config_value,
            env_var: env_var.into(),
            config_key,
            name,
        }
    }
}

impl fmt::Debug for ConfigCredentialProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigCredentialProvider")
            .field("config_value", &self.config_value)
            .field("env_var", &self.env_var)
            .field("config_key", &self.config_key)
            .finish()
    }
}

#[async_trait]
impl CredentialProvider for ConfigCredentialProvider {
    async fn credential(&self) -> Result<ApiCredential, ProviderError> {
        let credential = match &self.config_value {
            Some(credential) => credential.duplicate(),
            None => ApiCredential::from_config_or_env(
                &JsonValue::Null,
                &self.config_key,
                &self.env_var,
                self.name,
            )?,
        };
        if credential.expose().trim().is_empty() {
            return Err(ProviderError::NotConfigured(format!(
                "{} is empty: check '{}' or {}",
                self.name, self.config_key, self.env_var
            )));
        }
        Ok(credential)
    }
}
