//! Error taxonomy for classification.
//!
//! Every failure of a single item is a [`ClassificationError`] value in that
//! item's slot; nothing here aborts sibling items.

use std::time::Duration;
use thiserror::Error;

use sieve_core::ResponseError;

use crate::providers::ProviderError;

/// Why an item could not be classified.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClassificationError {
    /// Credential provider could not supply a secret. Terminal; raised
    /// before any external call.
    #[error("No credential available: {0}")]
    NoCredential(String),

    /// Service rejected the credential. Terminal.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Service asked us to slow down. Retryable.
    #[error("Rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    /// Transport failure, timeout, or 5xx. Retryable.
    #[error("Transient network error: {0}")]
    TransientNetwork(String),

    /// Response did not validate as a classification. Retryable.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Retryable failures persisted through every allowed attempt.
    #[error("Retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<ClassificationError>,
    },

    /// Service refused the request for a reason retrying will not fix.
    #[error("Request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// Service is unusable as configured.
    #[error("Service misconfigured: {0}")]
    Configuration(String),

    /// Item normalizes to nothing.
    #[error("Item has no classifiable text")]
    EmptyItem,

    /// Skipped because an earlier item proved the credential dead.
    #[error("Skipped after credential failure: {0}")]
    ShortCircuited(Box<ClassificationError>),

    /// Concurrency limiter closed while waiting for a permit.
    #[error("Cancelled before a permit was granted")]
    Cancelled,

    /// The item's task panicked.
    #[error("Classification task failed: {0}")]
    TaskFailed(String),
}

impl ClassificationError {
    /// Whether the executor may try again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClassificationError::RateLimited { .. }
                | ClassificationError::TransientNetwork(_)
                | ClassificationError::MalformedResponse(_)
        )
    }

    /// Whether every later call is bound to fail the same way.
    pub fn is_credential_failure(&self) -> bool {
        matches!(
            self,
            ClassificationError::NoCredential(_) | ClassificationError::Authentication(_)
        )
    }

    /// Server-provided wait hint, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ClassificationError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Short machine-readable label for logs and CLI output.
    pub fn kind(&self) -> &'static str {
        match self {
            ClassificationError::NoCredential(_) => "no_credential",
            ClassificationError::Authentication(_) => "authentication",
            ClassificationError::RateLimited { .. } => "rate_limited",
            ClassificationError::TransientNetwork(_) => "transient_network",
            ClassificationError::MalformedResponse(_) => "malformed_response",
            ClassificationError::RetriesExhausted { .. } => "retries_exhausted",
            ClassificationError::Rejected { .. } => "rejected",
            ClassificationError::Configuration(_) => "configuration",
            ClassificationError::EmptyItem => "empty_item",
            ClassificationError::ShortCircuited(_) => "short_circuited",
            ClassificationError::Cancelled => "cancelled",
            ClassificationError::TaskFailed(_) => "task_failed",
        }
    }
}

impl From<ProviderError> for ClassificationError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::AuthError => {
                ClassificationError::Authentication("credential rejected".to_string())
            }
            ProviderError::RateLimited { retry_after } => {
                ClassificationError::RateLimited { retry_after }
            }
            ProviderError::ApiError { status, message } => match status {
                401 | 403 => ClassificationError::Authentication(message),
                429 => ClassificationError::RateLimited { retry_after: None },
                408 | 500..=599 => {
                    ClassificationError::TransientNetwork(format!("{}: {}", status, message))
                }
                _ => ClassificationError::Rejected { status, message },
            },
            ProviderError::HttpError(msg) => ClassificationError::TransientNetwork(msg),
            ProviderError::Timeout(after) => {
                ClassificationError::TransientNetwork(format!("timed out after {:?}", after))
            }
            ProviderError::ParseError(msg) => ClassificationError::MalformedResponse(msg),
            ProviderError::NotConfigured(msg) => ClassificationError::Configuration(msg),
        }
    }
}

impl From<ResponseError> for ClassificationError {
    fn from(err: ResponseError) -> Self {
        ClassificationError::MalformedResponse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let auth: ClassificationError = ProviderError::ApiError {
            status: 401,
            message: "invalid x-api-key".to_string(),
        }
        .into();
        assert!(matches!(auth, ClassificationError::Authentication(_)));
        assert!(auth.is_credential_failure());
        assert!(!auth.is_retryable());

        let limited: ClassificationError = ProviderError::ApiError {
            status: 429,
            message: String::new(),
        }
        .into();
        assert!(limited.is_retryable());

        let overloaded: ClassificationError = ProviderError::ApiError {
            status: 529,
            message: "overloaded".to_string(),
        }
        .into();
        assert!(matches!(overloaded, ClassificationError::TransientNetwork(_)));

        let bad_request: ClassificationError = ProviderError::ApiError {
            status: 400,
            message: "bad".to_string(),
        }
        .into();
        assert_eq!(
            bad_request,
            ClassificationError::Rejected {
                status: 400,
                message: "bad".to_string()
            }
        );
        assert!(!bad_request.is_retryable());
    }

    #[test]
    fn test_transport_mapping() {
        let timeout: ClassificationError = ProviderError::Timeout(Duration::from_secs(5)).into();
        assert!(matches!(timeout, ClassificationError::TransientNetwork(_)));

        let parse: ClassificationError = ProviderError::ParseError("eof".to_string()).into();
        assert!(matches!(parse, ClassificationError::MalformedResponse(_)));

        let limited: ClassificationError = ProviderError::RateLimited {
            retry_after: Some(Duration::from_secs(3)),
        }
        .into();
        assert_eq!(limited.retry_after(), Some(Duration::from_secs(3)));
    }

    #[test]
    fn test_response_errors_are_malformed() {
        let err: ClassificationError = ResponseError::EmptyCategory.into();
        assert!(matches!(err, ClassificationError::MalformedResponse(_)));
        assert!(err.is_retryable());
        assert_eq!(err.kind(), "malformed_response");
    }

    #[test]
    fn test_exhausted_wraps_last_error() {
        let err = ClassificationError::RetriesExhausted {
            attempts: 3,
            last: Box::new(ClassificationError::TransientNetwork("reset".to_string())),
        };
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("3 attempts"));
        assert!(err.to_string().contains("reset"));
    }
}
