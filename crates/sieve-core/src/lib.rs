//! # sieve-core
//!
//! Deterministic building blocks for article classification.
//!
//! This crate answers the questions that do not need the network:
//! - Are these two articles the same article? ([`normalize`], [`CacheKey`])
//! - Is this service response a valid classification? ([`parse_classification`])
//! - Can this result be trusted, or does a human need to look? ([`ConfidenceRouter`])
//!
//! ## Key Guarantees
//!
//! 1. **Deterministic**: Same input always produces same output
//! 2. **No network calls**: The runtime crate owns all I/O
//! 3. **Strict parsing**: Malformed responses are rejected, never patched up
//!
//! ## Example
//!
//! ```rust
//! use sieve_core::{CacheKey, ConfidenceRouter, parse_classification};
//!
//! assert_eq!(
//!     CacheKey::for_text("  Breaking: Stocks Rise!!"),
//!     CacheKey::for_text("breaking stocks rise"),
//! );
//!
//! let raw = r#"{"category": "Finance", "confidence": 0.72, "reasoning": "markets"}"#;
//! let result = parse_classification(raw, &[], false).unwrap();
//! let routed = ConfidenceRouter::new(0.8).unwrap().route(result);
//! assert!(routed.needs_validation);
//! ```

pub mod normalize;
pub mod response;
pub mod routing;
pub mod types;

// Re-export main types at crate root
pub use normalize::{derive_key, normalize, CacheKey};
pub use response::{parse_classification, ResponseError};
pub use routing::{ConfidenceRouter, Route, RouterError};
pub use types::{ClassificationResult, Item};
