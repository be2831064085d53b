//! Confidence-based routing.
//!
//! Decides whether a result is trusted as-is or queued for manual review.
//! The decision is a pure function of confidence and the configured
//! threshold, so re-routing a result always gives the same answer.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::ClassificationResult;

/// Errors constructing a router.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RouterError {
    #[error("Confidence threshold must be within [0, 1], got {0}")]
    ThresholdOutOfRange(f64),
}

/// Where a result goes after classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    /// Confidence at or above threshold
    AutoAccept,

    /// Confidence below threshold, needs a human
    ManualReview,
}

/// Routes results by confidence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceRouter {
    threshold: f64,
}

impl ConfidenceRouter {
    /// Create a router with the given threshold.
    pub fn new(threshold: f64) -> Result<Self, RouterError> {
        if !threshold.is_finite() || !(0.0..=1.0).contains(&threshold) {
            return Err(RouterError::ThresholdOutOfRange(threshold));
        }
        Ok(Self { threshold })
    }

    /// The configured threshold.
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Decide the route for a confidence value.
    pub fn decision(&self, confidence: f64) -> Route {
        if confidence < self.threshold {
            Route::ManualReview
        } else {
            Route::AutoAccept
        }
    }

    /// Annotate a result with `needs_validation`.
    pub fn route(&self, mut result: ClassificationResult) -> ClassificationResult {
        result.needs_validation = self.decision(result.confidence) == Route::ManualReview;
        result
    }
}

impl Default for ConfidenceRouter {
    fn default() -> Self {
        Self { threshold: 0.8 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_threshold_boundary() {
        let router = ConfidenceRouter::new(0.8).unwrap();

        let below = router.route(ClassificationResult::new("World", 0.8 - 0.01, ""));
        assert!(below.needs_validation);

        let at = router.route(ClassificationResult::new("World", 0.8, ""));
        assert!(!at.needs_validation);
    }

    #[test]
    fn test_reroute_overrides_stale_flag() {
        let router = ConfidenceRouter::new(0.5).unwrap();
        let mut result = ClassificationResult::new("Sports", 0.9, "");
        result.needs_validation = true;

        assert!(!router.route(result).needs_validation);
    }

    #[test]
    fn test_rejects_invalid_threshold() {
        assert!(ConfidenceRouter::new(-0.1).is_err());
        assert!(ConfidenceRouter::new(1.5).is_err());
        assert!(ConfidenceRouter::new(f64::NAN).is_err());
        assert!(ConfidenceRouter::new(0.0).is_ok());
        assert!(ConfidenceRouter::new(1.0).is_ok());
    }

    proptest! {
        #[test]
        fn prop_needs_validation_iff_below_threshold(threshold in 0.0f64..=1.0, confidence in 0.0f64..=1.0) {
            let router = ConfidenceRouter::new(threshold).unwrap();
            let routed = router.route(ClassificationResult::new("X", confidence, ""));
            prop_assert_eq!(routed.needs_validation, confidence < threshold);
            // Routing twice changes nothing
            prop_assert_eq!(router.route(routed.clone()), routed);
        }
    }
}
