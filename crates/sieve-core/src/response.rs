//! Structural validation of classification service responses.
//!
//! The service answers in free text that should contain one JSON object.
//! A response is accepted only if that object validates against
//! `schema/classification.schema.json` and passes the semantic checks
//! below. Anything else is a malformed response; we never best-effort parse.

use serde::Deserialize;
use std::sync::OnceLock;
use thiserror::Error;

use crate::types::ClassificationResult;

/// Embedded response schema (loaded at compile time).
const RESPONSE_SCHEMA_JSON: &str = include_str!("../schema/classification.schema.json");

/// Compiled JSON Schema validator (initialized once, reused).
static COMPILED_SCHEMA: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();

/// Reasons a response is rejected.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResponseError {
    #[error("Response contains no JSON object")]
    NoJsonObject,

    #[error("Response JSON is invalid: {0}")]
    InvalidJson(String),

    #[error("Response violates schema: {}", .0.join("; "))]
    Schema(Vec<String>),

    #[error("Category is empty")]
    EmptyCategory,

    #[error("Confidence {0} is outside [0, 1]")]
    ConfidenceOutOfRange(f64),

    #[error("Category '{0}' is not one of the configured categories")]
    UnknownCategory(String),

    #[error("Failed to load response schema: {0}")]
    SchemaLoad(String),
}

#[derive(Debug, Deserialize)]
struct ResponseBody {
    category: String,
    confidence: f64,
    #[serde(default)]
    reasoning: String,
}

fn get_validator() -> Result<&'static jsonschema::Validator, ResponseError> {
    let result = COMPILED_SCHEMA.get_or_init(|| {
        let schema_value: serde_json::Value = match serde_json::from_str(RESPONSE_SCHEMA_JSON) {
            Ok(v) => v,
            Err(e) => return Err(format!("Invalid schema JSON: {}", e)),
        };

        match jsonschema::options().build(&schema_value) {
            Ok(v) => Ok(v),
            Err(e) => Err(format!("Failed to compile schema: {}", e)),
        }
    });

    match result {
        Ok(v) => Ok(v),
        Err(e) => {
            tracing::error!(error = %e, "Response schema unavailable");
            Err(ResponseError::SchemaLoad(e.clone()))
        }
    }
}

/// Locate the JSON object inside raw model text.
///
/// Models wrap JSON in code fences or add a sentence around it; the object
/// spans from the first `{` to the last `}`.
fn extract_json_object(raw: &str) -> Result<&str, ResponseError> {
    let start = raw.find('{').ok_or(ResponseError::NoJsonObject)?;
    let end = raw.rfind('}').ok_or(ResponseError::NoJsonObject)?;
    if end < start {
        return Err(ResponseError::NoJsonObject);
    }
    Ok(&raw[start..=end])
}

/// Parse and validate a raw service response.
///
/// # Arguments
/// * `raw` - Text returned by the classification service
/// * `categories` - Configured categories; empty means any category
/// * `strict` - Reject categories outside `categories`
///
/// # Returns
/// An unrouted [`ClassificationResult`] (`needs_validation` is false until
/// the router decides).
pub fn parse_classification(
    raw: &str,
    categories: &[String],
    strict: bool,
) -> Result<ClassificationResult, ResponseError> {
    let json = extract_json_object(raw)?;
    let value: serde_json::Value =
        serde_json::from_str(json).map_err(|e| ResponseError::InvalidJson(e.to_string()))?;

    let validator = get_validator()?;
    let errors: Vec<String> = validator
        .iter_errors(&value)
        .map(|e| format!("{} at {}", e, e.instance_path))
        .collect();
    if !errors.is_empty() {
        tracing::debug!(violations = errors.len(), "Response failed schema validation");
        return Err(ResponseError::Schema(errors));
    }

    let body: ResponseBody =
        serde_json::from_value(value).map_err(|e| ResponseError::InvalidJson(e.to_string()))?;

    let category = body.category.trim();
    if category.is_empty() {
        return Err(ResponseError::EmptyCategory);
    }
    if !body.confidence.is_finite() || !(0.0..=1.0).contains(&body.confidence) {
        return Err(ResponseError::ConfidenceOutOfRange(body.confidence));
    }

    let category = match categories.iter().find(|c| c.eq_ignore_ascii_case(category)) {
        Some(configured) => configured.clone(),
        None if strict && !categories.is_empty() => {
            return Err(ResponseError::UnknownCategory(category.to_string()));
        }
        None => category.to_string(),
    };

    Ok(ClassificationResult::new(
        category,
        body.confidence,
        body.reasoning.trim(),
    ))
}
