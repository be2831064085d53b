//! Core data model shared by the runtime and the CLI.

use serde::{Deserialize, Serialize};

/// A text item ("article") submitted for classification.
///
/// The optional `id` is carried through for correlation only; batch results
/// are aligned with their input by position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Caller-supplied identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Raw article text
    pub text: String,
}

impl Item {
    /// Create an item without an identifier.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: None,
            text: text.into(),
        }
    }

    /// Attach a caller-supplied identifier.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

impl From<&str> for Item {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for Item {
    fn from(text: String) -> Self {
        Self::new(text)
    }
}

/// Outcome of classifying one item.
///
/// Immutable once produced: the cache hands out clones, and a corrected
/// category from manual review becomes a new result rather than an edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    /// Assigned category
    pub category: String,

    /// Confidence in the assignment (0.0 - 1.0)
    pub confidence: f64,

    /// Short explanation from the classifier
    #[serde(default)]
    pub reasoning: String,

    /// True when confidence fell below the configured threshold
    #[serde(default)]
    pub needs_validation: bool,
}

impl ClassificationResult {
    /// Create an unrouted result (`needs_validation` is decided by the router).
    pub fn new(category: impl Into<String>, confidence: f64, reasoning: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            confidence,
            reasoning: reasoning.into(),
            needs_validation: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_builders() {
        let item = Item::new("Stocks rise").with_id("a-1");
        assert_eq!(item.id.as_deref(), Some("a-1"));
        assert_eq!(Item::from("x").id, None);
    }

    #[test]
    fn test_item_deserializes_without_id() {
        let item: Item = serde_json::from_str(r#"{"text":"hello"}"#).unwrap();
        assert_eq!(item, Item::new("hello"));
    }

    #[test]
    fn test_result_serialization_shape() {
        let result = ClassificationResult::new("Finance", 0.9, "earnings report");
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["category"], "Finance");
        assert_eq!(json["needs_validation"], false);
    }
}
