//! Prompts for the classification service.
//!
//! The system prompt is identical for every article in a session, so
//! services with prompt caching only pay for it once. The article itself
//! goes in the user message.

use crate::providers::ChatMessage;

/// Base instructions; `{categories}` is replaced with the configured list.
pub const CLASSIFIER_SYSTEM_PROMPT: &str = r#"
You are a news article classifier.

Assign the article to exactly one category.
{categories}

## Output Format (JSON)
Respond with a single JSON object and nothing else:
{
  "category": "string",
  "confidence": 0.0-1.0,
  "reasoning": "one sentence explaining the choice"
}

## Confidence Guidelines
- 0.9-1.0: The article is unambiguously about this category
- 0.7-0.9: Clearly fits, with minor overlap into another category
- 0.5-0.7: Plausible, but another category fits nearly as well
- < 0.5: Mostly a guess

Report your real confidence. Low-confidence answers are reviewed by a human;
that is the intended outcome, not a failure.
"#;

/// Render the system prompt for a category list.
pub fn system_prompt(categories: &[String]) -> String {
    let category_block = if categories.is_empty() {
        "Choose the most fitting short category name.".to_string()
    } else {
        format!("Choose one of: {}.", categories.join(", "))
    };
    CLASSIFIER_SYSTEM_PROMPT
        .replace("{categories}", &category_block)
        .trim()
        .to_string()
}

/// Messages for classifying one article.
pub fn classification_messages(categories: &[String], article: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(system_prompt(categories)),
        ChatMessage::user(format!("Article:\n\"\"\"\n{}\n\"\"\"", article.trim())),
    ]
}
