//! Reading items and rendering per-item output lines.

use anyhow::{Context, Result};
use serde_json::{json, Value};

use sieve_runtime::{Item, ItemOutcome};

/// Parse one item per non-blank line.
///
/// With `jsonl`, each line is `{"id": .., "text": ..}`; otherwise the line
/// itself is the text.
pub fn parse_items(input: &str, jsonl: bool) -> Result<Vec<Item>> {
    input
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(number, line)| {
            if jsonl {
                serde_json::from_str::<Item>(line)
                    .with_context(|| format!("line {}: expected {{\"id\", \"text\"}}", number + 1))
            } else {
                Ok(Item::new(line))
            }
        })
        .collect()
}

/// One JSON object describing an item's outcome.
pub fn render_outcome(index: usize, item: &Item, outcome: &ItemOutcome) -> Value {
    let mut line = json!({ "index": index });
    if let Some(id) = &item.id {
        line["id"] = json!(id);
    }
    match outcome {
        Ok(result) => line["ok"] = json!(result),
        Err(e) => {
            line["error"] = json!({
                "kind": e.kind(),
                "message": e.to_string(),
            })
        }
    }
    line
}
