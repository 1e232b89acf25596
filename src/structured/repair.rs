//! Deterministic repair of payloads that almost satisfy their schema.
//!
//! Models routinely overshoot length limits by a few characters or emit one
//! list element too many. Rather than discard the whole response, the payload
//! is walked alongside its [`SchemaNode`] tree and trimmed into shape.

use serde_json::Value;

use super::schema::SchemaNode;

const ELLIPSIS: char = '…';

/// Repair `value` against `node`. Values the schema does not describe pass through.
pub fn repair(value: Value, node: &SchemaNode) -> Value {
    match (node, value) {
        (SchemaNode::Object { properties, .. }, Value::Object(fields)) => Value::Object(
            fields
                .into_iter()
                .map(|(name, field)| {
                    let repaired = match properties.get(&name) {
                        Some(child) => repair(field, child),
                        None => field,
                    };
                    (name, repaired)
                })
                .collect(),
        ),
        (SchemaNode::Array { items, max_items, .. }, Value::Array(mut elements)) => {
            if let Some(max) = max_items {
                elements.truncate(*max);
            }
            Value::Array(elements.into_iter().map(|e| repair(e, items)).collect())
        }
        (SchemaNode::String { max_length, .. }, Value::String(text)) => {
            Value::String(repair_text(&text, *max_length))
        }
        (_, other) => other,
    }
}

/// Trim `text`; if it exceeds `max_length` characters, cut it to fit with a trailing `…`.
pub fn repair_text(text: &str, max_length: Option<usize>) -> String {
    match max_length {
        Some(max) if text.chars().count() > max => {
            let kept: String = text.chars().take(max.saturating_sub(1)).collect();
            let mut truncated = kept.trim_end().to_string();
            truncated.push(ELLIPSIS);
            truncated
        }
        _ => text.trim().to_string(),
    }
}
