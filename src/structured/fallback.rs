//! Prompt-based JSON protocol for models without native structured output.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use super::error::GenerationError;

static FENCED_OBJECT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json)?\s*(\{.*\})\s*```").expect("invalid fenced JSON pattern")
});

/// Fold the system instruction, the request and the wire schema into one plain prompt.
pub fn build_fallback_prompt(system_instruction: &str, prompt: &str, wire_schema: &Value) -> String {
    let schema = serde_json::to_string_pretty(wire_schema).unwrap_or_else(|_| wire_schema.to_string());
    format!(
        "Follow these instructions exactly.\n\n\
         System instruction:\n{system_instruction}\n\n\
         User request:\n{prompt}\n\n\
         Return only valid JSON that matches this schema exactly:\n{schema}"
    )
}

/// Recover a JSON object from free-form model text.
///
/// A leading fenced block is unwrapped first. When the remaining text is not
/// valid JSON, the span from the first `{` to the last `}` is tried instead.
pub fn extract_json_object(text: &str) -> Result<Map<String, Value>, GenerationError> {
    let mut cleaned = text.trim();
    if cleaned.starts_with("```")
        && let Some(inner) = FENCED_OBJECT.captures(cleaned).and_then(|c| c.get(1))
    {
        cleaned = inner.as_str();
    }

    let parsed = match serde_json::from_str::<Value>(cleaned) {
        Ok(value) => value,
        Err(_) => {
            let (Some(start), Some(end)) = (cleaned.find('{'), cleaned.rfind('}')) else {
                return Err(GenerationError::MalformedResponse(
                    "fallback response did not contain a JSON object".to_string(),
                ));
            };
            if end < start {
                return Err(GenerationError::MalformedResponse(
                    "fallback response did not contain a JSON object".to_string(),
                ));
            }
            serde_json::from_str::<Value>(&cleaned[start..=end]).map_err(|e| {
                GenerationError::MalformedResponse(format!("fallback JSON could not be parsed: {e}"))
            })?
        }
    };

    match parsed {
        Value::Object(map) => Ok(map),
        _ => Err(GenerationError::MalformedResponse(
            "fallback response must be a JSON object".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn prompt_embeds_every_part() {
        let prompt = build_fallback_prompt("Be terse.", "Describe a cat.", &json!({"type": "object"}));
        assert!(prompt.starts_with("Follow these instructions exactly."));
        assert!(prompt.contains("System instruction:\nBe terse."));
        assert!(prompt.contains("User request:\nDescribe a cat."));
        assert!(prompt.ends_with("{\n  \"type\": \"object\"\n}"));
    }

    #[test]
    fn fenced_block_is_unwrapped() {
        let map = extract_json_object("```json\n{\"a\": 1}\n```").unwrap();
        assert_eq!(map["a"], 1);
    }

    #[test]
    fn embedded_object_is_located() {
        let map = extract_json_object("Sure! Here it is: {\"a\": {\"b\": 2}} Hope that helps.").unwrap();
        assert_eq!(map["a"]["b"], 2);
    }

    #[test]
    fn text_without_object_is_malformed() {
        assert!(matches!(
            extract_json_object("no json here"),
            Err(GenerationError::MalformedResponse(_))
        ));
        assert!(matches!(
            extract_json_object("} backwards {"),
            Err(GenerationError::MalformedResponse(_))
        ));
    }

    #[test]
    fn non_object_top_level_is_malformed() {
        assert!(matches!(
            extract_json_object("[1, 2, 3]"),
            Err(GenerationError::MalformedResponse(_))
        ));
    }
}
