//! Wire types for the Gemini `generateContent` endpoint.
//!
//! Field names follow the REST API (camelCase); only the parts this crate
//! sends or reads are modelled.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    pub generation_config: GenerationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Some("user".into()),
            parts: vec![Part { text: Some(text.into()) }],
        }
    }

    /// System instructions carry no role.
    pub fn instruction(text: impl Into<String>) -> Self {
        Self {
            role: None,
            parts: vec![Part { text: Some(text.into()) }],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub candidate_count: u32,
    pub max_output_tokens: u32,
    pub seed: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_json_schema: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

impl GenerateContentResponse {
    /// Concatenated text parts of the first candidate.
    pub fn text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        let text: String = content.parts.iter().filter_map(|p| p.text.as_deref()).collect();
        if text.is_empty() { None } else { Some(text) }
    }
}

/// `{"error": {...}}` body returned with non-2xx statuses.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub code: u16,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub details: Vec<Value>,
}

impl ErrorBody {
    /// Delay suggested by a `google.rpc.RetryInfo` detail, if present.
    pub fn retry_delay(&self) -> Option<Duration> {
        self.details
            .iter()
            .filter_map(|detail| detail.get("retryDelay")?.as_str())
            .find_map(parse_retry_delay)
    }
}

/// Parse a protobuf duration string such as `"8s"` or `"1.5s"`.
pub fn parse_retry_delay(raw: &str) -> Option<Duration> {
    let seconds: f64 = raw.trim().strip_suffix('s')?.parse().ok()?;
    Duration::try_from_secs_f64(seconds).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_serializes_camel_case() {
        let request = GenerateContentRequest {
            contents: vec![Content::user("hi")],
            system_instruction: Some(Content::instruction("be brief")),
            generation_config: GenerationConfig {
                temperature: 0.0,
                top_p: 0.95,
                top_k: 20,
                candidate_count: 1,
                max_output_tokens: 4096,
                seed: 7,
                response_mime_type: Some("application/json".into()),
                response_json_schema: Some(json!({"type": "object"})),
            },
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["contents"][0]["role"], "user");
        assert_eq!(value["contents"][0]["parts"][0]["text"], "hi");
        assert!(value["systemInstruction"].get("role").is_none());
        assert_eq!(value["generationConfig"]["topK"], 20);
        assert_eq!(value["generationConfig"]["maxOutputTokens"], 4096);
        assert_eq!(value["generationConfig"]["responseMimeType"], "application/json");
        assert_eq!(value["generationConfig"]["responseJsonSchema"]["type"], "object");
    }

    #[test]
    fn plain_request_omits_structured_fields() {
        let config = GenerationConfig {
            temperature: 0.0,
            top_p: 0.95,
            top_k: 20,
            candidate_count: 1,
            max_output_tokens: 4096,
            seed: 0,
            response_mime_type: None,
            response_json_schema: None,
        };
        let value = serde_json::to_value(&config).unwrap();
        assert!(value.get("responseMimeType").is_none());
        assert!(value.get("responseJsonSchema").is_none());
    }

    #[test]
    fn response_text_joins_first_candidate_parts() {
        let response: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [
                {"content": {"role": "model", "parts": [{"text": "{\"a\":"}, {"text": "1}"}]}, "finishReason": "STOP"},
                {"content": {"parts": [{"text": "ignored"}]}}
            ]
        }))
        .unwrap();
        assert_eq!(response.text().as_deref(), Some("{\"a\":1}"));
    }

    #[test]
    fn response_without_text_yields_none() {
        let empty: GenerateContentResponse = serde_json::from_value(json!({})).unwrap();
        assert_eq!(empty.text(), None);
        let blocked: GenerateContentResponse =
            serde_json::from_value(json!({"candidates": [{"finishReason": "SAFETY"}]})).unwrap();
        assert_eq!(blocked.text(), None);
    }

    #[test]
    fn retry_info_detail_is_read() {
        let envelope: ErrorEnvelope = serde_json::from_value(json!({
            "error": {
                "code": 429,
                "message": "Resource exhausted",
                "status": "RESOURCE_EXHAUSTED",
                "details": [
                    {"@type": "type.googleapis.com/google.rpc.QuotaFailure"},
                    {"@type": "type.googleapis.com/google.rpc.RetryInfo", "retryDelay": "8s"}
                ]
            }
        }))
        .unwrap();
        assert_eq!(envelope.error.retry_delay(), Some(Duration::from_secs(8)));
    }

    #[test]
    fn retry_delay_parsing() {
        assert_eq!(parse_retry_delay("1.5s"), Some(Duration::from_millis(1500)));
        assert_eq!(parse_retry_delay("0s"), Some(Duration::ZERO));
        assert_eq!(parse_retry_delay("8"), None);
        assert_eq!(parse_retry_delay("-1s"), None);
        assert_eq!(parse_retry_delay("NaNs"), None);
        assert_eq!(parse_retry_delay("1e30s"), None);
        assert_eq!(parse_retry_delay("99999999999999999999s"), None);
    }
}
