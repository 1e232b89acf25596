use std::time::Duration;

use reqwest::{Client, StatusCode};
use tracing::debug;

use super::types::{Content, ErrorEnvelope, GenerateContentRequest, GenerateContentResponse, GenerationConfig};
use crate::structured::{Provider, ProviderError, ProviderRequest, ProviderResponse};

pub const API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// 400-level wording Gemini uses when a model lacks JSON mode or system prompts.
const CAPABILITY_MARKERS: &[&str] = &[
    "json mode is not enabled",
    "response schema",
    "response_json_schema",
    "developer instruction is not enabled",
    "system instruction is not enabled",
];

/// [`Provider`] backed by the Gemini REST API.
pub struct GeminiClient {
    api_key: String,
    client: Client,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: String, timeout: Duration) -> Result<Self, ProviderError> {
        Self::with_base_url(api_key, API_URL.to_string(), timeout)
    }

    /// Create a client pointing at a custom base URL (useful for testing).
    pub fn with_base_url(api_key: String, base_url: String, timeout: Duration) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            api_key,
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/models/{model}:generateContent", self.base_url)
    }
}

fn build_body(request: &ProviderRequest) -> GenerateContentRequest {
    let structured = request.is_structured();
    GenerateContentRequest {
        contents: vec![Content::user(&request.prompt)],
        system_instruction: request.system_instruction.as_deref().map(Content::instruction),
        generation_config: GenerationConfig {
            temperature: request.sampling.temperature,
            top_p: request.sampling.top_p,
            top_k: request.sampling.top_k,
            candidate_count: request.sampling.candidate_count,
            max_output_tokens: request.sampling.max_output_tokens,
            seed: request.seed,
            response_mime_type: structured.then(|| "application/json".to_string()),
            response_json_schema: request.response_schema.clone(),
        },
    }
}

/// Map a non-success response onto a [`ProviderError`].
///
/// `header_hint` is the parsed `Retry-After` header; a `RetryInfo` detail in
/// the body takes precedence over it.
pub fn classify_error(status: u16, body: &str, header_hint: Option<Duration>) -> ProviderError {
    let envelope = serde_json::from_str::<ErrorEnvelope>(body).ok();
    let message = match &envelope {
        Some(envelope) if !envelope.error.message.is_empty() => envelope.error.message.clone(),
        _ if body.trim().is_empty() => "unknown error".to_string(),
        _ => body.trim().to_string(),
    };

    match status {
        429 => ProviderError::RateLimited {
            retry_after: envelope.and_then(|e| e.error.retry_delay()).or(header_hint),
            message,
        },
        401 | 403 => ProviderError::PermissionDenied { status, message },
        400 if is_capability_error(&message) => ProviderError::UnsupportedFeature { message },
        _ => ProviderError::Api { status, message },
    }
}

fn is_capability_error(message: &str) -> bool {
    let lowered = message.to_lowercase();
    CAPABILITY_MARKERS.iter().any(|marker| lowered.contains(marker))
}

impl Provider for GeminiClient {
    async fn complete(&self, request: &ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        debug!(model = %request.model, structured = request.is_structured(), "sending generateContent");
        let response = self
            .client
            .post(self.endpoint(&request.model))
            .header("x-goog-api-key", &self.api_key)
            .json(&build_body(request))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let header_hint = if status == StatusCode::TOO_MANY_REQUESTS {
                response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.trim().parse::<u64>().ok())
                    .map(Duration::from_secs)
            } else {
                None
            };
            let body = response.text().await.unwrap_or_default();
            return Err(classify_error(status.as_u16(), &body, header_hint));
        }

        let body = response.json::<GenerateContentResponse>().await?;
        let text = body
            .text()
            .ok_or_else(|| ProviderError::InvalidResponse("response contained no candidate text".into()))?;
        Ok(ProviderResponse { text })
    }
}
