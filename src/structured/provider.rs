//! The boundary between the structured client and a hosted model.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Message fragments that identify a quota which will not reset within a run.
const QUOTA_EXHAUSTION_MARKERS: &[&str] = &[
    "perday",
    "per day",
    "daily",
    "billing limit",
    "spending cap",
];

/// Sampling parameters forwarded verbatim to the provider.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default = "default_top_k")]
    pub top_k: u32,
    #[serde(default = "default_candidate_count")]
    pub candidate_count: u32,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
}

fn default_temperature() -> f32 {
    0.0
}

fn default_top_p() -> f32 {
    0.95
}

fn default_top_k() -> u32 {
    20
}

fn default_candidate_count() -> u32 {
    1
}

fn default_max_output_tokens() -> u32 {
    4096
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            top_p: default_top_p(),
            top_k: default_top_k(),
            candidate_count: default_candidate_count(),
            max_output_tokens: default_max_output_tokens(),
        }
    }
}

/// One completion request.
///
/// With `response_schema` set the provider is asked for native structured
/// output; without it the request is a plain text completion.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderRequest {
    pub model: String,
    pub prompt: String,
    pub system_instruction: Option<String>,
    pub response_schema: Option<Value>,
    pub sampling: SamplingParams,
    pub seed: u64,
}

impl ProviderRequest {
    pub fn is_structured(&self) -> bool {
        self.response_schema.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderResponse {
    pub text: String,
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("permission denied (status {status}): {message}")]
    PermissionDenied { status: u16, message: String },

    #[error("feature not supported by model: {message}")]
    UnsupportedFeature { message: String },

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ProviderError::RateLimited { .. })
    }

    pub fn is_unsupported_feature(&self) -> bool {
        matches!(self, ProviderError::UnsupportedFeature { .. })
    }

    /// Server-suggested wait before the next attempt, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ProviderError::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// A rate limit whose wording points at a daily or billing quota.
    pub fn is_quota_exhausted(&self) -> bool {
        match self {
            ProviderError::RateLimited { message, .. } => {
                let lowered = message.to_lowercase();
                QUOTA_EXHAUSTION_MARKERS.iter().any(|marker| lowered.contains(marker))
            }
            _ => false,
        }
    }

    pub fn message(&self) -> String {
        match self {
            ProviderError::RateLimited { message, .. }
            | ProviderError::PermissionDenied { message, .. }
            | ProviderError::UnsupportedFeature { message }
            | ProviderError::Api { message, .. }
            | ProviderError::InvalidResponse(message) => message.clone(),
            ProviderError::Network(err) => err.to_string(),
        }
    }
}

/// A hosted model that can complete one request.
#[allow(async_fn_in_trait)]
pub trait Provider {
    async fn complete(&self, request: &ProviderRequest) -> Result<ProviderResponse, ProviderError>;
}
