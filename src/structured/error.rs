use thiserror::Error;

use super::provider::ProviderError;
use super::schema::{SchemaError, Violation};

/// Terminal failure of one structured generation call.
///
/// Provider failures are translated here into messages an operator can act on.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error(
        "Google API key is blocked because Google flagged it as leaked. Create a new key in Google AI Studio, update `GOOGLE_API_KEY` or `GEMINI_API_KEY`, and retry."
    )]
    LeakedKey { message: String },

    #[error(
        "Model provider request was denied. Check that the API key is valid and has access to the selected model `{model}`. Provider said: {message}"
    )]
    PermissionDenied { model: String, message: String },

    #[error(
        "Model provider rate limit was hit {attempts} times in a row. Wait a bit, reduce request volume, or increase retry settings. For long runs, restart with `--resume-from-cache` to continue from already completed items."
    )]
    RateLimitExhausted { attempts: u32, message: String },

    #[error(
        "Model provider quota is exhausted and will not reset within this run ({message}). Restart with `--resume-from-cache` once the quota window reopens."
    )]
    QuotaExhausted { message: String },

    #[error("Model provider request failed: {0}")]
    Provider(ProviderError),

    #[error("Model returned malformed output: {0}")]
    MalformedResponse(String),

    #[error("`{schema}` payload failed validation after repair: {}", join_violations(.violations))]
    Validation {
        schema: String,
        violations: Vec<Violation>,
    },

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

fn join_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(Violation::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Turn a provider failure that ended a call into its user-facing form.
pub fn translate_provider_error(
    model: &str,
    error: ProviderError,
    attempts: u32,
    fail_fast_on_quota_exhaustion: bool,
) -> GenerationError {
    match error {
        ProviderError::PermissionDenied { status, message }
            if status == 403 && message.to_lowercase().contains("reported as leaked") =>
        {
            GenerationError::LeakedKey { message }
        }
        ProviderError::PermissionDenied { message, .. } => GenerationError::PermissionDenied {
            model: model.to_string(),
            message,
        },
        err @ ProviderError::RateLimited { .. } => {
            if fail_fast_on_quota_exhaustion && err.is_quota_exhausted() {
                GenerationError::QuotaExhausted {
                    message: err.message(),
                }
            } else {
                GenerationError::RateLimitExhausted {
                    attempts,
                    message: err.message(),
                }
            }
        }
        other => GenerationError::Provider(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaked_key_message() {
        let err = translate_provider_error(
            "gemini-2.5-flash",
            ProviderError::PermissionDenied {
                status: 403,
                message: "Your API key was reported as leaked. Please use another API key.".into(),
            },
            1,
            true,
        );
        let text = err.to_string();
        assert!(text.contains("flagged it as leaked"));
        assert!(text.contains("Create a new key"));
    }

    #[test]
    fn other_denials_name_the_model() {
        let err = translate_provider_error(
            "gemini-2.5-pro",
            ProviderError::PermissionDenied {
                status: 403,
                message: "Permission denied".into(),
            },
            1,
            true,
        );
        assert!(matches!(err, GenerationError::PermissionDenied { .. }));
        assert!(err.to_string().contains("gemini-2.5-pro"));
    }

    #[test]
    fn exhausted_rate_limit_suggests_resume() {
        let err = translate_provider_error(
            "m",
            ProviderError::RateLimited {
                message: "Resource exhausted".into(),
                retry_after: None,
            },
            11,
            true,
        );
        assert!(matches!(err, GenerationError::RateLimitExhausted { attempts: 11, .. }));
        assert!(err.to_string().contains("--resume-from-cache"));
    }

    #[test]
    fn daily_quota_becomes_quota_exhausted() {
        let err = translate_provider_error(
            "m",
            ProviderError::RateLimited {
                message: "Quota exceeded for limit 'GenerateContentRequestsPerDayPerProjectPerModel-FreeTier'.".into(),
                retry_after: None,
            },
            1,
            true,
        );
        assert!(matches!(err, GenerationError::QuotaExhausted { .. }));
    }

    #[test]
    fn anything_else_is_generic() {
        let err = translate_provider_error(
            "m",
            ProviderError::Api {
                status: 500,
                message: "backend error".into(),
            },
            1,
            true,
        );
        assert_eq!(
            err.to_string(),
            "Model provider request failed: API error (status 500): backend error"
        );
    }

    #[test]
    fn validation_lists_violations() {
        let err = GenerationError::Validation {
            schema: "Draft".into(),
            violations: vec![
                Violation {
                    path: "$.title".into(),
                    message: "too short".into(),
                },
                Violation {
                    path: "$.turns".into(),
                    message: "missing required field".into(),
                },
            ],
        };
        assert_eq!(
            err.to_string(),
            "`Draft` payload failed validation after repair: $.title: too short; $.turns: missing required field"
        );
    }
}
