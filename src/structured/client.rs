use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::error::{GenerationError, translate_provider_error};
use super::fallback::{build_fallback_prompt, extract_json_object};
use super::pacing::{PacingConfig, Pacer, Sleeper, TokioSleeper};
use super::provider::{Provider, ProviderError, ProviderRequest, ProviderResponse, SamplingParams};
use super::repair::repair;
use super::retry::RetryPolicy;
use super::schema::{CompiledSchema, SchemaError, Violation};
use super::{StructuredGenerator, StructuredOutput};

/// Everything a [`StructuredClient`] needs besides its provider.
#[derive(Debug, Clone, Default)]
pub struct ClientSettings {
    pub retry: RetryPolicy,
    pub pacing: PacingConfig,
    pub sampling: SamplingParams,
}

/// Structured generation on top of a [`Provider`].
///
/// Owns the pacing state for every model it talks to, which is why
/// generation takes `&mut self`.
pub struct StructuredClient<P, S = TokioSleeper> {
    provider: P,
    sleeper: S,
    retry: RetryPolicy,
    sampling: SamplingParams,
    pacer: Pacer,
    schemas: HashMap<&'static str, Arc<CompiledSchema>>,
}

/// A provider call that ended in an error after retries.
struct FailedCall {
    error: ProviderError,
    attempts: u32,
}

impl<P: Provider> StructuredClient<P> {
    pub fn new(provider: P, settings: ClientSettings) -> Self {
        Self::with_sleeper(provider, TokioSleeper, settings)
    }
}

impl<P: Provider, S: Sleeper> StructuredClient<P, S> {
    pub fn with_sleeper(provider: P, sleeper: S, settings: ClientSettings) -> Self {
        Self {
            provider,
            sleeper,
            retry: settings.retry,
            sampling: settings.sampling,
            pacer: Pacer::new(settings.pacing),
            schemas: HashMap::new(),
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn sleeper(&self) -> &S {
        &self.sleeper
    }

    fn compiled_schema<T: StructuredOutput>(&mut self) -> Result<Arc<CompiledSchema>, SchemaError> {
        if let Some(compiled) = self.schemas.get(T::SCHEMA_NAME) {
            return Ok(Arc::clone(compiled));
        }
        let compiled = Arc::new(T::schema().compile()?);
        self.schemas.insert(T::SCHEMA_NAME, Arc::clone(&compiled));
        Ok(compiled)
    }

    async fn pace(&mut self, model: &str) {
        let wait = self.pacer.reserve(model, Instant::now());
        if !wait.is_zero() {
            debug!(model, wait_ms = wait.as_millis() as u64, "pacing request");
            self.sleeper.sleep(wait).await;
        }
    }

    async fn send_with_retry(&mut self, request: &ProviderRequest) -> Result<ProviderResponse, FailedCall> {
        let mut attempt = 0u32;
        loop {
            self.pace(&request.model).await;
            match self.provider.complete(request).await {
                Ok(response) => return Ok(response),
                Err(error) if self.retry.should_retry(&error, attempt) => {
                    let delay = self.retry.delay_for(&error, attempt);
                    attempt += 1;
                    warn!(
                        model = %request.model,
                        attempt,
                        max_retries = self.retry.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        %error,
                        "rate limited, backing off"
                    );
                    self.sleeper.sleep(delay).await;
                }
                Err(error) => {
                    return Err(FailedCall {
                        error,
                        attempts: attempt + 1,
                    });
                }
            }
        }
    }

    fn translate(&self, model: &str, failed: FailedCall) -> GenerationError {
        translate_provider_error(
            model,
            failed.error,
            failed.attempts,
            self.retry.fail_fast_on_quota_exhaustion,
        )
    }

    async fn generate_via_fallback(
        &mut self,
        model: &str,
        prompt: &str,
        system_instruction: &str,
        seed: u64,
        schema: &CompiledSchema,
    ) -> Result<Value, GenerationError> {
        let request = ProviderRequest {
            model: model.to_string(),
            prompt: build_fallback_prompt(system_instruction, prompt, &schema.wire),
            system_instruction: None,
            response_schema: None,
            sampling: self.sampling,
            seed,
        };
        let response = match self.send_with_retry(&request).await {
            Ok(response) => response,
            Err(failed) => return Err(self.translate(model, failed)),
        };
        extract_json_object(&response.text).map(Value::Object)
    }
}

impl<P: Provider, S: Sleeper> StructuredGenerator for StructuredClient<P, S> {
    async fn generate<T: StructuredOutput>(
        &mut self,
        model: &str,
        prompt: &str,
        system_instruction: &str,
        seed: u64,
    ) -> Result<T, GenerationError> {
        let schema = self.compiled_schema::<T>()?;
        let request = ProviderRequest {
            model: model.to_string(),
            prompt: prompt.to_string(),
            system_instruction: Some(system_instruction.to_string()),
            response_schema: Some(schema.wire.clone()),
            sampling: self.sampling,
            seed,
        };

        let payload = match self.send_with_retry(&request).await {
            Ok(response) => serde_json::from_str::<Value>(&response.text).map_err(|e| {
                GenerationError::MalformedResponse(format!("structured response is not valid JSON: {e}"))
            })?,
            Err(failed) if failed.error.is_unsupported_feature() => {
                info!(
                    model,
                    schema = schema.name,
                    reason = %failed.error,
                    "structured output unsupported, switching to prompt-based JSON"
                );
                self.generate_via_fallback(model, prompt, system_instruction, seed, &schema)
                    .await?
            }
            Err(failed) => return Err(self.translate(model, failed)),
        };

        validate_payload::<T>(&schema, payload).map(T::normalized)
    }
}

/// Validate, and on failure repair once and validate again.
fn validate_payload<T: DeserializeOwned>(schema: &CompiledSchema, payload: Value) -> Result<T, GenerationError> {
    let violations = match conform::<T>(schema, &payload) {
        Ok(value) => return Ok(value),
        Err(violations) => violations,
    };
    debug!(
        schema = schema.name,
        violations = violations.len(),
        "payload failed validation, repairing"
    );

    let repaired = repair(payload, &schema.root);
    conform::<T>(schema, &repaired).map_err(|violations| GenerationError::Validation {
        schema: schema.name.to_string(),
        violations,
    })
}

fn conform<T: DeserializeOwned>(schema: &CompiledSchema, payload: &Value) -> Result<T, Vec<Violation>> {
    let violations = schema.root.validate(payload);
    if !violations.is_empty() {
        return Err(violations);
    }
    serde_json::from_value(payload.clone()).map_err(|e| {
        vec![Violation {
            path: "$".to_string(),
            message: e.to_string(),
        }]
    })
}
