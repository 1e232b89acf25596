//! Resilient structured generation.
//!
//! [`StructuredClient`] turns a prompt plus a [`StructuredOutput`] type into a
//! validated value, absorbing rate limits, pacing, models without native JSON
//! mode, and payloads that slightly overshoot their schema.

pub mod client;
pub mod error;
pub mod fallback;
pub mod pacing;
pub mod provider;
pub mod repair;
pub mod retry;
pub mod schema;

use serde::Serialize;
use serde::de::DeserializeOwned;

pub use client::{ClientSettings, StructuredClient};
pub use error::GenerationError;
pub use pacing::{PacingConfig, Pacer, Sleeper, TokioSleeper};
pub use provider::{Provider, ProviderError, ProviderRequest, ProviderResponse, SamplingParams};
pub use retry::RetryPolicy;
pub use schema::{CompiledSchema, SchemaDescriptor, SchemaError, SchemaNode, Violation};

/// A type the model can be asked to produce.
pub trait StructuredOutput: Serialize + DeserializeOwned {
    /// Stable name; part of every replay-cache key.
    const SCHEMA_NAME: &'static str;

    fn schema() -> SchemaDescriptor;

    /// Post-validation cleanup, such as removing duplicates.
    fn normalized(self) -> Self {
        self
    }
}

/// Something that can produce validated structured outputs, one call at a time.
#[allow(async_fn_in_trait)]
pub trait StructuredGenerator {
    async fn generate<T: StructuredOutput>(
        &mut self,
        model: &str,
        prompt: &str,
        system_instruction: &str,
        seed: u64,
    ) -> Result<T, GenerationError>;
}
