use thiserror::Error;

use crate::cache::CacheError;
use crate::store::StoreError;
use crate::structured::{GenerationError, ProviderError, SchemaError};

#[derive(Debug, Error)]
pub enum ForgeError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("start_from={start_from} is out of range for {planned} planned items")]
    StartOutOfRange { start_from: usize, planned: usize },

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Replay cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}
