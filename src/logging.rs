//! `tracing` subscriber setup.
//!
//! Level precedence, highest first: `--verbose`, the `CHATFORGE_LOG`
//! environment variable, the `[logging]` table, the default (`info`).
//! Output always goes to stderr so stdout stays free for results.

use serde::{Deserialize, Serialize};
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::{EnvFilter, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::ForgeError;

pub const LOG_ENV_VAR: &str = "CHATFORGE_LOG";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// trace, debug, info, warn, error, off, or a full filter directive.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// `text` or `json`.
    #[serde(default = "default_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_format() -> String {
    "text".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_format(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogFormat {
    Text,
    Json,
}

fn parse_format(raw: &str) -> Result<LogFormat, ForgeError> {
    match raw.trim().to_lowercase().as_str() {
        "text" => Ok(LogFormat::Text),
        "json" => Ok(LogFormat::Json),
        other => Err(ForgeError::Config(format!("unknown log format {other:?}; expected text or json"))),
    }
}

/// The filter directive that wins for this process.
fn filter_directive(config: &LoggingConfig, verbose: bool, env_value: Option<String>) -> String {
    if verbose {
        return "debug".to_string();
    }
    env_value
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| config.level.clone())
}

pub fn init_logging(config: &LoggingConfig, verbose: bool) -> Result<(), ForgeError> {
    let directive = filter_directive(config, verbose, std::env::var(LOG_ENV_VAR).ok());
    let filter = EnvFilter::try_new(&directive)
        .map_err(|e| ForgeError::Config(format!("invalid log filter {directive:?}: {e}")))?;
    let base = Registry::default().with(filter);

    let result = match parse_format(&config.format)? {
        LogFormat::Json => base
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_writer(std::io::stderr),
            )
            .try_init(),
        LogFormat::Text => base
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_writer(std::io::stderr),
            )
            .try_init(),
    };
    result.map_err(|e| ForgeError::Config(format!("failed to install logger: {e}")))
}
