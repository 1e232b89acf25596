//! Configuration loaded from `chatforge.toml`.
//!
//! Every key has a default, so a missing file or a partial file is fine.
//! Secrets and model choices can be overridden from the environment.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ForgeError;
use crate::gemini::API_URL;
use crate::logging::LoggingConfig;
use crate::structured::{ClientSettings, PacingConfig, RetryPolicy, SamplingParams};

pub const DEFAULT_CONFIG_FILE: &str = "chatforge.toml";

/// Checked in order; the first non-empty value wins.
const API_KEY_VARS: &[&str] = &["GOOGLE_API_KEY", "GEMINI_API_KEY", "LLM_API_KEY"];

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model used when no role-specific model is configured.
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default)]
    pub generation_model: Option<String>,

    #[serde(default)]
    pub evaluation_model: Option<String>,

    /// Dataset language when `--language` is not given.
    #[serde(default = "default_language")]
    pub language: String,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,

    #[serde(default = "default_true")]
    pub fail_fast_on_quota_exhaustion: bool,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    #[serde(default)]
    pub sampling: SamplingParams,

    #[serde(default)]
    pub pacing: PacingSection,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// `[pacing]` table. Unset intervals fall back to per-model defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PacingSection {
    #[serde(default)]
    pub min_interval_ms: Option<u64>,
    /// Model name to minimum interval in milliseconds.
    #[serde(default)]
    pub models: BTreeMap<String, u64>,
}

fn default_base_url() -> String {
    API_URL.to_string()
}

fn default_model() -> String {
    "gemini-2.5-flash-lite".to_string()
}

fn default_language() -> String {
    "uk".to_string()
}

fn default_max_retries() -> u32 {
    10
}

fn default_retry_base_delay_ms() -> u64 {
    3000
}

fn default_retry_max_delay_ms() -> u64 {
    60_000
}

fn default_true() -> bool {
    true
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from(".cache/chatforge")
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_base_url(),
            model: default_model(),
            generation_model: None,
            evaluation_model: None,
            language: default_language(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
            fail_fast_on_quota_exhaustion: default_true(),
            request_timeout_secs: default_request_timeout_secs(),
            cache_dir: default_cache_dir(),
            sampling: SamplingParams::default(),
            pacing: PacingSection::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load `path`, or `chatforge.toml` in the current directory, then apply
    /// environment overrides.
    ///
    /// A missing default file yields defaults; a missing explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ForgeError> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    fn from_file(path: Option<&Path>) -> Result<Self, ForgeError> {
        let (path, explicit) = match path {
            Some(path) => (path, true),
            None => (Path::new(DEFAULT_CONFIG_FILE), false),
        };
        if !path.exists() {
            if explicit {
                return Err(ForgeError::Config(format!("config file {} does not exist", path.display())));
            }
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str::<AppConfig>(&contents)?)
    }

    /// Environment variables take precedence over the file.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ForgeError> {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(key) = API_KEY_VARS.iter().find_map(|name| non_empty(*name)) {
            self.api_key = key;
        }
        if let Some(model) = non_empty("LLM_MODEL") {
            self.model = model;
        }
        if let Some(model) = non_empty("GENERATION_MODEL") {
            self.generation_model = Some(model);
        }
        if let Some(model) = non_empty("EVALUATION_MODEL") {
            self.evaluation_model = Some(model);
        }
        if let Some(raw) = non_empty("LLM_MAX_RETRIES") {
            self.max_retries = raw
                .trim()
                .parse()
                .map_err(|_| ForgeError::Config(format!("LLM_MAX_RETRIES must be a non-negative integer, got {raw:?}")))?;
        }
        Ok(())
    }

    /// CLI override, then `generation_model`, then `model`.
    pub fn resolve_generation_model(&self, cli_override: Option<&str>) -> String {
        resolve(cli_override, self.generation_model.as_deref(), &self.model)
    }

    /// CLI override, then `evaluation_model`, then `model`.
    pub fn resolve_evaluation_model(&self, cli_override: Option<&str>) -> String {
        resolve(cli_override, self.evaluation_model.as_deref(), &self.model)
    }

    pub fn require_api_key(&self) -> Result<&str, ForgeError> {
        let key = self.api_key.trim();
        if key.is_empty() {
            return Err(ForgeError::Config(format!(
                "no API key configured; set one of {} or `api_key` in {DEFAULT_CONFIG_FILE}",
                API_KEY_VARS.join(", ")
            )));
        }
        Ok(key)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
            fail_fast_on_quota_exhaustion: self.fail_fast_on_quota_exhaustion,
        }
    }

    pub fn pacing_config(&self) -> PacingConfig {
        PacingConfig {
            global_interval: self.pacing.min_interval_ms.map(Duration::from_millis),
            model_intervals: self
                .pacing
                .models
                .iter()
                .map(|(model, ms)| (model.clone(), Duration::from_millis(*ms)))
                .collect(),
        }
    }

    pub fn client_settings(&self) -> ClientSettings {
        ClientSettings {
            retry: self.retry_policy(),
            pacing: self.pacing_config(),
            sampling: self.sampling,
        }
    }
}

fn resolve(cli_override: Option<&str>, role_model: Option<&str>, fallback: &str) -> String {
    cli_override
        .or(role_model)
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .unwrap_or(fallback)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn default_config_values() {
        let config = AppConfig::default();
        assert_eq!(config.model, "gemini-2.5-flash-lite");
        assert_eq!(config.language, "uk");
        assert_eq!(config.max_retries, 10);
        assert_eq!(config.retry_policy(), RetryPolicy::default());
        assert_eq!(config.sampling, SamplingParams::default());
        assert_eq!(config.cache_dir, PathBuf::from(".cache/chatforge"));
        assert!(config.api_key.is_empty());
    }

    #[test]
    fn deserialize_partial_toml() {
        let toml_str = r#"
            api_key = "from-file"
            max_retries = 5
            evaluation_model = "gemini-2.5-pro"

            [sampling]
            temperature = 0.7

            [pacing]
            min_interval_ms = 1500

            [pacing.models]
            "gemma-3-27b-it" = 250

            [logging]
            format = "json"
        "#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.api_key, "from-file");
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.sampling.temperature, 0.7);
        assert_eq!(config.sampling.top_k, 20);
        assert_eq!(config.retry_base_delay_ms, 3000);

        let pacing = config.pacing_config();
        assert_eq!(pacing.global_interval, Some(Duration::from_millis(1500)));
        assert_eq!(pacing.model_intervals["gemma-3-27b-it"], Duration::from_millis(250));
        assert_eq!(config.resolve_evaluation_model(None), "gemini-2.5-pro");
        assert_eq!(config.resolve_generation_model(None), "gemini-2.5-flash-lite");
    }

    #[test]
    fn load_falls_back_to_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = AppConfig::from_file(Some(&dir.path().join("missing.toml")));
        assert!(matches!(config, Err(ForgeError::Config(_))));

        let path = dir.path().join("chatforge.toml");
        std::fs::write(&path, "language = \"en\"\n").unwrap();
        let config = AppConfig::from_file(Some(&path)).unwrap();
        assert_eq!(config.language, "en");
        assert_eq!(config.max_retries, 10);
    }

    #[test]
    fn api_key_precedence() {
        let mut config = AppConfig {
            api_key: "from-file".into(),
            ..AppConfig::default()
        };
        config
            .apply_env_overrides(env(&[("GOOGLE_API_KEY", " "), ("GEMINI_API_KEY", "gemini"), ("LLM_API_KEY", "llm")]))
            .unwrap();
        assert_eq!(config.api_key, "gemini");

        let mut untouched = AppConfig {
            api_key: "from-file".into(),
            ..AppConfig::default()
        };
        untouched.apply_env_overrides(env(&[])).unwrap();
        assert_eq!(untouched.require_api_key().unwrap(), "from-file");
    }

    #[test]
    fn model_resolution_order() {
        let mut config = AppConfig::default();
        config
            .apply_env_overrides(env(&[("LLM_MODEL", "gemini-2.5-flash"), ("GENERATION_MODEL", "gemma-3-27b-it")]))
            .unwrap();
        assert_eq!(config.resolve_generation_model(None), "gemma-3-27b-it");
        assert_eq!(config.resolve_generation_model(Some("gemini-2.5-pro")), "gemini-2.5-pro");
        assert_eq!(config.resolve_evaluation_model(None), "gemini-2.5-flash");
        assert_eq!(config.resolve_evaluation_model(Some("  ")), "gemini-2.5-flash");
    }

    #[test]
    fn max_retries_from_env() {
        let mut config = AppConfig::default();
        config.apply_env_overrides(env(&[("LLM_MAX_RETRIES", "2")])).unwrap();
        assert_eq!(config.retry_policy().max_retries, 2);

        let err = config.apply_env_overrides(env(&[("LLM_MAX_RETRIES", "many")])).unwrap_err();
        assert!(err.to_string().contains("LLM_MAX_RETRIES"));
    }

    #[test]
    fn missing_api_key_is_config_error() {
        let err = AppConfig::default().require_api_key().unwrap_err();
        assert!(matches!(err, ForgeError::Config(_)));
        assert!(err.to_string().contains("GOOGLE_API_KEY"));
    }
}
