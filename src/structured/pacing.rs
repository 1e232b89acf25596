//! Per-model request pacing.
//!
//! Free-tier quotas are enforced per minute, so back-to-back calls to the
//! same model are spaced by a minimum interval. The [`Pacer`] only decides how
//! long to wait; the client performs the wait through its [`Sleeper`].

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Minimum spacing between calls to the same model, in the absence of configuration.
pub fn default_interval_for(model: &str) -> Duration {
    let model = model.to_lowercase();
    let secs = if model.contains("-pro") {
        12
    } else if model.contains("flash-lite") {
        4
    } else if model.contains("flash") {
        6
    } else if model.starts_with("gemma") {
        2
    } else {
        4
    };
    Duration::from_secs(secs)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PacingConfig {
    /// Applies to every model without a per-model entry.
    pub global_interval: Option<Duration>,
    /// Exact model name to interval.
    pub model_intervals: HashMap<String, Duration>,
}

impl PacingConfig {
    /// No spacing at all; used where calls must not be delayed.
    pub fn unpaced() -> Self {
        Self {
            global_interval: Some(Duration::ZERO),
            model_intervals: HashMap::new(),
        }
    }
}

/// Earliest permitted time of the next request, per model.
#[derive(Debug)]
pub struct Pacer {
    config: PacingConfig,
    next_allowed: HashMap<String, Instant>,
}

impl Pacer {
    pub fn new(config: PacingConfig) -> Self {
        Self {
            config,
            next_allowed: HashMap::new(),
        }
    }

    pub fn interval_for(&self, model: &str) -> Duration {
        self.config
            .model_intervals
            .get(model)
            .copied()
            .or(self.config.global_interval)
            .unwrap_or_else(|| default_interval_for(model))
    }

    /// Claim the next request slot for `model` and return how long to wait for it.
    pub fn reserve(&mut self, model: &str, now: Instant) -> Duration {
        let start = match self.next_allowed.get(model) {
            Some(earliest) if *earliest > now => *earliest,
            _ => now,
        };
        let interval = self.interval_for(model);
        self.next_allowed.insert(model.to_string(), start + interval);
        start - now
    }
}

/// Suspends the current task. Injected so tests can observe waits without sleeping.
#[allow(async_fn_in_trait)]
pub trait Sleeper {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
