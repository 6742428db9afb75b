//! Configuration surface of the router.

use router_core::ProviderConfig;
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;
use validator::Validate;

/// Error type for configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// The file contents could not be parsed.
    #[error("failed to parse config: {0}")]
    Parse(String),

    /// A `${VAR}` placeholder referenced an unset environment variable.
    #[error("environment variable '{0}' referenced in config is not set")]
    MissingEnvVar(String),

    /// The parsed configuration violates an invariant.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl From<ConfigError> for router_core::RouterError {
    fn from(err: ConfigError) -> Self {
        Self::configuration(err.to_string())
    }
}

/// Structured configuration mapping accepted by the router core.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RouterConfig {
    /// Provider declarations.
    pub providers: Vec<ProviderConfig>,

    /// Per-priority overrides of the scoring weight profiles.
    #[serde(default)]
    pub routing_weights: Option<RoutingWeightOverrides>,

    /// Circuit breaker settings.
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerSettings,

    /// Sliding window width in seconds.
    #[serde(default = "defaults::window_seconds")]
    #[validate(range(min = 1))]
    pub window_seconds: u64,

    /// Fraction of each provider's RPM capacity reserved for high
    /// priority traffic.
    #[serde(default = "defaults::reserve_fraction")]
    #[validate(range(min = 0.0, max = 0.99))]
    pub high_priority_reserve_fraction: f64,

    /// Session-affinity binding lifetime in seconds.
    #[serde(default = "defaults::session_ttl_seconds")]
    #[validate(range(min = 1))]
    pub session_ttl_seconds: u64,

    /// Latency EMA smoothing factor.
    #[serde(default = "defaults::ema_alpha")]
    #[validate(range(min = 0.0001, max = 1.0))]
    pub ema_alpha: f64,

    /// Exhaustion predictor settings.
    #[serde(default)]
    pub exhaustion: ExhaustionSettings,

    /// When present, selects the shared state backend and the shared
    /// circuit-breaker mode.
    #[serde(default)]
    pub shared_store_url: Option<String>,

    /// Whether a pinned request may still fall back to other providers
    /// on failure.
    #[serde(default = "defaults::forced_fallback")]
    pub forced_fallback: bool,

    /// Optional overall budget for the fallback loop, in milliseconds.
    /// Unset means unlimited.
    #[serde(default)]
    pub fallback_budget_ms: Option<u64>,
}

impl RouterConfig {
    /// Minimal configuration over a set of provider declarations, with
    /// every tunable at its default.
    #[must_use]
    pub fn with_providers(providers: Vec<ProviderConfig>) -> Self {
        Self {
            providers,
            routing_weights: None,
            circuit_breaker: CircuitBreakerSettings::default(),
            window_seconds: defaults::window_seconds(),
            high_priority_reserve_fraction: defaults::reserve_fraction(),
            session_ttl_seconds: defaults::session_ttl_seconds(),
            ema_alpha: defaults::ema_alpha(),
            exhaustion: ExhaustionSettings::default(),
            shared_store_url: None,
            forced_fallback: defaults::forced_fallback(),
            fallback_budget_ms: None,
        }
    }

    /// Sliding window width.
    #[must_use]
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }

    /// Session binding lifetime.
    #[must_use]
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_seconds)
    }

    /// Fallback loop budget, when configured.
    #[must_use]
    pub fn fallback_budget(&self) -> Option<Duration> {
        self.fallback_budget_ms.map(Duration::from_millis)
    }

    /// Validate field ranges and cross-field invariants.
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] on duplicate provider names,
    /// non-positive quotas, malformed weights, or weight profiles that do
    /// not sum to 1.0.
    pub fn validate_config(&self) -> Result<(), ConfigError> {
        Validate::validate(self).map_err(|e| ConfigError::Invalid(e.to_string()))?;

        let mut seen = HashSet::new();
        for provider in &self.providers {
            if provider.name.is_empty() {
                return Err(ConfigError::Invalid("provider name is empty".to_string()));
            }
            if !seen.insert(provider.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate provider name '{}'",
                    provider.name
                )));
            }
            if provider.rpm_limit == 0 {
                return Err(ConfigError::Invalid(format!(
                    "provider '{}' has rpm_limit 0",
                    provider.name
                )));
            }
            if provider.tpm_limit == 0 {
                return Err(ConfigError::Invalid(format!(
                    "provider '{}' has tpm_limit 0",
                    provider.name
                )));
            }
            if !provider.weight.is_finite() || provider.weight < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "provider '{}' has invalid weight {}",
                    provider.name, provider.weight
                )));
            }
        }

        if let Some(overrides) = &self.routing_weights {
            for (lane, profile) in [
                ("high", overrides.high.as_ref()),
                ("normal", overrides.normal.as_ref()),
                ("low", overrides.low.as_ref()),
            ] {
                if let Some(profile) = profile {
                    profile
                        .check_sum()
                        .map_err(|e| ConfigError::Invalid(format!("{lane} weights: {e}")))?;
                }
            }
        }

        Ok(())
    }
}

/// Per-priority weight profile overrides.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RoutingWeightOverrides {
    /// Override for the high priority lane.
    #[serde(default)]
    pub high: Option<WeightProfile>,
    /// Override for the normal priority lane.
    #[serde(default)]
    pub normal: Option<WeightProfile>,
    /// Override for the low priority lane.
    #[serde(default)]
    pub low: Option<WeightProfile>,
}

/// Scoring weights for one priority lane. Must sum to 1.0.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
pub struct WeightProfile {
    /// Weight of the capacity score.
    pub capacity: f64,
    /// Weight of the latency score.
    pub latency: f64,
    /// Weight of the provider's static weight.
    #[serde(rename = "static")]
    pub static_weight: f64,
}

impl WeightProfile {
    /// Error unless the three weights sum to 1.0 (within 1e-6).
    pub fn check_sum(&self) -> Result<(), String> {
        let sum = self.capacity + self.latency + self.static_weight;
        if (sum - 1.0).abs() > 1e-6 {
            return Err(format!("capacity + latency + static must equal 1.0, got {sum}"));
        }
        Ok(())
    }
}

/// Circuit breaker tunables.
#[derive(Debug, Clone, Deserialize)]
pub struct CircuitBreakerSettings {
    /// Consecutive failures before the circuit opens.
    #[serde(default = "defaults::failure_threshold")]
    pub failure_threshold: u32,
    /// Open-state duration in seconds.
    #[serde(default = "defaults::cooldown_seconds")]
    pub cooldown_seconds: u64,
}

impl CircuitBreakerSettings {
    /// Open-state duration.
    #[must_use]
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_seconds)
    }
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: defaults::failure_threshold(),
            cooldown_seconds: defaults::cooldown_seconds(),
        }
    }
}

/// Exhaustion predictor tunables.
#[derive(Debug, Clone, Deserialize)]
pub struct ExhaustionSettings {
    /// Width of the short-term rate sub-window, in seconds.
    #[serde(default = "defaults::short_window_seconds")]
    pub short_window_seconds: u64,
    /// How far ahead consumption is projected, in seconds.
    #[serde(default = "defaults::lookahead_seconds")]
    pub lookahead_seconds: u64,
    /// Short-term rate must exceed this multiple of the long-term
    /// average before a provider is considered at risk.
    #[serde(default = "defaults::multiplier")]
    pub multiplier: f64,
}

impl Default for ExhaustionSettings {
    fn default() -> Self {
        Self {
            short_window_seconds: defaults::short_window_seconds(),
            lookahead_seconds: defaults::lookahead_seconds(),
            multiplier: defaults::multiplier(),
        }
    }
}

mod defaults {
    pub(super) fn window_seconds() -> u64 {
        60
    }
    pub(super) fn reserve_fraction() -> f64 {
        0.2
    }
    pub(super) fn session_ttl_seconds() -> u64 {
        3600
    }
    pub(super) fn ema_alpha() -> f64 {
        0.2
    }
    pub(super) fn forced_fallback() -> bool {
        true
    }
    pub(super) fn failure_threshold() -> u32 {
        5
    }
    pub(super) fn cooldown_seconds() -> u64 {
        30
    }
    pub(super) fn short_window_seconds() -> u64 {
        30
    }
    pub(super) fn lookahead_seconds() -> u64 {
        120
    }
    pub(super) fn multiplier() -> f64 {
        1.5
    }
}
