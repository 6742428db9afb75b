//! Configuration loading.
//!
//! Files are interpolated before parsing: every `${VAR}` placeholder is
//! replaced with the value of the environment variable `VAR`, and an
//! unset variable is a hard error rather than an empty string.

use regex::Regex;
use std::path::Path;
use tracing::info;

use crate::model::{ConfigError, RouterConfig};

/// Known provider environment variables for [`RouterConfig::from_env`]:
/// `(env var, provider name, default model)`.
const KNOWN_PROVIDER_ENV: &[(&str, &str, &str)] = &[
    ("OPENAI_API_KEY", "openai", "gpt-4o"),
    ("ANTHROPIC_API_KEY", "anthropic", "claude-3-5-sonnet-latest"),
    ("GOOGLE_API_KEY", "google", "gemini-1.5-pro"),
];

/// Default quotas assumed for env-derived providers.
const ENV_DEFAULT_RPM: u32 = 60;
const ENV_DEFAULT_TPM: u32 = 100_000;

impl RouterConfig {
    /// Load a configuration file, dispatching on its extension
    /// (`.yaml`/`.yml` or `.json`).
    ///
    /// # Errors
    /// Returns error on I/O failure, unknown extension, missing
    /// interpolation variables, parse failure, or invalid configuration.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let interpolated = interpolate_env(&raw)?;

        let config: Self = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml" | "yml") => serde_yaml::from_str(&interpolated)
                .map_err(|e| ConfigError::Parse(e.to_string()))?,
            Some("json") => serde_json::from_str(&interpolated)
                .map_err(|e| ConfigError::Parse(e.to_string()))?,
            other => {
                return Err(ConfigError::Parse(format!(
                    "unsupported config extension {other:?} (expected yaml, yml, or json)"
                )))
            }
        };

        config.validate_config()?;
        info!(
            path = %path.display(),
            providers = config.providers.len(),
            "configuration loaded"
        );
        Ok(config)
    }

    /// Derive a configuration from the fixed set of well-known provider
    /// environment variables, with default quotas.
    ///
    /// `ROUTER_SHARED_STORE_URL` selects the shared state backend when
    /// set.
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] when none of the known variables
    /// is set.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut providers = Vec::new();
        for (var, name, model) in KNOWN_PROVIDER_ENV {
            if let Ok(key) = std::env::var(var) {
                if key.is_empty() {
                    continue;
                }
                providers.push(
                    serde_json::from_value(serde_json::json!({
                        "name": name,
                        "model": model,
                        "rpm_limit": ENV_DEFAULT_RPM,
                        "tpm_limit": ENV_DEFAULT_TPM,
                        "api_key": key,
                    }))
                    .map_err(|e| ConfigError::Parse(e.to_string()))?,
                );
            }
        }

        if providers.is_empty() {
            return Err(ConfigError::Invalid(
                "no known provider environment variables set".to_string(),
            ));
        }

        let mut config = Self::with_providers(providers);
        config.shared_store_url = std::env::var("ROUTER_SHARED_STORE_URL").ok();
        config.validate_config()?;
        Ok(config)
    }
}

/// Replace every `${VAR}` placeholder with the environment value of `VAR`.
fn interpolate_env(raw: &str) -> Result<String, ConfigError> {
    let pattern = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid pattern");

    let mut out = String::with_capacity(raw.len());
    let mut last = 0;
    for captures in pattern.captures_iter(raw) {
        let whole = captures.get(0).expect("match");
        let var = &captures[1];
        let value =
            std::env::var(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))?;
        out.push_str(&raw[last..whole.start()]);
        out.push_str(&value);
        last = whole.end();
    }
    out.push_str(&raw[last..]);
    Ok(out)
}
