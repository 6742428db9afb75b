//! Provider adapter contract.
//!
//! The router never speaks a vendor wire protocol itself. A backend SDK is
//! mounted behind [`ProviderAdapter`]: an opaque capability set of `chat`,
//! `stream`, and `close`, plus the read-only quota attributes the scorer
//! needs. Adapters translate backend-specific failures into the
//! [`crate::RouterError`] taxonomy and must never retry internally; retries
//! live in the fallback loop.

use async_trait::async_trait;
use secrecy::SecretString;
use serde::Deserialize;

use crate::error::RouterResult;
use crate::request::{Message, RouterRequest};
use crate::streaming::FragmentStream;

/// Immutable declaration of a provider's identity and quotas.
///
/// Created at router construction and read-only thereafter.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    /// Unique provider name within a router instance.
    pub name: String,

    /// Model served by this provider.
    pub model: String,

    /// Requests-per-minute quota.
    pub rpm_limit: u32,

    /// Tokens-per-minute quota.
    pub tpm_limit: u32,

    /// Static score used by the scorer.
    #[serde(default = "default_weight")]
    pub weight: f64,

    /// Whether the provider participates in routing.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Credential handed to the adapter factory. Never logged.
    #[serde(default)]
    pub api_key: Option<SecretString>,

    /// Provider-specific options, passed to the adapter factory verbatim.
    #[serde(default)]
    pub options: serde_json::Value,
}

fn default_weight() -> f64 {
    1.0
}

fn default_enabled() -> bool {
    true
}

/// Inputs for a single adapter invocation, extracted from a
/// [`RouterRequest`] with the routing-only fields stripped.
#[derive(Debug, Clone)]
pub struct ChatCall {
    /// Ordered conversation messages.
    pub messages: Vec<Message>,
    /// Maximum tokens to generate.
    pub max_tokens: Option<u32>,
    /// Sampling temperature.
    pub temperature: Option<f32>,
    /// Opaque passthrough options.
    pub options: serde_json::Value,
}

impl ChatCall {
    /// Extract the adapter-facing parts of a request.
    #[must_use]
    pub fn from_request(request: &RouterRequest) -> Self {
        Self {
            messages: request.messages.clone(),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            options: request.options.clone(),
        }
    }
}

/// Outcome of a successful non-streaming adapter call.
#[derive(Debug, Clone)]
pub struct ChatOutcome {
    /// Generated completion text.
    pub content: String,
    /// Prompt tokens consumed.
    pub input_tokens: u64,
    /// Completion tokens produced.
    pub output_tokens: u64,
}

/// Capability wrapper around one backend SDK.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Unique provider name.
    fn name(&self) -> &str;

    /// Model served by this provider.
    fn model(&self) -> &str;

    /// Requests-per-minute quota.
    fn rpm_limit(&self) -> u32;

    /// Tokens-per-minute quota.
    fn tpm_limit(&self) -> u32;

    /// Static score used by the scorer.
    fn weight(&self) -> f64 {
        1.0
    }

    /// Whether the provider participates in routing.
    fn enabled(&self) -> bool {
        true
    }

    /// Issue one completion call.
    ///
    /// # Errors
    /// Backend failures are translated into the router error taxonomy;
    /// adapters never retry internally.
    async fn chat(&self, call: &ChatCall) -> RouterResult<ChatOutcome>;

    /// Issue one streaming completion call.
    ///
    /// The returned stream is finite and non-restartable; the final
    /// fragment carries actual token counts when the backend reports them.
    ///
    /// # Errors
    /// Backend failures are translated into the router error taxonomy.
    async fn stream(&self, call: &ChatCall) -> RouterResult<FragmentStream>;

    /// Release underlying connections.
    async fn close(&self) {}
}
