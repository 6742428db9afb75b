//! # Adaptive LLM Router
//!
//! An adaptive, rate-limit-aware request router that sits between an
//! application and a pool of LLM backend providers. For every chat or
//! streaming request it selects one provider, invokes it, observes the
//! outcome, and updates its view of provider health; failed calls fall
//! back to the next-best provider transparently.
//!
//! The facade re-exports the public surface of the workspace crates:
//!
//! - [`router_core`]: request/response types, the adapter contract, and
//!   the error taxonomy
//! - [`router_config`]: the structured configuration mapping and loaders
//! - [`router_state`]: sliding-window usage tracking (in-process and
//!   Redis-backed)
//! - [`router_resilience`]: per-provider circuit breaking
//! - [`router_providers`]: the provider registry and BYOC mounting
//! - [`router_routing`]: scoring, exhaustion prediction, and the
//!   [`Router`] itself
//! - [`router_telemetry`]: logging setup
//!
//! ## Quick start
//!
//! ```no_run
//! use llm_adaptive_router::{Message, Router, RouterConfig, RouterRequest};
//!
//! # async fn run(adapter: std::sync::Arc<dyn llm_adaptive_router::ProviderAdapter>)
//! #     -> Result<(), llm_adaptive_router::RouterError> {
//! let config = RouterConfig::load("router.yaml")?;
//! let router = Router::builder(config).adapter(adapter).build().await?;
//!
//! let request = RouterRequest::builder()
//!     .message(Message::user("Hello"))
//!     .build()?;
//! let response = router.chat(request).await?;
//! println!("{} served by {}", response.content, response.provider);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub use router_config::{
    CircuitBreakerSettings, ConfigError, ExhaustionSettings, RouterConfig,
    RoutingWeightOverrides, WeightProfile,
};
pub use router_core::{
    AttemptError, ChatCall, ChatOutcome, ErrorKind, FragmentStream, Message, MessageRole,
    Priority, ProviderAdapter, ProviderConfig, RouteEvent, RouteObserver, RouterError,
    RouterRequest, RouterResponse, RouterResult, StreamFragment, TokenUsage,
};
pub use router_providers::{AdapterFactory, ByocAdapter, ByocClient, ProviderRegistry};
pub use router_resilience::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use router_routing::{
    estimate_tokens, ExhaustionPredictor, ProviderStatus, Router, RouterBuilder,
};
pub use router_state::{
    LatencyTracker, MemoryStateStore, RedisStateStore, StateError, StateStore, Usage,
};
pub use router_telemetry::{init_logging, LoggingConfig};
