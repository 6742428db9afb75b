//! # Router Routing
//!
//! Scoring, exhaustion prediction, and the per-request routing pipeline
//! for the Adaptive LLM Router.
//!
//! The [`Router`] composes the registry, state backend, latency tracker,
//! circuit breaker, scorer, and predictor into the fallback loop that
//! serves `chat` and `stream` requests.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod estimator;
pub mod predictor;
pub mod router;
pub mod scorer;

pub use estimator::estimate_tokens;
pub use predictor::ExhaustionPredictor;
pub use router::{ProviderStatus, Router, RouterBuilder};
pub use scorer::{rank_providers, ProviderSnapshot, ScoredProvider, WeightProfiles};
