//! # Router Resilience
//!
//! Per-provider circuit breaking for the Adaptive LLM Router.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod circuit_breaker;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState, CircuitStats};
