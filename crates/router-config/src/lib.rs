//! # Router Config
//!
//! Configuration management for the Adaptive LLM Router.
//!
//! The router core accepts only the structured [`RouterConfig`] mapping.
//! This crate additionally loads that mapping from YAML or JSON files
//! (with `${VAR}` environment interpolation) and derives a minimal
//! configuration from a fixed set of well-known environment variables.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod loader;
pub mod model;

pub use model::{
    CircuitBreakerSettings, ConfigError, ExhaustionSettings, RouterConfig, RoutingWeightOverrides,
    WeightProfile,
};
