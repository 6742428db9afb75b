//! # Router Providers
//!
//! Provider registry and adapter mounting for the Adaptive LLM Router.
//!
//! Concrete vendor SDK crates live outside the router core; they plug in
//! either through an [`AdapterFactory`] (credential-driven construction
//! from a [`router_core::ProviderConfig`]) or as a BYOC client that is
//! already configured.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod byoc;
pub mod registry;

pub use byoc::{ByocAdapter, ByocClient};
pub use registry::{AdapterFactory, ProviderRegistry};
