//! # Router Core
//!
//! Core types, traits, and error handling for the Adaptive LLM Router.
//!
//! This crate provides the foundational types used throughout the router:
//! - Request and response types
//! - The provider adapter contract and streaming types
//! - Error taxonomy and retriability classification
//! - Route events for observability

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod event;
pub mod provider;
pub mod request;
pub mod response;
pub mod streaming;

// Re-export commonly used types
pub use error::{AttemptError, ErrorKind, RouterError, RouterResult};
pub use event::{RouteEvent, RouteObserver};
pub use provider::{ChatCall, ChatOutcome, ProviderAdapter, ProviderConfig};
pub use request::{Message, MessageRole, Priority, RouterRequest};
pub use response::RouterResponse;
pub use streaming::{FragmentStream, StreamFragment, TokenUsage};
