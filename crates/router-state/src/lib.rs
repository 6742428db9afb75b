//! # Router State
//!
//! Sliding-window usage tracking and session-affinity state for the
//! Adaptive LLM Router.
//!
//! Two interchangeable [`StateStore`] implementations:
//! - [`MemoryStateStore`]: in-process, one cooperative mutex per backend
//! - [`RedisStateStore`]: shared across instances via Redis sorted sets
//!
//! Also hosts the per-process [`LatencyTracker`], which is deliberately
//! not shared across instances.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod latency;
pub mod memory;
pub mod redis_store;
mod store;

pub use latency::LatencyTracker;
pub use memory::MemoryStateStore;
pub use redis_store::RedisStateStore;
pub use store::{StateError, StateResult, StateStore, Usage};
