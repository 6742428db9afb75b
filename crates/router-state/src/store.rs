//! The state backend contract.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Error type for state backend operations.
#[derive(Debug, Error)]
pub enum StateError {
    /// The backing store could not be reached or answered with an error.
    /// The router treats this as reduced visibility, never as quota
    /// exhaustion.
    #[error("state backend error: {0}")]
    Backend(String),

    /// A stored value could not be decoded.
    #[error("corrupt state entry: {0}")]
    Corrupt(String),
}

/// Result type for state backend operations.
pub type StateResult<T> = Result<T, StateError>;

impl From<redis::RedisError> for StateError {
    fn from(err: redis::RedisError) -> Self {
        Self::Backend(err.to_string())
    }
}

/// Aggregated usage within one sliding window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    /// Number of samples in the window.
    pub rpm: u64,
    /// Sum of token counts over the window's samples.
    pub tpm: u64,
}

/// Per-provider sliding-window usage and session-affinity storage.
///
/// All operations may suspend and are safe under concurrent callers.
/// Both counts returned by [`StateStore::get_usage`] must be derivable
/// solely from the samples currently inside `[now - window, now]`.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Append a sample `(now, tokens)` to the provider's window.
    async fn record_request(
        &self,
        provider: &str,
        tokens: u64,
        window: Duration,
    ) -> StateResult<()>;

    /// Count and token-sum of samples with timestamps inside
    /// `[now - window, now]`. Stale samples are purged before counting.
    async fn get_usage(&self, provider: &str, window: Duration) -> StateResult<Usage>;

    /// Provider bound to this session, if the binding is unexpired.
    async fn get_session_provider(&self, session_id: &str) -> StateResult<Option<String>>;

    /// Bind a session to a provider for `ttl`.
    async fn set_session_provider(
        &self,
        session_id: &str,
        provider: &str,
        ttl: Duration,
    ) -> StateResult<()>;

    /// Mark the provider's circuit open for `cooldown`. Used by the
    /// circuit breaker's shared mode.
    async fn set_circuit_open(&self, provider: &str, cooldown: Duration) -> StateResult<()>;

    /// Whether a shared circuit-open marker exists for the provider.
    async fn circuit_is_open(&self, provider: &str) -> StateResult<bool>;

    /// Release resources held by the backend.
    async fn close(&self) -> StateResult<()>;
}
