//! Error taxonomy for the router.
//!
//! Every failure in the routing pipeline maps onto one of the kinds defined
//! here. The fallback loop keys its control flow off [`RouterError::is_retryable`]:
//! retriable kinds advance to the next candidate, non-retriable kinds surface
//! immediately.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type used throughout the router.
pub type RouterResult<T> = Result<T, RouterError>;

/// Top-level error type for all router operations.
#[derive(Debug, Error)]
pub enum RouterError {
    /// The registry holds no providers at call time.
    #[error("no providers configured")]
    NoProvidersConfigured,

    /// Internal: the provider's circuit is open and its cooldown has not
    /// elapsed. Consumed by the fallback loop, never surfaced to callers.
    #[error("circuit open for provider '{provider}'")]
    CircuitOpen {
        /// Provider whose circuit is open.
        provider: String,
    },

    /// The provider rejected the call due to quota exhaustion.
    #[error("provider '{provider}' rate limited: {message}")]
    RateLimited {
        /// Provider that rejected the call.
        provider: String,
        /// Backend-supplied detail.
        message: String,
    },

    /// A transient network-level failure (connection reset, DNS, ...).
    #[error("provider '{provider}' transient failure: {message}")]
    Transient {
        /// Provider the call was issued against.
        provider: String,
        /// Backend-supplied detail.
        message: String,
    },

    /// The backend returned a 5xx-class error.
    #[error("provider '{provider}' server error: {message}")]
    ServerError {
        /// Provider that failed.
        provider: String,
        /// Backend-supplied detail.
        message: String,
    },

    /// The underlying client gave up waiting for the backend.
    #[error("provider '{provider}' timed out: {message}")]
    Timeout {
        /// Provider that timed out.
        provider: String,
        /// Backend-supplied detail.
        message: String,
    },

    /// The backend rejected the request as malformed.
    #[error("provider '{provider}' rejected request: {message}")]
    BadRequest {
        /// Provider that rejected the request.
        provider: String,
        /// Backend-supplied detail.
        message: String,
    },

    /// Credentials were rejected by the backend.
    #[error("provider '{provider}' authentication failed: {message}")]
    AuthError {
        /// Provider that rejected the credentials.
        provider: String,
        /// Backend-supplied detail.
        message: String,
    },

    /// The request exceeds the model's context window.
    #[error("provider '{provider}' token limit exceeded: {message}")]
    TokenLimitExceeded {
        /// Provider that rejected the request.
        provider: String,
        /// Backend-supplied detail.
        message: String,
    },

    /// Terminal: every candidate was tried (or none was eligible).
    #[error("all providers failed after {} attempt(s)", .attempts.len())]
    AllProvidersFailed {
        /// Per-candidate outcome, in attempt order. Empty when no provider
        /// was eligible for the request.
        attempts: Vec<AttemptError>,
    },

    /// The shared state backend could not be reached.
    #[error("state backend unavailable: {message}")]
    StateBackend {
        /// Underlying failure detail.
        message: String,
    },

    /// Invalid configuration or request shape.
    #[error("configuration error: {message}")]
    Configuration {
        /// What was wrong.
        message: String,
    },
}

impl RouterError {
    /// Build a [`RouterError::CircuitOpen`].
    #[must_use]
    pub fn circuit_open(provider: impl Into<String>) -> Self {
        Self::CircuitOpen {
            provider: provider.into(),
        }
    }

    /// Build a [`RouterError::RateLimited`].
    #[must_use]
    pub fn rate_limited(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RateLimited {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Build a [`RouterError::Transient`].
    #[must_use]
    pub fn transient(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transient {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Build a [`RouterError::ServerError`].
    #[must_use]
    pub fn server_error(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ServerError {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Build a [`RouterError::Timeout`].
    #[must_use]
    pub fn timeout(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Timeout {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Build a [`RouterError::BadRequest`].
    #[must_use]
    pub fn bad_request(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BadRequest {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Build a [`RouterError::AuthError`].
    #[must_use]
    pub fn auth(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::AuthError {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Build a [`RouterError::TokenLimitExceeded`].
    #[must_use]
    pub fn token_limit(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TokenLimitExceeded {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Build a [`RouterError::StateBackend`].
    #[must_use]
    pub fn state_backend(message: impl Into<String>) -> Self {
        Self::StateBackend {
            message: message.into(),
        }
    }

    /// Build a [`RouterError::Configuration`].
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Whether the fallback loop should advance to the next candidate
    /// after this error.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. }
                | Self::Transient { .. }
                | Self::ServerError { .. }
                | Self::Timeout { .. }
        )
    }

    /// The observability kind for this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoProvidersConfigured => ErrorKind::NoProvidersConfigured,
            Self::CircuitOpen { .. } => ErrorKind::CircuitOpen,
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::Transient { .. } => ErrorKind::Transient,
            Self::ServerError { .. } => ErrorKind::ServerError,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::BadRequest { .. } => ErrorKind::BadRequest,
            Self::AuthError { .. } => ErrorKind::AuthError,
            Self::TokenLimitExceeded { .. } => ErrorKind::TokenLimitExceeded,
            Self::AllProvidersFailed { .. } => ErrorKind::AllProvidersFailed,
            Self::StateBackend { .. } => ErrorKind::StateBackend,
            Self::Configuration { .. } => ErrorKind::Configuration,
        }
    }

    /// Collapse this error into a per-candidate attempt record.
    #[must_use]
    pub fn into_attempt(self, provider: impl Into<String>) -> AttemptError {
        AttemptError {
            provider: provider.into(),
            kind: self.kind(),
            message: self.to_string(),
        }
    }
}

/// Coarse error classification carried on [`crate::RouteEvent`] and inside
/// [`RouterError::AllProvidersFailed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Registry empty at call time.
    NoProvidersConfigured,
    /// Circuit open, cooldown pending.
    CircuitOpen,
    /// Provider quota exhausted.
    RateLimited,
    /// Transient network failure.
    Transient,
    /// 5xx-class backend failure.
    ServerError,
    /// Client-side timeout.
    Timeout,
    /// Malformed request.
    BadRequest,
    /// Rejected credentials.
    AuthError,
    /// Context window exceeded.
    TokenLimitExceeded,
    /// Fallback loop exhausted.
    AllProvidersFailed,
    /// Shared store unreachable.
    StateBackend,
    /// Invalid configuration.
    Configuration,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NoProvidersConfigured => "no_providers_configured",
            Self::CircuitOpen => "circuit_open",
            Self::RateLimited => "rate_limited",
            Self::Transient => "transient",
            Self::ServerError => "server_error",
            Self::Timeout => "timeout",
            Self::BadRequest => "bad_request",
            Self::AuthError => "auth_error",
            Self::TokenLimitExceeded => "token_limit_exceeded",
            Self::AllProvidersFailed => "all_providers_failed",
            Self::StateBackend => "state_backend",
            Self::Configuration => "configuration",
        };
        f.write_str(s)
    }
}

/// One failed candidate inside [`RouterError::AllProvidersFailed`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptError {
    /// Provider that was tried.
    pub provider: String,
    /// Classified error kind.
    pub kind: ErrorKind,
    /// Human-readable detail.
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(RouterError::rate_limited("a", "429").is_retryable());
        assert!(RouterError::transient("a", "reset").is_retryable());
        assert!(RouterError::server_error("a", "500").is_retryable());
        assert!(RouterError::timeout("a", "deadline").is_retryable());

        assert!(!RouterError::bad_request("a", "bad json").is_retryable());
        assert!(!RouterError::auth("a", "401").is_retryable());
        assert!(!RouterError::token_limit("a", "too long").is_retryable());
        assert!(!RouterError::circuit_open("a").is_retryable());
        assert!(!RouterError::NoProvidersConfigured.is_retryable());
    }

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            RouterError::rate_limited("a", "x").kind(),
            ErrorKind::RateLimited
        );
        assert_eq!(
            RouterError::AllProvidersFailed { attempts: vec![] }.kind(),
            ErrorKind::AllProvidersFailed
        );
    }

    #[test]
    fn test_into_attempt_preserves_kind() {
        let attempt = RouterError::timeout("slow", "deadline exceeded").into_attempt("slow");
        assert_eq!(attempt.provider, "slow");
        assert_eq!(attempt.kind, ErrorKind::Timeout);
        assert!(attempt.message.contains("deadline exceeded"));
    }

    #[test]
    fn test_error_kind_display() {
        assert_eq!(ErrorKind::RateLimited.to_string(), "rate_limited");
        assert_eq!(ErrorKind::CircuitOpen.to_string(), "circuit_open");
    }
}
