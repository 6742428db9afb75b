//! Route events for observability.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;
use crate::request::Priority;

/// Record emitted after each routed request attempt sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteEvent {
    /// Provider that served (or last failed) the request.
    pub provider: String,

    /// Wall-clock latency of the final attempt, in milliseconds.
    pub latency_ms: f64,

    /// 1-based count of candidates tried.
    pub attempts: u32,

    /// Priority lane of the request.
    pub priority: Priority,

    /// Session identifier, when the request carried one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    /// Whether the request completed successfully.
    pub success: bool,

    /// Classified error kind on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,

    /// When the attempt sequence finished.
    pub timestamp: DateTime<Utc>,
}

/// Receiver for [`RouteEvent`]s.
///
/// Delivery is best-effort: errors returned by the observer are caught and
/// discarded by the router, and must never affect the request outcome.
#[async_trait]
pub trait RouteObserver: Send + Sync {
    /// Handle one route event.
    ///
    /// # Errors
    /// Any error returned here is logged at debug level and dropped.
    async fn on_route(
        &self,
        event: RouteEvent,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}
