//! Response types for the router.

use serde::{Deserialize, Serialize};

/// Successful routing outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterResponse {
    /// Generated completion text.
    pub content: String,

    /// Name of the provider that served the request.
    pub provider: String,

    /// Model that produced the completion.
    pub model: String,

    /// Wall-clock latency of the successful call, in milliseconds.
    pub latency_ms: f64,

    /// 1-based count of candidates tried, the successful attempt included.
    pub attempts: u32,

    /// Prompt tokens consumed.
    pub input_tokens: u64,

    /// Completion tokens produced.
    pub output_tokens: u64,
}

impl RouterResponse {
    /// Total tokens consumed by the call.
    #[must_use]
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}
