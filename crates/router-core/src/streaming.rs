//! Streaming types for the adapter contract.
//!
//! Adapters expose streaming completions as a finite, non-restartable
//! sequence of [`StreamFragment`]s. Actual token counts are surfaced as a
//! completion signal: the final fragment carries [`StreamFragment::usage`].

use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::RouterError;

/// A lazily produced sequence of content fragments from one provider call.
pub type FragmentStream = BoxStream<'static, Result<StreamFragment, RouterError>>;

/// One fragment of streamed completion content.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamFragment {
    /// Content delta. May be empty on the final metadata-only fragment.
    pub content: String,

    /// Populated on the final fragment once the backend reports actual
    /// token counts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

impl StreamFragment {
    /// A plain content fragment.
    #[must_use]
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            usage: None,
        }
    }

    /// The terminal fragment carrying actual token counts.
    #[must_use]
    pub fn done(usage: TokenUsage) -> Self {
        Self {
            content: String::new(),
            usage: Some(usage),
        }
    }
}

/// Actual token counts reported by a backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Prompt tokens consumed.
    pub input_tokens: u64,
    /// Completion tokens produced.
    pub output_tokens: u64,
}

impl TokenUsage {
    /// Total tokens for the call.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_done_fragment_carries_usage() {
        let fragment = StreamFragment::done(TokenUsage {
            input_tokens: 12,
            output_tokens: 34,
        });
        assert!(fragment.content.is_empty());
        assert_eq!(fragment.usage.expect("usage").total(), 46);
    }
}
