//! Request types for the router.
//!
//! This module defines the provider-agnostic request shape the router
//! accepts. Messages are role-tagged and carry unknown fields verbatim so
//! adapters can forward vendor-specific extensions untouched.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single request submitted to the router.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterRequest {
    /// Ordered conversation messages.
    pub messages: Vec<Message>,

    /// Maximum tokens to generate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Sampling temperature (0.0 - 2.0).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Priority lane controlling scoring weights and reserve enforcement.
    #[serde(default)]
    pub priority: Priority,

    /// Session identifier for sticky routing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    /// Pin the request to a named provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub force_provider: Option<String>,

    /// Opaque options passed through to the adapter.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub options: serde_json::Value,
}

impl RouterRequest {
    /// Create a new builder for `RouterRequest`.
    #[must_use]
    pub fn builder() -> RouterRequestBuilder {
        RouterRequestBuilder::default()
    }

    /// Validate the request shape.
    ///
    /// # Errors
    /// Returns error if the message list is empty or the temperature is out
    /// of range.
    pub fn validate(&self) -> Result<(), crate::error::RouterError> {
        if self.messages.is_empty() {
            return Err(crate::error::RouterError::configuration(
                "messages cannot be empty",
            ));
        }
        if let Some(t) = self.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(crate::error::RouterError::configuration(format!(
                    "temperature must be between 0.0 and 2.0, got {t}"
                )));
            }
        }
        Ok(())
    }
}

/// Builder for [`RouterRequest`].
#[derive(Debug, Default)]
pub struct RouterRequestBuilder {
    messages: Vec<Message>,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
    priority: Priority,
    session_id: Option<String>,
    force_provider: Option<String>,
    options: serde_json::Value,
}

impl RouterRequestBuilder {
    /// Set the messages.
    #[must_use]
    pub fn messages(mut self, messages: Vec<Message>) -> Self {
        self.messages = messages;
        self
    }

    /// Add a message.
    #[must_use]
    pub fn message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    /// Set max_tokens.
    #[must_use]
    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set the temperature.
    #[must_use]
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the priority lane.
    #[must_use]
    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Set the session identifier.
    #[must_use]
    pub fn session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Pin the request to a provider.
    #[must_use]
    pub fn force_provider(mut self, provider: impl Into<String>) -> Self {
        self.force_provider = Some(provider.into());
        self
    }

    /// Set adapter passthrough options.
    #[must_use]
    pub fn options(mut self, options: serde_json::Value) -> Self {
        self.options = options;
        self
    }

    /// Build the request.
    ///
    /// # Errors
    /// Returns error if the request does not validate.
    pub fn build(self) -> Result<RouterRequest, crate::error::RouterError> {
        let request = RouterRequest {
            messages: self.messages,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            priority: self.priority,
            session_id: self.session_id,
            force_provider: self.force_provider,
            options: self.options,
        };
        request.validate()?;
        Ok(request)
    }
}

/// Role-tagged conversation message.
///
/// Unknown fields deserialize into `extra` and are serialized back out
/// unchanged, so vendor extensions survive the round trip to the adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message author.
    pub role: MessageRole,

    /// Text content of the message.
    pub content: String,

    /// Passthrough fields carried verbatim to adapters.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl Message {
    /// Create a system message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
            extra: HashMap::new(),
        }
    }

    /// Create a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
            extra: HashMap::new(),
        }
    }

    /// Create an assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
            extra: HashMap::new(),
        }
    }
}

/// Message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System message.
    System,
    /// User message.
    User,
    /// Assistant message.
    Assistant,
    /// Tool response message.
    Tool,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::Tool => write!(f, "tool"),
        }
    }
}

/// Priority lane for a request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Latency-sensitive traffic; bypasses at-risk exclusion and the
    /// capacity reserve.
    High,
    /// Default lane.
    #[default]
    Normal,
    /// Background traffic; weighted toward static provider preference.
    Low,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::High => write!(f, "high"),
            Self::Normal => write!(f, "normal"),
            Self::Low => write!(f, "low"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let request = RouterRequest::builder()
            .message(Message::user("Hello"))
            .temperature(0.7)
            .max_tokens(100)
            .priority(Priority::High)
            .build();

        let request = request.expect("should build");
        assert_eq!(request.messages.len(), 1);
        assert_eq!(request.temperature, Some(0.7));
        assert_eq!(request.max_tokens, Some(100));
        assert_eq!(request.priority, Priority::High);
    }

    #[test]
    fn test_request_builder_missing_messages() {
        let request = RouterRequest::builder().build();
        assert!(request.is_err());
    }

    #[test]
    fn test_request_validation_invalid_temperature() {
        let request = RouterRequest::builder()
            .message(Message::user("Hello"))
            .temperature(3.0)
            .build();
        assert!(request.is_err());
    }

    #[test]
    fn test_default_priority_is_normal() {
        let request = RouterRequest::builder()
            .message(Message::user("Hello"))
            .build()
            .expect("should build");
        assert_eq!(request.priority, Priority::Normal);
    }

    #[test]
    fn test_message_passthrough_fields_round_trip() {
        let json = r#"{"role":"user","content":"hi","cache_control":{"type":"ephemeral"}}"#;
        let message: Message = serde_json::from_str(json).expect("deserialize");
        assert!(message.extra.contains_key("cache_control"));

        let out = serde_json::to_value(&message).expect("serialize");
        assert_eq!(out["cache_control"]["type"], "ephemeral");
    }

    #[test]
    fn test_priority_serde_lowercase() {
        assert_eq!(
            serde_json::to_string(&Priority::High).expect("serialize"),
            "\"high\""
        );
        let p: Priority = serde_json::from_str("\"low\"").expect("deserialize");
        assert_eq!(p, Priority::Low);
    }
}
