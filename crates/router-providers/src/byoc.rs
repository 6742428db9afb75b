//! Bring-your-own-client adapter.
//!
//! Callers that already hold a configured vendor SDK object mount it
//! behind [`ByocClient`] instead of handing the router credentials.

use async_trait::async_trait;
use router_core::{ChatCall, ChatOutcome, FragmentStream, ProviderAdapter, RouterResult};
use std::sync::Arc;

/// Minimal capability surface a caller-owned client must provide.
///
/// Error translation into the router taxonomy is the client's job, same
/// as for factory-built adapters; no internal retries.
#[async_trait]
pub trait ByocClient: Send + Sync {
    /// Issue one completion call.
    async fn chat(&self, call: &ChatCall) -> RouterResult<ChatOutcome>;

    /// Issue one streaming completion call.
    async fn stream(&self, call: &ChatCall) -> RouterResult<FragmentStream>;
}

/// Adapter wrapping a [`ByocClient`] with quota attributes.
pub struct ByocAdapter {
    name: String,
    model: String,
    rpm_limit: u32,
    tpm_limit: u32,
    weight: f64,
    client: Arc<dyn ByocClient>,
}

impl ByocAdapter {
    /// Wrap a client under the given identity and quotas.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        client: Arc<dyn ByocClient>,
        model: impl Into<String>,
        rpm_limit: u32,
        tpm_limit: u32,
        weight: f64,
    ) -> Self {
        Self {
            name: name.into(),
            model: model.into(),
            rpm_limit,
            tpm_limit,
            weight,
            client,
        }
    }
}

#[async_trait]
impl ProviderAdapter for ByocAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn rpm_limit(&self) -> u32 {
        self.rpm_limit
    }

    fn tpm_limit(&self) -> u32 {
        self.tpm_limit
    }

    fn weight(&self) -> f64 {
        self.weight
    }

    async fn chat(&self, call: &ChatCall) -> RouterResult<ChatOutcome> {
        self.client.chat(call).await
    }

    async fn stream(&self, call: &ChatCall) -> RouterResult<FragmentStream> {
        self.client.stream(call).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use router_core::{Message, RouterError, RouterRequest};

    struct EchoClient;

    #[async_trait]
    impl ByocClient for EchoClient {
        async fn chat(&self, call: &ChatCall) -> RouterResult<ChatOutcome> {
            Ok(ChatOutcome {
                content: call.messages[0].content.clone(),
                input_tokens: 2,
                output_tokens: 2,
            })
        }

        async fn stream(&self, _call: &ChatCall) -> RouterResult<FragmentStream> {
            Err(RouterError::bad_request("echo", "no streaming"))
        }
    }

    #[tokio::test]
    async fn test_byoc_adapter_delegates_and_reports_quotas() {
        let adapter = ByocAdapter::new("echo", Arc::new(EchoClient), "echo-1", 10, 1000, 2.0);
        assert_eq!(adapter.name(), "echo");
        assert_eq!(adapter.model(), "echo-1");
        assert_eq!(adapter.rpm_limit(), 10);
        assert_eq!(adapter.tpm_limit(), 1000);
        assert!((adapter.weight() - 2.0).abs() < f64::EPSILON);
        assert!(adapter.enabled());

        let request = RouterRequest::builder()
            .message(Message::user("hi"))
            .build()
            .expect("build");
        let outcome = adapter
            .chat(&ChatCall::from_request(&request))
            .await
            .expect("chat");
        assert_eq!(outcome.content, "hi");
    }
}
