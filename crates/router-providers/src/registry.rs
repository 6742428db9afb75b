//! Concurrency-safe provider registry.

use router_core::{ProviderAdapter, ProviderConfig, RouterResult};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Builds an adapter from a provider declaration.
///
/// This is the seam where concrete vendor SDK crates attach: the core
/// hands the factory a [`ProviderConfig`] (credentials included) and
/// receives an opaque adapter back.
pub trait AdapterFactory: Send + Sync {
    /// Construct an adapter for the given provider declaration.
    ///
    /// # Errors
    /// Returns a configuration error when the declaration cannot be
    /// satisfied (unknown vendor, missing credential, ...).
    fn build(&self, config: &ProviderConfig) -> RouterResult<Arc<dyn ProviderAdapter>>;
}

/// Name-keyed collection of mounted adapters.
///
/// All accessors serialize through one cooperative lock; registration is
/// idempotent by name, with re-registration replacing the previous entry.
#[derive(Default)]
pub struct ProviderRegistry {
    adapters: Mutex<HashMap<String, Arc<dyn ProviderAdapter>>>,
}

impl ProviderRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an adapter from a declaration and mount it.
    ///
    /// # Errors
    /// Propagates factory failures.
    pub async fn register_from_config(
        &self,
        config: &ProviderConfig,
        factory: &dyn AdapterFactory,
    ) -> RouterResult<()> {
        let adapter = factory.build(config)?;
        self.register_adapter(adapter).await;
        Ok(())
    }

    /// Mount a prebuilt adapter, replacing any previous entry of the
    /// same name.
    pub async fn register_adapter(&self, adapter: Arc<dyn ProviderAdapter>) {
        let name = adapter.name().to_string();
        let mut adapters = self.adapters.lock().await;
        if adapters.insert(name.clone(), adapter).is_some() {
            debug!(provider = %name, "provider re-registered");
        } else {
            info!(provider = %name, "provider registered");
        }
    }

    /// Mount a caller-owned client under the given quotas.
    pub async fn register_byoc(
        &self,
        name: impl Into<String>,
        client: Arc<dyn crate::byoc::ByocClient>,
        model: impl Into<String>,
        rpm_limit: u32,
        tpm_limit: u32,
        weight: f64,
    ) {
        let adapter = crate::byoc::ByocAdapter::new(name, client, model, rpm_limit, tpm_limit, weight);
        self.register_adapter(Arc::new(adapter)).await;
    }

    /// Look up an adapter by name.
    pub async fn get(&self, name: &str) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.lock().await.get(name).cloned()
    }

    /// All adapters whose `enabled` flag is set.
    pub async fn get_all_enabled(&self) -> Vec<Arc<dyn ProviderAdapter>> {
        self.adapters
            .lock()
            .await
            .values()
            .filter(|adapter| adapter.enabled())
            .cloned()
            .collect()
    }

    /// Number of mounted adapters.
    pub async fn len(&self) -> usize {
        self.adapters.lock().await.len()
    }

    /// Whether the registry is empty.
    pub async fn is_empty(&self) -> bool {
        self.adapters.lock().await.is_empty()
    }

    /// Close every adapter and drop it from the registry.
    pub async fn close_all(&self) {
        let drained: Vec<_> = {
            let mut adapters = self.adapters.lock().await;
            adapters.drain().map(|(_, adapter)| adapter).collect()
        };
        for adapter in drained {
            adapter.close().await;
        }
    }
}
