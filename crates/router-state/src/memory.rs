//! In-process state backend.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::store::{StateResult, StateStore, Usage};

/// One usage sample: logical completion time and token count.
#[derive(Debug, Clone, Copy)]
struct Sample {
    at: Instant,
    tokens: u64,
}

#[derive(Debug, Default)]
struct Inner {
    windows: HashMap<String, VecDeque<Sample>>,
    sessions: HashMap<String, SessionBinding>,
    circuits: HashMap<String, Instant>,
}

#[derive(Debug, Clone)]
struct SessionBinding {
    provider: String,
    expires_at: Instant,
}

/// Per-process state backend.
///
/// Each provider holds an ordered sequence of samples. A single
/// cooperative mutex guards all mutation; readers acquire the same mutex
/// so they never observe a partial purge. Expired session bindings are
/// dropped lazily on read.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    inner: Mutex<Inner>,
}

impl MemoryStateStore {
    /// Create an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn purge(window: Duration, samples: &mut VecDeque<Sample>, now: Instant) {
        // Samples sitting exactly on the window edge are retained.
        while let Some(front) = samples.front() {
            if now.duration_since(front.at) > window {
                samples.pop_front();
            } else {
                break;
            }
        }
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn record_request(
        &self,
        provider: &str,
        tokens: u64,
        window: Duration,
    ) -> StateResult<()> {
        let now = Instant::now();
        let mut inner = self.inner.lock().await;
        let samples = inner.windows.entry(provider.to_string()).or_default();
        Self::purge(window, samples, now);
        samples.push_back(Sample { at: now, tokens });
        Ok(())
    }

    async fn get_usage(&self, provider: &str, window: Duration) -> StateResult<Usage> {
        let now = Instant::now();
        let mut inner = self.inner.lock().await;
        let Some(samples) = inner.windows.get_mut(provider) else {
            return Ok(Usage::default());
        };
        Self::purge(window, samples, now);
        Ok(Usage {
            rpm: samples.len() as u64,
            tpm: samples.iter().map(|s| s.tokens).sum(),
        })
    }

    async fn get_session_provider(&self, session_id: &str) -> StateResult<Option<String>> {
        let now = Instant::now();
        let mut inner = self.inner.lock().await;
        match inner.sessions.get(session_id) {
            Some(binding) if binding.expires_at > now => Ok(Some(binding.provider.clone())),
            Some(_) => {
                inner.sessions.remove(session_id);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_session_provider(
        &self,
        session_id: &str,
        provider: &str,
        ttl: Duration,
    ) -> StateResult<()> {
        let mut inner = self.inner.lock().await;
        inner.sessions.insert(
            session_id.to_string(),
            SessionBinding {
                provider: provider.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn set_circuit_open(&self, provider: &str, cooldown: Duration) -> StateResult<()> {
        let mut inner = self.inner.lock().await;
        inner
            .circuits
            .insert(provider.to_string(), Instant::now() + cooldown);
        Ok(())
    }

    async fn circuit_is_open(&self, provider: &str) -> StateResult<bool> {
        let now = Instant::now();
        let mut inner = self.inner.lock().await;
        match inner.circuits.get(provider) {
            Some(until) if *until > now => Ok(true),
            Some(_) => {
                inner.circuits.remove(provider);
                Ok(false)
            }
            None => Ok(false),
        }
    }

    async fn close(&self) -> StateResult<()> {
        let mut inner = self.inner.lock().await;
        inner.windows.clear();
        inner.sessions.clear();
        inner.circuits.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn test_usage_counts_and_sums() {
        let store = MemoryStateStore::new();
        store.record_request("a", 100, WINDOW).await.expect("record");
        store.record_request("a", 250, WINDOW).await.expect("record");
        store.record_request("b", 40, WINDOW).await.expect("record");

        let usage = store.get_usage("a", WINDOW).await.expect("usage");
        assert_eq!(usage, Usage { rpm: 2, tpm: 350 });

        let usage = store.get_usage("b", WINDOW).await.expect("usage");
        assert_eq!(usage, Usage { rpm: 1, tpm: 40 });
    }

    #[tokio::test]
    async fn test_unknown_provider_reads_zero() {
        let store = MemoryStateStore::new();
        let usage = store.get_usage("nope", WINDOW).await.expect("usage");
        assert_eq!(usage, Usage::default());
    }

    #[tokio::test]
    async fn test_stale_samples_purged() {
        let store = MemoryStateStore::new();
        let short = Duration::from_millis(30);
        store.record_request("a", 10, short).await.expect("record");
        tokio::time::sleep(Duration::from_millis(60)).await;
        store.record_request("a", 20, short).await.expect("record");

        let usage = store.get_usage("a", short).await.expect("usage");
        assert_eq!(usage, Usage { rpm: 1, tpm: 20 });
    }

    #[tokio::test]
    async fn test_successive_reads_stable_without_records() {
        let store = MemoryStateStore::new();
        store.record_request("a", 10, WINDOW).await.expect("record");
        let first = store.get_usage("a", WINDOW).await.expect("usage");
        let second = store.get_usage("a", WINDOW).await.expect("usage");
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_session_binding_round_trip() {
        let store = MemoryStateStore::new();
        assert_eq!(
            store.get_session_provider("s1").await.expect("get"),
            None
        );

        store
            .set_session_provider("s1", "a", Duration::from_secs(10))
            .await
            .expect("set");
        assert_eq!(
            store.get_session_provider("s1").await.expect("get"),
            Some("a".to_string())
        );
    }

    #[tokio::test]
    async fn test_expired_session_treated_as_absent() {
        let store = MemoryStateStore::new();
        store
            .set_session_provider("s1", "a", Duration::from_millis(10))
            .await
            .expect("set");
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(store.get_session_provider("s1").await.expect("get"), None);
    }

    #[tokio::test]
    async fn test_circuit_marker_expires() {
        let store = MemoryStateStore::new();
        store
            .set_circuit_open("a", Duration::from_millis(20))
            .await
            .expect("set");
        assert!(store.circuit_is_open("a").await.expect("check"));
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(!store.circuit_is_open("a").await.expect("check"));
    }

    #[tokio::test]
    async fn test_concurrent_records_each_contribute_one_sample() {
        let store = std::sync::Arc::new(MemoryStateStore::new());
        let mut handles = Vec::new();
        for _ in 0..32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.record_request("a", 5, WINDOW).await
            }));
        }
        for handle in handles {
            handle.await.expect("join").expect("record");
        }
        let usage = store.get_usage("a", WINDOW).await.expect("usage");
        assert_eq!(usage, Usage { rpm: 32, tpm: 160 });
    }
}
