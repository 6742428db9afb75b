//! Circuit breaker pattern implementation.
//!
//! Each provider carries a failure-count state machine with two explicit
//! states. HALF-OPEN is implicit: an open circuit whose deadline has
//! passed is treated as closed for guarding, and the next recorded
//! outcome either resets it (success) or reopens it (failure). All
//! requests arriving after the deadline are admitted; the first
//! completion determines the subsequent state.

use dashmap::DashMap;
use router_core::{RouterError, RouterResult};
use router_state::StateStore;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Requests flow normally.
    Closed,
    /// Requests are rejected until the cooldown deadline.
    Open,
}

/// Circuit breaker configuration.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens.
    pub failure_threshold: u32,
    /// How long an open circuit rejects requests.
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Default)]
struct Entry {
    failure_count: u32,
    open_until: Option<Instant>,
}

impl Entry {
    fn is_open(&self, now: Instant) -> bool {
        self.open_until.is_some_and(|until| until > now)
    }
}

/// Per-provider circuit breaker.
///
/// When a shared state store is attached, the OPEN condition is mirrored
/// as a `circuit:{provider}` key with TTL equal to the cooldown, and
/// `guard` consults that key as well. Failure counts always stay
/// in-process: a cross-instance undercount is acceptable because any
/// instance that crosses the threshold trips the shared key, which all
/// instances respect.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    entries: DashMap<String, Entry>,
    shared: Option<Arc<dyn StateStore>>,
}

impl CircuitBreaker {
    /// Create a breaker with in-process state only.
    #[must_use]
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            entries: DashMap::new(),
            shared: None,
        }
    }

    /// Create a breaker that mirrors OPEN markers into a shared store.
    #[must_use]
    pub fn with_shared_store(config: CircuitBreakerConfig, store: Arc<dyn StateStore>) -> Self {
        Self {
            config,
            entries: DashMap::new(),
            shared: Some(store),
        }
    }

    /// Fail fast if the provider's circuit is open.
    ///
    /// An open circuit whose deadline has passed admits the call; the
    /// call's outcome decides whether the circuit resets or reopens.
    ///
    /// # Errors
    /// Returns [`RouterError::CircuitOpen`] while the cooldown deadline
    /// is in the future.
    pub async fn guard(&self, provider: &str) -> RouterResult<()> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(provider) {
            if entry.is_open(now) {
                return Err(RouterError::circuit_open(provider));
            }
        }

        if let Some(store) = &self.shared {
            match store.circuit_is_open(provider).await {
                Ok(true) => return Err(RouterError::circuit_open(provider)),
                Ok(false) => {}
                // A store fault must not block routing; the local view
                // already answered.
                Err(err) => debug!(provider = %provider, error = %err, "shared circuit check failed"),
            }
        }
        Ok(())
    }

    /// Record a failed call against the provider.
    pub async fn record_failure(&self, provider: &str) {
        let tripped = {
            let mut entry = self.entries.entry(provider.to_string()).or_default();
            if entry.open_until.is_some() {
                // Open (or post-cooldown probe): a failure reopens the
                // circuit for a fresh cooldown.
                entry.open_until = Some(Instant::now() + self.config.cooldown);
                true
            } else {
                entry.failure_count += 1;
                if entry.failure_count >= self.config.failure_threshold {
                    entry.open_until = Some(Instant::now() + self.config.cooldown);
                    entry.failure_count = 0;
                    true
                } else {
                    debug!(
                        provider = %provider,
                        failures = entry.failure_count,
                        threshold = self.config.failure_threshold,
                        "circuit breaker failure recorded"
                    );
                    false
                }
            }
        };

        if tripped {
            warn!(
                provider = %provider,
                cooldown_secs = self.config.cooldown.as_secs(),
                "circuit breaker opened"
            );
            if let Some(store) = &self.shared {
                if let Err(err) = store.set_circuit_open(provider, self.config.cooldown).await {
                    warn!(provider = %provider, error = %err, "failed to mirror open circuit");
                }
            }
        }
    }

    /// Record a successful call: the circuit closes and the failure count
    /// resets to zero, regardless of prior state.
    pub fn record_success(&self, provider: &str) {
        if let Some(mut entry) = self.entries.get_mut(provider) {
            if entry.open_until.is_some() {
                debug!(provider = %provider, "circuit breaker closed");
            }
            entry.failure_count = 0;
            entry.open_until = None;
        }
    }

    /// Whether the provider's circuit is currently open, consulting the
    /// shared marker when one is configured.
    pub async fn is_open(&self, provider: &str) -> bool {
        self.guard(provider).await.is_err()
    }

    /// Point-in-time snapshot of the provider's local breaker state.
    #[must_use]
    pub fn stats(&self, provider: &str) -> CircuitStats {
        let now = Instant::now();
        self.entries.get(provider).map_or(
            CircuitStats {
                state: CircuitState::Closed,
                failure_count: 0,
            },
            |entry| CircuitStats {
                state: if entry.is_open(now) {
                    CircuitState::Open
                } else {
                    CircuitState::Closed
                },
                failure_count: entry.failure_count,
            },
        )
    }
}

/// Snapshot of one provider's breaker state.
#[derive(Debug, Clone, Copy)]
pub struct CircuitStats {
    /// Effective state (an expired deadline reads as closed).
    pub state: CircuitState,
    /// Consecutive failures since the last success or trip.
    pub failure_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, cooldown: Duration) -> CircuitBreaker {
        CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: threshold,
            cooldown,
        })
    }

    #[tokio::test]
    async fn test_initial_state_closed() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig::default());
        assert!(cb.guard("a").await.is_ok());
        assert_eq!(cb.stats("a").state, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_opens_exactly_at_threshold() {
        let cb = breaker(3, Duration::from_secs(30));

        cb.record_failure("a").await;
        cb.record_failure("a").await;
        assert_eq!(cb.stats("a").state, CircuitState::Closed);
        assert_eq!(cb.stats("a").failure_count, 2);

        cb.record_failure("a").await;
        assert_eq!(cb.stats("a").state, CircuitState::Open);
        assert!(matches!(
            cb.guard("a").await,
            Err(RouterError::CircuitOpen { .. })
        ));
    }

    #[tokio::test]
    async fn test_success_resets_count_in_one_step() {
        let cb = breaker(5, Duration::from_secs(30));
        for _ in 0..4 {
            cb.record_failure("a").await;
        }
        assert_eq!(cb.stats("a").failure_count, 4);

        cb.record_success("a");
        assert_eq!(cb.stats("a").failure_count, 0);

        // Threshold counting starts over.
        cb.record_failure("a").await;
        assert_eq!(cb.stats("a").state, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_expired_deadline_admits_and_success_closes() {
        let cb = breaker(2, Duration::from_millis(20));
        cb.record_failure("a").await;
        cb.record_failure("a").await;
        assert!(cb.guard("a").await.is_err());

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(cb.guard("a").await.is_ok());

        cb.record_success("a");
        assert_eq!(cb.stats("a").state, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_post_cooldown_failure_reopens() {
        let cb = breaker(2, Duration::from_millis(20));
        cb.record_failure("a").await;
        cb.record_failure("a").await;

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(cb.guard("a").await.is_ok());

        // Single failure is enough to reopen; the threshold does not
        // restart counting during the probe.
        cb.record_failure("a").await;
        assert!(cb.guard("a").await.is_err());
    }

    #[tokio::test]
    async fn test_providers_independent() {
        let cb = breaker(1, Duration::from_secs(30));
        cb.record_failure("a").await;
        assert!(cb.guard("a").await.is_err());
        assert!(cb.guard("b").await.is_ok());
    }

    #[tokio::test]
    async fn test_shared_marker_respected() {
        use router_state::MemoryStateStore;

        let store: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());
        let cb =
            CircuitBreaker::with_shared_store(CircuitBreakerConfig::default(), store.clone());

        // Another instance tripped the shared key; this one has no local
        // failures but must still refuse.
        store
            .set_circuit_open("a", Duration::from_secs(30))
            .await
            .expect("set");
        assert!(cb.guard("a").await.is_err());
    }

    #[tokio::test]
    async fn test_trip_writes_shared_marker() {
        use router_state::MemoryStateStore;

        let store: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());
        let cb = CircuitBreaker::with_shared_store(
            CircuitBreakerConfig {
                failure_threshold: 2,
                cooldown: Duration::from_secs(30),
            },
            store.clone(),
        );

        cb.record_failure("a").await;
        cb.record_failure("a").await;
        assert!(store.circuit_is_open("a").await.expect("check"));
    }
}
