//! Per-process latency EMA.

use parking_lot::RwLock;
use std::collections::HashMap;

/// Default smoothing factor.
pub const DEFAULT_ALPHA: f64 = 0.2;

/// Running latency EMA keyed by provider name.
///
/// Deliberately process-local: scoring tolerates per-instance variance,
/// and skipping a shared-store write per completion keeps the hot path
/// free of suspension points.
#[derive(Debug)]
pub struct LatencyTracker {
    alpha: f64,
    emas: RwLock<HashMap<String, f64>>,
}

impl LatencyTracker {
    /// Create a tracker with smoothing factor `alpha` in `(0, 1]`.
    #[must_use]
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha: alpha.clamp(f64::EPSILON, 1.0),
            emas: RwLock::new(HashMap::new()),
        }
    }

    /// Fold one observed latency (milliseconds) into the provider's EMA.
    /// The first observation initializes the EMA.
    pub fn record(&self, provider: &str, latency_ms: f64) {
        let mut emas = self.emas.write();
        match emas.get_mut(provider) {
            Some(ema) => *ema = self.alpha * latency_ms + (1.0 - self.alpha) * *ema,
            None => {
                emas.insert(provider.to_string(), latency_ms);
            }
        }
    }

    /// Current EMA for the provider. Unknown providers read as 0, which
    /// the scorer treats as perfect latency.
    #[must_use]
    pub fn get(&self, provider: &str) -> f64 {
        self.emas.read().get(provider).copied().unwrap_or(0.0)
    }
}

impl Default for LatencyTracker {
    fn default() -> Self {
        Self::new(DEFAULT_ALPHA)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_observation_initializes() {
        let tracker = LatencyTracker::new(0.2);
        tracker.record("a", 500.0);
        assert!((tracker.get("a") - 500.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_ema_update() {
        let tracker = LatencyTracker::new(0.2);
        tracker.record("a", 500.0);
        tracker.record("a", 1000.0);
        // 0.2 * 1000 + 0.8 * 500
        assert!((tracker.get("a") - 600.0).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_provider_reads_zero() {
        let tracker = LatencyTracker::default();
        assert!((tracker.get("nope")).abs() < f64::EPSILON);
    }

    #[test]
    fn test_providers_tracked_independently() {
        let tracker = LatencyTracker::new(0.5);
        tracker.record("a", 100.0);
        tracker.record("b", 900.0);
        assert!((tracker.get("a") - 100.0).abs() < f64::EPSILON);
        assert!((tracker.get("b") - 900.0).abs() < f64::EPSILON);
    }
}
