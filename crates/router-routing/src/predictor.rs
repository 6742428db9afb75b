//! Exhaustion prediction.
//!
//! The predictor keeps its own in-process ring of `(timestamp, tokens)`
//! observations per provider — the same points as the usage samples — so
//! it can compute consumption rates without racing the state backend.

use parking_lot::Mutex;
use router_config::ExhaustionSettings;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
struct Observation {
    at: Instant,
    tokens: u64,
}

#[derive(Debug, Clone, Copy, Default)]
struct Rates {
    rpm_per_sec: f64,
    tpm_per_sec: f64,
}

/// Per-provider consumption-rate analyzer.
///
/// A provider is at risk when its short-window rate both exceeds
/// `multiplier` times the long-term average and, projected
/// `lookahead_seconds` forward from current window usage, would meet or
/// exceed the corresponding quota. Providers with no history are never
/// at risk.
#[derive(Debug)]
pub struct ExhaustionPredictor {
    settings: ExhaustionSettings,
    retention: Duration,
    history: Mutex<HashMap<String, VecDeque<Observation>>>,
}

impl ExhaustionPredictor {
    /// Create a predictor retaining one `window` of history per provider.
    #[must_use]
    pub fn new(settings: ExhaustionSettings, window: Duration) -> Self {
        // The long-term baseline needs at least the short sub-window.
        let retention = window.max(Duration::from_secs(settings.short_window_seconds));
        Self {
            settings,
            retention,
            history: Mutex::new(HashMap::new()),
        }
    }

    /// Record one completed request's token count.
    pub fn record(&self, provider: &str, tokens: u64) {
        let now = Instant::now();
        let mut history = self.history.lock();
        let ring = history.entry(provider.to_string()).or_default();
        while let Some(front) = ring.front() {
            if now.duration_since(front.at) > self.retention {
                ring.pop_front();
            } else {
                break;
            }
        }
        ring.push_back(Observation { at: now, tokens });
    }

    /// Whether the provider's observed consumption implies imminent
    /// quota breach.
    #[must_use]
    pub fn at_risk(&self, provider: &str, rpm_limit: u32, tpm_limit: u32) -> bool {
        let now = Instant::now();
        let mut history = self.history.lock();
        let Some(ring) = history.get_mut(provider) else {
            return false;
        };
        while let Some(front) = ring.front() {
            if now.duration_since(front.at) > self.retention {
                ring.pop_front();
            } else {
                break;
            }
        }
        let Some(oldest) = ring.front() else {
            return false;
        };

        let long_span = now.duration_since(oldest.at).as_secs_f64().max(1.0);
        let long = Self::rates_over(ring.iter(), long_span);

        let short_span = self.settings.short_window_seconds as f64;
        let short_cutoff = Duration::from_secs(self.settings.short_window_seconds);
        let short = Self::rates_over(
            ring.iter()
                .filter(|obs| now.duration_since(obs.at) <= short_cutoff),
            short_span,
        );

        let window_requests = ring.len() as f64;
        let window_tokens: u64 = ring.iter().map(|obs| obs.tokens).sum();
        let lookahead = self.settings.lookahead_seconds as f64;

        let rpm_breach = short.rpm_per_sec > self.settings.multiplier * long.rpm_per_sec
            && window_requests + short.rpm_per_sec * lookahead >= f64::from(rpm_limit);
        let tpm_breach = short.tpm_per_sec > self.settings.multiplier * long.tpm_per_sec
            && window_tokens as f64 + short.tpm_per_sec * lookahead >= f64::from(tpm_limit);

        rpm_breach || tpm_breach
    }

    fn rates_over<'a>(observations: impl Iterator<Item = &'a Observation>, span: f64) -> Rates {
        let mut requests = 0u64;
        let mut tokens = 0u64;
        for obs in observations {
            requests += 1;
            tokens += obs.tokens;
        }
        Rates {
            rpm_per_sec: requests as f64 / span,
            tpm_per_sec: tokens as f64 / span,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(short: u64, lookahead: u64, multiplier: f64) -> ExhaustionSettings {
        ExhaustionSettings {
            short_window_seconds: short,
            lookahead_seconds: lookahead,
            multiplier,
        }
    }

    #[test]
    fn test_no_history_never_at_risk() {
        let predictor =
            ExhaustionPredictor::new(ExhaustionSettings::default(), Duration::from_secs(60));
        assert!(!predictor.at_risk("a", 100, 10_000));
    }

    #[test]
    fn test_steady_rate_is_not_a_spike() {
        // All observations land inside the short window, so the short-term
        // rate equals the long-term average and the multiplier gate holds.
        let predictor = ExhaustionPredictor::new(
            settings(30, 120, 1.5),
            Duration::from_secs(60),
        );
        for _ in 0..50 {
            predictor.record("a", 100);
        }
        assert!(!predictor.at_risk("a", 100, 1_000_000));
    }

    #[test]
    fn test_burst_after_quiet_period_flags_rpm_risk() {
        // A quiet period dilutes the long-term baseline; the burst then
        // dominates the 1s short window.
        let predictor = ExhaustionPredictor::new(
            settings(1, 120, 1.5),
            Duration::from_secs(60),
        );
        predictor.record("a", 1);
        std::thread::sleep(Duration::from_millis(2000));
        for _ in 0..30 {
            predictor.record("a", 1);
        }
        // Short rate ~30/s vs long ~31/2s; projection 30/s * 120s
        // dwarfs the quota.
        assert!(predictor.at_risk("a", 100, 1_000_000));
    }

    #[test]
    fn test_spike_without_projected_breach_is_tolerated() {
        let predictor = ExhaustionPredictor::new(
            settings(1, 120, 1.5),
            Duration::from_secs(60),
        );
        predictor.record("a", 1);
        std::thread::sleep(Duration::from_millis(2000));
        for _ in 0..5 {
            predictor.record("a", 1);
        }
        // Short rate ~5/s beats the ~3/s baseline, but projecting 120s
        // forward stays far below an enormous quota.
        assert!(!predictor.at_risk("a", 1_000_000, 1_000_000_000));
    }

    #[test]
    fn test_token_burst_flags_tpm_risk() {
        let predictor = ExhaustionPredictor::new(
            settings(1, 120, 1.5),
            Duration::from_secs(60),
        );
        predictor.record("a", 10);
        std::thread::sleep(Duration::from_millis(2000));
        for _ in 0..10 {
            predictor.record("a", 5_000);
        }
        // ~50k tokens/s short-term; any realistic TPM quota is breached
        // within the lookahead.
        assert!(predictor.at_risk("a", 1_000_000, 100_000));
    }
}
