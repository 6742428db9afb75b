//! Provider scoring.
//!
//! [`rank_providers`] is a pure function: identical inputs produce the
//! identical ordered candidate list, tie-break order included.

use router_config::{RoutingWeightOverrides, WeightProfile};
use router_core::Priority;
use router_state::Usage;
use std::collections::HashSet;

/// Latency at which the latency score bottoms out at zero.
const LATENCY_CEILING_MS: f64 = 3000.0;

/// Per-priority weight profiles.
#[derive(Debug, Clone, Copy)]
pub struct WeightProfiles {
    /// Profile for the high lane.
    pub high: WeightProfile,
    /// Profile for the normal lane.
    pub normal: WeightProfile,
    /// Profile for the low lane.
    pub low: WeightProfile,
}

impl Default for WeightProfiles {
    fn default() -> Self {
        Self {
            high: WeightProfile {
                capacity: 0.5,
                latency: 0.4,
                static_weight: 0.1,
            },
            normal: WeightProfile {
                capacity: 0.5,
                latency: 0.3,
                static_weight: 0.2,
            },
            low: WeightProfile {
                capacity: 0.3,
                latency: 0.1,
                static_weight: 0.6,
            },
        }
    }
}

impl WeightProfiles {
    /// Defaults with any configured per-priority overrides applied.
    #[must_use]
    pub fn with_overrides(overrides: Option<&RoutingWeightOverrides>) -> Self {
        let mut profiles = Self::default();
        if let Some(overrides) = overrides {
            if let Some(high) = overrides.high {
                profiles.high = high;
            }
            if let Some(normal) = overrides.normal {
                profiles.normal = normal;
            }
            if let Some(low) = overrides.low {
                profiles.low = low;
            }
        }
        profiles
    }

    /// Profile for the given lane.
    #[must_use]
    pub fn for_priority(&self, priority: Priority) -> WeightProfile {
        match priority {
            Priority::High => self.high,
            Priority::Normal => self.normal,
            Priority::Low => self.low,
        }
    }
}

/// Scoring inputs for one provider.
#[derive(Debug, Clone)]
pub struct ProviderSnapshot {
    /// Provider name.
    pub name: String,
    /// RPM quota.
    pub rpm_limit: u32,
    /// TPM quota.
    pub tpm_limit: u32,
    /// Static weight.
    pub weight: f64,
    /// Window usage; `None` when the state backend could not answer.
    pub usage: Option<Usage>,
    /// Current latency EMA in milliseconds.
    pub latency_ema_ms: f64,
}

/// One ranked candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredProvider {
    /// Provider name.
    pub name: String,
    /// Composite score in `[0, 1]` for unit-weight providers.
    pub score: f64,
}

/// Rank the eligible providers for one request, highest score first.
///
/// Filtering rules:
/// - zero capacity drops a provider outright;
/// - at-risk providers are dropped for normal/low but kept for high;
/// - for non-high lanes, a provider whose RPM usage has already consumed
///   the unreserved share of its quota is scored against the reserved
///   (smaller) limit, which zeroes its capacity;
/// - a provider with no usage snapshot is scored as idle for high and
///   dropped otherwise.
///
/// Ties break by static weight descending, then name ascending.
#[must_use]
pub fn rank_providers(
    snapshots: &[ProviderSnapshot],
    estimated_tokens: u64,
    priority: Priority,
    at_risk: &HashSet<String>,
    profiles: &WeightProfiles,
    reserve_fraction: f64,
) -> Vec<ScoredProvider> {
    let profile = profiles.for_priority(priority);
    let mut ranked: Vec<(ScoredProvider, f64)> = Vec::with_capacity(snapshots.len());

    for snapshot in snapshots {
        if priority != Priority::High && at_risk.contains(&snapshot.name) {
            continue;
        }

        let usage = match snapshot.usage {
            Some(usage) => usage,
            // Reduced visibility: only the high lane keeps flying blind.
            None if priority == Priority::High => Usage::default(),
            None => continue,
        };

        let rpm_used = usage.rpm as f64;
        let mut rpm_limit = f64::from(snapshot.rpm_limit);
        if priority != Priority::High {
            let unreserved = rpm_limit * (1.0 - reserve_fraction);
            if rpm_used >= unreserved {
                rpm_limit = unreserved;
            }
        }

        let rpm_headroom = (1.0 - rpm_used / rpm_limit).max(0.0);
        let tpm_headroom = (1.0
            - (usage.tpm + estimated_tokens) as f64 / f64::from(snapshot.tpm_limit))
        .max(0.0);
        let capacity_score = rpm_headroom.min(tpm_headroom);
        if capacity_score <= 0.0 {
            continue;
        }

        let latency_score = (1.0 - snapshot.latency_ema_ms / LATENCY_CEILING_MS).max(0.0);
        let score = profile.capacity * capacity_score
            + profile.latency * latency_score
            + profile.static_weight * snapshot.weight;

        ranked.push((
            ScoredProvider {
                name: snapshot.name.clone(),
                score,
            },
            snapshot.weight,
        ));
    }

    ranked.sort_by(|(a, a_weight), (b, b_weight)| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| b_weight.total_cmp(a_weight))
            .then_with(|| a.name.cmp(&b.name))
    });

    ranked.into_iter().map(|(scored, _)| scored).collect()
}
