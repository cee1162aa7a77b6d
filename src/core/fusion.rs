//! Score fusion.
//!
//! Combines the latest normalized score of every enabled channel into one
//! Stress Score in [0, 100], weighting each channel by configuration and by
//! how fresh its last sample is. A stalled channel fades out; it never
//! corrupts the fused value.

use crate::core::types::{ChannelId, ChannelScore, StressScore};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Midpoint the score decays toward when every channel has gone silent.
pub const BASELINE_MIDPOINT: f64 = 50.0;

/// Per-tick decay factor applied while all channels are stale. The previous
/// value's distance from the midpoint shrinks by this factor each tick.
const STALE_DECAY: f64 = 0.85;

/// Per-channel fusion parameters, derived from the configuration.
#[derive(Debug, Clone, Copy)]
pub struct ChannelWeight {
    pub weight: f64,
    /// Staleness at which the channel starts fading
    pub timeout_s: f64,
}

/// Freshness factor for a channel score.
///
/// 1.0 up to the channel's timeout, then linear decay to 0.0 at twice the
/// timeout. A fully stale channel contributes zero weight and drops out of
/// the normalization sum.
pub fn freshness_factor(staleness_s: f64, timeout_s: f64) -> f64 {
    if timeout_s <= 0.0 {
        return 0.0;
    }
    if staleness_s <= timeout_s {
        1.0
    } else {
        (2.0 - staleness_s / timeout_s).clamp(0.0, 1.0)
    }
}

/// Fuses channel snapshots into the per-tick Stress Score.
///
/// Holds only the last emitted value (for the all-stale decay path); given
/// the same snapshot sequence it reproduces the same score sequence exactly.
#[derive(Debug)]
pub struct FusionEngine {
    weights: BTreeMap<ChannelId, ChannelWeight>,
    last_value: Option<f64>,
}

impl FusionEngine {
    pub fn new(weights: BTreeMap<ChannelId, ChannelWeight>) -> Self {
        Self {
            weights,
            last_value: None,
        }
    }

    /// Produce the Stress Score for one tick from the latest per-channel
    /// snapshot. Channels absent from the snapshot, disabled in the weight
    /// table, or fully stale simply drop out; the weighted sum is normalized
    /// by the weight that actually contributed, so missing channels cannot
    /// bias the score toward zero.
    pub fn fuse(
        &mut self,
        snapshot: &BTreeMap<ChannelId, ChannelScore>,
        now: DateTime<Utc>,
    ) -> StressScore {
        let mut numerator = 0.0;
        let mut denominator = 0.0;
        let mut effective: Vec<(ChannelId, f64)> = Vec::new();

        for (&channel, score) in snapshot {
            let Some(cw) = self.weights.get(&channel) else {
                continue;
            };
            let freshness = freshness_factor(score.staleness_s, cw.timeout_s);
            let effective_weight = cw.weight * freshness;
            if effective_weight <= 0.0 {
                continue;
            }
            numerator += effective_weight * score.normalized;
            denominator += effective_weight;
            effective.push((channel, effective_weight * score.normalized));
        }

        let (value, contributions) = if denominator > 0.0 {
            let value = (100.0 * numerator / denominator).clamp(0.0, 100.0);
            let scale = 100.0 / denominator;
            let contributions = effective
                .into_iter()
                .map(|(channel, weighted)| (channel, weighted * scale))
                .collect();
            (value, contributions)
        } else {
            // Absence of signal is not absence (or presence) of stress:
            // drift the last known value toward the midpoint.
            let last = self.last_value.unwrap_or(BASELINE_MIDPOINT);
            let value = BASELINE_MIDPOINT + (last - BASELINE_MIDPOINT) * STALE_DECAY;
            (value, BTreeMap::new())
        };

        self.last_value = Some(value);
        StressScore {
            value,
            timestamp: now,
            contributions,
        }
    }

    /// The last emitted value, if any tick has run.
    pub fn last_value(&self) -> Option<f64> {
        self.last_value
    }
}
