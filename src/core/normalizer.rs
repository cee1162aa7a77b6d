//! Feature normalization.
//!
//! Converts a raw feature value (keys/s, degrees, breaths/min) into a
//! bounded score in [0, 1] relative to the channel's rolling baseline, so
//! that channels with different native units become comparable inputs to
//! fusion.

use crate::core::baseline::ChannelBaseline;
use crate::core::types::{ChannelScore, FeatureSample};

/// Z-scores are clamped to this magnitude before squashing.
pub const Z_CLAMP: f64 = 4.0;

/// Guard against division by a vanishing variance.
const VARIANCE_FLOOR: f64 = 1e-6;

/// Score emitted while a channel's baseline is still warming up.
pub const NEUTRAL_SCORE: f64 = 0.5;

/// Normalization parameters, taken from the configuration surface.
#[derive(Debug, Clone)]
pub struct NormalizerParams {
    /// Samples below this confidence are dropped, not scored
    pub confidence_floor: f64,
    /// Baselines with fewer samples than this score neutrally
    pub warmup_samples: u64,
}

impl Default for NormalizerParams {
    fn default() -> Self {
        Self {
            confidence_floor: 0.3,
            warmup_samples: 20,
        }
    }
}

/// Normalize one sample against its channel baseline.
///
/// Returns `None` when the sample's confidence is below the floor; a
/// low-confidence read must distort neither the baseline nor the score, and
/// dropping it is a no-op rather than an error.
///
/// While the baseline is unlearned the channel scores the neutral midpoint,
/// so a fresh (or freshly recalibrated) channel never penalizes the user.
pub fn normalize(
    sample: &FeatureSample,
    baseline: &ChannelBaseline,
    params: &NormalizerParams,
) -> Option<ChannelScore> {
    if sample.confidence < params.confidence_floor {
        return None;
    }

    let normalized = if baseline.is_warmed_up(params.warmup_samples) {
        let spread = baseline.variance.max(VARIANCE_FLOOR).sqrt();
        let z = ((sample.value - baseline.mean) / spread).clamp(-Z_CLAMP, Z_CLAMP);
        squash(z)
    } else {
        NEUTRAL_SCORE
    };

    Some(ChannelScore {
        channel: sample.channel,
        normalized,
        observed_at: sample.timestamp,
        staleness_s: 0.0,
    })
}

/// Monotonic map from a clamped z-score to [0, 1].
///
/// The standard logistic: z = 0 lands on 0.5, the clamp bounds land near
/// 0.018 and 0.982.
fn squash(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ChannelId;
    use chrono::Utc;

    fn warm_baseline(mean: f64, variance: f64) -> ChannelBaseline {
        ChannelBaseline::with_stats(ChannelId::Keyboard, mean, variance, 100)
    }

    fn sample(value: f64, confidence: f64) -> FeatureSample {
        FeatureSample::at(ChannelId::Keyboard, Utc::now(), value, confidence)
    }

    #[test]
    fn test_low_confidence_dropped() {
        let baseline = warm_baseline(5.0, 1.0);
        let params = NormalizerParams::default();
        assert!(normalize(&sample(9.0, 0.1), &baseline, &params).is_none());
        assert!(normalize(&sample(9.0, 0.3), &baseline, &params).is_some());
    }

    #[test]
    fn test_baseline_value_scores_midpoint() {
        let baseline = warm_baseline(5.0, 1.0);
        let score = normalize(&sample(5.0, 1.0), &baseline, &NormalizerParams::default()).unwrap();
        assert!((score.normalized - 0.5).abs() < 1e-9);
        assert_eq!(score.staleness_s, 0.0);
    }

    #[test]
    fn test_elevated_value_scores_high() {
        let baseline = warm_baseline(5.0, 1.0);
        let score = normalize(&sample(9.0, 1.0), &baseline, &NormalizerParams::default()).unwrap();
        // z clamps at 4.0; logistic(4) is about 0.982
        assert!(score.normalized > 0.95);
        assert!(score.normalized <= 1.0);
    }

    #[test]
    fn test_monotonic_in_value() {
        let baseline = warm_baseline(5.0, 1.0);
        let params = NormalizerParams::default();
        let mut last = 0.0;
        for value in [1.0, 3.0, 5.0, 7.0, 9.0, 50.0] {
            let score = normalize(&sample(value, 1.0), &baseline, &params).unwrap();
            assert!(score.normalized >= last);
            last = score.normalized;
        }
    }

    #[test]
    fn test_extreme_values_stay_bounded() {
        let baseline = warm_baseline(5.0, 1.0);
        let params = NormalizerParams::default();
        let high = normalize(&sample(1e9, 1.0), &baseline, &params).unwrap();
        let low = normalize(&sample(-1e9, 1.0), &baseline, &params).unwrap();
        assert!(high.normalized < 1.0 && high.normalized > 0.9);
        assert!(low.normalized > 0.0 && low.normalized < 0.1);
    }

    #[test]
    fn test_zero_variance_does_not_divide_by_zero() {
        let baseline = warm_baseline(5.0, 0.0);
        let score = normalize(&sample(6.0, 1.0), &baseline, &NormalizerParams::default()).unwrap();
        assert!(score.normalized.is_finite());
    }

    #[test]
    fn test_warmup_scores_neutral() {
        let baseline = ChannelBaseline::with_stats(ChannelId::Keyboard, 5.0, 1.0, 10);
        let score =
            normalize(&sample(10_000.0, 1.0), &baseline, &NormalizerParams::default()).unwrap();
        assert_eq!(score.normalized, NEUTRAL_SCORE);
    }
}
