//! Privacy-preserving signal types for the stress pipeline.
//!
//! Everything here is a derived scalar. No raw sensor payload (key content,
//! coordinates, audio, frames) ever appears in these types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// A sensor modality's processed metric stream.
///
/// The set is closed: configuration referring to any other key is rejected
/// at load time.
///
/// Variants are declared in lexical order of their wire names; the derived
/// `Ord` (and every `BTreeMap` keyed by channel) depends on that.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelId {
    /// Breathing-rate estimate from an external analyzer
    Breathing,
    /// Screen-intent mismatch flag from an external classifier
    Intent,
    /// Keystroke cadence (timing only, never content)
    Keyboard,
    /// Mouse activity (magnitudes only, never coordinates)
    Mouse,
    /// Posture angle from an external analyzer
    Posture,
    /// Voice-stress estimate from an external analyzer
    Voice,
}

impl ChannelId {
    /// All known channels, in lexical order of their wire names.
    pub const ALL: [ChannelId; 6] = [
        ChannelId::Breathing,
        ChannelId::Intent,
        ChannelId::Keyboard,
        ChannelId::Mouse,
        ChannelId::Posture,
        ChannelId::Voice,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelId::Keyboard => "keyboard",
            ChannelId::Mouse => "mouse",
            ChannelId::Breathing => "breathing",
            ChannelId::Posture => "posture",
            ChannelId::Intent => "intent",
            ChannelId::Voice => "voice",
        }
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChannelId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "keyboard" => Ok(ChannelId::Keyboard),
            "mouse" => Ok(ChannelId::Mouse),
            "breathing" => Ok(ChannelId::Breathing),
            "posture" => Ok(ChannelId::Posture),
            "intent" => Ok(ChannelId::Intent),
            "voice" => Ok(ChannelId::Voice),
            other => Err(format!("unknown channel: {other}")),
        }
    }
}

/// One anonymized feature event from a signal source.
///
/// Ephemeral: a sample contributes to at most one normalization pass and is
/// then discarded. It is never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureSample {
    /// Which modality produced this sample
    pub channel: ChannelId,
    /// When the underlying observation was made
    pub timestamp: DateTime<Utc>,
    /// The already-anonymized scalar feature (native units)
    pub value: f64,
    /// Producer confidence in [0, 1]
    pub confidence: f64,
}

impl FeatureSample {
    /// Create a sample stamped now.
    pub fn new(channel: ChannelId, value: f64, confidence: f64) -> Self {
        Self::at(channel, Utc::now(), value, confidence)
    }

    /// Create a sample with an explicit timestamp (replay and tests).
    pub fn at(channel: ChannelId, timestamp: DateTime<Utc>, value: f64, confidence: f64) -> Self {
        Self {
            channel,
            timestamp,
            value,
            confidence,
        }
    }
}

/// A channel's latest normalized reading.
///
/// Carried forward between samples; `staleness_s` is refreshed at every
/// fusion tick so a silent channel fades out instead of erroring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelScore {
    pub channel: ChannelId,
    /// Bounded comparable value in [0, 1]
    pub normalized: f64,
    /// When the last real sample for this channel arrived
    pub observed_at: DateTime<Utc>,
    /// Seconds since `observed_at`, as of the last tick
    pub staleness_s: f64,
}

/// The fused stress estimate for one tick.
///
/// Immutable once emitted; consumed exactly once by the intervention machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StressScore {
    /// Fused estimate in [0, 100]
    pub value: f64,
    pub timestamp: DateTime<Utc>,
    /// Weighted contribution per channel; the values sum to `value` when at
    /// least one channel was fresh enough to contribute.
    pub contributions: BTreeMap<ChannelId, f64>,
}

impl StressScore {
    /// The channel contributing most to this score.
    ///
    /// Ties break toward the lexically smallest channel id, which the
    /// `BTreeMap` iteration order gives us with a strict comparison.
    pub fn dominant_channel(&self) -> Option<ChannelId> {
        let mut best: Option<(ChannelId, f64)> = None;
        for (&channel, &contribution) in &self.contributions {
            match best {
                Some((_, current)) if contribution <= current => {}
                _ => best = Some((channel, contribution)),
            }
        }
        best.map(|(channel, _)| channel)
    }
}
