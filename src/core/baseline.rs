//! Rolling per-channel baselines.
//!
//! Each channel keeps an incremental mean/variance estimate of its native
//! feature values so the normalizer can score new samples relative to the
//! user's own habits. Only these scalar summaries are ever persisted; the
//! raw samples feeding them are discarded immediately.

use crate::core::types::ChannelId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

/// Default effective window, in samples, after which old observations decay.
pub const DEFAULT_BASELINE_WINDOW: u64 = 240;

/// Scalar summary statistics for one channel.
///
/// Invariants: `sample_count >= 0` and `variance >= 0`. Updated with a
/// Welford-style incremental estimator, so the numbers stay stable over
/// arbitrarily long uptimes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelBaseline {
    pub channel: ChannelId,
    pub mean: f64,
    /// Population variance of the effective window
    pub variance: f64,
    pub sample_count: u64,
    pub last_updated: DateTime<Utc>,
}

impl ChannelBaseline {
    /// An unlearned baseline; the normalizer treats it as neutral until
    /// enough samples arrive.
    pub fn unlearned(channel: ChannelId) -> Self {
        Self {
            channel,
            mean: 0.0,
            variance: 0.0,
            sample_count: 0,
            last_updated: Utc::now(),
        }
    }

    /// Construct with known statistics (seeding and tests).
    pub fn with_stats(channel: ChannelId, mean: f64, variance: f64, sample_count: u64) -> Self {
        Self {
            channel,
            mean,
            variance,
            sample_count,
            last_updated: Utc::now(),
        }
    }

    /// Whether enough samples exist for scores to be meaningful.
    pub fn is_warmed_up(&self, warmup_samples: u64) -> bool {
        self.sample_count >= warmup_samples
    }

    /// Fold one observation into the statistics.
    ///
    /// Exact Welford update until `window_cap` samples; past the cap an
    /// exponentially-weighted form with `alpha = 1 / window_cap`, giving a
    /// bounded effective window so an old baseline cannot permanently
    /// anchor scoring.
    pub fn observe(&mut self, value: f64, at: DateTime<Utc>, window_cap: u64) {
        let cap = window_cap.max(1);
        if self.sample_count < cap {
            self.sample_count += 1;
            let n = self.sample_count as f64;
            let delta = value - self.mean;
            self.mean += delta / n;
            self.variance += (delta * (value - self.mean) - self.variance) / n;
        } else {
            let alpha = 1.0 / cap as f64;
            let delta = value - self.mean;
            let increment = alpha * delta;
            self.mean += increment;
            self.variance = (1.0 - alpha) * (self.variance + delta * increment);
            self.sample_count = self.sample_count.saturating_add(1);
        }
        if self.variance < 0.0 {
            self.variance = 0.0;
        }
        self.last_updated = at;
    }

    /// Return to the unlearned state (user-initiated recalibration).
    pub fn reset(&mut self) {
        self.mean = 0.0;
        self.variance = 0.0;
        self.sample_count = 0;
        self.last_updated = Utc::now();
    }
}

/// Per-channel baseline store.
///
/// The map of shards is fixed at construction, so concurrent producers only
/// ever contend on their own channel's record. No global lock exists.
#[derive(Debug)]
pub struct BaselineStore {
    shards: HashMap<ChannelId, Mutex<ChannelBaseline>>,
    window_cap: u64,
}

impl BaselineStore {
    pub fn new(window_cap: u64) -> Self {
        let shards = ChannelId::ALL
            .iter()
            .map(|&channel| (channel, Mutex::new(ChannelBaseline::unlearned(channel))))
            .collect();
        Self { shards, window_cap }
    }

    /// Fold one observation into a channel's baseline.
    pub fn observe(&self, channel: ChannelId, value: f64, at: DateTime<Utc>) {
        if let Some(shard) = self.shards.get(&channel) {
            let mut baseline = shard.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            baseline.observe(value, at, self.window_cap);
        }
    }

    /// A snapshot copy of one channel's baseline.
    pub fn get(&self, channel: ChannelId) -> ChannelBaseline {
        match self.shards.get(&channel) {
            Some(shard) => shard
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .clone(),
            None => ChannelBaseline::unlearned(channel),
        }
    }

    /// Replace one channel's record (loading persisted state, seeding tests).
    pub fn seed(&self, baseline: ChannelBaseline) {
        if let Some(shard) = self.shards.get(&baseline.channel) {
            *shard.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = baseline;
        }
    }

    /// Clear one channel back to the unlearned state.
    pub fn reset(&self, channel: ChannelId) {
        if let Some(shard) = self.shards.get(&channel) {
            shard
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .reset();
        }
    }

    /// Clear every channel (full recalibration).
    pub fn reset_all(&self) {
        for &channel in ChannelId::ALL.iter() {
            self.reset(channel);
        }
    }

    /// Snapshot of all baselines, in lexical channel order.
    pub fn snapshot(&self) -> Vec<ChannelBaseline> {
        ChannelId::ALL.iter().map(|&c| self.get(c)).collect()
    }

    /// Serialize the scalar records to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.snapshot())
    }

    /// Load scalar records from JSON into the store.
    pub fn load_json(&self, json: &str) -> Result<(), serde_json::Error> {
        let records: Vec<ChannelBaseline> = serde_json::from_str(json)?;
        for record in records {
            self.seed(record);
        }
        Ok(())
    }

    /// Persist the scalar records to disk.
    pub fn save(&self, path: &Path) -> Result<(), std::io::Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = self.to_json().map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }

    /// Load persisted records from disk, if present.
    pub fn load(&self, path: &Path) -> Result<(), std::io::Error> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            self.load_json(&content).map_err(std::io::Error::other)?;
        }
        Ok(())
    }
}

impl Default for BaselineStore {
    fn default() -> Self {
        Self::new(DEFAULT_BASELINE_WINDOW)
    }
}
