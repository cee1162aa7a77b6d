//! Configuration for the sati-agent.
//!
//! Everything tunable lives here: channel enablement and weights, the
//! stress threshold, sustain/cooldown windows, and the paths the agent
//! persists derived state to. Validation happens once at load and is the
//! only fatal error class in the agent — it refuses to run with undefined
//! thresholds rather than guess.

use crate::core::types::ChannelId;
use crate::core::{ChannelWeight, NormalizerParams};
use crate::error::AgentError;
use crate::intervention::InterventionParams;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Per-channel configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub enabled: bool,
    /// Relative weight in fusion; the sum does not need to be 1.0
    pub weight: f64,
    /// Staleness past which the channel starts fading out of fusion
    pub timeout_s: f64,
}

impl ChannelConfig {
    fn new(enabled: bool, weight: f64, timeout_s: f64) -> Self {
        Self {
            enabled,
            weight,
            timeout_s,
        }
    }
}

/// Main configuration for the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Per-channel settings; the key set is closed, unknown keys are
    /// rejected during deserialization
    pub channels: BTreeMap<ChannelId, ChannelConfig>,

    /// Stress Score level that begins the warming window (clamped to 0-100)
    pub stress_threshold: f64,

    /// Consecutive above-threshold ticks before an intervention activates
    pub sustain_ticks: u32,

    /// Active never outlives this without user acknowledgment
    pub max_active_duration_s: u64,

    /// Suppression window after an intervention ends
    pub cooldown_duration_s: u64,

    /// Default snooze length for user overrides
    pub snooze_duration_s: u64,

    /// Fusion tick interval
    pub tick_interval_s: u64,

    /// Samples below this confidence are dropped
    pub confidence_floor: f64,

    /// Baseline samples required before a channel scores non-neutrally
    pub warmup_samples: u64,

    /// Effective baseline window in samples
    pub baseline_window: u64,

    /// Path for persisted baselines and the audit trail
    pub data_path: PathBuf,

    /// Cross-process override: interventions suppressed until this time
    #[serde(default)]
    pub snoozed_until: Option<DateTime<Utc>>,

    /// Cross-process acknowledgment flag, consumed by the running agent
    #[serde(default)]
    pub pending_ack: bool,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sati-agent");

        let mut channels = BTreeMap::new();
        channels.insert(ChannelId::Keyboard, ChannelConfig::new(true, 0.3, 5.0));
        channels.insert(ChannelId::Mouse, ChannelConfig::new(true, 0.2, 5.0));
        channels.insert(ChannelId::Breathing, ChannelConfig::new(false, 0.3, 30.0));
        channels.insert(ChannelId::Posture, ChannelConfig::new(false, 0.2, 30.0));
        channels.insert(ChannelId::Intent, ChannelConfig::new(false, 0.1, 60.0));
        channels.insert(ChannelId::Voice, ChannelConfig::new(false, 0.1, 60.0));

        Self {
            channels,
            stress_threshold: 50.0,
            sustain_ticks: 2,
            max_active_duration_s: 120,
            cooldown_duration_s: 120,
            snooze_duration_s: 900,
            tick_interval_s: 1,
            confidence_floor: 0.3,
            warmup_samples: 20,
            baseline_window: crate::core::DEFAULT_BASELINE_WINDOW,
            data_path: data_dir,
            snoozed_until: None,
            pending_ack: false,
        }
    }
}

impl Config {
    /// Load configuration from the default location and validate it.
    pub fn load() -> Result<Self, AgentError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from an explicit path and validate it.
    pub fn load_from(path: &PathBuf) -> Result<Self, AgentError> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            serde_json::from_str::<Config>(&content)
                .map_err(|e| AgentError::invalid_config("config", e.to_string()))?
        } else {
            Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), AgentError> {
        self.save_to(&Self::config_path())
    }

    /// Save configuration to an explicit path.
    pub fn save_to(&self, path: &PathBuf) -> Result<(), AgentError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Clear the acknowledgment flag on disk. Re-reads the file first so a
    /// snooze or resume written since the flag was observed is kept intact.
    pub fn consume_pending_ack(path: &PathBuf) -> Result<(), AgentError> {
        let mut latest = Self::load_from(path)?;
        if latest.pending_ack {
            latest.pending_ack = false;
            latest.save_to(path)?;
        }
        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sati-agent")
            .join("config.json")
    }

    /// Ensure the data directory exists.
    pub fn ensure_directories(&self) -> Result<(), AgentError> {
        std::fs::create_dir_all(&self.data_path)?;
        Ok(())
    }

    /// Validate the configuration, clamping where the contract says clamp
    /// and rejecting where it says reject. Rejections name the offending
    /// field.
    pub fn validate(&mut self) -> Result<(), AgentError> {
        self.stress_threshold = self.stress_threshold.clamp(0.0, 100.0);

        if self.sustain_ticks == 0 {
            return Err(AgentError::invalid_config(
                "sustain_ticks",
                "must be at least 1",
            ));
        }
        if self.max_active_duration_s == 0 {
            return Err(AgentError::invalid_config(
                "max_active_duration_s",
                "must be positive",
            ));
        }
        if self.cooldown_duration_s == 0 {
            return Err(AgentError::invalid_config(
                "cooldown_duration_s",
                "must be positive",
            ));
        }
        if self.snooze_duration_s == 0 {
            return Err(AgentError::invalid_config(
                "snooze_duration_s",
                "must be positive",
            ));
        }
        if self.tick_interval_s == 0 {
            return Err(AgentError::invalid_config(
                "tick_interval_s",
                "must be positive",
            ));
        }
        if !(0.0..=1.0).contains(&self.confidence_floor) {
            return Err(AgentError::invalid_config(
                "confidence_floor",
                "must be within [0, 1]",
            ));
        }
        if self.baseline_window == 0 {
            return Err(AgentError::invalid_config(
                "baseline_window",
                "must be positive",
            ));
        }

        for (channel, cc) in &self.channels {
            if !cc.weight.is_finite() || cc.weight < 0.0 {
                return Err(AgentError::invalid_config(
                    format!("channels.{channel}.weight"),
                    "must be finite and non-negative",
                ));
            }
            if !cc.timeout_s.is_finite() || cc.timeout_s <= 0.0 {
                return Err(AgentError::invalid_config(
                    format!("channels.{channel}.timeout_s"),
                    "must be positive",
                ));
            }
        }

        Ok(())
    }

    /// Whether a channel is present and enabled.
    pub fn channel_enabled(&self, channel: ChannelId) -> bool {
        self.channels
            .get(&channel)
            .map(|cc| cc.enabled)
            .unwrap_or(false)
    }

    /// Fusion weight table for the enabled channels.
    pub fn fusion_weights(&self) -> BTreeMap<ChannelId, ChannelWeight> {
        self.channels
            .iter()
            .filter(|(_, cc)| cc.enabled && cc.weight > 0.0)
            .map(|(&channel, cc)| {
                (
                    channel,
                    ChannelWeight {
                        weight: cc.weight,
                        timeout_s: cc.timeout_s,
                    },
                )
            })
            .collect()
    }

    pub fn normalizer_params(&self) -> NormalizerParams {
        NormalizerParams {
            confidence_floor: self.confidence_floor,
            warmup_samples: self.warmup_samples,
        }
    }

    pub fn intervention_params(&self) -> InterventionParams {
        InterventionParams {
            stress_threshold: self.stress_threshold,
            sustain_ticks: self.sustain_ticks,
            max_active_duration_s: self.max_active_duration_s,
            cooldown_duration_s: self.cooldown_duration_s,
        }
    }

    pub fn baselines_path(&self) -> PathBuf {
        self.data_path.join("baselines.json")
    }

    pub fn audit_path(&self) -> PathBuf {
        self.data_path.join("audit.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());
        assert!(config.channel_enabled(ChannelId::Keyboard));
        assert!(!config.channel_enabled(ChannelId::Breathing));
    }

    #[test]
    fn test_threshold_is_clamped_not_rejected() {
        let mut config = Config {
            stress_threshold: 140.0,
            ..Default::default()
        };
        config.validate().unwrap();
        assert_eq!(config.stress_threshold, 100.0);

        config.stress_threshold = -5.0;
        config.validate().unwrap();
        assert_eq!(config.stress_threshold, 0.0);
    }

    #[test]
    fn test_zero_duration_rejected_naming_field() {
        let mut config = Config {
            cooldown_duration_s: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("cooldown_duration_s"));
    }

    #[test]
    fn test_bad_channel_weight_rejected_naming_channel() {
        let mut config = Config::default();
        config
            .channels
            .insert(ChannelId::Mouse, ChannelConfig::new(true, -1.0, 5.0));
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("channels.mouse.weight"));
    }

    #[test]
    fn test_unknown_channel_key_rejected() {
        let json = r#"{"webcam": {"enabled": true, "weight": 1.0, "timeout_s": 5.0}}"#;
        let parsed: Result<BTreeMap<ChannelId, ChannelConfig>, _> = serde_json::from_str(json);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_fusion_weights_exclude_disabled() {
        let config = Config::default();
        let weights = config.fusion_weights();
        assert!(weights.contains_key(&ChannelId::Keyboard));
        assert!(weights.contains_key(&ChannelId::Mouse));
        assert!(!weights.contains_key(&ChannelId::Breathing));
    }

    #[test]
    fn test_consume_pending_ack_keeps_later_snooze() {
        let dir = std::env::temp_dir().join("sati-agent-config-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("ack-config.json");

        let mut config = Config {
            pending_ack: true,
            ..Default::default()
        };
        config.save_to(&path).unwrap();

        // A snooze lands on disk after the flag was observed by the agent.
        config.snoozed_until = Some(Utc::now() + chrono::Duration::hours(1));
        config.save_to(&path).unwrap();

        Config::consume_pending_ack(&path).unwrap();
        let back = Config::load_from(&path).unwrap();
        assert!(!back.pending_ack);
        assert!(back.snoozed_until.is_some());
    }

    #[test]
    fn test_config_json_roundtrip() {
        let config = Config::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let back: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(back.stress_threshold, config.stress_threshold);
        assert_eq!(back.channels.len(), config.channels.len());
    }
}
