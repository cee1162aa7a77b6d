//! Error types for the sati-agent core.
//!
//! Per-channel failures are never fatal: a misbehaving sensor degrades that
//! channel via staleness decay. Only configuration validation aborts startup.

use crate::core::types::ChannelId;
use thiserror::Error;

/// Errors surfaced by the pipeline and its collaborators.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Rejected at startup; the agent refuses to run with undefined thresholds.
    #[error("invalid configuration: {field}: {reason}")]
    InvalidConfiguration { field: String, reason: String },

    /// A channel is disabled or unknown to the running pipeline.
    #[error("sensor unavailable: {0}")]
    SensorUnavailable(ChannelId),

    /// The action sink rejected a delivery; retried on the next tick.
    #[error("action sink unavailable: {0}")]
    SinkUnavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl AgentError {
    /// Shorthand for a configuration rejection naming the offending field.
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        AgentError::InvalidConfiguration {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_names_field() {
        let err = AgentError::invalid_config("cooldown_duration_s", "must be positive");
        let msg = err.to_string();
        assert!(msg.contains("cooldown_duration_s"));
        assert!(msg.contains("must be positive"));
    }

    #[test]
    fn test_sensor_error_display() {
        let err = AgentError::SensorUnavailable(ChannelId::Posture);
        assert_eq!(err.to_string(), "sensor unavailable: posture");
    }
}
