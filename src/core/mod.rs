//! Core signal processing for the sati-agent.
//!
//! This module contains:
//! - The privacy-preserving signal types flowing through the pipeline
//! - Rolling per-channel baselines (Baseline Tracker)
//! - Sample normalization against those baselines (Feature Normalizer)
//! - Score fusion into the live Stress Score (Fusion Engine)

pub mod baseline;
pub mod fusion;
pub mod normalizer;
pub mod types;

// Re-export commonly used types
pub use baseline::{BaselineStore, ChannelBaseline, DEFAULT_BASELINE_WINDOW};
pub use fusion::{freshness_factor, ChannelWeight, FusionEngine, BASELINE_MIDPOINT};
pub use normalizer::{normalize, NormalizerParams, NEUTRAL_SCORE};
pub use types::{ChannelId, ChannelScore, FeatureSample, StressScore};
