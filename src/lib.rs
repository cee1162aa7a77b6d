//! Sati Agent - Privacy-first stress signal fusion and intervention engine.
//!
//! This library fuses anonymized behavioral signals (typing cadence, mouse
//! agitation, breathing rate, posture) into a single Stress Score and drives
//! a state machine that decides when a gentle intervention is warranted.
//!
//! # Privacy Guarantees
//!
//! - **No raw payloads**: sensors deliver pre-extracted scalar features; the
//!   core never sees keystrokes, frames, or audio
//! - **No network**: everything runs and persists locally
//! - **Scalar persistence**: only baseline summaries (mean, variance, count)
//!   and fused scores are ever written to disk
//! - **Transparency**: every drop, tick, and intervention decision is counted
//!   in an auditable trail
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         Sati Agent                           │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌──────────┐   ┌────────────┐   ┌────────┐   ┌───────────┐ │
//! │  │  Source  │──▶│ Normalizer │──▶│ Fusion │──▶│Intervention│ │
//! │  │ (queue)  │   │ (baseline) │   │ (tick) │   │  machine  │ │
//! │  └──────────┘   └────────────┘   └────────┘   └───────────┘ │
//! │       │               │                             │        │
//! │       ▼               ▼                             ▼        │
//! │  ┌──────────┐   ┌────────────┐                ┌───────────┐ │
//! │  │  Audit   │   │  Baseline  │                │  Action   │ │
//! │  │  trail   │   │   store    │                │   sink    │ │
//! │  └──────────┘   └────────────┘                └───────────┘ │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use sati_agent::audit::create_shared_log;
//! use sati_agent::config::Config;
//! use sati_agent::core::{ChannelId, FeatureSample};
//! use sati_agent::pipeline::Pipeline;
//! use sati_agent::sink::LogSink;
//! use chrono::Utc;
//!
//! let config = Config::default();
//! let audit = create_shared_log();
//! let mut pipeline = Pipeline::new(config, Box::new(LogSink), audit)
//!     .expect("valid default config");
//!
//! pipeline.handle_sample(FeatureSample::new(ChannelId::Keyboard, 6.2, 1.0));
//! let score = pipeline.tick(Utc::now());
//! println!("stress: {:.1}", score.value);
//! ```

pub mod audit;
pub mod config;
pub mod core;
pub mod error;
pub mod intervention;
pub mod pipeline;
pub mod sink;
pub mod source;

// Re-export key types at crate root for convenience
pub use audit::{AuditLog, AuditStats, SharedAuditLog};
pub use config::{ChannelConfig, Config};
pub use core::{
    BaselineStore, ChannelBaseline, ChannelId, ChannelScore, FeatureSample, FusionEngine,
    StressScore,
};
pub use error::AgentError;
pub use intervention::{InterventionMachine, InterventionRecord, InterventionState};
pub use pipeline::{ControlEvent, Pipeline};
pub use sink::{ActionSink, LogSink};
pub use source::{sample_channel, SampleEmitter};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Privacy declaration that can be displayed to users.
pub const PRIVACY_DECLARATION: &str = r#"
╔══════════════════════════════════════════════════════════════════╗
║               SATI AGENT - PRIVACY DECLARATION                   ║
╠══════════════════════════════════════════════════════════════════╣
║                                                                  ║
║  This agent estimates stress from behavioral signals, locally.   ║
║                                                                  ║
║  ✓ WHAT WE PROCESS:                                              ║
║    • Typing cadence (events per second, timing only)             ║
║    • Mouse agitation (movement magnitude only)                   ║
║    • Breathing rate and posture, if those sensors are enabled    ║
║                                                                  ║
║  ✗ WHAT WE NEVER SEE OR STORE:                                   ║
║    • Which keys you press (no passwords, no text)                ║
║    • Camera frames, audio, or screen content                     ║
║    • Cursor positions or application names                       ║
║                                                                  ║
║  All processing happens on this machine. Nothing leaves it.      ║
║  Raw feature values are discarded as soon as they are scored;    ║
║  only baseline summaries and fused scores are persisted.         ║
║                                                                  ║
║  You can view session statistics anytime with:                   ║
║    sati-agent status                                             ║
║                                                                  ║
╚══════════════════════════════════════════════════════════════════╝
"#;
