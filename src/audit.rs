//! Decision audit trail and collection diagnostics.
//!
//! Tracks what the pipeline did — samples seen, samples dropped, ticks,
//! intervention transitions — without retaining any raw feature value.
//! The persisted artifact holds counters and `InterventionRecord`s only
//! (fused scores and reason codes).

use crate::intervention::{InterventionRecord, InterventionState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Audit log for the current session.
#[derive(Debug)]
pub struct AuditLog {
    /// Samples accepted into the pipeline
    samples_received: AtomicU64,
    /// Samples dropped for confidence below the floor
    low_confidence_drops: AtomicU64,
    /// Samples ignored because their channel is disabled
    disabled_channel_drops: AtomicU64,
    /// Fusion ticks completed
    ticks_completed: AtomicU64,
    /// Transitions into Active
    interventions_triggered: AtomicU64,
    /// Append-only transition trail
    records: Mutex<Vec<InterventionRecord>>,
    /// Session start time
    session_start: DateTime<Utc>,
    /// Unique id for this agent instance
    instance_id: Uuid,
    /// Path for persisting the trail
    persist_path: Option<PathBuf>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self {
            samples_received: AtomicU64::new(0),
            low_confidence_drops: AtomicU64::new(0),
            disabled_channel_drops: AtomicU64::new(0),
            ticks_completed: AtomicU64::new(0),
            interventions_triggered: AtomicU64::new(0),
            records: Mutex::new(Vec::new()),
            session_start: Utc::now(),
            instance_id: Uuid::new_v4(),
            persist_path: None,
        }
    }

    /// Create an audit log that persists to the given path, folding in any
    /// previously saved counters.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut log = Self::new();
        log.persist_path = Some(path);
        if let Err(e) = log.load() {
            tracing::debug!("no previous audit state loaded: {e}");
        }
        log
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    pub fn record_sample(&self) {
        self.samples_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_low_confidence_drop(&self) {
        self.low_confidence_drops.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_disabled_channel_drop(&self) {
        self.disabled_channel_drops.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tick(&self) {
        self.ticks_completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Append a transition to the trail.
    pub fn append(&self, record: InterventionRecord) {
        if record.state_to == InterventionState::Active {
            self.interventions_triggered.fetch_add(1, Ordering::Relaxed);
        }
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(record);
    }

    /// A copy of the transition trail, in append order.
    pub fn records(&self) -> Vec<InterventionRecord> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Current counters.
    pub fn stats(&self) -> AuditStats {
        AuditStats {
            samples_received: self.samples_received.load(Ordering::Relaxed),
            low_confidence_drops: self.low_confidence_drops.load(Ordering::Relaxed),
            disabled_channel_drops: self.disabled_channel_drops.load(Ordering::Relaxed),
            ticks_completed: self.ticks_completed.load(Ordering::Relaxed),
            interventions_triggered: self.interventions_triggered.load(Ordering::Relaxed),
            session_start: self.session_start,
            session_duration_secs: (Utc::now() - self.session_start).num_seconds().max(0) as u64,
        }
    }

    /// Human-readable session summary.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        format!(
            "Session Statistics:\n\
             - Samples received: {}\n\
             - Low-confidence drops: {}\n\
             - Disabled-channel drops: {}\n\
             - Fusion ticks: {}\n\
             - Interventions triggered: {}\n\
             - Session duration: {} seconds\n\
             \n\
             Privacy Guarantee:\n\
             - No raw sensor payloads retained\n\
             - Audit trail holds fused scores and reason codes only",
            stats.samples_received,
            stats.low_confidence_drops,
            stats.disabled_channel_drops,
            stats.ticks_completed,
            stats.interventions_triggered,
            stats.session_duration_secs
        )
    }

    /// Persist counters and the transition trail.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let stats = self.stats();
            let persisted = PersistedAudit {
                samples_received: stats.samples_received,
                low_confidence_drops: stats.low_confidence_drops,
                disabled_channel_drops: stats.disabled_channel_drops,
                ticks_completed: stats.ticks_completed,
                interventions_triggered: stats.interventions_triggered,
                records: self.records(),
                last_updated: Utc::now(),
            };
            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;
            std::fs::write(path, json)?;
        }
        Ok(())
    }

    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let persisted: PersistedAudit =
                    serde_json::from_str(&content).map_err(std::io::Error::other)?;
                self.samples_received
                    .store(persisted.samples_received, Ordering::Relaxed);
                self.low_confidence_drops
                    .store(persisted.low_confidence_drops, Ordering::Relaxed);
                self.disabled_channel_drops
                    .store(persisted.disabled_channel_drops, Ordering::Relaxed);
                self.ticks_completed
                    .store(persisted.ticks_completed, Ordering::Relaxed);
                self.interventions_triggered
                    .store(persisted.interventions_triggered, Ordering::Relaxed);
                *self
                    .records
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner()) = persisted.records;
            }
        }
        Ok(())
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of audit counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditStats {
    pub samples_received: u64,
    pub low_confidence_drops: u64,
    pub disabled_channel_drops: u64,
    pub ticks_completed: u64,
    pub interventions_triggered: u64,
    pub session_start: DateTime<Utc>,
    pub session_duration_secs: u64,
}

/// On-disk audit format. Derived scalars only.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedAudit {
    samples_received: u64,
    low_confidence_drops: u64,
    disabled_channel_drops: u64,
    ticks_completed: u64,
    interventions_triggered: u64,
    records: Vec<InterventionRecord>,
    last_updated: DateTime<Utc>,
}

/// Thread-safe shared audit log.
pub type SharedAuditLog = Arc<AuditLog>;

/// Create a new shared audit log.
pub fn create_shared_log() -> SharedAuditLog {
    Arc::new(AuditLog::new())
}

/// Create a new shared audit log with persistence.
pub fn create_shared_log_with_persistence(path: PathBuf) -> SharedAuditLog {
    Arc::new(AuditLog::with_persistence(path))
}
