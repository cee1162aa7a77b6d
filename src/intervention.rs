//! Intervention state machine.
//!
//! Consumes Stress Score ticks in timestamp order on a single logical
//! thread and decides when to enter, escalate, and leave an intervention.
//! All timing derives from score and event timestamps, never the wall
//! clock, so replaying an identical tick sequence reproduces an identical
//! transition sequence.

use crate::core::types::StressScore;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The single process-wide intervention state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterventionState {
    /// No intervention pending
    Idle,
    /// Score crossed the threshold; waiting out the sustain window
    Warming,
    /// Intervention side effect is live
    Active,
    /// Recently intervened; re-triggering suppressed
    Cooldown,
    /// User snoozed or disabled interventions
    Overridden,
}

impl InterventionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            InterventionState::Idle => "idle",
            InterventionState::Warming => "warming",
            InterventionState::Active => "active",
            InterventionState::Cooldown => "cooldown",
            InterventionState::Overridden => "overridden",
        }
    }
}

impl fmt::Display for InterventionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One audited state transition. Carries only derived scalars: the fused
/// score and a reason code, never feature values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterventionRecord {
    pub state_from: InterventionState,
    pub state_to: InterventionState,
    pub trigger_score: f64,
    pub trigger_reason: String,
    pub timestamp: DateTime<Utc>,
}

/// Tunable thresholds and windows, taken from the configuration surface.
#[derive(Debug, Clone)]
pub struct InterventionParams {
    /// Score must exceed this (strictly) to begin warming
    pub stress_threshold: f64,
    /// Consecutive ticks above threshold before Active
    pub sustain_ticks: u32,
    /// Active never persists longer than this without acknowledgment
    pub max_active_duration_s: u64,
    /// Time spent in Cooldown regardless of score
    pub cooldown_duration_s: u64,
}

impl Default for InterventionParams {
    fn default() -> Self {
        Self {
            stress_threshold: 50.0,
            sustain_ticks: 2,
            max_active_duration_s: 120,
            cooldown_duration_s: 120,
        }
    }
}

/// The state machine. Exactly one instance exists per pipeline; it is owned
/// and mutated only by the tick-consuming thread, so it needs no locking.
#[derive(Debug)]
pub struct InterventionMachine {
    params: InterventionParams,
    state: InterventionState,
    /// Consecutive above-threshold ticks, counting the one that entered Warming
    consecutive_above: u32,
    active_since: Option<DateTime<Utc>>,
    cooldown_since: Option<DateTime<Utc>>,
    override_until: Option<DateTime<Utc>>,
    last_score: f64,
}

impl InterventionMachine {
    pub fn new(params: InterventionParams) -> Self {
        Self {
            params,
            state: InterventionState::Idle,
            consecutive_above: 0,
            active_since: None,
            cooldown_since: None,
            override_until: None,
            last_score: 0.0,
        }
    }

    pub fn state(&self) -> InterventionState {
        self.state
    }

    /// Feed one Stress Score tick. Returns the transitions it caused, in
    /// order (a tick can close a cooldown and immediately begin warming).
    pub fn on_score(&mut self, score: &StressScore) -> Vec<InterventionRecord> {
        let mut records = Vec::new();
        let ts = score.timestamp;
        self.last_score = score.value;

        if self.state == InterventionState::Overridden {
            match self.override_until {
                Some(until) if ts >= until => {
                    records.push(self.transition(
                        InterventionState::Idle,
                        score.value,
                        "override_expired",
                        ts,
                    ));
                }
                // While overridden, scores are observed but drive nothing.
                _ => return records,
            }
        }

        if self.state == InterventionState::Active {
            let expired = self
                .active_since
                .map(|since| ts - since >= Duration::seconds(self.params.max_active_duration_s as i64))
                .unwrap_or(false);
            if expired {
                self.cooldown_since = Some(ts);
                records.push(self.transition(
                    InterventionState::Cooldown,
                    score.value,
                    "max_duration",
                    ts,
                ));
            }
        }

        if self.state == InterventionState::Cooldown {
            let elapsed = self
                .cooldown_since
                .map(|since| ts - since >= Duration::seconds(self.params.cooldown_duration_s as i64))
                .unwrap_or(true);
            if elapsed {
                records.push(self.transition(
                    InterventionState::Idle,
                    score.value,
                    "cooldown_elapsed",
                    ts,
                ));
            }
        }

        // A score with no contributing channels is a decayed placeholder,
        // not evidence of stress; it can end states but never start or
        // sustain one.
        let above =
            score.value > self.params.stress_threshold && !score.contributions.is_empty();
        let dominant = score
            .dominant_channel()
            .map(|c| c.as_str())
            .unwrap_or("none");

        match self.state {
            InterventionState::Idle => {
                if above {
                    self.consecutive_above = 1;
                    records.push(self.transition(
                        InterventionState::Warming,
                        score.value,
                        dominant,
                        ts,
                    ));
                    if self.consecutive_above >= self.params.sustain_ticks {
                        self.active_since = Some(ts);
                        records.push(self.transition(
                            InterventionState::Active,
                            score.value,
                            dominant,
                            ts,
                        ));
                    }
                }
            }
            InterventionState::Warming => {
                if above {
                    self.consecutive_above += 1;
                    if self.consecutive_above >= self.params.sustain_ticks {
                        self.active_since = Some(ts);
                        records.push(self.transition(
                            InterventionState::Active,
                            score.value,
                            dominant,
                            ts,
                        ));
                    }
                } else {
                    // False alarm: a single-sample spike, not an intervention.
                    self.consecutive_above = 0;
                    records.push(self.transition(
                        InterventionState::Idle,
                        score.value,
                        "false_alarm",
                        ts,
                    ));
                }
            }
            // Active waits for acknowledgment or expiry; Cooldown waits out
            // its timer; both were handled above.
            _ => {}
        }

        records
    }

    /// User explicitly accepted the intervention.
    pub fn acknowledge(&mut self, at: DateTime<Utc>) -> Option<InterventionRecord> {
        if self.state != InterventionState::Active {
            return None;
        }
        self.cooldown_since = Some(at);
        Some(self.transition(InterventionState::Cooldown, self.last_score, "acknowledged", at))
    }

    /// User snoozed interventions until the given time. Enters Overridden
    /// from any state.
    pub fn snooze(&mut self, at: DateTime<Utc>, until: DateTime<Utc>) -> Option<InterventionRecord> {
        self.override_until = Some(until);
        if self.state == InterventionState::Overridden {
            // Already overridden: just extend the timer.
            return None;
        }
        self.consecutive_above = 0;
        Some(self.transition(InterventionState::Overridden, self.last_score, "snoozed", at))
    }

    /// User explicitly re-enabled interventions.
    pub fn resume(&mut self, at: DateTime<Utc>) -> Option<InterventionRecord> {
        if self.state != InterventionState::Overridden {
            return None;
        }
        self.override_until = None;
        Some(self.transition(InterventionState::Idle, self.last_score, "resumed", at))
    }

    fn transition(
        &mut self,
        to: InterventionState,
        trigger_score: f64,
        reason: &str,
        at: DateTime<Utc>,
    ) -> InterventionRecord {
        let record = InterventionRecord {
            state_from: self.state,
            state_to: to,
            trigger_score,
            trigger_reason: reason.to_string(),
            timestamp: at,
        };
        self.state = to;
        if to != InterventionState::Warming && to != InterventionState::Active {
            self.consecutive_above = 0;
        }
        record
    }
}

impl Default for InterventionMachine {
    fn default() -> Self {
        Self::new(InterventionParams::default())
    }
}
