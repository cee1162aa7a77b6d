//! Pipeline orchestration.
//!
//! Wires the stages together: samples arrive from producer channels, are
//! normalized against their baselines, fused on a fixed tick into a Stress
//! Score, and fed to the intervention machine. Transitions go to the action
//! sink with retry; everything notable lands in the audit trail.
//!
//! All mutable state (latest scores, the fusion engine, the intervention
//! machine) is owned by the single thread driving `handle_sample`/`tick`.
//! Only the baseline store is shared, and it is sharded per channel.

use crate::audit::SharedAuditLog;
use crate::config::Config;
use crate::core::baseline::BaselineStore;
use crate::core::normalizer::{normalize, NormalizerParams};
use crate::core::types::{ChannelId, ChannelScore, FeatureSample, StressScore};
use crate::core::FusionEngine;
use crate::error::AgentError;
use crate::intervention::{InterventionMachine, InterventionRecord, InterventionState};
use crate::sink::ActionSink;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use crossbeam_channel::Receiver;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// User-originated control events, fed in by the UI or CLI collaborator.
#[derive(Debug, Clone)]
pub enum ControlEvent {
    /// User accepted the live intervention
    Acknowledge { at: DateTime<Utc> },
    /// User snoozed interventions until the given time
    Snooze {
        at: DateTime<Utc>,
        until: DateTime<Utc>,
    },
    /// User explicitly re-enabled interventions
    Resume { at: DateTime<Utc> },
}

/// The assembled stress pipeline.
pub struct Pipeline {
    config: Config,
    normalizer_params: NormalizerParams,
    baselines: Arc<BaselineStore>,
    /// Latest score per channel, carried forward with growing staleness
    latest: BTreeMap<ChannelId, ChannelScore>,
    engine: FusionEngine,
    machine: InterventionMachine,
    /// Transitions awaiting sink delivery
    pending: VecDeque<InterventionRecord>,
    audit: SharedAuditLog,
    sink: Box<dyn ActionSink>,
}

impl Pipeline {
    pub fn new(
        mut config: Config,
        sink: Box<dyn ActionSink>,
        audit: SharedAuditLog,
    ) -> Result<Self, AgentError> {
        config.validate()?;
        let baselines = Arc::new(BaselineStore::new(config.baseline_window));
        let engine = FusionEngine::new(config.fusion_weights());
        let machine = InterventionMachine::new(config.intervention_params());
        let normalizer_params = config.normalizer_params();
        Ok(Self {
            config,
            normalizer_params,
            baselines,
            latest: BTreeMap::new(),
            engine,
            machine,
            pending: VecDeque::new(),
            audit,
            sink,
        })
    }

    /// The shared baseline store (for seeding, persistence, recalibration).
    pub fn baselines(&self) -> Arc<BaselineStore> {
        Arc::clone(&self.baselines)
    }

    pub fn state(&self) -> InterventionState {
        self.machine.state()
    }

    /// Ingest one sample. Low-confidence samples and samples for disabled
    /// channels are dropped (counted, never an error). While an
    /// intervention is warming or active the baselines are frozen so the
    /// stressed interval cannot recalibrate them toward the stressed state.
    pub fn handle_sample(&mut self, sample: FeatureSample) {
        if !self.config.channel_enabled(sample.channel) {
            self.audit.record_disabled_channel_drop();
            tracing::debug!(channel = sample.channel.as_str(), "sample for disabled channel");
            return;
        }
        if sample.confidence < self.normalizer_params.confidence_floor {
            self.audit.record_low_confidence_drop();
            return;
        }
        self.audit.record_sample();

        let frozen = matches!(
            self.machine.state(),
            InterventionState::Warming | InterventionState::Active
        );
        if !frozen {
            self.baselines
                .observe(sample.channel, sample.value, sample.timestamp);
        }

        let baseline = self.baselines.get(sample.channel);
        if let Some(score) = normalize(&sample, &baseline, &self.normalizer_params) {
            self.latest.insert(sample.channel, score);
        }
        // The sample dies here; nothing downstream sees the raw value.
    }

    /// Honor a snooze carried in the configuration, so a window granted by
    /// `sati-agent snooze` survives an agent restart.
    pub fn apply_persisted_snooze(&mut self, now: DateTime<Utc>) {
        if let Some(until) = self.config.snoozed_until {
            if until > now {
                self.handle_control(ControlEvent::Snooze { at: now, until });
            }
        }
    }

    /// Apply a user control event.
    pub fn handle_control(&mut self, event: ControlEvent) {
        let record = match event {
            ControlEvent::Acknowledge { at } => self.machine.acknowledge(at),
            ControlEvent::Snooze { at, until } => self.machine.snooze(at, until),
            ControlEvent::Resume { at } => self.machine.resume(at),
        };
        if let Some(record) = record {
            self.audit.append(record.clone());
            self.pending.push_back(record);
        }
    }

    /// Run one fusion tick at the given instant: snapshot staleness, fuse,
    /// drive the state machine, deliver to the sink. Returns the emitted
    /// score.
    pub fn tick(&mut self, now: DateTime<Utc>) -> StressScore {
        for score in self.latest.values_mut() {
            let staleness = (now - score.observed_at).num_milliseconds() as f64 / 1000.0;
            score.staleness_s = staleness.max(0.0);
        }

        let score = self.engine.fuse(&self.latest, now);
        self.audit.record_tick();

        for record in self.machine.on_score(&score) {
            self.audit.append(record.clone());
            self.pending.push_back(record);
        }

        let suppressed = self.machine.state() == InterventionState::Overridden;
        if !suppressed {
            self.flush_pending();
        }

        // The live indicator gets every tick, overridden or not; a sink
        // failure here is dropped, not retried - the next tick supersedes it.
        if let Err(e) = self.sink.on_tick(&score) {
            tracing::debug!("sink dropped tick: {e}");
        }

        score
    }

    /// Deliver queued transitions; stop at the first failure and leave the
    /// remainder for the next tick.
    fn flush_pending(&mut self) {
        while let Some(record) = self.pending.front() {
            match self.sink.on_state_transition(record) {
                Ok(()) => {
                    self.pending.pop_front();
                }
                Err(e) => {
                    tracing::warn!("sink unavailable, retrying next tick: {e}");
                    break;
                }
            }
        }
    }

    /// Number of transitions still awaiting sink delivery.
    pub fn pending_deliveries(&self) -> usize {
        self.pending.len()
    }

    /// Flush derived state to disk: baselines and the audit trail. In-flight
    /// samples are dropped by design; partial fusion results are never
    /// persisted.
    pub fn shutdown(&mut self) -> Result<(), AgentError> {
        self.flush_pending();
        self.baselines.save(&self.config.baselines_path())?;
        self.audit.save()?;
        Ok(())
    }

    /// Drive the pipeline from live producer channels until `running` goes
    /// false. Samples are consumed as they arrive; a fusion tick fires every
    /// `tick_interval_s` regardless of sample traffic, so a stalled sensor
    /// never stalls fusion. The config file is re-read once per second so a
    /// second process can snooze/resume/acknowledge the running agent.
    pub fn run(
        &mut self,
        samples: Receiver<FeatureSample>,
        controls: Receiver<ControlEvent>,
        running: Arc<AtomicBool>,
    ) -> Result<(), AgentError> {
        let tick_interval = Duration::from_secs(self.config.tick_interval_s);
        let mut last_tick = Instant::now();
        let mut last_config_check = Instant::now();
        let mut snoozed_until = self.config.snoozed_until;
        self.apply_persisted_snooze(Utc::now());

        while running.load(Ordering::SeqCst) {
            match samples.recv_timeout(Duration::from_millis(100)) {
                Ok(sample) => self.handle_sample(sample),
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                    tracing::info!("sample sources disconnected, shutting down");
                    break;
                }
            }

            while let Ok(event) = controls.try_recv() {
                self.handle_control(event);
            }

            if last_config_check.elapsed() >= Duration::from_secs(1) {
                self.poll_config_overrides(&mut snoozed_until);
                last_config_check = Instant::now();
            }

            if last_tick.elapsed() >= tick_interval {
                self.tick(Utc::now());
                last_tick = Instant::now();
            }
        }

        self.shutdown()
    }

    /// Pick up cross-process control changes from the config file, in the
    /// manner of an external `sati-agent snooze`/`resume`/`ack` invocation.
    fn poll_config_overrides(&mut self, snoozed_until: &mut Option<DateTime<Utc>>) {
        let Ok(fresh) = Config::load() else {
            return;
        };
        let now = Utc::now();

        if fresh.snoozed_until != *snoozed_until {
            *snoozed_until = fresh.snoozed_until;
            match fresh.snoozed_until {
                Some(until) if until > now => {
                    tracing::info!(%until, "snooze requested");
                    self.handle_control(ControlEvent::Snooze { at: now, until });
                }
                _ => {
                    tracing::info!("resume requested");
                    self.handle_control(ControlEvent::Resume { at: now });
                }
            }
        }

        if fresh.pending_ack {
            self.handle_control(ControlEvent::Acknowledge { at: now });
            // Clear against the newest on-disk copy so a snooze or resume
            // written since the poll is not overwritten.
            if let Err(e) = Config::consume_pending_ack(&Config::config_path()) {
                tracing::warn!("could not clear acknowledgment flag: {e}");
            }
        }
    }

    /// Replay a recorded, timestamp-ordered sample stream deterministically:
    /// ticks fire on the sample timeline at the configured interval rather
    /// than on the wall clock. Returns the emitted score sequence.
    pub fn replay(&mut self, samples: Vec<FeatureSample>) -> Vec<StressScore> {
        let mut scores = Vec::new();
        let Some(first) = samples.first() else {
            return scores;
        };
        let interval = ChronoDuration::seconds(self.config.tick_interval_s as i64);
        let mut next_tick = first.timestamp + interval;

        for sample in samples {
            while sample.timestamp >= next_tick {
                scores.push(self.tick(next_tick));
                next_tick += interval;
            }
            self.handle_sample(sample);
        }
        // One closing tick so the final samples are scored.
        scores.push(self.tick(next_tick));
        scores
    }
}
