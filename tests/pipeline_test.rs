//! End-to-end pipeline tests: samples in, transitions out.
//!
//! These drive the assembled pipeline through recorded timelines with a
//! recording sink, checking the behavior a user would actually observe:
//! when interventions fire, what reason they carry, and what happens when
//! sensors go quiet or the user pushes back.

use chrono::{DateTime, TimeZone, Utc};
use sati_agent::audit::create_shared_log;
use sati_agent::config::Config;
use sati_agent::core::{ChannelBaseline, ChannelId, FeatureSample, StressScore};
use sati_agent::error::AgentError;
use sati_agent::intervention::{InterventionRecord, InterventionState};
use sati_agent::pipeline::{ControlEvent, Pipeline};
use sati_agent::sink::ActionSink;
use std::sync::{Arc, Mutex};

/// Sink that records every delivery for later assertions.
#[derive(Clone, Default)]
struct RecordingSink {
    transitions: Arc<Mutex<Vec<InterventionRecord>>>,
    tick_values: Arc<Mutex<Vec<f64>>>,
}

impl RecordingSink {
    fn transitions(&self) -> Vec<InterventionRecord> {
        self.transitions.lock().unwrap().clone()
    }

    fn reasons(&self) -> Vec<String> {
        self.transitions()
            .iter()
            .map(|r| r.trigger_reason.clone())
            .collect()
    }
}

impl ActionSink for RecordingSink {
    fn on_state_transition(&mut self, record: &InterventionRecord) -> Result<(), AgentError> {
        self.transitions.lock().unwrap().push(record.clone());
        Ok(())
    }

    fn on_tick(&mut self, score: &StressScore) -> Result<(), AgentError> {
        self.tick_values.lock().unwrap().push(score.value);
        Ok(())
    }
}

/// Sink whose transition deliveries fail a set number of times before
/// recovering, to exercise the retry queue.
struct FlakySink {
    failures_left: u32,
    delivered: Arc<Mutex<Vec<InterventionRecord>>>,
}

impl ActionSink for FlakySink {
    fn on_state_transition(&mut self, record: &InterventionRecord) -> Result<(), AgentError> {
        if self.failures_left > 0 {
            self.failures_left -= 1;
            return Err(AgentError::SinkUnavailable("flaky".to_string()));
        }
        self.delivered.lock().unwrap().push(record.clone());
        Ok(())
    }

    fn on_tick(&mut self, _score: &StressScore) -> Result<(), AgentError> {
        Ok(())
    }
}

fn ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

fn sample(channel: ChannelId, secs: i64, value: f64) -> FeatureSample {
    FeatureSample::at(channel, ts(secs), value, 1.0)
}

fn test_config() -> Config {
    Config {
        data_path: std::env::temp_dir().join("sati-agent-pipeline-test"),
        ..Default::default()
    }
}

fn seeded_pipeline(config: Config, sink: Box<dyn ActionSink>) -> Pipeline {
    let pipeline = Pipeline::new(config, sink, create_shared_log()).unwrap();
    pipeline
        .baselines()
        .seed(ChannelBaseline::with_stats(ChannelId::Keyboard, 5.0, 1.0, 100));
    pipeline
}

#[test]
fn test_sustained_stress_triggers_one_intervention() {
    let sink = RecordingSink::default();
    let mut pipeline = seeded_pipeline(test_config(), Box::new(sink.clone()));

    // Typing cadence jumps well above the learned baseline and stays there.
    pipeline.handle_sample(sample(ChannelId::Keyboard, 0, 9.0));
    let first = pipeline.tick(ts(1));
    assert!(first.value > 90.0);
    assert_eq!(pipeline.state(), InterventionState::Warming);

    pipeline.handle_sample(sample(ChannelId::Keyboard, 1, 9.0));
    pipeline.tick(ts(2));
    assert_eq!(pipeline.state(), InterventionState::Active);

    let transitions = sink.transitions();
    assert_eq!(transitions.len(), 2);
    assert_eq!(transitions[0].state_to, InterventionState::Warming);
    assert_eq!(transitions[1].state_to, InterventionState::Active);
    // The reason names the dominant channel, never a raw value.
    assert_eq!(transitions[0].trigger_reason, "keyboard");
    assert_eq!(transitions[1].trigger_reason, "keyboard");
}

#[test]
fn test_single_spike_is_a_false_alarm() {
    let sink = RecordingSink::default();
    let mut pipeline = seeded_pipeline(test_config(), Box::new(sink.clone()));

    pipeline.handle_sample(sample(ChannelId::Keyboard, 0, 9.0));
    pipeline.tick(ts(1));
    assert_eq!(pipeline.state(), InterventionState::Warming);

    // Back to normal before the sustain window elapses.
    pipeline.handle_sample(sample(ChannelId::Keyboard, 1, 5.0));
    pipeline.tick(ts(2));
    assert_eq!(pipeline.state(), InterventionState::Idle);
    assert_eq!(sink.reasons(), vec!["keyboard", "false_alarm"]);
}

#[test]
fn test_acknowledge_enters_cooldown_and_suppresses_retrigger() {
    let sink = RecordingSink::default();
    let mut pipeline = seeded_pipeline(test_config(), Box::new(sink.clone()));

    pipeline.handle_sample(sample(ChannelId::Keyboard, 0, 9.0));
    pipeline.tick(ts(1));
    pipeline.handle_sample(sample(ChannelId::Keyboard, 1, 9.0));
    pipeline.tick(ts(2));
    assert_eq!(pipeline.state(), InterventionState::Active);

    pipeline.handle_control(ControlEvent::Acknowledge { at: ts(3) });
    assert_eq!(pipeline.state(), InterventionState::Cooldown);

    // Stress stays elevated through the whole cooldown; no re-trigger.
    for i in 4..60 {
        pipeline.handle_sample(sample(ChannelId::Keyboard, i, 9.0));
        pipeline.tick(ts(i + 1));
        assert_eq!(pipeline.state(), InterventionState::Cooldown);
    }

    let active_count = sink
        .transitions()
        .iter()
        .filter(|r| r.state_to == InterventionState::Active)
        .count();
    assert_eq!(active_count, 1);
}

#[test]
fn test_warmup_is_neutral_no_matter_the_values() {
    let sink = RecordingSink::default();
    let mut pipeline = Pipeline::new(
        test_config(),
        Box::new(sink.clone()),
        create_shared_log(),
    )
    .unwrap();

    // Nothing learned yet; even absurd readings must score neutrally.
    for i in 0..10 {
        pipeline.handle_sample(sample(ChannelId::Keyboard, i, 10_000.0));
        let score = pipeline.tick(ts(i + 1));
        assert!((score.value - 50.0).abs() < 1e-9);
        assert!(score.value <= 60.0);
    }
    assert_eq!(pipeline.state(), InterventionState::Idle);
    assert!(sink.transitions().is_empty());
}

#[test]
fn test_silent_sensors_decay_toward_midpoint() {
    let sink = RecordingSink::default();
    let mut pipeline = seeded_pipeline(test_config(), Box::new(sink.clone()));

    // One calm reading, then silence.
    pipeline.handle_sample(sample(ChannelId::Keyboard, 0, 3.0));
    let calm = pipeline.tick(ts(1));
    assert!(calm.value < 20.0);

    // Past twice the keyboard timeout every channel is fully stale; the
    // score drifts toward the midpoint instead of freezing or zeroing.
    let mut previous = calm.value;
    for i in [12, 13, 14, 15] {
        let score = pipeline.tick(ts(i));
        assert!(score.value > previous);
        assert!(score.value < 50.0);
        assert!(score.contributions.is_empty());
        previous = score.value;
    }
    assert_eq!(pipeline.state(), InterventionState::Idle);
}

#[test]
fn test_snooze_suppresses_interventions_until_resume() {
    let sink = RecordingSink::default();
    let mut pipeline = seeded_pipeline(test_config(), Box::new(sink.clone()));

    pipeline.handle_control(ControlEvent::Snooze {
        at: ts(0),
        until: ts(3600),
    });
    assert_eq!(pipeline.state(), InterventionState::Overridden);

    // Heavy stress the whole time; nothing may fire.
    for i in 0..30 {
        pipeline.handle_sample(sample(ChannelId::Keyboard, i, 9.0));
        pipeline.tick(ts(i + 1));
        assert_eq!(pipeline.state(), InterventionState::Overridden);
    }

    pipeline.handle_control(ControlEvent::Resume { at: ts(31) });
    assert_eq!(pipeline.state(), InterventionState::Idle);

    // The override trail is delivered once the override ends.
    pipeline.handle_sample(sample(ChannelId::Keyboard, 31, 5.0));
    pipeline.tick(ts(32));
    let reasons = sink.reasons();
    assert!(reasons.contains(&"snoozed".to_string()));
    assert!(reasons.contains(&"resumed".to_string()));
    assert!(!sink
        .transitions()
        .iter()
        .any(|r| r.state_to == InterventionState::Active));
}

#[test]
fn test_snooze_expiry_during_sensor_silence_stays_idle() {
    let sink = RecordingSink::default();
    let mut pipeline = seeded_pipeline(test_config(), Box::new(sink.clone()));

    // One stress reading, then the user snoozes and the sensors go quiet.
    pipeline.handle_sample(sample(ChannelId::Keyboard, 0, 9.0));
    pipeline.handle_control(ControlEvent::Snooze {
        at: ts(0),
        until: ts(15),
    });

    // The decayed leftover score is still above the threshold when the
    // snooze lapses; with no channel contributing it must not warm.
    for i in 1..=20 {
        pipeline.tick(ts(i));
    }

    assert_eq!(pipeline.state(), InterventionState::Idle);
    let reasons = sink.reasons();
    assert!(reasons.contains(&"override_expired".to_string()));
    assert!(!sink.transitions().iter().any(|r| {
        r.state_to == InterventionState::Warming || r.state_to == InterventionState::Active
    }));
}

#[test]
fn test_persisted_snooze_applies_at_startup() {
    let mut config = test_config();
    config.snoozed_until = Some(ts(3600));
    let sink = RecordingSink::default();
    let mut pipeline =
        Pipeline::new(config, Box::new(sink.clone()), create_shared_log()).unwrap();
    pipeline
        .baselines()
        .seed(ChannelBaseline::with_stats(ChannelId::Keyboard, 5.0, 1.0, 100));

    pipeline.apply_persisted_snooze(ts(0));
    assert_eq!(pipeline.state(), InterventionState::Overridden);

    // Heavy stress inside the promised window; nothing may fire.
    for i in 0..30 {
        pipeline.handle_sample(sample(ChannelId::Keyboard, i, 9.0));
        pipeline.tick(ts(i + 1));
        assert_eq!(pipeline.state(), InterventionState::Overridden);
    }
    assert!(!sink
        .transitions()
        .iter()
        .any(|r| r.state_to == InterventionState::Active));
}

#[test]
fn test_expired_snooze_is_ignored_at_startup() {
    let mut config = test_config();
    config.snoozed_until = Some(ts(-10));
    let mut pipeline = Pipeline::new(
        config,
        Box::new(RecordingSink::default()),
        create_shared_log(),
    )
    .unwrap();

    pipeline.apply_persisted_snooze(ts(0));
    assert_eq!(pipeline.state(), InterventionState::Idle);
}

#[test]
fn test_failed_sink_deliveries_are_retried_in_order() {
    let delivered = Arc::new(Mutex::new(Vec::new()));
    let sink = FlakySink {
        failures_left: 2,
        delivered: Arc::clone(&delivered),
    };
    let mut config = test_config();
    config.sustain_ticks = 1;
    let mut pipeline = Pipeline::new(config, Box::new(sink), create_shared_log()).unwrap();
    pipeline
        .baselines()
        .seed(ChannelBaseline::with_stats(ChannelId::Keyboard, 5.0, 1.0, 100));

    // One tick produces two transitions (Warming then Active); the sink
    // rejects both attempts across the first two ticks.
    pipeline.handle_sample(sample(ChannelId::Keyboard, 0, 9.0));
    pipeline.tick(ts(1));
    assert_eq!(pipeline.pending_deliveries(), 2);

    pipeline.tick(ts(2));
    assert_eq!(pipeline.pending_deliveries(), 2);

    // Third tick: the sink recovers and the backlog drains in order.
    pipeline.tick(ts(3));
    assert_eq!(pipeline.pending_deliveries(), 0);

    let delivered = delivered.lock().unwrap();
    assert_eq!(delivered.len(), 2);
    assert_eq!(delivered[0].state_to, InterventionState::Warming);
    assert_eq!(delivered[1].state_to, InterventionState::Active);
}

#[test]
fn test_replay_is_deterministic() {
    let timeline: Vec<FeatureSample> = (0..120)
        .map(|i| {
            let value = if (40..80).contains(&i) { 9.0 } else { 5.0 };
            sample(ChannelId::Keyboard, i, value)
        })
        .collect();

    let run = |timeline: Vec<FeatureSample>| {
        let sink = RecordingSink::default();
        let mut pipeline = seeded_pipeline(test_config(), Box::new(sink.clone()));
        let scores = pipeline.replay(timeline);
        (
            scores.iter().map(|s| s.value).collect::<Vec<_>>(),
            sink.transitions(),
        )
    };

    let (scores_a, transitions_a) = run(timeline.clone());
    let (scores_b, transitions_b) = run(timeline);
    assert_eq!(scores_a, scores_b);
    assert_eq!(transitions_a, transitions_b);
    // The stressed stretch actually produced an intervention.
    assert!(transitions_a
        .iter()
        .any(|r| r.state_to == InterventionState::Active));
}

#[test]
fn test_multi_channel_fusion_prefers_heavier_channel_as_reason() {
    let mut config = test_config();
    config.sustain_ticks = 1;
    let sink = RecordingSink::default();
    let mut pipeline =
        Pipeline::new(config, Box::new(sink.clone()), create_shared_log()).unwrap();
    pipeline
        .baselines()
        .seed(ChannelBaseline::with_stats(ChannelId::Keyboard, 5.0, 1.0, 100));
    pipeline
        .baselines()
        .seed(ChannelBaseline::with_stats(ChannelId::Mouse, 200.0, 400.0, 100));

    // Both elevated, but the keyboard carries more weight and more deviation.
    pipeline.handle_sample(sample(ChannelId::Keyboard, 0, 9.0));
    pipeline.handle_sample(sample(ChannelId::Mouse, 0, 260.0));
    pipeline.tick(ts(1));

    assert_eq!(pipeline.state(), InterventionState::Active);
    assert_eq!(sink.transitions()[0].trigger_reason, "keyboard");
}
