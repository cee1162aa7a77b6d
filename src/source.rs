//! Signal source interface.
//!
//! Sensors are external collaborators: each one runs as its own producer
//! and pushes already-anonymized `FeatureSample`s into the pipeline through
//! a bounded channel. The core never polls hardware. A full queue drops the
//! sample rather than blocking a producer.

use crate::core::types::FeatureSample;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::io::BufRead;
use std::thread;

/// Default capacity of the sample queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Create the sample queue connecting signal sources to the pipeline.
pub fn sample_channel(capacity: usize) -> (SampleEmitter, Receiver<FeatureSample>) {
    let (sender, receiver) = bounded(capacity);
    (SampleEmitter { sender }, receiver)
}

/// Handle a signal source uses to push samples. Cheap to clone; one per
/// sensor modality.
#[derive(Debug, Clone)]
pub struct SampleEmitter {
    sender: Sender<FeatureSample>,
}

impl SampleEmitter {
    /// Push a sample, fire-and-forget. Returns false if the sample was
    /// dropped (queue full or pipeline gone); the producer carries on
    /// either way.
    pub fn emit(&self, sample: FeatureSample) -> bool {
        match self.sender.try_send(sample) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::debug!("sample queue full, dropping sample");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

/// Spawn a reader that feeds JSONL-encoded `FeatureSample`s from any
/// buffered input (a replay file, or stdin from an external capture
/// process) into the pipeline. Malformed lines are skipped with a warning.
pub fn spawn_jsonl_reader<R>(reader: R, emitter: SampleEmitter) -> thread::JoinHandle<()>
where
    R: BufRead + Send + 'static,
{
    thread::spawn(move || {
        for line in reader.lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    tracing::warn!("sample input closed: {e}");
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<FeatureSample>(&line) {
                Ok(sample) => {
                    emitter.emit(sample);
                }
                Err(e) => {
                    tracing::warn!("skipping malformed sample line: {e}");
                }
            }
        }
    })
}

/// Parse a full JSONL buffer into samples, preserving order (replay mode).
pub fn parse_jsonl(input: &str) -> Vec<FeatureSample> {
    input
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str::<FeatureSample>(line) {
            Ok(sample) => Some(sample),
            Err(e) => {
                tracing::warn!("skipping malformed sample line: {e}");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ChannelId;
    use std::io::Cursor;

    #[test]
    fn test_emit_and_receive() {
        let (emitter, receiver) = sample_channel(4);
        assert!(emitter.emit(FeatureSample::new(ChannelId::Keyboard, 5.0, 1.0)));
        let sample = receiver.recv().unwrap();
        assert_eq!(sample.channel, ChannelId::Keyboard);
    }

    #[test]
    fn test_full_queue_drops_instead_of_blocking() {
        let (emitter, _receiver) = sample_channel(1);
        assert!(emitter.emit(FeatureSample::new(ChannelId::Mouse, 1.0, 1.0)));
        assert!(!emitter.emit(FeatureSample::new(ChannelId::Mouse, 2.0, 1.0)));
    }

    #[test]
    fn test_jsonl_reader_skips_malformed_lines() {
        let input = concat!(
            r#"{"channel":"keyboard","timestamp":"2024-01-15T10:00:00Z","value":6.5,"confidence":1.0}"#,
            "\n",
            "not json\n",
            "\n",
            r#"{"channel":"posture","timestamp":"2024-01-15T10:00:01Z","value":12.0,"confidence":0.8}"#,
            "\n",
        );
        let (emitter, receiver) = sample_channel(8);
        spawn_jsonl_reader(Cursor::new(input.to_string()), emitter)
            .join()
            .unwrap();

        let samples: Vec<_> = receiver.try_iter().collect();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].channel, ChannelId::Keyboard);
        assert_eq!(samples[1].channel, ChannelId::Posture);
    }

    #[test]
    fn test_parse_jsonl_preserves_order() {
        let input = concat!(
            r#"{"channel":"keyboard","timestamp":"2024-01-15T10:00:00Z","value":1.0,"confidence":1.0}"#,
            "\n",
            r#"{"channel":"keyboard","timestamp":"2024-01-15T10:00:01Z","value":2.0,"confidence":1.0}"#,
            "\n",
        );
        let samples = parse_jsonl(input);
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].value, 1.0);
        assert_eq!(samples[1].value, 2.0);
    }
}
