//! Envelope (run_id, seq, captured_at) for each event.
//! EnvelopeState issues monotonically increasing sequence numbers within one run.

use crate::event::SnapshotEvent;
use serde_json::Value;

/// Envelope fields attached to each event.
#[derive(Clone, Debug, Default)]
pub struct Envelope {
    /// Run ID; constant within a run.
    pub run_id: Option<String>,
    /// Per-event sequence number; monotonically increasing within a run.
    pub seq: Option<u64>,
    /// RFC 3339 capture time.
    pub captured_at: Option<String>,
}

impl Envelope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_run_id(mut self, id: impl Into<String>) -> Self {
        self.run_id = Some(id.into());
        self
    }

    pub fn with_seq(mut self, seq: u64) -> Self {
        self.seq = Some(seq);
        self
    }

    pub fn with_captured_at(mut self, ts: impl Into<String>) -> Self {
        self.captured_at = Some(ts.into());
        self
    }

    /// Merges envelope fields into the given JSON object (top-level only).
    /// Does not overwrite existing keys.
    pub fn inject_into(&self, obj: &mut Value) {
        let Some(obj) = obj.as_object_mut() else {
            return;
        };
        if let Some(ref id) = self.run_id {
            obj.entry("run_id")
                .or_insert_with(|| Value::String(id.clone()));
        }
        if let Some(seq) = self.seq {
            obj.entry("seq")
                .or_insert_with(|| Value::Number(serde_json::Number::from(seq)));
        }
        if let Some(ref ts) = self.captured_at {
            obj.entry("captured_at")
                .or_insert_with(|| Value::String(ts.clone()));
        }
    }
}

/// Envelope state for one run: run_id plus the next sequence number.
pub struct EnvelopeState {
    pub run_id: String,
    pub next_seq: u64,
}

impl EnvelopeState {
    pub fn new(run_id: String) -> Self {
        Self { run_id, next_seq: 1 }
    }

    /// Injects envelope fields into the event value and advances the sequence.
    pub fn inject_into(&mut self, value: &mut Value) {
        let env = Envelope::new()
            .with_run_id(&self.run_id)
            .with_seq(self.next_seq)
            .with_captured_at(chrono::Utc::now().to_rfc3339());
        self.next_seq += 1;
        env.inject_into(value);
    }
}

/// Converts an event to JSON and injects envelope fields using the given state.
/// Returns the final value (type + payload + run_id, seq, captured_at).
pub fn to_json(
    event: &SnapshotEvent,
    state: &mut EnvelopeState,
) -> Result<Value, serde_json::Error> {
    let mut value = event.to_value()?;
    state.inject_into(&mut value);
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::SnapshotEvent;

    #[test]
    fn envelope_inject() {
        let mut obj = serde_json::json!({"type":"run_started","topic":"fusion"});
        let env = Envelope::new()
            .with_run_id("run-1")
            .with_seq(1)
            .with_captured_at("2026-01-01T00:00:00Z");
        env.inject_into(&mut obj);
        assert_eq!(obj["run_id"], "run-1");
        assert_eq!(obj["seq"], 1);
        assert_eq!(obj["captured_at"], "2026-01-01T00:00:00Z");
        assert_eq!(obj["type"], "run_started");
    }

    #[test]
    fn inject_does_not_overwrite_existing_keys() {
        let mut obj = serde_json::json!({"type":"run_started","run_id":"already-set"});
        let env = Envelope::new().with_run_id("run-2").with_seq(9);
        env.inject_into(&mut obj);
        assert_eq!(obj["run_id"], "already-set");
        assert_eq!(obj["seq"], 9);
    }

    #[test]
    fn to_json_advances_seq() {
        let ev = SnapshotEvent::RunStarted {
            topic: "test".to_string(),
        };
        let mut state = EnvelopeState::new("run-42".to_string());

        let first = to_json(&ev, &mut state).unwrap();
        let second = to_json(&ev, &mut state).unwrap();

        assert_eq!(first["run_id"], "run-42");
        assert_eq!(first["seq"], 1);
        assert_eq!(second["seq"], 2);
        assert!(second["captured_at"].is_string());
    }
}
