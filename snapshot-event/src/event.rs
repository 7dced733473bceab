//! Wire-level event types (type + payload).
//! The graph payload is `serde_json::Value`; the engine serializes its snapshot form into that.

use serde::Serialize;
use serde_json::Value;

/// Snapshot event: wire shape for one observability event (type + payload).
/// Envelope fields (run_id, seq, captured_at) are applied separately.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SnapshotEvent {
    /// A run began for the given topic.
    RunStarted { topic: String },
    /// Full-graph snapshot, emitted after every node state transition.
    GraphSnapshot { graph: Value },
    /// Terminal event with final counts. `status` is "complete" or "failed".
    RunFinished {
        status: String,
        nodes_total: usize,
        nodes_failed: usize,
    },
}

impl SnapshotEvent {
    /// Serializes this event to a JSON object (type + payload only; no envelope).
    ///
    /// Use crate-level [`crate::to_json`] when you need envelope fields injected.
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}
