//! Snapshot emission: consistent graph copies pushed to a pluggable sink.
//!
//! Snapshots are observation only. Delivery is fire-and-forget: a full or closed
//! sink drops the snapshot with a debug log and the run never blocks or fails on
//! it. Wire framing for external consumers lives in the `snapshot_event` crate;
//! [`EnvelopePipe`] bridges the two.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;

use crate::graph::{GraphMeta, ResearchNode};
use snapshot_event::{EnvelopeState, SnapshotEvent};

/// Node totals by status, recomputed at capture time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotCounts {
    pub total_nodes: usize,
    pub completed: usize,
    pub in_progress: usize,
    pub failed: usize,
}

/// A consistent copy of the whole graph at one instant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub root_id: Option<String>,
    pub nodes: HashMap<String, ResearchNode>,
    pub meta: GraphMeta,
    pub counts: SnapshotCounts,
    pub captured_at: DateTime<Utc>,
}

impl GraphSnapshot {
    pub fn to_value(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
}

type EmitFn = dyn Fn(GraphSnapshot) -> bool + Send + Sync;

/// Destination for snapshots. Cloning shares the underlying sink.
///
/// The emit function returns whether the snapshot was accepted; rejection is
/// normal backpressure and is only logged.
#[derive(Clone)]
pub struct SnapshotWriter {
    emit_fn: Arc<EmitFn>,
}

impl SnapshotWriter {
    pub fn new(emit_fn: impl Fn(GraphSnapshot) -> bool + Send + Sync + 'static) -> Self {
        Self {
            emit_fn: Arc::new(emit_fn),
        }
    }

    /// Discards every snapshot. The default for runs nobody is watching.
    pub fn noop() -> Self {
        Self::new(|_| true)
    }

    /// Bounded channel sink. When the channel is full the snapshot is dropped
    /// rather than awaited, so a slow consumer cannot stall the run.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<GraphSnapshot>) {
        let (tx, rx) = mpsc::channel(capacity);
        let writer = Self::new(move |snapshot| tx.try_send(snapshot).is_ok());
        (writer, rx)
    }

    /// Like [`SnapshotWriter::channel`] but hands back a `Stream` for consumers
    /// that iterate with `StreamExt`.
    pub fn stream_channel(capacity: usize) -> (Self, ReceiverStream<GraphSnapshot>) {
        let (writer, rx) = Self::channel(capacity);
        (writer, ReceiverStream::new(rx))
    }

    /// In-memory sink that keeps every snapshot, for tests and demos.
    pub fn memory() -> (Self, MemorySink) {
        let sink = MemorySink::default();
        let captured = sink.clone();
        let writer = Self::new(move |snapshot| {
            captured.push(snapshot);
            true
        });
        (writer, sink)
    }

    /// Delivers each snapshot to both writers.
    pub fn fanout(a: SnapshotWriter, b: SnapshotWriter) -> Self {
        Self::new(move |snapshot: GraphSnapshot| {
            let first = (a.emit_fn)(snapshot.clone());
            let second = (b.emit_fn)(snapshot);
            first && second
        })
    }

    pub fn emit(&self, snapshot: GraphSnapshot) {
        if !(self.emit_fn)(snapshot) {
            debug!("snapshot dropped: sink full or closed");
        }
    }
}

/// Growable snapshot buffer behind a mutex, shared with its writer.
#[derive(Clone, Default)]
pub struct MemorySink(Arc<Mutex<Vec<GraphSnapshot>>>);

impl MemorySink {
    fn push(&self, snapshot: GraphSnapshot) {
        self.0
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(snapshot);
    }

    pub fn snapshots(&self) -> Vec<GraphSnapshot> {
        self.0
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.0
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

type SendFn = dyn Fn(Value) -> bool + Send + Sync;

/// Stamps events with the run envelope (`run_id`, `seq`, `captured_at`) and pushes
/// the framed JSON to an external consumer.
#[derive(Clone)]
pub struct EnvelopePipe {
    state: Arc<Mutex<EnvelopeState>>,
    send: Arc<SendFn>,
}

impl EnvelopePipe {
    pub fn new(
        run_id: impl Into<String>,
        send: impl Fn(Value) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(EnvelopeState::new(run_id.into()))),
            send: Arc::new(send),
        }
    }

    /// Frames and sends one event. Returns whether the consumer accepted it.
    pub fn emit(&self, event: &SnapshotEvent) -> bool {
        let value = {
            let mut state = self
                .state
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            match snapshot_event::to_json(event, &mut state) {
                Ok(value) => value,
                Err(error) => {
                    debug!(%error, "failed to encode snapshot event");
                    return false;
                }
            }
        };
        (self.send)(value)
    }

    /// A writer that frames each snapshot as a `graph_snapshot` event on this pipe.
    pub fn snapshot_writer(&self) -> SnapshotWriter {
        let pipe = self.clone();
        SnapshotWriter::new(move |snapshot| {
            let graph = match snapshot.to_value() {
                Ok(graph) => graph,
                Err(error) => {
                    debug!(%error, "failed to encode graph snapshot");
                    return false;
                }
            };
            pipe.emit(&SnapshotEvent::GraphSnapshot { graph })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_snapshot() -> GraphSnapshot {
        GraphSnapshot {
            root_id: Some("node_1".to_string()),
            nodes: HashMap::new(),
            meta: GraphMeta {
                topic: "t".to_string(),
                budget_exhausted: false,
                refinement_iterations_run: 0,
                started_at: Utc::now(),
                finished_at: None,
            },
            counts: SnapshotCounts {
                total_nodes: 1,
                ..SnapshotCounts::default()
            },
            captured_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn channel_writer_delivers() {
        let (writer, mut rx) = SnapshotWriter::channel(4);
        writer.emit(sample_snapshot());
        let got = rx.recv().await.unwrap();
        assert_eq!(got.root_id.as_deref(), Some("node_1"));
    }

    /// **Scenario**: A full channel drops the snapshot instead of blocking the run.
    #[tokio::test]
    async fn full_channel_drops_snapshot() {
        let (writer, mut rx) = SnapshotWriter::channel(1);
        writer.emit(sample_snapshot());
        writer.emit(sample_snapshot()); // dropped, does not block
        assert!(rx.recv().await.is_some());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn memory_sink_collects_everything() {
        let (writer, sink) = SnapshotWriter::memory();
        assert!(sink.is_empty());
        writer.emit(sample_snapshot());
        writer.emit(sample_snapshot());
        assert_eq!(sink.len(), 2);
        assert_eq!(sink.snapshots()[0].counts.total_nodes, 1);
    }

    #[tokio::test]
    async fn fanout_reaches_both_sinks() {
        let (a, sink_a) = SnapshotWriter::memory();
        let (b, sink_b) = SnapshotWriter::memory();
        let writer = SnapshotWriter::fanout(a, b);
        writer.emit(sample_snapshot());
        assert_eq!(sink_a.len(), 1);
        assert_eq!(sink_b.len(), 1);
    }

    /// **Scenario**: Events leaving the pipe carry the run id and consecutive
    /// sequence numbers under the wire tag.
    #[tokio::test]
    async fn envelope_pipe_frames_events() {
        let collected: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));
        let out = collected.clone();
        let pipe = EnvelopePipe::new("run-7", move |value| {
            out.lock().unwrap().push(value);
            true
        });

        assert!(pipe.emit(&SnapshotEvent::RunStarted {
            topic: "fusion".to_string(),
        }));
        let writer = pipe.snapshot_writer();
        writer.emit(sample_snapshot());

        let events = collected.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0]["run_id"], "run-7");
        assert_eq!(events[0]["seq"], 1);
        assert_eq!(events[0]["type"], "run_started");
        assert_eq!(events[1]["seq"], 2);
        assert_eq!(events[1]["type"], "graph_snapshot");
        assert_eq!(events[1]["graph"]["root_id"], "node_1");
    }
}
