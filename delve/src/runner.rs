//! Run orchestration: one call from topic to final graph and report.
//!
//! The runner wires the builder, processor, refinement pass, and assembler
//! around one store and one snapshot writer, and applies the error taxonomy:
//! oracle trouble stays on nodes, root synthesis failure becomes a `Failed`
//! run outcome, assembly failure costs only the report, and only graph or
//! config violations surface as `Err`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::builder::{BuildError, GraphBuilder};
use crate::config::{ConfigError, RunConfig};
use crate::graph::{GraphError, GraphStore};
use crate::oracle::{AnswerOracle, DecompositionOracle};
use crate::processor::{GraphProcessor, ProcessError};
use crate::refine::RefinementPass;
use crate::report::{ReportAssembler, ReportBundle};
use crate::snapshot::{EnvelopePipe, SnapshotWriter};
use snapshot_event::SnapshotEvent;

/// Terminal status of a run. `Failed` still carries the full graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Complete,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Complete => "complete",
            RunStatus::Failed => "failed",
        }
    }
}

/// Everything a finished run leaves behind.
pub struct RunOutcome {
    /// The full graph in terminal state, inspectable regardless of status.
    pub graph: GraphStore,
    pub status: RunStatus,
    /// Present only when the run completed and assembly succeeded.
    pub report: Option<ReportBundle>,
    /// Why the report is missing despite a complete run, if that happened.
    pub report_error: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),
    #[error(transparent)]
    Graph(#[from] GraphError),
}

impl From<BuildError> for RunError {
    fn from(err: BuildError) -> Self {
        match err {
            BuildError::InvalidConfig(e) => RunError::InvalidConfig(e),
            BuildError::Graph(e) => RunError::Graph(e),
        }
    }
}

/// Entry point for a whole research run. Construct once, run once per topic.
pub struct ResearchRunner {
    decomposer: Arc<dyn DecompositionOracle>,
    answerer: Arc<dyn AnswerOracle>,
    config: RunConfig,
    snapshots: SnapshotWriter,
    events: Option<EnvelopePipe>,
}

impl ResearchRunner {
    pub fn new(
        decomposer: Arc<dyn DecompositionOracle>,
        answerer: Arc<dyn AnswerOracle>,
        config: RunConfig,
    ) -> Self {
        Self {
            decomposer,
            answerer,
            config,
            snapshots: SnapshotWriter::noop(),
            events: None,
        }
    }

    /// Receives every graph snapshot the run emits.
    pub fn with_snapshot_writer(mut self, snapshots: SnapshotWriter) -> Self {
        self.snapshots = snapshots;
        self
    }

    /// Attaches an external event consumer. Snapshots are additionally framed as
    /// enveloped wire events (fresh run id, consecutive sequence numbers) and
    /// bracketed by `run_started`/`run_finished`.
    pub fn with_event_sink(
        mut self,
        send: impl Fn(Value) -> bool + Send + Sync + 'static,
    ) -> Self {
        let run_id = Uuid::new_v4().to_string();
        debug!(%run_id, "event sink attached");
        let pipe = EnvelopePipe::new(run_id, send);
        self.snapshots = SnapshotWriter::fanout(self.snapshots.clone(), pipe.snapshot_writer());
        self.events = Some(pipe);
        self
    }

    /// Runs the full lifecycle for `topic`: build, process, refine, assemble.
    pub async fn run(&self, topic: &str) -> Result<RunOutcome, RunError> {
        self.config.validate()?;
        if let Some(events) = &self.events {
            events.emit(&SnapshotEvent::RunStarted {
                topic: topic.to_string(),
            });
        }
        info!(topic, "research run started");

        let builder = GraphBuilder::new(self.decomposer.clone(), self.config.clone())
            .with_snapshot_writer(self.snapshots.clone());
        let store = builder.build(topic).await?;

        let processor = GraphProcessor::new(self.answerer.clone(), self.config.clone())
            .with_snapshot_writer(self.snapshots.clone());
        let mut status = RunStatus::Complete;
        match processor.process(&store).await {
            Ok(()) => {}
            Err(ProcessError::RootSynthesisFailed(reason)) => {
                warn!(%reason, "run failed at root synthesis");
                status = RunStatus::Failed;
            }
            Err(ProcessError::Graph(e)) => return Err(e.into()),
        }

        if status == RunStatus::Complete && self.config.max_refinements > 0 {
            let pass = RefinementPass::new(self.decomposer.clone(), self.config.clone())
                .with_snapshot_writer(self.snapshots.clone());
            match pass.run(&store, &processor).await {
                Ok(iterations) => debug!(iterations, "refinement finished"),
                Err(ProcessError::RootSynthesisFailed(reason)) => {
                    warn!(%reason, "run failed during refinement re-synthesis");
                    status = RunStatus::Failed;
                }
                Err(ProcessError::Graph(e)) => return Err(e.into()),
            }
        }

        store.finish().await;

        let (report, report_error) = if status == RunStatus::Complete {
            match ReportAssembler::new().assemble(&store).await {
                Ok(bundle) => (Some(bundle), None),
                Err(error) => {
                    warn!(%error, "graph succeeded but report assembly failed");
                    (None, Some(error.to_string()))
                }
            }
        } else {
            (None, None)
        };

        if let Some(events) = &self.events {
            let snapshot = store.snapshot().await;
            events.emit(&SnapshotEvent::RunFinished {
                status: status.as_str().to_string(),
                nodes_total: snapshot.counts.total_nodes,
                nodes_failed: snapshot.counts.failed,
            });
        }
        info!(status = status.as_str(), "research run finished");

        Ok(RunOutcome {
            graph: store,
            status,
            report,
            report_error,
        })
    }
}
