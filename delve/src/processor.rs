//! Bottom-up computation: answer leaves, synthesize parents, layer by layer.
//!
//! Within a layer nodes run concurrently up to `concurrency`; the layer boundary
//! is the barrier that guarantees every child is terminal before its parent
//! starts. Oracle failures stay on the failing node as `Failed` status, and a
//! recomputing node falls back to the answer it already had instead of failing;
//! the only run-level failure is a root that does not reach `Complete`.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::config::RunConfig;
use crate::graph::{Citation, GraphError, GraphStore, NodeStatus};
use crate::oracle::{AnswerOracle, ChildReport, OracleError};
use crate::snapshot::SnapshotWriter;

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    /// The root node finished the run without completing, so there is no answer.
    #[error("root synthesis failed: {0}")]
    RootSynthesisFailed(String),
    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Keeps the first citation per URL, preserving encounter order.
fn merge_citations(citations: impl IntoIterator<Item = Citation>) -> Vec<Citation> {
    let mut seen = HashSet::new();
    let mut merged = Vec::new();
    for citation in citations {
        if seen.insert(citation.url.clone()) {
            merged.push(citation);
        }
    }
    merged
}

/// Runs the computation phase over a built graph. Re-running over an already
/// computed graph is a no-op; nodes flipped back to `Recomputing` by refinement
/// are picked up again.
pub struct GraphProcessor {
    answerer: Arc<dyn AnswerOracle>,
    config: RunConfig,
    snapshots: SnapshotWriter,
}

impl GraphProcessor {
    pub fn new(answerer: Arc<dyn AnswerOracle>, config: RunConfig) -> Self {
        Self {
            answerer,
            config,
            snapshots: SnapshotWriter::noop(),
        }
    }

    pub fn with_snapshot_writer(mut self, snapshots: SnapshotWriter) -> Self {
        self.snapshots = snapshots;
        self
    }

    /// Applies the configured deadline to one oracle call.
    async fn call<T>(
        &self,
        fut: impl Future<Output = Result<T, OracleError>>,
    ) -> Result<T, OracleError> {
        match self.config.oracle_timeout {
            Some(limit) => match tokio::time::timeout(limit, fut).await {
                Ok(result) => result,
                Err(_) => Err(OracleError::Timeout),
            },
            None => fut.await,
        }
    }

    /// Computes every runnable node, leaves first, and checks the root completed.
    pub async fn process(&self, store: &GraphStore) -> Result<(), ProcessError> {
        let layers = store.layers().await?;
        for (index, layer) in layers.iter().enumerate() {
            let mut runnable = Vec::new();
            for id in layer {
                let node = store.get(id).await?;
                match node.status {
                    NodeStatus::Pending | NodeStatus::Recomputing => runnable.push(id.clone()),
                    NodeStatus::Complete | NodeStatus::Failed => {}
                    NodeStatus::InProgress => {
                        warn!(node = %id, "skipping node already in progress")
                    }
                }
            }
            if runnable.is_empty() {
                continue;
            }
            debug!(layer = index, nodes = runnable.len(), "computing layer");

            let results: Vec<Result<(), ProcessError>> = stream::iter(runnable)
                .map(|id| self.run_node(store, id))
                .buffer_unordered(self.config.concurrency)
                .collect()
                .await;
            results.into_iter().collect::<Result<(), _>>()?;
        }

        let root_id = store.root_id().await?;
        let root = store.get(&root_id).await?;
        if root.status != NodeStatus::Complete {
            return Err(ProcessError::RootSynthesisFailed(
                root.error
                    .unwrap_or_else(|| "root did not complete".to_string()),
            ));
        }
        let nodes = store.node_count().await;
        info!(nodes, "graph computed");
        Ok(())
    }

    /// Computes one node end to end. Oracle trouble marks the node failed, or
    /// restores the previous answer when the node is being recomputed, and
    /// returns `Ok`; only graph violations propagate.
    async fn run_node(&self, store: &GraphStore, id: String) -> Result<(), ProcessError> {
        let node = store.get(&id).await?;
        // A recomputing node still carries the answer it completed with; set
        // aside so a refinement that only produced failures can put it back.
        let prior = match node.status {
            NodeStatus::Recomputing => node
                .answer
                .clone()
                .map(|answer| (answer, node.cited_documents.clone())),
            _ => None,
        };
        store.mark_in_progress(&id).await?;
        self.snapshots.emit(store.snapshot().await);

        let outcome = if node.is_leaf() {
            self.call(
                self.answerer
                    .answer(&node.question, node.expected_output_format),
            )
            .await
        } else {
            let mut reports = Vec::with_capacity(node.children.len());
            let mut child_citations = Vec::new();
            let mut all_failed = true;
            for child_id in &node.children {
                let child = store.get(child_id).await?;
                if child.status != NodeStatus::Failed {
                    all_failed = false;
                    child_citations.extend(child.cited_documents.iter().cloned());
                }
                reports.push(ChildReport::from_node(&child));
            }

            if all_failed {
                match prior {
                    Some((answer, citations)) => {
                        warn!(node = %id, "gap children all failed, keeping previous answer");
                        store.complete_node(&id, answer, citations).await?;
                    }
                    None => {
                        warn!(node = %id, "all children failed, nothing to synthesize");
                        store.fail_node(&id, "all children failed").await?;
                    }
                }
                self.snapshots.emit(store.snapshot().await);
                return Ok(());
            }

            let instructions = node.composition_instructions.clone().unwrap_or_default();
            self.call(self.answerer.synthesize(
                &node.question,
                &instructions,
                &reports,
                node.expected_output_format,
            ))
            .await
            .map(|mut payload| {
                // Non-failed children's citations first, then the synthesis's own,
                // first URL wins.
                let mut citations = child_citations;
                citations.append(&mut payload.citations);
                payload.citations = merge_citations(citations);
                payload
            })
        };

        match outcome {
            Ok(payload) => {
                store
                    .complete_node(&id, payload.answer, payload.citations)
                    .await?;
            }
            Err(error) => match prior {
                Some((answer, citations)) => {
                    warn!(node = %id, %error, "recomputation failed, keeping previous answer");
                    store.complete_node(&id, answer, citations).await?;
                }
                None => {
                    warn!(node = %id, %error, "node computation failed");
                    store.fail_node(&id, &error.to_string()).await?;
                }
            },
        }
        self.snapshots.emit(store.snapshot().await);
        Ok(())
    }
}
