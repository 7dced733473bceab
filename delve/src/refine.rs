//! Refinement: bounded gap-filling passes over an already computed graph.
//!
//! Each iteration reviews every complete node's answer, attaches gap questions
//! as new children under the node that revealed them, flips that node and its
//! complete ancestors back to `recomputing`, and re-runs the processor. Budgets
//! are shared with the build, not reset. The pass ends early once a review
//! round attaches nothing, and it never leaves a reviewed node worse off: a
//! recomputation that only produces failures keeps the previous answer.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::RunConfig;
use crate::graph::{normalize_question, GraphError, GraphStore, NodeStatus, OutputFormat};
use crate::oracle::{DecompositionOracle, OracleError};
use crate::processor::{GraphProcessor, ProcessError};
use crate::snapshot::SnapshotWriter;

/// New children one review may attach under one node in one iteration.
const GAP_CHILDREN_PER_NODE: usize = 2;

pub struct RefinementPass {
    decomposer: Arc<dyn DecompositionOracle>,
    config: RunConfig,
    snapshots: SnapshotWriter,
}

impl RefinementPass {
    pub fn new(decomposer: Arc<dyn DecompositionOracle>, config: RunConfig) -> Self {
        Self {
            decomposer,
            config,
            snapshots: SnapshotWriter::noop(),
        }
    }

    pub fn with_snapshot_writer(mut self, snapshots: SnapshotWriter) -> Self {
        self.snapshots = snapshots;
        self
    }

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

    /// Runs up to `max_refinements` iterations. Returns how many actually
    /// recomputed anything.
    pub async fn run(
        &self,
        store: &GraphStore,
        processor: &GraphProcessor,
    ) -> Result<u32, ProcessError> {
        let mut iterations_run = 0;
        for iteration in 1..=self.config.max_refinements {
            let attached = self.review_round(store, iteration).await?;
            if attached == 0 {
                debug!(iteration, "no gaps attached, refinement settled");
                break;
            }
            processor.process(store).await?;
            store.mark_refinement_iteration().await;
            iterations_run += 1;
            info!(iteration, attached, "refinement iteration recomputed");
        }
        Ok(iterations_run)
    }

    /// Reviews every complete node once and attaches its gap children.
    /// Returns how many children were attached across the whole round.
    async fn review_round(
        &self,
        store: &GraphStore,
        iteration: u32,
    ) -> Result<usize, ProcessError> {
        let mut attached_total = 0;
        for id in store.ids().await {
            let node = store.get(&id).await?;
            if node.status != NodeStatus::Complete {
                continue;
            }
            let answer = node.answer.clone().unwrap_or_default();
            let review = match self
                .call(self.decomposer.review(&node.question, &answer))
                .await
            {
                Ok(review) => review,
                Err(error) => {
                    warn!(node = %id, %error, "review failed, treating answer as sufficient");
                    continue;
                }
            };
            if review.sufficient {
                continue;
            }

            let mut lineage = vec![node.question.clone()];
            lineage.extend(store.ancestor_questions(&id).await?);

            let mut attached_here = 0;
            for gap in review.gap_questions.iter().take(GAP_CHILDREN_PER_NODE) {
                let normalized = normalize_question(gap);
                if lineage.iter().any(|q| normalize_question(q) == normalized) {
                    debug!(node = %id, gap, "dropping gap equivalent to its own lineage");
                    continue;
                }
                if let Some(existing_id) = store.find_by_question(gap).await {
                    if node.children.contains(&existing_id) {
                        continue;
                    }
                    match store.attach_parent(&existing_id, &id).await {
                        Ok(()) => {
                            debug!(node = %existing_id, parent = %id, "gap shares existing node");
                            self.snapshots.emit(store.snapshot().await);
                            attached_here += 1;
                        }
                        Err(GraphError::WouldCreateCycle { .. }) => {
                            debug!(node = %existing_id, "dropping gap that would close a cycle");
                        }
                        Err(other) => return Err(other.into()),
                    }
                    continue;
                }
                if node.depth + 1 > self.config.max_depth
                    || store.node_count().await >= self.config.max_nodes
                {
                    store.set_budget_exhausted().await;
                    debug!(node = %id, gap, "budget exhausted, reporting gap as-is");
                    continue;
                }
                let child_id = store
                    .create_child(&id, gap, OutputFormat::Report, iteration)
                    .await?;
                debug!(node = %child_id, parent = %id, "gap child created");
                self.snapshots.emit(store.snapshot().await);
                attached_here += 1;
            }

            if attached_here > 0 {
                attached_total += attached_here;
                self.mark_recompute_path(store, &id).await?;
            }
        }
        Ok(attached_total)
    }

    /// Flips the node and every still-complete ancestor back to `recomputing`,
    /// so re-synthesis reaches the root.
    async fn mark_recompute_path(
        &self,
        store: &GraphStore,
        id: &str,
    ) -> Result<(), ProcessError> {
        store.begin_recompute(id).await?;
        self.snapshots.emit(store.snapshot().await);
        for ancestor_id in store.ancestor_ids(id).await? {
            if store.get(&ancestor_id).await?.status == NodeStatus::Complete {
                store.begin_recompute(&ancestor_id).await?;
                self.snapshots.emit(store.snapshot().await);
            }
        }
        Ok(())
    }
}
