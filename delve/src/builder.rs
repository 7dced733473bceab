//! Graph construction: breadth-first decomposition under hard budgets.
//!
//! The builder grows the graph top-down from the run topic, asking the
//! decomposition oracle about each admitted question exactly once. Candidates
//! that duplicate an existing question become extra parent edges instead of new
//! nodes; candidates that duplicate their own lineage are dropped as
//! non-productive. Budget pressure never fails the build, it clips the frontier
//! and flags `budget_exhausted` on the graph metadata.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::{ConfigError, RunConfig};
use crate::graph::{normalize_question, GraphError, GraphStore, OutputFormat};
use crate::oracle::{Decision, DecompositionOracle};
use crate::snapshot::SnapshotWriter;

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),
    #[error(transparent)]
    Graph(#[from] GraphError),
}

struct Candidate {
    question: String,
    /// `None` only for the run topic itself.
    parent_id: Option<String>,
    depth: u32,
}

/// Builds the research graph for a topic. See the module docs for the admission
/// rules; the short version is one oracle decision per node, ever.
pub struct GraphBuilder {
    decomposer: Arc<dyn DecompositionOracle>,
    config: RunConfig,
    snapshots: SnapshotWriter,
}

impl GraphBuilder {
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

    /// Builds the full graph for `topic`, breadth-first.
    pub async fn build(&self, topic: &str) -> Result<GraphStore, BuildError> {
        self.config.validate()?;
        let store = GraphStore::new(topic);

        let mut frontier = VecDeque::new();
        frontier.push_back(Candidate {
            question: topic.to_string(),
            parent_id: None,
            depth: 0,
        });
        // Instructions for nodes whose children are still only queued
        // candidates; applied once a child is actually admitted.
        let mut pending_instructions: HashMap<String, String> = HashMap::new();

        while let Some(candidate) = frontier.pop_front() {
            // The question of the parent plus everything above it, nearest first.
            let lineage = match &candidate.parent_id {
                Some(parent_id) => {
                    let parent = store.get(parent_id).await?;
                    let mut lineage = vec![parent.question];
                    lineage.extend(store.ancestor_questions(parent_id).await?);
                    lineage
                }
                None => Vec::new(),
            };

            if let Some(parent_id) = &candidate.parent_id {
                let normalized = normalize_question(&candidate.question);
                if lineage.iter().any(|q| normalize_question(q) == normalized) {
                    debug!(
                        question = %candidate.question,
                        "dropping candidate equivalent to its own lineage"
                    );
                    continue;
                }
                if let Some(existing_id) = store.find_by_question(&candidate.question).await {
                    // Same question from another branch: share the node.
                    match store.attach_parent(&existing_id, parent_id).await {
                        Ok(()) => {
                            debug!(node = %existing_id, parent = %parent_id, "sharing existing node");
                            if let Some(instructions) = pending_instructions.remove(parent_id) {
                                store
                                    .set_composition_instructions(parent_id, &instructions)
                                    .await?;
                            }
                            self.snapshots.emit(store.snapshot().await);
                        }
                        Err(GraphError::WouldCreateCycle { .. }) => {
                            debug!(node = %existing_id, "dropping candidate that would close a cycle");
                        }
                        Err(other) => return Err(other.into()),
                    }
                    continue;
                }
                if store.node_count().await >= self.config.max_nodes {
                    store.set_budget_exhausted().await;
                    debug!(question = %candidate.question, "node budget exhausted, dropping candidate");
                    continue;
                }
            }

            let decision = match self.decomposer.decide(&candidate.question, &lineage).await {
                Ok(decision) => decision,
                Err(error) => {
                    warn!(question = %candidate.question, %error, "decomposition failed, treating as leaf");
                    Decision::leaf(OutputFormat::ShortAnswer)
                }
            };

            let node_id = match &candidate.parent_id {
                None => {
                    store
                        .create_root(&candidate.question, decision.expected_format)
                        .await?
                }
                Some(parent_id) => {
                    let id = store
                        .create_child(parent_id, &candidate.question, decision.expected_format, 0)
                        .await?;
                    if let Some(instructions) = pending_instructions.remove(parent_id) {
                        store
                            .set_composition_instructions(parent_id, &instructions)
                            .await?;
                    }
                    id
                }
            };

            if decision.decompose && !decision.sub_questions.is_empty() {
                if candidate.depth >= self.config.max_depth {
                    // The oracle wanted to go deeper than the budget allows.
                    store.set_budget_exhausted().await;
                    debug!(node = %node_id, "depth budget reached, keeping node as leaf");
                } else {
                    let room = self
                        .config
                        .max_nodes
                        .saturating_sub(store.node_count().await);
                    let cap = self.config.max_subtasks.min(room);
                    for sub in decision.sub_questions.iter().take(cap) {
                        frontier.push_back(Candidate {
                            question: sub.question.clone(),
                            parent_id: Some(node_id.clone()),
                            depth: candidate.depth + 1,
                        });
                    }
                    if decision.sub_questions.len() > cap {
                        store.set_budget_exhausted().await;
                    }
                    if cap > 0 {
                        if let Some(instructions) = &decision.composition_instructions {
                            // Every queued candidate can still be dropped, and a
                            // childless node must not carry instructions.
                            pending_instructions.insert(node_id.clone(), instructions.clone());
                        }
                    }
                }
            }

            self.snapshots.emit(store.snapshot().await);
        }

        let nodes = store.node_count().await;
        let budget_exhausted = store.meta().await.budget_exhausted;
        info!(nodes, budget_exhausted, "graph built");
        Ok(store)
    }
}
