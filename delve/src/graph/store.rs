//! Shared graph arena: id-keyed nodes behind one `RwLock` with guarded updates.
//!
//! The store is the single shared mutable structure of a run. Critical sections are
//! short and never span an oracle call; concurrent per-node writers touch disjoint
//! nodes, and snapshot readers take one brief shared lock for a consistent copy.
//!
//! **Interaction**: nodes are created by `crate::builder` and `crate::refine`,
//! mutated by `crate::processor` through the transition methods, and read by
//! `crate::snapshot` and `crate::report`.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::graph::node::{Citation, NodeStatus, OutputFormat, ResearchNode};
use crate::snapshot::{GraphSnapshot, SnapshotCounts};

/// Violations of graph structure or the node state machine.
///
/// These indicate engine bugs or misuse, not oracle trouble; oracle failures are
/// recorded on nodes as `Failed` status and never surface here.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GraphError {
    #[error("node not found: {0}")]
    NodeNotFound(String),
    #[error("root already created")]
    RootAlreadySet,
    #[error("graph has no nodes")]
    Empty,
    #[error("question already exists as {0}")]
    DuplicateQuestion(String),
    #[error("attaching {child} under {parent} would create a cycle")]
    WouldCreateCycle { parent: String, child: String },
    #[error("illegal status transition for {id}: {from:?} -> {to:?}")]
    InvalidTransition {
        id: String,
        from: NodeStatus,
        to: NodeStatus,
    },
    #[error("cannot complete {id}: child {child} is not terminal")]
    ChildNotTerminal { id: String, child: String },
    #[error("cycle detected in graph")]
    CycleDetected,
}

/// Run-level metadata carried with the graph and every snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphMeta {
    pub topic: String,
    /// Set when the builder stopped admitting nodes for budget rather than
    /// decomposition reasons. A normal termination condition, not an error.
    #[serde(default)]
    pub budget_exhausted: bool,
    #[serde(default)]
    pub refinement_iterations_run: u32,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
}

/// Normalizes a question for equivalence comparison: lowercase, trimmed, internal
/// whitespace runs collapsed to single spaces.
pub fn normalize_question(question: &str) -> String {
    question
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

struct GraphInner {
    root_id: Option<String>,
    nodes: HashMap<String, ResearchNode>,
    /// normalized question -> node id, for dedup and diamond attachment.
    question_index: HashMap<String, String>,
    meta: GraphMeta,
}

impl GraphInner {
    fn node(&self, id: &str) -> Result<&ResearchNode, GraphError> {
        self.nodes
            .get(id)
            .ok_or_else(|| GraphError::NodeNotFound(id.to_string()))
    }

    fn node_mut(&mut self, id: &str) -> Result<&mut ResearchNode, GraphError> {
        self.nodes
            .get_mut(id)
            .ok_or_else(|| GraphError::NodeNotFound(id.to_string()))
    }

    fn next_id(&self) -> String {
        format!("node_{}", self.nodes.len() + 1)
    }

    /// All transitive ancestors of `id`, nearest first, each listed once.
    fn ancestor_ids(&self, id: &str) -> Vec<String> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut out = Vec::new();
        let mut queue: VecDeque<String> = match self.nodes.get(id) {
            Some(n) => n.parents.iter().cloned().collect(),
            None => return out,
        };
        while let Some(pid) = queue.pop_front() {
            if !seen.insert(pid.clone()) {
                continue;
            }
            if let Some(p) = self.nodes.get(&pid) {
                queue.extend(p.parents.iter().cloned());
            }
            out.push(pid);
        }
        out
    }
}

/// Numeric suffix of a `node_N` id, used only for deterministic ordering.
fn node_index(id: &str) -> u64 {
    id.strip_prefix("node_")
        .and_then(|n| n.parse().ok())
        .unwrap_or(u64::MAX)
}

/// The one shared mutable structure of a run. Cheap to clone (all state is shared).
///
/// Status transitions go through the guarded methods below, which validate the
/// node state machine and stamp each transition with a logical sequence number
/// from a single atomic counter. Those sequence numbers make the bottom-up
/// barrier observable: a parent's `started_seq` is always greater than every
/// child's `finished_seq`.
#[derive(Clone)]
pub struct GraphStore {
    inner: Arc<RwLock<GraphInner>>,
    transition_seq: Arc<AtomicU64>,
}

impl GraphStore {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(GraphInner {
                root_id: None,
                nodes: HashMap::new(),
                question_index: HashMap::new(),
                meta: GraphMeta {
                    topic: topic.into(),
                    budget_exhausted: false,
                    refinement_iterations_run: 0,
                    started_at: Utc::now(),
                    finished_at: None,
                },
            })),
            transition_seq: Arc::new(AtomicU64::new(0)),
        }
    }

    fn next_seq(&self) -> u64 {
        self.transition_seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Creates the single entry node at depth 0. Errors if a root already exists.
    pub async fn create_root(
        &self,
        question: &str,
        format: OutputFormat,
    ) -> Result<String, GraphError> {
        let mut inner = self.inner.write().await;
        if inner.root_id.is_some() {
            return Err(GraphError::RootAlreadySet);
        }
        let id = inner.next_id();
        let node = ResearchNode::new(&id, question, 0, format);
        inner
            .question_index
            .insert(normalize_question(question), id.clone());
        inner.nodes.insert(id.clone(), node);
        inner.root_id = Some(id.clone());
        Ok(id)
    }

    /// Creates a new child under `parent_id` at the parent's depth + 1.
    ///
    /// Rejects a question that already exists anywhere in the graph — callers
    /// dedup first and either drop the candidate or use [`GraphStore::attach_parent`].
    pub async fn create_child(
        &self,
        parent_id: &str,
        question: &str,
        format: OutputFormat,
        refinement_iteration: u32,
    ) -> Result<String, GraphError> {
        let mut inner = self.inner.write().await;
        let normalized = normalize_question(question);
        if let Some(existing) = inner.question_index.get(&normalized) {
            return Err(GraphError::DuplicateQuestion(existing.clone()));
        }
        let depth = inner.node(parent_id)?.depth + 1;
        let id = inner.next_id();
        let mut node = ResearchNode::new(&id, question, depth, format);
        node.parents.insert(parent_id.to_string());
        node.refinement_iteration = refinement_iteration;
        inner.question_index.insert(normalized, id.clone());
        inner.nodes.insert(id.clone(), node);
        inner.node_mut(parent_id)?.children.push(id.clone());
        Ok(id)
    }

    /// Attaches `parent_id` as an additional parent of the existing `child_id`
    /// (diamond sharing). Rejects edges that would make a node its own ancestor.
    pub async fn attach_parent(&self, child_id: &str, parent_id: &str) -> Result<(), GraphError> {
        let mut inner = self.inner.write().await;
        inner.node(child_id)?;
        inner.node(parent_id)?;
        if child_id == parent_id
            || inner.ancestor_ids(parent_id).iter().any(|a| a == child_id)
        {
            return Err(GraphError::WouldCreateCycle {
                parent: parent_id.to_string(),
                child: child_id.to_string(),
            });
        }
        let parent = inner.node_mut(parent_id)?;
        if !parent.children.iter().any(|c| c == child_id) {
            parent.children.push(child_id.to_string());
        }
        inner
            .node_mut(child_id)?
            .parents
            .insert(parent_id.to_string());
        Ok(())
    }

    /// Records how a decomposed node's children are to be recombined.
    pub async fn set_composition_instructions(
        &self,
        id: &str,
        instructions: &str,
    ) -> Result<(), GraphError> {
        let mut inner = self.inner.write().await;
        inner.node_mut(id)?.composition_instructions = Some(instructions.to_string());
        Ok(())
    }

    /// Looks up a node by normalized question equivalence.
    pub async fn find_by_question(&self, question: &str) -> Option<String> {
        let inner = self.inner.read().await;
        inner
            .question_index
            .get(&normalize_question(question))
            .cloned()
    }

    /// Returns a clone of the node.
    pub async fn get(&self, id: &str) -> Result<ResearchNode, GraphError> {
        let inner = self.inner.read().await;
        inner.node(id).cloned()
    }

    pub async fn root_id(&self) -> Result<String, GraphError> {
        let inner = self.inner.read().await;
        inner.root_id.clone().ok_or(GraphError::Empty)
    }

    pub async fn node_count(&self) -> usize {
        self.inner.read().await.nodes.len()
    }

    /// All node ids in creation order.
    pub async fn ids(&self) -> Vec<String> {
        let inner = self.inner.read().await;
        let mut ids: Vec<String> = inner.nodes.keys().cloned().collect();
        ids.sort_by_key(|id| node_index(id));
        ids
    }

    pub async fn meta(&self) -> GraphMeta {
        self.inner.read().await.meta.clone()
    }

    /// Transitive ancestor ids of `id`, nearest first.
    pub async fn ancestor_ids(&self, id: &str) -> Result<Vec<String>, GraphError> {
        let inner = self.inner.read().await;
        inner.node(id)?;
        Ok(inner.ancestor_ids(id))
    }

    /// Questions of all transitive ancestors of `id`, nearest first.
    pub async fn ancestor_questions(&self, id: &str) -> Result<Vec<String>, GraphError> {
        let inner = self.inner.read().await;
        inner.node(id)?;
        Ok(inner
            .ancestor_ids(id)
            .iter()
            .filter_map(|aid| inner.nodes.get(aid).map(|n| n.question.clone()))
            .collect())
    }

    fn check_transition(node: &ResearchNode, to: NodeStatus) -> Result<(), GraphError> {
        if !node.status.can_transition_to(to) {
            return Err(GraphError::InvalidTransition {
                id: node.id.clone(),
                from: node.status,
                to,
            });
        }
        Ok(())
    }

    /// `Pending`/`Recomputing` -> `InProgress`. Returns the transition's sequence number.
    pub async fn mark_in_progress(&self, id: &str) -> Result<u64, GraphError> {
        let mut inner = self.inner.write().await;
        let node = inner.node_mut(id)?;
        Self::check_transition(node, NodeStatus::InProgress)?;
        let seq = self.next_seq();
        node.status = NodeStatus::InProgress;
        node.started_seq = Some(seq);
        Ok(seq)
    }

    /// `InProgress` -> `Complete` with the node's answer and citations.
    ///
    /// Enforces the bottom-up barrier at the last possible moment: every child must
    /// already be terminal.
    pub async fn complete_node(
        &self,
        id: &str,
        answer: String,
        citations: Vec<Citation>,
    ) -> Result<u64, GraphError> {
        let mut inner = self.inner.write().await;
        let children = inner.node(id)?.children.clone();
        for child_id in &children {
            if !inner.node(child_id)?.status.is_terminal() {
                return Err(GraphError::ChildNotTerminal {
                    id: id.to_string(),
                    child: child_id.clone(),
                });
            }
        }
        let node = inner.node_mut(id)?;
        Self::check_transition(node, NodeStatus::Complete)?;
        let seq = self.next_seq();
        node.status = NodeStatus::Complete;
        node.answer = Some(answer);
        node.error = None;
        node.cited_documents = citations;
        node.finished_seq = Some(seq);
        Ok(seq)
    }

    /// `InProgress` -> `Failed` with an empty answer placeholder and the reason.
    pub async fn fail_node(&self, id: &str, reason: &str) -> Result<u64, GraphError> {
        let mut inner = self.inner.write().await;
        let node = inner.node_mut(id)?;
        Self::check_transition(node, NodeStatus::Failed)?;
        let seq = self.next_seq();
        node.status = NodeStatus::Failed;
        node.answer = Some(String::new());
        node.error = Some(reason.to_string());
        node.cited_documents.clear();
        node.finished_seq = Some(seq);
        Ok(seq)
    }

    /// `Complete` -> `Recomputing`, used by refinement after attaching gap children.
    pub async fn begin_recompute(&self, id: &str) -> Result<u64, GraphError> {
        let mut inner = self.inner.write().await;
        let node = inner.node_mut(id)?;
        Self::check_transition(node, NodeStatus::Recomputing)?;
        let seq = self.next_seq();
        node.status = NodeStatus::Recomputing;
        Ok(seq)
    }

    pub async fn set_budget_exhausted(&self) {
        self.inner.write().await.meta.budget_exhausted = true;
    }

    pub async fn mark_refinement_iteration(&self) {
        self.inner.write().await.meta.refinement_iterations_run += 1;
    }

    pub async fn finish(&self) {
        self.inner.write().await.meta.finished_at = Some(Utc::now());
    }

    /// Bottom-up topological layering: leaves at layer 0, a parent one past the max
    /// layer of its children. Within a layer, ids are in creation order.
    pub async fn layers(&self) -> Result<Vec<Vec<String>>, GraphError> {
        let inner = self.inner.read().await;
        if inner.nodes.is_empty() {
            return Err(GraphError::Empty);
        }

        let mut remaining: HashMap<&str, usize> = HashMap::new();
        let mut layer_of: HashMap<&str, u32> = HashMap::new();
        let mut queue: VecDeque<&str> = VecDeque::new();

        let mut leaves: Vec<&str> = Vec::new();
        for node in inner.nodes.values() {
            remaining.insert(node.id.as_str(), node.children.len());
            if node.children.is_empty() {
                leaves.push(node.id.as_str());
            }
        }
        leaves.sort_by_key(|id| node_index(id));
        for id in leaves {
            layer_of.insert(id, 0);
            queue.push_back(id);
        }

        while let Some(id) = queue.pop_front() {
            let parents = &inner.nodes[id].parents;
            for pid in parents {
                let left = remaining
                    .get_mut(pid.as_str())
                    .ok_or_else(|| GraphError::NodeNotFound(pid.clone()))?;
                *left -= 1;
                if *left == 0 {
                    let parent = &inner.nodes[pid.as_str()];
                    let layer = parent
                        .children
                        .iter()
                        .filter_map(|c| layer_of.get(c.as_str()))
                        .max()
                        .copied()
                        .unwrap_or(0)
                        + 1;
                    layer_of.insert(pid.as_str(), layer);
                    queue.push_back(pid.as_str());
                }
            }
        }

        if layer_of.len() != inner.nodes.len() {
            return Err(GraphError::CycleDetected);
        }

        let max_layer = layer_of.values().max().copied().unwrap_or(0);
        let mut layers: Vec<Vec<String>> = vec![Vec::new(); max_layer as usize + 1];
        for (id, layer) in &layer_of {
            layers[*layer as usize].push((*id).to_string());
        }
        for layer in &mut layers {
            layer.sort_by_key(|id| node_index(id));
        }
        Ok(layers)
    }

    /// Consistent whole-graph copy under one shared lock, with status counts.
    pub async fn snapshot(&self) -> GraphSnapshot {
        let inner = self.inner.read().await;
        let mut counts = SnapshotCounts {
            total_nodes: inner.nodes.len(),
            ..SnapshotCounts::default()
        };
        for node in inner.nodes.values() {
            match node.status {
                NodeStatus::Complete => counts.completed += 1,
                NodeStatus::InProgress => counts.in_progress += 1,
                NodeStatus::Failed => counts.failed += 1,
                NodeStatus::Pending | NodeStatus::Recomputing => {}
            }
        }
        GraphSnapshot {
            root_id: inner.root_id.clone(),
            nodes: inner.nodes.clone(),
            meta: inner.meta.clone(),
            counts,
            captured_at: Utc::now(),
        }
    }
}
