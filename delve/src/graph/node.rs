//! Node model: ResearchNode plus the status and output-format enums.
//!
//! Written by [`crate::graph::store::GraphStore`] through guarded updates; consumers
//! receive clones and never hold references into the arena.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Lifecycle status of a single research node.
///
/// `Recomputing` is a transient state used only by the refinement pass: a node that
/// was already `Complete` and received new gap children goes back through
/// `Recomputing` → `InProgress` → `Complete`, never back to `Pending`. A `Failed`
/// node is final (no resurrection).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    /// Created, not yet picked up by the processor.
    Pending,
    /// Currently being answered or synthesized.
    InProgress,
    /// Answered; `ResearchNode::answer` is set.
    Complete,
    /// The oracle call for this node failed; `ResearchNode::error` is set.
    Failed,
    /// Was complete, but new children were attached and it awaits re-synthesis.
    Recomputing,
}

impl NodeStatus {
    /// True for the two final states.
    pub fn is_terminal(self) -> bool {
        matches!(self, NodeStatus::Complete | NodeStatus::Failed)
    }

    /// Legal transition table. Everything not listed is rejected by the store.
    pub fn can_transition_to(self, next: NodeStatus) -> bool {
        matches!(
            (self, next),
            (NodeStatus::Pending, NodeStatus::InProgress)
                | (NodeStatus::InProgress, NodeStatus::Complete)
                | (NodeStatus::InProgress, NodeStatus::Failed)
                | (NodeStatus::Complete, NodeStatus::Recomputing)
                | (NodeStatus::Recomputing, NodeStatus::InProgress)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NodeStatus::Pending => "pending",
            NodeStatus::InProgress => "in_progress",
            NodeStatus::Complete => "complete",
            NodeStatus::Failed => "failed",
            NodeStatus::Recomputing => "recomputing",
        }
    }
}

/// Expected shape of a node's answer. Set once at node creation, never mutated.
///
/// Downstream consumers match exhaustively; there is no open-ended format string.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    Boolean,
    ShortAnswer,
    List,
    Table,
    #[default]
    Report,
}

impl OutputFormat {
    /// Lenient parse for oracle-side probes: unknown or empty input falls back to
    /// [`OutputFormat::Report`].
    pub fn from_probe(value: &str) -> OutputFormat {
        match value.trim().to_lowercase().as_str() {
            "boolean" | "bool" | "yes/no" => OutputFormat::Boolean,
            "short_answer" | "short answer" => OutputFormat::ShortAnswer,
            "list" => OutputFormat::List,
            "table" => OutputFormat::Table,
            _ => OutputFormat::Report,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OutputFormat::Boolean => "boolean",
            OutputFormat::ShortAnswer => "short_answer",
            OutputFormat::List => "list",
            OutputFormat::Table => "table",
            OutputFormat::Report => "report",
        }
    }
}

/// One cited document: title plus URL. Deduplication is by URL.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Citation {
    pub title: String,
    pub url: String,
}

impl Citation {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
        }
    }
}

/// One unit of inquiry in the research DAG.
///
/// Created by the builder (root first, children during expansion, gap children during
/// refinement); status/answer/citations are written by the processor. `parents` is a
/// set because equivalent sub-questions are shared across branches instead of being
/// duplicated; `children` is ordered in decomposition order and that order is
/// preserved through processing and display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchNode {
    /// Stable id, `node_N` in creation order.
    pub id: String,
    /// The sub-question this node answers.
    pub question: String,
    /// 0 at root, +1 per decomposition level.
    pub depth: u32,
    pub status: NodeStatus,
    #[serde(default)]
    pub parents: BTreeSet<String>,
    #[serde(default)]
    pub children: Vec<String>,
    /// Answer shape decided at creation time; never mutated.
    pub expected_output_format: OutputFormat,
    /// Present only on nodes that decomposed: how to combine children's answers.
    #[serde(default)]
    pub composition_instructions: Option<String>,
    /// Leaf answer or synthesized answer. A failed node carries an empty placeholder.
    #[serde(default)]
    pub answer: Option<String>,
    /// Why the node failed, when it did.
    #[serde(default)]
    pub error: Option<String>,
    /// For parents: order-preserving, URL-deduplicated union of non-failed children's
    /// citations plus the node's own.
    #[serde(default)]
    pub cited_documents: Vec<Citation>,
    /// 0 for originally generated nodes, k for nodes added by refinement iteration k.
    #[serde(default)]
    pub refinement_iteration: u32,
    /// Logical order index at which the node last entered `InProgress`.
    #[serde(default)]
    pub started_seq: Option<u64>,
    /// Logical order index at which the node last reached a terminal state.
    #[serde(default)]
    pub finished_seq: Option<u64>,
}

impl ResearchNode {
    pub(crate) fn new(
        id: impl Into<String>,
        question: impl Into<String>,
        depth: u32,
        expected_output_format: OutputFormat,
    ) -> Self {
        Self {
            id: id.into(),
            question: question.into(),
            depth,
            status: NodeStatus::Pending,
            parents: BTreeSet::new(),
            children: Vec::new(),
            expected_output_format,
            composition_instructions: None,
            answer: None,
            error: None,
            cited_documents: Vec::new(),
            refinement_iteration: 0,
            started_seq: None,
            finished_seq: None,
        }
    }

    /// A leaf has no children and is answered directly; everything else is synthesized.
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}
