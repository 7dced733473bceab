//! Oracle traits: the two reasoning collaborators the engine delegates to.
//!
//! The engine owns structure and lifecycle; everything that requires judgement —
//! whether to decompose, how to answer, whether an answer suffices — crosses one
//! of these traits. Implementations are expected to be remote and unreliable, so
//! every method returns a [`Result`] and callers degrade per node rather than
//! abort the run.
//!
//! **Used by**: `crate::builder` (decide), `crate::processor` (answer,
//! synthesize), `crate::refine` (review).

mod mock;

pub use mock::{MockAnswerer, MockDecomposer};

use async_trait::async_trait;

use crate::graph::{Citation, NodeStatus, OutputFormat, ResearchNode};

/// Failure of an oracle call. Affects the node that needed the call, nothing else.
#[derive(Debug, Clone, thiserror::Error)]
pub enum OracleError {
    #[error("oracle unavailable: {0}")]
    Unavailable(String),
    #[error("oracle call timed out")]
    Timeout,
}

/// One proposed sub-question from a decomposition.
#[derive(Debug, Clone)]
pub struct SubQuestion {
    pub question: String,
    /// Free-form guidance for whoever answers it.
    pub note: Option<String>,
}

impl SubQuestion {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            note: None,
        }
    }
}

/// Decomposition verdict for one question.
#[derive(Debug, Clone)]
pub struct Decision {
    pub expected_format: OutputFormat,
    pub decompose: bool,
    pub sub_questions: Vec<SubQuestion>,
    /// How to recombine the children's answers, set only when decomposing.
    pub composition_instructions: Option<String>,
}

impl Decision {
    /// Answer directly, no children.
    pub fn leaf(expected_format: OutputFormat) -> Self {
        Self {
            expected_format,
            decompose: false,
            sub_questions: Vec::new(),
            composition_instructions: None,
        }
    }

    /// Split into sub-questions recombined per `instructions`.
    pub fn split(
        expected_format: OutputFormat,
        sub_questions: Vec<SubQuestion>,
        instructions: impl Into<String>,
    ) -> Self {
        Self {
            expected_format,
            decompose: true,
            sub_questions,
            composition_instructions: Some(instructions.into()),
        }
    }
}

/// Sufficiency verdict for a completed answer, with follow-ups when it falls short.
#[derive(Debug, Clone)]
pub struct Review {
    pub sufficient: bool,
    pub gap_questions: Vec<String>,
}

impl Review {
    pub fn sufficient() -> Self {
        Self {
            sufficient: true,
            gap_questions: Vec::new(),
        }
    }

    pub fn gaps(gap_questions: Vec<String>) -> Self {
        Self {
            sufficient: false,
            gap_questions,
        }
    }
}

/// An answer with its supporting citations.
#[derive(Debug, Clone, Default)]
pub struct AnswerPayload {
    pub answer: String,
    pub citations: Vec<Citation>,
}

impl AnswerPayload {
    pub fn new(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            citations: Vec::new(),
        }
    }
}

/// What a parent sees of one child at synthesis time. Failed children appear
/// here too, as explicit gaps.
#[derive(Debug, Clone)]
pub struct ChildReport {
    pub question: String,
    pub answer: Option<String>,
    pub status: NodeStatus,
}

impl ChildReport {
    pub fn from_node(node: &ResearchNode) -> Self {
        Self {
            question: node.question.clone(),
            answer: node.answer.clone(),
            status: node.status,
        }
    }

    pub fn failed(&self) -> bool {
        self.status == NodeStatus::Failed
    }
}

/// Decides graph shape: whether a question is answerable directly or needs
/// splitting, and later whether a finished answer actually suffices.
#[async_trait]
pub trait DecompositionOracle: Send + Sync {
    /// Classifies `question` and proposes sub-questions. `ancestor_questions`
    /// runs from the immediate parent up to the run topic, for context.
    async fn decide(
        &self,
        question: &str,
        ancestor_questions: &[String],
    ) -> Result<Decision, OracleError>;

    /// Judges whether `answer` settles `question`. The default accepts everything,
    /// which disables refinement for oracles that never review.
    async fn review(&self, _question: &str, _answer: &str) -> Result<Review, OracleError> {
        Ok(Review::sufficient())
    }
}

/// Produces answers: directly for leaves, by recombining child reports for parents.
#[async_trait]
pub trait AnswerOracle: Send + Sync {
    async fn answer(
        &self,
        question: &str,
        expected_format: OutputFormat,
    ) -> Result<AnswerPayload, OracleError>;

    async fn synthesize(
        &self,
        question: &str,
        composition_instructions: &str,
        children: &[ChildReport],
        expected_format: OutputFormat,
    ) -> Result<AnswerPayload, OracleError>;
}
