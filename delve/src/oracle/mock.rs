//! Scripted oracles for tests, examples, and offline runs.
//!
//! Both mocks key their scripts by normalized question, count every call, and
//! fall back to a predictable default when a question has no script. A question
//! listed via `fail_on` makes the call return [`OracleError::Unavailable`],
//! which is how tests exercise per-node failure paths.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::graph::{normalize_question, OutputFormat};
use crate::oracle::{
    AnswerOracle, AnswerPayload, ChildReport, Decision, DecompositionOracle, OracleError, Review,
};

/// [`DecompositionOracle`] that answers from scripts. Unscripted questions
/// become short-answer leaves; unscripted reviews are sufficient.
#[derive(Default)]
pub struct MockDecomposer {
    decisions: HashMap<String, Decision>,
    reviews: HashMap<String, Review>,
    fail_on: HashSet<String>,
    decide_calls: AtomicUsize,
    review_calls: AtomicUsize,
}

impl MockDecomposer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the decomposition verdict for one question.
    pub fn script(mut self, question: &str, decision: Decision) -> Self {
        self.decisions.insert(normalize_question(question), decision);
        self
    }

    /// Scripts the sufficiency verdict for one question.
    pub fn review_script(mut self, question: &str, review: Review) -> Self {
        self.reviews.insert(normalize_question(question), review);
        self
    }

    /// Makes both `decide` and `review` fail for one question.
    pub fn fail_on(mut self, question: &str) -> Self {
        self.fail_on.insert(normalize_question(question));
        self
    }

    pub fn decide_calls(&self) -> usize {
        self.decide_calls.load(Ordering::SeqCst)
    }

    pub fn review_calls(&self) -> usize {
        self.review_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DecompositionOracle for MockDecomposer {
    async fn decide(
        &self,
        question: &str,
        _ancestor_questions: &[String],
    ) -> Result<Decision, OracleError> {
        self.decide_calls.fetch_add(1, Ordering::SeqCst);
        let key = normalize_question(question);
        if self.fail_on.contains(&key) {
            return Err(OracleError::Unavailable(format!(
                "no decomposition for: {question}"
            )));
        }
        Ok(self
            .decisions
            .get(&key)
            .cloned()
            .unwrap_or_else(|| Decision::leaf(OutputFormat::ShortAnswer)))
    }

    async fn review(&self, question: &str, _answer: &str) -> Result<Review, OracleError> {
        self.review_calls.fetch_add(1, Ordering::SeqCst);
        let key = normalize_question(question);
        if self.fail_on.contains(&key) {
            return Err(OracleError::Unavailable(format!("no review for: {question}")));
        }
        Ok(self
            .reviews
            .get(&key)
            .cloned()
            .unwrap_or_else(Review::sufficient))
    }
}

/// [`AnswerOracle`] that answers from scripts. Unscripted leaves get
/// `answer: <question>`; unscripted synthesis concatenates child answers,
/// rendering failed children as `[gap: <question>]` lines.
#[derive(Default)]
pub struct MockAnswerer {
    answers: HashMap<String, AnswerPayload>,
    syntheses: HashMap<String, AnswerPayload>,
    fail_on: HashSet<String>,
    answer_calls: AtomicUsize,
    synthesize_calls: AtomicUsize,
}

impl MockAnswerer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the direct answer for one leaf question.
    pub fn answer_script(mut self, question: &str, payload: AnswerPayload) -> Self {
        self.answers.insert(normalize_question(question), payload);
        self
    }

    /// Scripts the synthesized answer for one parent question.
    pub fn synthesis_script(mut self, question: &str, payload: AnswerPayload) -> Self {
        self.syntheses.insert(normalize_question(question), payload);
        self
    }

    /// Makes both `answer` and `synthesize` fail for one question.
    pub fn fail_on(mut self, question: &str) -> Self {
        self.fail_on.insert(normalize_question(question));
        self
    }

    pub fn answer_calls(&self) -> usize {
        self.answer_calls.load(Ordering::SeqCst)
    }

    pub fn synthesize_calls(&self) -> usize {
        self.synthesize_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnswerOracle for MockAnswerer {
    async fn answer(
        &self,
        question: &str,
        _expected_format: OutputFormat,
    ) -> Result<AnswerPayload, OracleError> {
        self.answer_calls.fetch_add(1, Ordering::SeqCst);
        let key = normalize_question(question);
        if self.fail_on.contains(&key) {
            return Err(OracleError::Unavailable(format!("no answer for: {question}")));
        }
        Ok(self
            .answers
            .get(&key)
            .cloned()
            .unwrap_or_else(|| AnswerPayload::new(format!("answer: {question}"))))
    }

    async fn synthesize(
        &self,
        question: &str,
        _composition_instructions: &str,
        children: &[ChildReport],
        _expected_format: OutputFormat,
    ) -> Result<AnswerPayload, OracleError> {
        self.synthesize_calls.fetch_add(1, Ordering::SeqCst);
        let key = normalize_question(question);
        if self.fail_on.contains(&key) {
            return Err(OracleError::Unavailable(format!(
                "no synthesis for: {question}"
            )));
        }
        if let Some(scripted) = self.syntheses.get(&key) {
            return Ok(scripted.clone());
        }
        let lines: Vec<String> = children
            .iter()
            .map(|child| {
                if child.failed() {
                    format!("[gap: {}]", child.question)
                } else {
                    child.answer.clone().unwrap_or_default()
                }
            })
            .collect();
        Ok(AnswerPayload::new(lines.join("\n")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeStatus;

    #[tokio::test]
    async fn unscripted_decomposer_defaults_to_leaf() {
        let oracle = MockDecomposer::new();
        let decision = oracle.decide("anything", &[]).await.unwrap();
        assert!(!decision.decompose);
        assert_eq!(decision.expected_format, OutputFormat::ShortAnswer);
        assert_eq!(oracle.decide_calls(), 1);
    }

    #[tokio::test]
    async fn scripted_decision_is_returned() {
        let oracle = MockDecomposer::new().script(
            "Big question?",
            Decision::split(
                OutputFormat::Report,
                vec![crate::oracle::SubQuestion::new("small one")],
                "combine",
            ),
        );
        // Lookup normalizes, so spacing and case do not matter.
        let decision = oracle.decide("  big QUESTION? ", &[]).await.unwrap();
        assert!(decision.decompose);
        assert_eq!(decision.sub_questions.len(), 1);
    }

    #[tokio::test]
    async fn fail_on_returns_unavailable() {
        let oracle = MockDecomposer::new().fail_on("doomed");
        let err = oracle.decide("doomed", &[]).await.unwrap_err();
        assert!(matches!(err, OracleError::Unavailable(_)));
    }

    /// **Scenario**: Default synthesis spells out failed children as gaps instead
    /// of silently dropping them.
    #[tokio::test]
    async fn default_synthesis_marks_gaps() {
        let oracle = MockAnswerer::new();
        let children = vec![
            ChildReport {
                question: "good".to_string(),
                answer: Some("fine".to_string()),
                status: NodeStatus::Complete,
            },
            ChildReport {
                question: "bad".to_string(),
                answer: Some(String::new()),
                status: NodeStatus::Failed,
            },
        ];
        let payload = oracle
            .synthesize("parent", "combine", &children, OutputFormat::Report)
            .await
            .unwrap();
        assert_eq!(payload.answer, "fine\n[gap: bad]");
        assert_eq!(oracle.synthesize_calls(), 1);
    }
}
