//! End-to-end runs over scripted oracles, checking the engine's structural,
//! ordering, and failure guarantees from the outside.

use std::sync::Arc;

use async_trait::async_trait;
use delve::{
    AnswerPayload, Citation, Decision, DecompositionOracle, GraphBuilder, GraphProcessor,
    MockAnswerer, MockDecomposer, NodeStatus, OracleError, OutputFormat, ResearchRunner,
    Review, RunConfig, RunStatus, SubQuestion,
};

/// Splits every question into three fresh sub-questions, forever. Only the
/// budgets can stop it.
struct FanOut;

#[async_trait]
impl DecompositionOracle for FanOut {
    async fn decide(
        &self,
        question: &str,
        _ancestor_questions: &[String],
    ) -> Result<Decision, OracleError> {
        let subs = ["alpha", "beta", "gamma"]
            .iter()
            .map(|suffix| SubQuestion::new(format!("{question} {suffix}")))
            .collect();
        Ok(Decision::split(OutputFormat::Report, subs, "merge the parts"))
    }
}

/// **Scenario**: Under an unbounded decomposer the graph still honors
/// `max_nodes` and `max_depth`, stays acyclic, and records exhaustion.
#[tokio::test]
async fn budgets_bound_an_unbounded_decomposer() {
    let config = RunConfig {
        max_depth: 3,
        max_nodes: 12,
        max_subtasks: 3,
        ..RunConfig::default()
    };
    let builder = GraphBuilder::new(Arc::new(FanOut), config);
    let graph = builder.build("seed").await.unwrap();

    assert_eq!(graph.node_count().await, 12);
    assert!(graph.meta().await.budget_exhausted);
    for id in graph.ids().await {
        let node = graph.get(&id).await.unwrap();
        assert!(node.depth <= 3, "node {id} too deep");
        let ancestors = graph.ancestor_ids(&id).await.unwrap();
        assert!(!ancestors.contains(&id), "node {id} is its own ancestor");
    }
}

/// **Scenario**: Processing an already-complete graph a second time invokes
/// no oracle at all.
#[tokio::test]
async fn second_process_pass_is_free() {
    let decomposer = Arc::new(MockDecomposer::new().script(
        "topic",
        Decision::split(
            OutputFormat::Report,
            vec![SubQuestion::new("one?"), SubQuestion::new("two?")],
            "merge",
        ),
    ));
    let answerer = Arc::new(MockAnswerer::new());
    let config = RunConfig::default();
    let graph = GraphBuilder::new(decomposer, config.clone())
        .build("topic")
        .await
        .unwrap();
    let processor = GraphProcessor::new(answerer.clone(), config);

    processor.process(&graph).await.unwrap();
    assert_eq!(answerer.answer_calls(), 2);
    assert_eq!(answerer.synthesize_calls(), 1);

    processor.process(&graph).await.unwrap();
    assert_eq!(answerer.answer_calls(), 2);
    assert_eq!(answerer.synthesize_calls(), 1);
}

/// **Scenario**: Every parent enters `in_progress` only after all of its
/// children reached a terminal state, across the whole graph.
#[tokio::test]
async fn barrier_holds_for_every_parent() {
    let config = RunConfig {
        max_depth: 3,
        max_nodes: 10,
        max_refinements: 0,
        ..RunConfig::default()
    };
    let runner = ResearchRunner::new(Arc::new(FanOut), Arc::new(MockAnswerer::new()), config);
    let outcome = runner.run("root question").await.unwrap();
    assert_eq!(outcome.status, RunStatus::Complete);

    let graph = outcome.graph;
    for id in graph.ids().await {
        let node = graph.get(&id).await.unwrap();
        if node.is_leaf() {
            continue;
        }
        let started = node.started_seq.unwrap();
        for child_id in &node.children {
            let child = graph.get(child_id).await.unwrap();
            assert!(
                child.finished_seq.unwrap() < started,
                "parent {id} started before child {child_id} finished"
            );
        }
    }
}

/// **Scenario**: Textually equivalent sub-questions from two branches yield one
/// node with two parents, and the run still completes.
#[tokio::test]
async fn equivalent_questions_share_one_node_end_to_end() {
    let decomposer = Arc::new(
        MockDecomposer::new()
            .script(
                "topic",
                Decision::split(
                    OutputFormat::Report,
                    vec![SubQuestion::new("left?"), SubQuestion::new("right?")],
                    "merge",
                ),
            )
            .script(
                "left?",
                Decision::split(
                    OutputFormat::Report,
                    vec![SubQuestion::new("shared evidence?")],
                    "merge",
                ),
            )
            .script(
                "right?",
                Decision::split(
                    OutputFormat::Report,
                    vec![SubQuestion::new("Shared   EVIDENCE?")],
                    "merge",
                ),
            ),
    );
    let runner = ResearchRunner::new(
        decomposer,
        Arc::new(MockAnswerer::new()),
        RunConfig::default(),
    );

    let outcome = runner.run("topic").await.unwrap();

    assert_eq!(outcome.status, RunStatus::Complete);
    assert_eq!(outcome.graph.node_count().await, 4);
    let shared_id = outcome
        .graph
        .find_by_question("shared evidence?")
        .await
        .unwrap();
    let shared = outcome.graph.get(&shared_id).await.unwrap();
    assert_eq!(shared.parents.len(), 2);
    assert_eq!(shared.status, NodeStatus::Complete);
}

/// **Scenario**: A leaf that always fails leaves a produced report that
/// acknowledges the gap by name.
#[tokio::test]
async fn failed_leaf_is_acknowledged_in_report() {
    let decomposer = Arc::new(MockDecomposer::new().script(
        "topic",
        Decision::split(
            OutputFormat::Report,
            vec![SubQuestion::new("solid ground?"), SubQuestion::new("quicksand?")],
            "merge",
        ),
    ));
    let answerer = Arc::new(MockAnswerer::new().fail_on("quicksand?"));
    let runner = ResearchRunner::new(decomposer, answerer, RunConfig::default());

    let outcome = runner.run("topic").await.unwrap();

    assert_eq!(outcome.status, RunStatus::Complete);
    let failed_id = outcome.graph.find_by_question("quicksand?").await.unwrap();
    assert_eq!(
        outcome.graph.get(&failed_id).await.unwrap().status,
        NodeStatus::Failed
    );

    let report = outcome.report.unwrap().report;
    assert!(report.contains("[gap: quicksand?]"));
    assert!(report.contains("## quicksand?\n\nUnresolved in this run:"));
    assert!(report.contains("answer: solid ground?"));
}

/// **Scenario**: The fusion question with `max_depth = 1` and three scripted
/// leaves produces a boolean root whose stance and citations come from the
/// leaf union.
#[tokio::test]
async fn fusion_scenario_boolean_root() {
    let topic = "Is nuclear fusion commercially viable by 2035?";
    let decomposer = Arc::new(MockDecomposer::new().script(
        topic,
        Decision::split(
            OutputFormat::Boolean,
            vec![
                SubQuestion::new("What do current cost curves show?"),
                SubQuestion::new("What capacity is under construction?"),
                SubQuestion::new("What do regulators project?"),
            ],
            "weigh the evidence and answer yes or no",
        ),
    ));
    let answerer = Arc::new(
        MockAnswerer::new()
            .answer_script(
                "What do current cost curves show?",
                AnswerPayload {
                    answer: "Costs remain far above grid parity.".to_string(),
                    citations: vec![Citation::new("Cost Review", "https://example.org/costs")],
                },
            )
            .answer_script(
                "What capacity is under construction?",
                AnswerPayload {
                    answer: "No commercial-scale plants are under construction.".to_string(),
                    citations: vec![Citation::new(
                        "Capacity Tracker",
                        "https://example.org/capacity",
                    )],
                },
            )
            .synthesis_script(
                topic,
                AnswerPayload::new("No. Neither costs nor capacity support a 2035 date."),
            ),
    );
    let config = RunConfig {
        max_depth: 1,
        max_subtasks: 3,
        max_refinements: 0,
        ..RunConfig::default()
    };
    let runner = ResearchRunner::new(decomposer, answerer, config);

    let outcome = runner.run(topic).await.unwrap();

    assert_eq!(outcome.status, RunStatus::Complete);
    let root = outcome.graph.get("node_1").await.unwrap();
    assert_eq!(root.expected_output_format, OutputFormat::Boolean);
    assert_eq!(root.children.len(), 3);
    assert!(root.answer.as_deref().unwrap().starts_with("No."));
    let urls: Vec<&str> = root
        .cited_documents
        .iter()
        .map(|c| c.url.as_str())
        .collect();
    assert!(urls.contains(&"https://example.org/costs"));
    assert!(urls.contains(&"https://example.org/capacity"));

    let report = outcome.report.unwrap();
    assert!(report
        .report
        .starts_with(&format!("# {topic}\n\n**Answer:** No.")));
    assert!(report.report.contains("[1] Cost Review - https://example.org/costs"));
}

/// **Scenario**: A refinement round whose gap children all fail leaves the run
/// as complete as it was without the pass, report included.
#[tokio::test]
async fn refinement_with_failing_gaps_keeps_run_complete() {
    let decomposer = Arc::new(MockDecomposer::new().review_script(
        "topic",
        Review::gaps(vec!["dead end one?".to_string(), "dead end two?".to_string()]),
    ));
    let answerer = Arc::new(
        MockAnswerer::new()
            .fail_on("dead end one?")
            .fail_on("dead end two?"),
    );
    let runner = ResearchRunner::new(decomposer, answerer, RunConfig::default());

    let outcome = runner.run("topic").await.unwrap();

    assert_eq!(outcome.status, RunStatus::Complete);
    assert_eq!(outcome.graph.node_count().await, 3);
    let root = outcome.graph.get("node_1").await.unwrap();
    assert_eq!(root.status, NodeStatus::Complete);
    assert_eq!(root.answer.as_deref(), Some("answer: topic"));
    assert!(outcome.report.unwrap().report.contains("answer: topic"));
}

/// **Scenario**: `max_nodes = 1` forces a leaf root even when the oracle wants
/// to decompose.
#[tokio::test]
async fn single_node_budget_forces_leaf_root() {
    let config = RunConfig {
        max_nodes: 1,
        ..RunConfig::default()
    };
    let runner = ResearchRunner::new(Arc::new(FanOut), Arc::new(MockAnswerer::new()), config);

    let outcome = runner.run("topic").await.unwrap();

    assert_eq!(outcome.status, RunStatus::Complete);
    assert_eq!(outcome.graph.node_count().await, 1);
    let root = outcome.graph.get("node_1").await.unwrap();
    assert!(root.is_leaf());
    assert!(outcome.graph.meta().await.budget_exhausted);
    assert!(outcome.report.is_some());
}
