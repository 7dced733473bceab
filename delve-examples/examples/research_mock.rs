//! Example: a full research run over scripted mock oracles.
//!
//! Scripts a boolean decomposition for the fusion-viability question, computes
//! the graph bottom-up, and prints the outline, report, and node summary.
//! Configuration is read from the environment (`DELVE_*`), `.env`, or the XDG
//! config file.
//!
//! Run: `cargo run -p delve-examples --example research_mock -- "Is nuclear fusion commercially viable by 2035?"`

use std::env;
use std::sync::Arc;

use delve::{
    AnswerPayload, Citation, Decision, MockAnswerer, MockDecomposer, OutputFormat, ResearchRunner,
    RunConfig, SubQuestion,
};

#[tokio::main]
async fn main() {
    let topic = env::args()
        .nth(1)
        .unwrap_or_else(|| "Is nuclear fusion commercially viable by 2035?".to_string());

    let decomposer = Arc::new(MockDecomposer::new().script(
        &topic,
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
                    answer: "Projected cost per MWh remains several times above grid parity."
                        .to_string(),
                    citations: vec![Citation::new("Fusion Cost Review", "https://example.org/costs")],
                },
            )
            .answer_script(
                "What capacity is under construction?",
                AnswerPayload {
                    answer: "No commercial-scale plant has broken ground.".to_string(),
                    citations: vec![Citation::new(
                        "Capacity Tracker",
                        "https://example.org/capacity",
                    )],
                },
            )
            .synthesis_script(
                &topic,
                AnswerPayload::new(
                    "No. Neither cost trajectories nor construction pipelines support a 2035 date.",
                ),
            ),
    );

    let config = RunConfig::load().expect("config");
    let runner = ResearchRunner::new(decomposer, answerer, config);
    let outcome = runner.run(&topic).await.expect("run");

    println!("status: {}", outcome.status.as_str());
    println!("nodes:  {}", outcome.graph.node_count().await);
    match outcome.report {
        Some(report) => {
            println!("\n--- outline ---\n{}", report.outline);
            println!("\n--- report ---\n{}", report.report);
        }
        None => {
            if let Some(reason) = outcome.report_error {
                println!("report unavailable: {reason}");
            }
        }
    }

    println!("\n--- nodes ---");
    for id in outcome.graph.ids().await {
        if let Ok(node) = outcome.graph.get(&id).await {
            println!(
                "{id}  depth={} status={} format={}  {}",
                node.depth,
                node.status.as_str(),
                node.expected_output_format.as_str(),
                node.question
            );
        }
    }
}
