//! Example: two ways to watch a run from the outside.
//!
//! First drives a run with a bounded snapshot stream attached and prints one
//! line per graph transition; then repeats the run with an enveloped event
//! sink, printing the raw wire JSON a dashboard would consume.
//!
//! Run: `cargo run -p delve-examples --example snapshot_stream`

use std::sync::Arc;

use futures::StreamExt;

use delve::{
    Decision, MockAnswerer, MockDecomposer, OutputFormat, ResearchRunner, RunConfig,
    SnapshotWriter, SubQuestion,
};

const TOPIC: &str = "How do heat pumps compare to gas boilers?";

fn decomposer() -> Arc<MockDecomposer> {
    Arc::new(MockDecomposer::new().script(
        TOPIC,
        Decision::split(
            OutputFormat::Report,
            vec![
                SubQuestion::new("How do running costs compare?"),
                SubQuestion::new("How do emissions compare?"),
            ],
            "compare both dimensions and conclude",
        ),
    ))
}

#[tokio::main]
async fn main() {
    // Part one: a typed snapshot stream.
    let (writer, mut snapshots) = SnapshotWriter::stream_channel(64);
    let runner = ResearchRunner::new(
        decomposer(),
        Arc::new(MockAnswerer::new()),
        RunConfig::default(),
    )
    .with_snapshot_writer(writer);

    let run = tokio::spawn(async move { runner.run(TOPIC).await });

    let mut transition = 0;
    while let Some(snapshot) = snapshots.next().await {
        transition += 1;
        println!(
            "transition {transition}: total={} complete={} in_progress={} failed={}",
            snapshot.counts.total_nodes,
            snapshot.counts.completed,
            snapshot.counts.in_progress,
            snapshot.counts.failed,
        );
    }
    let outcome = run.await.expect("join").expect("run");
    println!("stream run finished: {}\n", outcome.status.as_str());

    // Part two: the same run as enveloped wire events.
    let runner = ResearchRunner::new(
        decomposer(),
        Arc::new(MockAnswerer::new()),
        RunConfig::default(),
    )
    .with_event_sink(|event| {
        println!("{event}");
        true
    });
    let outcome = runner.run(TOPIC).await.expect("run");
    println!("event run finished: {}", outcome.status.as_str());
}
