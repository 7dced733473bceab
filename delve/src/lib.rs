//! # Delve
//!
//! Bounded research runs over a question graph.
//!
//! A run takes one research topic, decomposes it into a directed acyclic graph
//! of sub-questions, computes answers bottom-up with bounded concurrency,
//! optionally fills reviewed gaps, and assembles an outline, narrative report,
//! and bibliography. Reasoning is delegated to two oracle traits; the crate
//! itself owns structure, ordering, budgets, and failure containment.
//!
//! ## Design principles
//!
//! - **Two phases**: the graph is built fully before any answer is computed, so
//!   ordering guarantees are explicit instead of buried in recursion.
//! - **Oracles at the seams**: everything requiring judgement crosses
//!   [`DecompositionOracle`] or [`AnswerOracle`]; swap in [`MockDecomposer`] and
//!   [`MockAnswerer`] to run without a backend.
//! - **Failure stays local**: a failed oracle call fails one node and flows into
//!   ancestor synthesis as an explicit gap; only a root that cannot be
//!   synthesized fails the run.
//! - **One shared structure**: the [`GraphStore`] arena is the only shared
//!   mutable state, with guarded status transitions and cheap consistent
//!   snapshots on every transition.
//!
//! ## Main modules
//!
//! - [`graph`] — nodes, statuses, and the shared store.
//! - [`builder`] — breadth-first decomposition under budgets.
//! - [`processor`] — layered bottom-up computation.
//! - [`refine`] — bounded gap-filling passes.
//! - [`report`] — outline, report, and bibliography assembly.
//! - [`runner`] — the one-call run lifecycle.
//! - [`snapshot`] — snapshot sinks and wire event framing.
//!
//! ## Quick start
//!
//! ```
//! use std::sync::Arc;
//! use delve::{MockAnswerer, MockDecomposer, ResearchRunner, RunConfig, RunStatus};
//!
//! #[tokio::main]
//! async fn main() {
//!     let decomposer = Arc::new(MockDecomposer::new());
//!     let answerer = Arc::new(MockAnswerer::new());
//!     let runner = ResearchRunner::new(decomposer, answerer, RunConfig::default());
//!
//!     let outcome = runner
//!         .run("Is nuclear fusion commercially viable by 2035?")
//!         .await
//!         .expect("run");
//!     assert_eq!(outcome.status, RunStatus::Complete);
//!     println!("{}", outcome.report.expect("report").report);
//! }
//! ```
//!
//! Runnable demos live in the `delve-examples` crate.

pub mod builder;
pub mod config;
pub mod graph;
pub mod oracle;
pub mod processor;
pub mod refine;
pub mod report;
pub mod runner;
pub mod snapshot;

pub use builder::{BuildError, GraphBuilder};
pub use config::{ConfigError, RunConfig};
pub use graph::{
    normalize_question, Citation, GraphError, GraphMeta, GraphStore, NodeStatus, OutputFormat,
    ResearchNode,
};
pub use oracle::{
    AnswerOracle, AnswerPayload, ChildReport, Decision, DecompositionOracle, MockAnswerer,
    MockDecomposer, OracleError, Review, SubQuestion,
};
pub use processor::{GraphProcessor, ProcessError};
pub use refine::RefinementPass;
pub use report::{AssemblyError, ReportAssembler, ReportBundle};
pub use runner::{ResearchRunner, RunError, RunOutcome, RunStatus};
pub use snapshot::{EnvelopePipe, GraphSnapshot, MemorySink, SnapshotCounts, SnapshotWriter};

#[cfg(test)]
mod test_logging {
    use ctor::ctor;

    /// Initializes tracing once for the whole test binary. Override the level
    /// with `RUST_LOG`, e.g. `RUST_LOG=delve=debug cargo test`.
    #[ctor]
    fn init_test_logging() {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    }
}
