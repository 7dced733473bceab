//! Research graph: node model and the shared arena store.
//!
//! Used by [`crate::builder`] (node creation), [`crate::processor`] (status/answer
//! mutation), and [`crate::snapshot`] (consistent whole-graph reads).

pub mod node;
pub mod store;

pub use node::{Citation, NodeStatus, OutputFormat, ResearchNode};
pub use store::{normalize_question, GraphError, GraphMeta, GraphStore};
