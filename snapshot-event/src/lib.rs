//! Snapshot event wire schema: type + payload + envelope.
//!
//! This crate defines the wire shape of one observability event and envelope injection.
//! It does not depend on delve. The engine serializes its graph into `serde_json::Value`
//! and crosses this boundary with it, so dashboards can consume events without the
//! engine's types.

pub mod envelope;
pub mod event;

pub use envelope::{to_json, Envelope, EnvelopeState};
pub use event::SnapshotEvent;
