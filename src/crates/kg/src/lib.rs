//! Knowledge-graph domain types and logic.
//!
//! This crate is pure domain code with no I/O: the node/edge schema catalog
//! and ID service, the diff wire format, provenance enrichment, changelog
//! entries and reverse-diff synthesis for rollback, hypernode helpers, and
//! claim confidence tiering. Persistence and transport live in the service
//! crate; the graph store itself is behind the [`store::GraphStore`] trait.

pub mod changelog;
pub mod diff;
pub mod error;
pub mod hypernode;
pub mod provenance;
pub mod rollback;
pub mod schema;
pub mod store;
pub mod tiering;

pub use diff::{create_diff_id, format_diff_summary, Diff, DiffMetadata, DiffOps, Edge, Node};
pub use error::{KgError, Result};
pub use schema::{generate_id, kind_of, validate_id, EdgeType, NodeKind};
pub use store::{ApplyResult, GraphStore};
