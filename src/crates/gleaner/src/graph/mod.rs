//! The supervisor graph: state, checkpointing, pipeline nodes, and routing.

pub mod agents;
pub mod checkpoint;
pub mod expansion;
pub mod improvement;
pub mod nodes;
pub mod state;
pub mod supervisor;

pub use state::{AgentState, ApprovalDecision, Intent, StateUpdate};
pub use supervisor::run_graph;
