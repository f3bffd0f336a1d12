//! Cost governance: per-call tracking, hard budget caps, layered envelopes,
//! and the TTL cache that keeps expensive operations from repeating.

pub mod budget;
pub mod cache;
pub mod envelopes;
pub mod tracker;

pub use budget::BudgetManager;
pub use cache::CostCache;
pub use envelopes::EnvelopeManager;
pub use tracker::CostTracker;
