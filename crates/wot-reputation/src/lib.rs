// crates/wot-reputation/src/lib.rs
//
// wot-reputation: Rank, capacity and score computation for the web of trust.
//
// Every own identity roots a trust tree. This crate computes each tree's
// rank/capacity/score rows (fully or incrementally), schedules recomputation
// after trust mutations, and exposes the query and ingestion API through the
// `WebOfTrust` context.

pub mod capacity;
pub mod context;
pub mod engine;
pub mod scheduler;

pub use capacity::CapacityTable;
pub use context::WebOfTrust;
pub use engine::{RecomputeMode, RecomputeStats, ScoreEngine};
pub use scheduler::{PendingWork, RecomputationScheduler, SchedulerConfig};
