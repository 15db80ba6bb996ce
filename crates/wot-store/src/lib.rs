// crates/wot-store/src/lib.rs
//
// wot-store: Storage layer for the web-of-trust engine.
//
// Provides the in-memory TrustGraph with its secondary indices, the identity
// registry and trust table operations on it, structural integrity checks,
// RocksDB-backed row persistence, and the transactional GraphStore that ties
// them together.

pub mod graph;
pub mod integrity;
pub mod registry;
pub mod rocks;
pub mod store;
pub mod trust_table;

// Re-export key types for ergonomic access from downstream crates.
pub use graph::TrustGraph;
pub use integrity::{verify, IntegrityReport};
pub use registry::IdentityRemoval;
pub use rocks::RocksBackend;
pub use store::GraphStore;
pub use trust_table::{TrustListDiff, TrustListOutcome};
