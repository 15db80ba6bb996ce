// crates/wot-core/src/lib.rs
//
// wot-core: Identity, trust and score types, validation limits, errors and
// crypto for the web-of-trust node.
//
// This is the leaf crate that all other crates in the workspace depend on.
// It defines the persisted row types, the node-wide error type, and the
// backend trait the store persists through.

pub mod crypto;
pub mod error;
pub mod identity;
pub mod traits;
pub mod trust;
pub mod validation;

// Re-export key types for ergonomic access from downstream crates.
// Usage: `use wot_core::IdentityId;`

pub use identity::{Identity, IdentityId, IdentityKind, IdentityOrigin};
pub use trust::{EdgeKey, Score, ScoreSign, Trust, TrustListEntry};

pub use error::{ErrorKind, Invariant, RowKind, WotError};

pub use traits::{GraphBackend, RowWrite, StoredRow};
