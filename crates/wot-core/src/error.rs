// crates/wot-core/src/error.rs
//
// Node-wide error type for the web-of-trust node.
//
// Every failure is a `WotError` variant carrying the ids and counts involved.
// `WotError::kind()` collapses the variants into the four categories callers
// actually branch on.

use std::fmt;

use thiserror::Error;

use crate::identity::IdentityId;

/// Coarse error category used by callers to decide how to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed mutation input. Rejected before any state change.
    Validation,
    /// Structural invariant violation. Should never happen in correct operation.
    Consistency,
    /// An optional relationship is absent. A normal query outcome.
    NotFound,
    /// The persistence layer failed or is closed. Never retried internally.
    Upstream,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Validation => write!(f, "validation"),
            ErrorKind::Consistency => write!(f, "consistency"),
            ErrorKind::NotFound => write!(f, "not-found"),
            ErrorKind::Upstream => write!(f, "upstream"),
        }
    }
}

/// The three persisted entity kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RowKind {
    Identity,
    Trust,
    Score,
}

impl fmt::Display for RowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowKind::Identity => write!(f, "identity"),
            RowKind::Trust => write!(f, "trust"),
            RowKind::Score => write!(f, "score"),
        }
    }
}

/// Structural invariants checked by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Invariant {
    /// A trust value outside [-100, 100] was persisted.
    TrustValueRange,
    /// An identity trusts itself.
    SelfTrust,
    /// A score row belongs to a tree whose owner is not an own identity.
    TreeOwnerNotOwn,
    /// The tree owner's own row is missing or not rank 0 / capacity 100.
    OwnerSelfScore,
    /// A non-owner row claims rank 0.
    NonOwnerRankZero,
    /// A capacity above 100.
    CapacityRange,
    /// An adjacency or context index disagrees with the rows it mirrors.
    IndexMirror,
    /// An own identity's insert key does not derive its id.
    OwnKeyMismatch,
}

impl fmt::Display for Invariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Invariant::TrustValueRange => "trust value outside [-100, 100]",
            Invariant::SelfTrust => "identity trusts itself",
            Invariant::TreeOwnerNotOwn => "tree owner is not an own identity",
            Invariant::OwnerSelfScore => "tree owner row is not rank 0 / capacity 100",
            Invariant::NonOwnerRankZero => "non-owner row has rank 0",
            Invariant::CapacityRange => "capacity above 100",
            Invariant::IndexMirror => "index does not mirror rows",
            Invariant::OwnKeyMismatch => "own identity key does not match its id",
        };
        f.write_str(text)
    }
}

/// Errors surfaced by the web-of-trust node.
#[derive(Debug, Error)]
pub enum WotError {
    /// A mutation parameter is malformed.
    #[error("invalid {field}: {reason}")]
    InvalidParameter { field: &'static str, reason: String },

    /// A trust value outside [-100, 100].
    #[error("trust value {value} is outside [-100, 100]")]
    TrustValueOutOfRange { value: i32 },

    /// A mutation referenced an identity that is not registered.
    #[error("unknown identity {0}")]
    UnknownIdentity(IdentityId),

    /// An operation that needs an own identity got a remote one.
    #[error("{0} is not an own identity")]
    NotOwnIdentity(IdentityId),

    /// Registration of an identity id that is already present.
    #[error("identity {0} already exists")]
    IdentityExists(IdentityId),

    /// Two rows share the same unique key.
    #[error("duplicate {entity} row for {key}")]
    DuplicateRow { entity: RowKind, key: String },

    /// A row references an identity that does not exist.
    #[error("{entity} row {key} references missing identity {missing}")]
    DanglingReference {
        entity: RowKind,
        key: String,
        missing: IdentityId,
    },

    /// A structural invariant does not hold.
    #[error("invariant violated ({invariant}) at {key}")]
    InvariantViolated { invariant: Invariant, key: String },

    /// No score row: the target is not reachable in the owner's tree.
    #[error("{target} is not in the trust tree of {owner}")]
    NotInTrustTree {
        owner: IdentityId,
        target: IdentityId,
    },

    /// No trust row between the two identities.
    #[error("{truster} does not trust {trustee}")]
    NotTrusted {
        truster: IdentityId,
        trustee: IdentityId,
    },

    /// Persistence backend failure (RocksDB and friends).
    #[error("storage error: {0}")]
    Storage(String),

    /// Row encoding/decoding failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The store has been closed.
    #[error("store is closed")]
    StoreClosed,
}

impl WotError {
    /// Category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            WotError::InvalidParameter { .. }
            | WotError::TrustValueOutOfRange { .. }
            | WotError::UnknownIdentity(_)
            | WotError::NotOwnIdentity(_)
            | WotError::IdentityExists(_) => ErrorKind::Validation,
            WotError::DuplicateRow { .. }
            | WotError::DanglingReference { .. }
            | WotError::InvariantViolated { .. } => ErrorKind::Consistency,
            WotError::NotInTrustTree { .. } | WotError::NotTrusted { .. } => ErrorKind::NotFound,
            WotError::Storage(_) | WotError::Serialization(_) | WotError::StoreClosed => {
                ErrorKind::Upstream
            }
        }
    }

    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        WotError::InvalidParameter {
            field,
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for WotError {
    fn from(e: serde_json::Error) -> Self {
        WotError::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_follow_taxonomy() {
        let id = IdentityId::from_bytes([7u8; 32]);
        assert_eq!(WotError::TrustValueOutOfRange { value: 101 }.kind(), ErrorKind::Validation);
        assert_eq!(WotError::UnknownIdentity(id).kind(), ErrorKind::Validation);
        assert_eq!(
            WotError::DuplicateRow {
                entity: RowKind::Trust,
                key: "a:b".to_string()
            }
            .kind(),
            ErrorKind::Consistency
        );
        assert_eq!(
            WotError::NotInTrustTree { owner: id, target: id }.kind(),
            ErrorKind::NotFound
        );
        assert_eq!(WotError::StoreClosed.kind(), ErrorKind::Upstream);
    }

    #[test]
    fn test_messages_carry_context() {
        let id = IdentityId::from_bytes([1u8; 32]);
        let msg = WotError::DanglingReference {
            entity: RowKind::Score,
            key: "x".to_string(),
            missing: id,
        }
        .to_string();
        assert!(msg.contains("score row x"));
        assert!(msg.contains(&id.to_string()));
    }
}
