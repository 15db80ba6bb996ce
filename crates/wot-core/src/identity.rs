// crates/wot-core/src/identity.rs
//
// Identity rows: pseudonymous identities known to the node, and the own
// identities that root a trust tree each.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::WotError;

/// Stable identifier of an identity: SHA-256 of its ed25519 public key.
///
/// Displays and parses as 64 lowercase hex characters.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdentityId([u8; 32]);

impl IdentityId {
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Short prefix for log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IdentityId({})", self.short())
    }
}

impl FromStr for IdentityId {
    type Err = WotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|e| WotError::invalid("identity id", e.to_string()))?;
        let array: [u8; 32] = bytes
            .try_into()
            .map_err(|_| WotError::invalid("identity id", "expected 32 bytes"))?;
        Ok(Self(array))
    }
}

impl Serialize for IdentityId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for IdentityId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// How an identity came to be known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdentityOrigin {
    /// Added explicitly by the local user or a collaborator.
    Explicit,
    /// Created because some trust list named it.
    Referenced,
}

/// Regular identity or own identity.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdentityKind {
    /// An identity published by someone else.
    Remote,
    /// An identity owned by this node. `insert_key` is the ed25519 signing
    /// key seed used to publish its documents; it roots its own trust tree.
    Own { insert_key: [u8; 32] },
}

impl fmt::Debug for IdentityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentityKind::Remote => write!(f, "Remote"),
            IdentityKind::Own { .. } => write!(f, "Own {{ .. }}"),
        }
    }
}

/// A node of the trust graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: IdentityId,
    pub kind: IdentityKind,
    pub origin: IdentityOrigin,
    /// Nickname as published by the identity. `None` until the first
    /// identity document has been seen.
    pub nickname: Option<String>,
    pub contexts: BTreeSet<String>,
    pub properties: BTreeMap<String, String>,
    /// Edition of the last trust list applied for this identity.
    pub edition: u64,
    pub added_at: DateTime<Utc>,
    pub last_changed: DateTime<Utc>,
}

impl Identity {
    /// A remote identity with no published data yet.
    pub fn new(id: IdentityId, origin: IdentityOrigin) -> Self {
        let now = Utc::now();
        Self {
            id,
            kind: IdentityKind::Remote,
            origin,
            nickname: None,
            contexts: BTreeSet::new(),
            properties: BTreeMap::new(),
            edition: 0,
            added_at: now,
            last_changed: now,
        }
    }

    /// An own identity holding the given signing key seed.
    pub fn new_own(id: IdentityId, insert_key: [u8; 32]) -> Self {
        let mut identity = Self::new(id, IdentityOrigin::Explicit);
        identity.kind = IdentityKind::Own { insert_key };
        identity
    }

    pub fn is_own(&self) -> bool {
        matches!(self.kind, IdentityKind::Own { .. })
    }

    pub fn has_context(&self, context: &str) -> bool {
        self.contexts.contains(context)
    }

    pub fn touch(&mut self) {
        self.last_changed = Utc::now();
    }
}
