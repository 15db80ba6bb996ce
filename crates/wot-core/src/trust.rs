// crates/wot-core/src/trust.rs
//
// Trust edges and derived score rows.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::identity::IdentityId;

/// Ordered (truster, trustee) pair: the unique key of a trust row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeKey {
    pub truster: IdentityId,
    pub trustee: IdentityId,
}

impl EdgeKey {
    pub fn new(truster: IdentityId, trustee: IdentityId) -> Self {
        Self { truster, trustee }
    }
}

impl fmt::Display for EdgeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.truster, self.trustee)
    }
}

/// A directed trust edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trust {
    pub truster: IdentityId,
    pub trustee: IdentityId,
    /// Signed trust in [-100, 100].
    pub value: i8,
    pub comment: String,
    /// Edition of the truster when this row was last written.
    pub truster_edition: u64,
}

impl Trust {
    pub fn key(&self) -> EdgeKey {
        EdgeKey::new(self.truster, self.trustee)
    }

    /// Only strictly positive trust propagates rank.
    pub fn is_positive(&self) -> bool {
        self.value > 0
    }
}

/// One entry of a published trust list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustListEntry {
    pub trustee: IdentityId,
    pub value: i8,
    #[serde(default)]
    pub comment: String,
}

/// Derived rank/capacity/score of `target` in the tree of `owner`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Score {
    pub owner: IdentityId,
    pub target: IdentityId,
    /// Positive-trust hops from the owner.
    pub rank: u32,
    /// Influence percentage, 0..=100, a function of `rank` only.
    pub capacity: u8,
    /// Capacity-weighted sum of all trust received from ranked trusters.
    pub value: i32,
}

/// Sign filter for score listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScoreSign {
    Positive,
    Negative,
    Zero,
}

impl ScoreSign {
    pub fn matches(self, value: i32) -> bool {
        match self {
            ScoreSign::Positive => value > 0,
            ScoreSign::Negative => value < 0,
            ScoreSign::Zero => value == 0,
        }
    }
}
