// crates/wot-core/src/traits.rs

use serde::{Deserialize, Serialize};

use crate::error::WotError;
use crate::identity::{Identity, IdentityId};
use crate::trust::{EdgeKey, Score, Trust};

/// A persisted row of any entity kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoredRow {
    Identity(Identity),
    Trust(Trust),
    Score(Score),
}

/// One write of a committed transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowWrite {
    Put(StoredRow),
    DeleteIdentity(IdentityId),
    DeleteTrust(EdgeKey),
    DeleteScore { owner: IdentityId, target: IdentityId },
}

/// Durable storage beneath the in-memory trust graph.
///
/// Implemented by wot-store (RocksDB backend). `commit` must apply the whole
/// batch or nothing.
pub trait GraphBackend: Send + Sync {
    /// Read every persisted row, in any order.
    fn load(&self) -> Result<Vec<StoredRow>, WotError>;

    /// Atomically apply the writes of one transaction.
    fn commit(&self, writes: &[RowWrite]) -> Result<(), WotError>;
}
