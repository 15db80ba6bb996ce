// crates/wot-store/src/rocks.rs
//
// RocksDB-backed persistence for trust-graph rows.
//
// Key format:
//   - `identity:{id}`             -> JSON-serialized Identity
//   - `trust:{truster}:{trustee}` -> JSON-serialized Trust
//   - `score:{owner}:{target}`    -> JSON-serialized Score
//
// Ids are 64 hex characters, so keys of one kind sort by their natural key.
// A commit is a single WriteBatch, which RocksDB applies atomically.

use rocksdb::{DBWithThreadMode, MultiThreaded, Options, WriteBatch};
use serde::de::DeserializeOwned;

use wot_core::error::WotError;
use wot_core::identity::IdentityId;
use wot_core::traits::{GraphBackend, RowWrite, StoredRow};
use wot_core::trust::EdgeKey;

const IDENTITY_PREFIX: &str = "identity:";
const TRUST_PREFIX: &str = "trust:";
const SCORE_PREFIX: &str = "score:";

/// RocksDB wrapper implementing the `GraphBackend` trait.
#[derive(Debug)]
pub struct RocksBackend {
    db: DBWithThreadMode<MultiThreaded>,
}

impl RocksBackend {
    /// Open a RocksDB database at the given filesystem path.
    ///
    /// Creates the database directory if it does not exist.
    pub fn open(path: &str) -> Result<Self, WotError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);

        let db = DBWithThreadMode::<MultiThreaded>::open(&opts, path)
            .map_err(|e| WotError::Storage(format!("Failed to open RocksDB at {}: {}", path, e)))?;

        Ok(Self { db })
    }

    fn identity_key(id: &IdentityId) -> Vec<u8> {
        format!("{}{}", IDENTITY_PREFIX, id).into_bytes()
    }

    fn trust_key(key: &EdgeKey) -> Vec<u8> {
        format!("{}{}:{}", TRUST_PREFIX, key.truster, key.trustee).into_bytes()
    }

    fn score_key(owner: &IdentityId, target: &IdentityId) -> Vec<u8> {
        format!("{}{}:{}", SCORE_PREFIX, owner, target).into_bytes()
    }

    /// Decode every value stored under `prefix`.
    fn scan<T: DeserializeOwned>(&self, prefix: &str) -> Result<Vec<T>, WotError> {
        let prefix = prefix.as_bytes();
        let mut rows = Vec::new();
        for item in self.db.prefix_iterator(prefix) {
            let (key, value) = item
                .map_err(|e| WotError::Storage(format!("RocksDB iteration error: {}", e)))?;

            // Stop when the prefix no longer matches.
            if !key.starts_with(prefix) {
                break;
            }
            rows.push(serde_json::from_slice(&value)?);
        }
        Ok(rows)
    }

    /// Raw read by key. Used by tests and tooling that inspect the database.
    pub fn get_bytes(&self, key: &[u8]) -> Result<Option<Vec<u8>>, WotError> {
        self.db
            .get(key)
            .map_err(|e| WotError::Storage(format!("RocksDB get failed: {}", e)))
    }
}

impl GraphBackend for RocksBackend {
    fn load(&self) -> Result<Vec<StoredRow>, WotError> {
        let mut rows: Vec<StoredRow> = Vec::new();
        rows.extend(self.scan(IDENTITY_PREFIX)?.into_iter().map(StoredRow::Identity));
        rows.extend(self.scan(TRUST_PREFIX)?.into_iter().map(StoredRow::Trust));
        rows.extend(self.scan(SCORE_PREFIX)?.into_iter().map(StoredRow::Score));
        Ok(rows)
    }

    fn commit(&self, writes: &[RowWrite]) -> Result<(), WotError> {
        let mut batch = WriteBatch::default();
        for write in writes {
            match write {
                RowWrite::Put(StoredRow::Identity(identity)) => {
                    batch.put(Self::identity_key(&identity.id), serde_json::to_vec(identity)?)
                }
                RowWrite::Put(StoredRow::Trust(trust)) => {
                    batch.put(Self::trust_key(&trust.key()), serde_json::to_vec(trust)?)
                }
                RowWrite::Put(StoredRow::Score(score)) => batch.put(
                    Self::score_key(&score.owner, &score.target),
                    serde_json::to_vec(score)?,
                ),
                RowWrite::DeleteIdentity(id) => batch.delete(Self::identity_key(id)),
                RowWrite::DeleteTrust(key) => batch.delete(Self::trust_key(key)),
                RowWrite::DeleteScore { owner, target } => {
                    batch.delete(Self::score_key(owner, target))
                }
            }
        }
        self.db
            .write(batch)
            .map_err(|e| WotError::Storage(format!("RocksDB batch write failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wot_core::identity::{Identity, IdentityOrigin};
    use wot_core::trust::Trust;

    fn temp_db_path(label: &str) -> String {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("wot_test_{}_{}", label, uuid::Uuid::now_v7()));
        path.to_string_lossy().to_string()
    }

    #[test]
    fn test_key_layout() {
        let a = IdentityId::from_bytes([0xaa; 32]);
        let b = IdentityId::from_bytes([0xbb; 32]);
        let key = String::from_utf8(RocksBackend::trust_key(&EdgeKey::new(a, b))).unwrap();
        assert_eq!(key, format!("trust:{}:{}", "aa".repeat(32), "bb".repeat(32)));
        assert!(RocksBackend::score_key(&a, &b).starts_with(b"score:"));
    }

    #[test]
    fn test_commit_then_load() {
        let backend = RocksBackend::open(&temp_db_path("commit")).unwrap();
        let a = IdentityId::from_bytes([1; 32]);
        let b = IdentityId::from_bytes([2; 32]);
        let trust = Trust {
            truster: a,
            trustee: b,
            value: 75,
            comment: "good".to_string(),
            truster_edition: 2,
        };
        backend
            .commit(&[
                RowWrite::Put(StoredRow::Identity(Identity::new(a, IdentityOrigin::Explicit))),
                RowWrite::Put(StoredRow::Identity(Identity::new(b, IdentityOrigin::Referenced))),
                RowWrite::Put(StoredRow::Trust(trust.clone())),
            ])
            .unwrap();

        let rows = backend.load().unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows.contains(&StoredRow::Trust(trust)));

        backend
            .commit(&[RowWrite::DeleteTrust(EdgeKey::new(a, b))])
            .unwrap();
        assert_eq!(backend.load().unwrap().len(), 2);
        assert!(backend
            .get_bytes(&RocksBackend::trust_key(&EdgeKey::new(a, b)))
            .unwrap()
            .is_none());
    }
}
