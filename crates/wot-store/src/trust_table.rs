// crates/wot-store/src/trust_table.rs
//
// TrustTable: trust edge mutation on a TrustGraph.
//
// Two write paths exist:
//   - local edits by an own identity (`set_trust`, `remove_trust`)
//   - replacement of a remote identity's whole published list
//     (`apply_remote_trust_list`), gated by a strictly increasing edition
//
// Both return the keys of edges whose existence or value changed, which is
// what recomputation scheduling needs.

use std::collections::BTreeSet;

use wot_core::error::WotError;
use wot_core::identity::IdentityId;
use wot_core::trust::{EdgeKey, Trust, TrustListEntry};
use wot_core::validation::{validate_trust_comment, validate_trust_value, MAX_TRUST_LIST_SIZE};

use crate::graph::TrustGraph;

/// Result of applying a published trust list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrustListOutcome {
    /// The list replaced the truster's previous out-edges.
    Applied(TrustListDiff),
    /// The offered edition was not newer than the last applied one.
    /// Nothing changed.
    Stale { offered: u64, last_applied: u64 },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrustListDiff {
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
    /// Identities first seen in this list.
    pub new_identities: usize,
    /// Edges whose existence or value changed.
    pub changed: Vec<EdgeKey>,
}

impl TrustGraph {
    /// Local trust edit by an own identity. Returns the edge key if the
    /// value changed (or the edge is new), `None` if only the comment did.
    pub fn set_trust(
        &mut self,
        truster: &IdentityId,
        trustee: &IdentityId,
        value: i8,
        comment: &str,
    ) -> Result<Option<EdgeKey>, WotError> {
        validate_trust_value(value)?;
        validate_trust_comment(comment)?;
        if truster == trustee {
            return Err(WotError::invalid("trustee", "an identity cannot trust itself"));
        }
        let truster_row = self.identity_or_err(truster)?;
        if !truster_row.is_own() {
            return Err(WotError::NotOwnIdentity(*truster));
        }
        let truster_edition = truster_row.edition;
        self.identity_or_err(trustee)?;

        let previous = self.put_trust(Trust {
            truster: *truster,
            trustee: *trustee,
            value,
            comment: comment.to_string(),
            truster_edition,
        });
        let changed = previous.map_or(true, |previous| previous.value != value);
        Ok(changed.then(|| EdgeKey::new(*truster, *trustee)))
    }

    /// Local removal of one edge given by an own identity.
    pub fn remove_trust(
        &mut self,
        truster: &IdentityId,
        trustee: &IdentityId,
    ) -> Result<Option<Trust>, WotError> {
        if !self.identity_or_err(truster)?.is_own() {
            return Err(WotError::NotOwnIdentity(*truster));
        }
        Ok(self.remove_trust_row(&EdgeKey::new(*truster, *trustee)))
    }

    /// Replace the whole out-edge set of a remote identity with `entries`.
    ///
    /// A no-op returning `Stale` unless `edition` is strictly newer than the
    /// truster's last applied edition. Entries naming unknown identities
    /// create them as referenced identities.
    pub fn apply_remote_trust_list(
        &mut self,
        truster: &IdentityId,
        entries: &[TrustListEntry],
        edition: u64,
    ) -> Result<TrustListOutcome, WotError> {
        let truster_row = self.identity_or_err(truster)?;
        if truster_row.is_own() {
            return Err(WotError::invalid(
                "truster",
                "trust lists of own identities are maintained locally",
            ));
        }
        if edition <= truster_row.edition {
            return Ok(TrustListOutcome::Stale {
                offered: edition,
                last_applied: truster_row.edition,
            });
        }
        validate_trust_list(truster, entries)?;

        let mut diff = TrustListDiff::default();
        let listed: BTreeSet<IdentityId> = entries.iter().map(|entry| entry.trustee).collect();

        for entry in entries {
            if self.ensure_referenced(entry.trustee) {
                diff.new_identities += 1;
            }
            let previous = self.put_trust(Trust {
                truster: *truster,
                trustee: entry.trustee,
                value: entry.value,
                comment: entry.comment.clone(),
                truster_edition: edition,
            });
            match previous {
                None => {
                    diff.added += 1;
                    diff.changed.push(EdgeKey::new(*truster, entry.trustee));
                }
                Some(previous) if previous.value != entry.value => {
                    diff.updated += 1;
                    diff.changed.push(EdgeKey::new(*truster, entry.trustee));
                }
                Some(_) => {}
            }
        }

        let dropped: Vec<EdgeKey> = self
            .given_trusts(truster)
            .filter(|trust| !listed.contains(&trust.trustee))
            .map(Trust::key)
            .collect();
        for key in dropped {
            self.remove_trust_row(&key);
            diff.removed += 1;
            diff.changed.push(key);
        }

        self.update_identity(truster, |identity| {
            identity.edition = edition;
            Ok(())
        })?;

        diff.changed.sort();
        Ok(TrustListOutcome::Applied(diff))
    }
}

fn validate_trust_list(truster: &IdentityId, entries: &[TrustListEntry]) -> Result<(), WotError> {
    if entries.len() > MAX_TRUST_LIST_SIZE {
        return Err(WotError::invalid(
            "trust list",
            format!("{} entries exceeds {}", entries.len(), MAX_TRUST_LIST_SIZE),
        ));
    }
    let mut seen = BTreeSet::new();
    for entry in entries {
        validate_trust_value(entry.value)?;
        validate_trust_comment(&entry.comment)?;
        if entry.trustee == *truster {
            return Err(WotError::invalid("trust list", "lists its own publisher"));
        }
        if !seen.insert(entry.trustee) {
            return Err(WotError::invalid(
                "trust list",
                format!("names {} more than once", entry.trustee),
            ));
        }
    }
    Ok(())
}
