// crates/wot-daemon/src/import.rs
//
// Batch import of published trust lists from a JSON file.
//
// File format: an array of lists, each
//   { "truster": "<hex id>", "edition": N,
//     "entries": [{ "trustee": "<hex id>", "value": V, "comment": "..." }] }

use std::fs;

use serde::Deserialize;

use wot_core::error::{ErrorKind, WotError};
use wot_core::identity::IdentityId;
use wot_core::trust::TrustListEntry;
use wot_reputation::WebOfTrust;
use wot_store::TrustListOutcome;

/// One published trust list as it appears in an import file.
#[derive(Debug, Clone, Deserialize)]
pub struct PublishedTrustList {
    pub truster: IdentityId,
    pub edition: u64,
    #[serde(default)]
    pub entries: Vec<TrustListEntry>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ImportSummary {
    pub applied: usize,
    pub stale: usize,
    pub rejected: usize,
    /// Trusters that were not known before the import.
    pub new_trusters: usize,
}

/// Read and parse an import file.
pub fn load_trust_lists(path: &str) -> Result<Vec<PublishedTrustList>, Box<dyn std::error::Error>> {
    let contents = fs::read_to_string(path)?;
    let lists: Vec<PublishedTrustList> = serde_json::from_str(&contents)?;
    Ok(lists)
}

/// Apply every list in order. Lists that fail validation are skipped and
/// counted; a storage failure aborts the import.
pub fn import_trust_lists(
    wot: &WebOfTrust,
    lists: &[PublishedTrustList],
) -> Result<ImportSummary, WotError> {
    let mut summary = ImportSummary::default();

    for list in lists {
        match wot.import_trust_list(&list.truster, &list.entries, list.edition) {
            Ok((outcome, created)) => {
                if created {
                    summary.new_trusters += 1;
                }
                match outcome {
                    TrustListOutcome::Applied(_) => summary.applied += 1,
                    TrustListOutcome::Stale { .. } => summary.stale += 1,
                }
            }
            Err(e) if e.kind() == ErrorKind::Upstream => return Err(e),
            Err(e) => {
                tracing::warn!(
                    "Rejected trust list of {} edition {}: {}",
                    list.truster.short(),
                    list.edition,
                    e
                );
                summary.rejected += 1;
            }
        }
    }

    tracing::info!(
        "Imported trust lists: {} applied, {} stale, {} rejected, {} new trusters",
        summary.applied,
        summary.stale,
        summary.rejected,
        summary.new_trusters
    );
    Ok(summary)
}
