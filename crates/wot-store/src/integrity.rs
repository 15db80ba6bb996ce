// crates/wot-store/src/integrity.rs
//
// Structural integrity checks over a TrustGraph.
//
// `verify` walks every row and index and is run once at startup.
// `verify_touched` only looks at rows named in the graph's journal and runs
// before every commit. Both check structure only: whether score values agree
// with the trust graph is the score engine's business, and rows may lag the
// graph until the next recomputation pass.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use wot_core::crypto::Keypair;
use wot_core::error::{Invariant, RowKind, WotError};
use wot_core::identity::{Identity, IdentityId, IdentityKind};
use wot_core::trust::{Score, Trust};
use wot_core::validation::{MAX_TRUST_VALUE, MIN_TRUST_VALUE};

use crate::graph::{Touched, TrustGraph};

/// Row counts of a graph that passed `verify`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IntegrityReport {
    pub identities: usize,
    pub own_identities: usize,
    pub trusts: usize,
    pub scores: usize,
}

/// Full structural check. Returns the first violation found.
pub fn verify(graph: &TrustGraph) -> Result<IntegrityReport, WotError> {
    for identity in graph.identities() {
        check_identity(identity)?;
    }
    for trust in graph.trusts() {
        check_trust(graph, trust)?;
    }
    for (owner, tree) in &graph.trees {
        check_tree_owner(graph, owner)?;
        for score in tree.values() {
            check_score(graph, score)?;
        }
    }
    check_indices(graph)?;

    Ok(IntegrityReport {
        identities: graph.identity_count(),
        own_identities: graph.own_identities().count(),
        trusts: graph.trust_count(),
        scores: graph.score_count(),
    })
}

/// Check only the rows touched since the last commit.
pub(crate) fn verify_touched(graph: &TrustGraph) -> Result<(), WotError> {
    for touched in &graph.journal {
        match touched {
            Touched::Identity(id) => match graph.identity(id) {
                Some(identity) => check_identity(identity)?,
                None => check_unreferenced(graph, id)?,
            },
            Touched::Trust(key) => {
                if let Some(trust) = graph.trusts.get(key) {
                    check_trust(graph, trust)?;
                }
            }
            Touched::Score { owner, target } => {
                if let Some(score) = graph.score(owner, target) {
                    check_tree_owner(graph, owner)?;
                    check_score(graph, score)?;
                }
            }
        }
    }
    Ok(())
}

fn violation(invariant: Invariant, key: impl ToString) -> WotError {
    WotError::InvariantViolated {
        invariant,
        key: key.to_string(),
    }
}

fn check_identity(identity: &Identity) -> Result<(), WotError> {
    if let IdentityKind::Own { insert_key } = &identity.kind {
        if Keypair::from_seed(insert_key).identity_id() != identity.id {
            return Err(violation(Invariant::OwnKeyMismatch, identity.id));
        }
    }
    Ok(())
}

/// A deleted identity must leave nothing behind that names it.
fn check_unreferenced(graph: &TrustGraph, id: &IdentityId) -> Result<(), WotError> {
    if let Some(trust) = graph.given_trusts(id).chain(graph.received_trusts(id)).next() {
        return Err(WotError::DanglingReference {
            entity: RowKind::Trust,
            key: trust.key().to_string(),
            missing: *id,
        });
    }
    if let Some(score) = graph.scores_of(id).chain(graph.tree(id)).next() {
        return Err(WotError::DanglingReference {
            entity: RowKind::Score,
            key: format!("{}:{}", score.owner, score.target),
            missing: *id,
        });
    }
    Ok(())
}

fn check_trust(graph: &TrustGraph, trust: &Trust) -> Result<(), WotError> {
    let key = trust.key();
    if !(MIN_TRUST_VALUE..=MAX_TRUST_VALUE).contains(&trust.value) {
        return Err(violation(Invariant::TrustValueRange, key));
    }
    if trust.truster == trust.trustee {
        return Err(violation(Invariant::SelfTrust, key));
    }
    for endpoint in [trust.truster, trust.trustee] {
        if !graph.contains(&endpoint) {
            return Err(WotError::DanglingReference {
                entity: RowKind::Trust,
                key: key.to_string(),
                missing: endpoint,
            });
        }
    }
    Ok(())
}

fn check_tree_owner(graph: &TrustGraph, owner: &IdentityId) -> Result<(), WotError> {
    match graph.identity(owner) {
        None => Err(WotError::DanglingReference {
            entity: RowKind::Score,
            key: format!("{}:*", owner),
            missing: *owner,
        }),
        Some(identity) if !identity.is_own() => Err(violation(Invariant::TreeOwnerNotOwn, owner)),
        Some(_) => match graph.score(owner, owner) {
            Some(row) if row.rank == 0 && row.capacity == 100 => Ok(()),
            _ => Err(violation(Invariant::OwnerSelfScore, owner)),
        },
    }
}

fn check_score(graph: &TrustGraph, score: &Score) -> Result<(), WotError> {
    let key = format!("{}:{}", score.owner, score.target);
    if !graph.contains(&score.target) {
        return Err(WotError::DanglingReference {
            entity: RowKind::Score,
            key,
            missing: score.target,
        });
    }
    if score.capacity > 100 {
        return Err(violation(Invariant::CapacityRange, key));
    }
    if score.target != score.owner && score.rank == 0 {
        return Err(violation(Invariant::NonOwnerRankZero, key));
    }
    Ok(())
}

/// Rebuild every secondary index from the rows and compare.
fn check_indices(graph: &TrustGraph) -> Result<(), WotError> {
    type Adjacency = HashMap<IdentityId, BTreeSet<IdentityId>>;
    let mut trustees = Adjacency::new();
    let mut trusters = Adjacency::new();
    let mut positive_trustees = Adjacency::new();
    let mut positive_trusters = Adjacency::new();
    for trust in graph.trusts() {
        trustees.entry(trust.truster).or_default().insert(trust.trustee);
        trusters.entry(trust.trustee).or_default().insert(trust.truster);
        if trust.is_positive() {
            positive_trustees.entry(trust.truster).or_default().insert(trust.trustee);
            positive_trusters.entry(trust.trustee).or_default().insert(trust.truster);
        }
    }

    let mut contexts: BTreeMap<String, BTreeSet<IdentityId>> = BTreeMap::new();
    for identity in graph.identities() {
        for context in &identity.contexts {
            contexts.entry(context.clone()).or_default().insert(identity.id);
        }
    }

    let mut scored_in = Adjacency::new();
    for (owner, tree) in &graph.trees {
        if tree.is_empty() {
            return Err(violation(Invariant::IndexMirror, format!("empty tree {}", owner)));
        }
        for (target, score) in tree {
            if score.owner != *owner || score.target != *target {
                return Err(violation(Invariant::IndexMirror, format!("{}:{}", owner, target)));
            }
            scored_in.entry(*target).or_default().insert(*owner);
        }
    }

    let mirrors = [
        ("trustees", trustees == graph.trustees),
        ("trusters", trusters == graph.trusters),
        ("positive trustees", positive_trustees == graph.positive_trustees),
        ("positive trusters", positive_trusters == graph.positive_trusters),
        ("contexts", contexts == graph.contexts),
        ("scored in", scored_in == graph.scored_in),
    ];
    for (name, matches) in mirrors {
        if !matches {
            return Err(violation(Invariant::IndexMirror, name));
        }
    }
    Ok(())
}
