// crates/wot-reputation/tests/scenarios.rs
//
// End-to-end trust tree scenarios through the WebOfTrust context.
//
// Each test builds a small graph with an own identity A and remote
// identities, drains the recomputation queue, and checks the resulting
// rank/capacity/score rows against values derived from the capacity table.

use std::sync::Arc;

use wot_core::crypto::Keypair;
use wot_core::error::ErrorKind;
use wot_core::identity::IdentityId;
use wot_core::trust::{Score, ScoreSign, TrustListEntry};
use wot_reputation::{CapacityTable, RecomputeMode, SchedulerConfig, WebOfTrust};
use wot_store::{GraphStore, TrustListOutcome};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn remote(n: u8) -> IdentityId {
    IdentityId::from_bytes([n; 32])
}

fn entry(trustee: IdentityId, value: i8) -> TrustListEntry {
    TrustListEntry {
        trustee,
        value,
        comment: String::new(),
    }
}

/// Context with own identity A and explicitly registered B, C, D.
struct Fixture {
    wot: WebOfTrust,
    a: IdentityId,
    b: IdentityId,
    c: IdentityId,
    d: IdentityId,
}

impl Fixture {
    fn new() -> Self {
        Self::with_capacities(CapacityTable::default())
    }

    fn with_capacities(capacities: CapacityTable) -> Self {
        let wot = WebOfTrust::new(
            Arc::new(GraphStore::in_memory()),
            capacities,
            SchedulerConfig::default(),
        );
        let a = wot
            .create_own_identity(&Keypair::from_seed(&[0xa0; 32]), Some("A"))
            .unwrap();
        let (b, c, d) = (remote(0xb0), remote(0xc0), remote(0xd0));
        for id in [b, c, d] {
            wot.add_identity(id).unwrap();
        }
        Self { wot, a, b, c, d }
    }

    fn cap(&self, rank: u32) -> i32 {
        i32::from(self.wot.engine().capacities().capacity(rank))
    }

    fn score(&self, target: &IdentityId) -> Option<Score> {
        self.wot.get_score(&self.a, target).unwrap()
    }

    fn settle(&self) {
        self.wot.run_pending().unwrap();
        assert_tree_matches_full(&self.wot, &self.a);
    }
}

/// The stored tree equals a from-scratch computation.
fn assert_tree_matches_full(wot: &WebOfTrust, owner: &IdentityId) {
    let snapshot = wot.store().snapshot().unwrap();
    let expected = wot.engine().compute_tree(&snapshot, owner).unwrap();
    let stored: Vec<Score> = snapshot.tree(owner).cloned().collect();
    assert_eq!(stored, expected.into_values().collect::<Vec<_>>());
}

/// A->B 100, B->C 50.
fn scenario_one(f: &Fixture) {
    f.wot.set_trust(&f.a, &f.b, 100, "").unwrap();
    f.wot
        .apply_remote_trust_list(&f.b, &[entry(f.c, 50)], 1)
        .unwrap();
    f.settle();
}

/// Scenario one plus A->D 100, D->C -30.
fn scenario_two(f: &Fixture) {
    scenario_one(f);
    f.wot.set_trust(&f.a, &f.d, 100, "").unwrap();
    f.wot
        .apply_remote_trust_list(&f.d, &[entry(f.c, -30)], 1)
        .unwrap();
    f.settle();
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn test_chain_ranks_and_scores() {
    let f = Fixture::new();
    scenario_one(&f);

    let b = f.score(&f.b).unwrap();
    assert_eq!(b.rank, 1);
    assert_eq!(i32::from(b.capacity), f.cap(1));
    assert_eq!(b.value, 100);

    let c = f.score(&f.c).unwrap();
    assert_eq!(c.rank, 2);
    assert_eq!(c.value, 50 * f.cap(1) / 100);
}

#[test]
fn test_chain_with_full_capacity_at_rank_one() {
    let table = CapacityTable::new(vec![100, 100, 50, 25], 8).unwrap();
    let f = Fixture::with_capacities(table);
    scenario_one(&f);

    let b = f.score(&f.b).unwrap();
    assert_eq!((b.rank, b.capacity), (1, 100));
    assert_eq!(f.score(&f.c).unwrap().value, 50);
}

#[test]
fn test_second_truster_adds_negative_contribution() {
    let f = Fixture::new();
    scenario_two(&f);

    let c = f.score(&f.c).unwrap();
    assert_eq!(c.rank, 2);
    assert_eq!(c.value, 50 * f.cap(1) / 100 + (-30) * f.cap(1) / 100);
    assert_eq!(f.score(&f.d).unwrap().rank, 1);
}

#[test]
fn test_removing_an_edge_unranks_negatively_trusted_target() {
    let f = Fixture::new();
    scenario_two(&f);

    assert!(f.wot.remove_trust(&f.a, &f.b).unwrap().is_some());
    f.settle();

    assert!(f.score(&f.b).is_none());
    // D->C is negative and does not carry rank, so C leaves the tree.
    assert!(f.score(&f.c).is_none());
    assert_eq!(f.score(&f.d).unwrap().rank, 1);
    assert!(f.wot.require_trust(&f.a, &f.b).is_err());
}

#[test]
fn test_removing_an_edge_reroutes_rank_through_positive_truster() {
    let f = Fixture::new();
    scenario_one(&f);
    f.wot.set_trust(&f.a, &f.d, 100, "").unwrap();
    f.wot
        .apply_remote_trust_list(&f.d, &[entry(f.c, 30)], 1)
        .unwrap();
    f.settle();

    assert!(f.wot.remove_trust(&f.a, &f.b).unwrap().is_some());
    f.settle();

    assert!(f.score(&f.b).is_none());
    let c = f.score(&f.c).unwrap();
    assert_eq!(c.rank, 2);
    assert_eq!(c.value, 30 * f.cap(1) / 100);
}

#[test]
fn test_empty_list_deletes_edges_and_stale_replay_is_noop() {
    let f = Fixture::new();
    f.wot.set_trust(&f.a, &f.b, 100, "").unwrap();
    for edition in 1..=3 {
        f.wot
            .apply_remote_trust_list(&f.b, &[entry(f.c, 50), entry(f.d, 20)], edition)
            .unwrap();
    }
    f.settle();
    assert_eq!(f.wot.given_trust_count(&f.b).unwrap(), 2);

    let outcome = f.wot.apply_remote_trust_list(&f.b, &[], 5).unwrap();
    assert!(matches!(outcome, TrustListOutcome::Applied(ref diff) if diff.removed == 2));
    f.settle();
    assert_eq!(f.wot.given_trust_count(&f.b).unwrap(), 0);
    assert!(f.score(&f.c).is_none());
    assert!(f.score(&f.d).is_none());

    let tree_before: Vec<Score> = f.wot.store().snapshot().unwrap().tree(&f.a).cloned().collect();
    let outcome = f
        .wot
        .apply_remote_trust_list(&f.b, &[entry(f.c, 50)], 3)
        .unwrap();
    assert_eq!(
        outcome,
        TrustListOutcome::Stale {
            offered: 3,
            last_applied: 5
        }
    );
    f.settle();
    assert_eq!(f.wot.given_trust_count(&f.b).unwrap(), 0);
    assert_eq!(f.wot.identity(&f.b).unwrap().unwrap().edition, 5);
    let tree_after: Vec<Score> = f.wot.store().snapshot().unwrap().tree(&f.a).cloned().collect();
    assert_eq!(tree_before, tree_after);
}

#[test]
fn test_positive_cycle_through_owner() {
    let f = Fixture::new();
    f.wot.set_trust(&f.a, &f.b, 100, "").unwrap();
    f.wot
        .apply_remote_trust_list(&f.b, &[entry(f.c, 100)], 1)
        .unwrap();
    f.wot
        .apply_remote_trust_list(&f.c, &[entry(f.a, 100)], 1)
        .unwrap();
    f.settle();

    let a = f.score(&f.a).unwrap();
    assert_eq!((a.rank, a.capacity), (0, 100));
    assert_eq!(a.value, 100 * f.cap(2) / 100);
    assert_eq!(f.score(&f.b).unwrap().rank, 1);
    assert_eq!(f.score(&f.c).unwrap().rank, 2);
}

// ---------------------------------------------------------------------------
// Properties on fixed graphs
// ---------------------------------------------------------------------------

#[test]
fn test_owner_row_survives_distrust() {
    let f = Fixture::new();
    f.wot.set_trust(&f.a, &f.b, 100, "").unwrap();
    f.wot
        .apply_remote_trust_list(&f.b, &[entry(f.a, -100)], 1)
        .unwrap();
    f.settle();

    let a = f.score(&f.a).unwrap();
    assert_eq!((a.rank, a.capacity), (0, 100));
    assert_eq!(a.value, -100 * f.cap(1) / 100);
}

#[test]
fn test_recompute_twice_is_identical() {
    let f = Fixture::new();
    scenario_two(&f);

    let first: Vec<Score> = f.wot.store().snapshot().unwrap().tree(&f.a).cloned().collect();
    let stats = f
        .wot
        .store()
        .transaction(|graph| f.wot.engine().full_recompute(graph, &f.a))
        .unwrap();
    assert_eq!((stats.written, stats.removed), (0, 0));
    let second: Vec<Score> = f.wot.store().snapshot().unwrap().tree(&f.a).cloned().collect();
    assert_eq!(first, second);
}

#[test]
fn test_lowering_a_rank_runs_incrementally() {
    let f = Fixture::new();
    f.wot.set_trust(&f.a, &f.b, 100, "").unwrap();
    f.wot
        .apply_remote_trust_list(&f.b, &[entry(f.c, 100)], 1)
        .unwrap();
    f.wot
        .apply_remote_trust_list(&f.c, &[entry(f.d, 100)], 1)
        .unwrap();
    f.settle();
    assert_eq!(f.score(&f.d).unwrap().rank, 3);

    f.wot.set_trust(&f.a, &f.c, 10, "").unwrap();
    let passes = f.wot.run_pending().unwrap();
    assert_eq!(passes.len(), 1);
    assert_eq!(passes[0].mode, RecomputeMode::Incremental);
    assert_eq!(f.score(&f.c).unwrap().rank, 1);
    assert_eq!(f.score(&f.d).unwrap().rank, 2);
    assert_tree_matches_full(&f.wot, &f.a);
}

#[test]
fn test_burst_of_mutations_is_one_pass() {
    let f = Fixture::new();
    f.settle();
    for (value, id) in [(10, f.b), (20, f.c), (30, f.d), (40, f.b)] {
        f.wot.set_trust(&f.a, &id, value, "").unwrap();
    }
    let passes = f.wot.run_pending().unwrap();
    assert_eq!(passes.len(), 1);
    assert_eq!(f.score(&f.b).unwrap().value, 40);
    assert_tree_matches_full(&f.wot, &f.a);
}

#[test]
fn test_trees_of_two_owners_are_independent() {
    let f = Fixture::new();
    let e = f
        .wot
        .create_own_identity(&Keypair::from_seed(&[0xe0; 32]), None)
        .unwrap();
    f.wot.set_trust(&f.a, &f.b, 100, "").unwrap();
    f.wot.set_trust(&e, &f.c, 100, "").unwrap();
    f.wot
        .apply_remote_trust_list(&f.c, &[entry(f.b, 60)], 1)
        .unwrap();
    f.settle();
    assert_tree_matches_full(&f.wot, &e);

    assert_eq!(f.wot.get_score(&e, &f.b).unwrap().unwrap().rank, 2);
    assert_eq!(f.score(&f.b).unwrap().rank, 1);
    assert!(f.score(&f.c).is_none());
    assert_eq!(f.wot.scores_of(&f.b).unwrap().len(), 2);
    assert_eq!(
        f.wot.best_capacity(&f.b).unwrap(),
        f.wot.engine().capacities().capacity(1)
    );
    assert_eq!(
        f.wot
            .identities_by_score(&e, ScoreSign::Positive)
            .unwrap()
            .len(),
        2
    );
}

#[test]
fn test_invalid_mutations_change_nothing() {
    let f = Fixture::new();
    assert_eq!(
        f.wot.set_trust(&f.a, &f.b, 101, "").unwrap_err().kind(),
        ErrorKind::Validation
    );
    assert_eq!(
        f.wot.set_trust(&f.b, &f.c, 10, "").unwrap_err().kind(),
        ErrorKind::Validation
    );
    assert_eq!(
        f.wot
            .apply_remote_trust_list(&f.b, &[entry(f.c, 1), entry(f.c, 2)], 1)
            .unwrap_err()
            .kind(),
        ErrorKind::Validation
    );
    assert_eq!(f.wot.store().snapshot().unwrap().trust_count(), 0);
    assert_eq!(f.wot.identity(&f.b).unwrap().unwrap().edition, 0);
}

#[test]
fn test_identity_attributes_round_trip() {
    let f = Fixture::new();
    f.wot.set_nickname(&f.b, "bob").unwrap();
    assert!(f.wot.add_context(&f.b, "Freetalk").unwrap());
    assert_eq!(f.wot.set_property(&f.b, "avatar", "none").unwrap(), None);

    assert_eq!(f.wot.get_property(&f.b, "avatar").unwrap().as_deref(), Some("none"));
    let with_context = f.wot.identities_with_context("Freetalk").unwrap();
    assert_eq!(with_context.len(), 1);
    assert_eq!(with_context[0].nickname.as_deref(), Some("bob"));

    assert_eq!(f.wot.remove_property(&f.b, "avatar").unwrap().as_deref(), Some("none"));
    assert!(f.wot.remove_context(&f.b, "Freetalk").unwrap());
    assert!(f.wot.identities_with_context("Freetalk").unwrap().is_empty());
    assert!(f.wot.add_context(&f.b, "not valid!").is_err());
}

#[test]
fn test_deleting_own_identity_drops_its_tree_only() {
    let f = Fixture::new();
    scenario_one(&f);
    assert_eq!(f.wot.own_identities().unwrap().len(), 1);

    let removed = f.wot.delete_own_identity(&f.a).unwrap();
    assert_eq!(removed, 3);
    f.wot.run_pending().unwrap();
    assert!(f.wot.own_identities().unwrap().is_empty());
    assert!(f.score(&f.c).is_none());
    // Its trust is kept.
    assert!(f.wot.get_trust(&f.a, &f.b).unwrap().is_some());
}
