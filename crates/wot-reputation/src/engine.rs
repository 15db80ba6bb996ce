// crates/wot-reputation/src/engine.rs
//
// ScoreEngine: rank, capacity and score computation for trust trees.
//
// For one tree owner:
//   1. Rank is the breadth-first distance from the owner over strictly
//      positive trust edges. A node's rank is fixed when it is first visited,
//      so positive cycles terminate without revisits.
//   2. Capacity is a table lookup on rank (see `CapacityTable`).
//   3. Score sums, over every trust edge a target receives, the edge value
//      times the truster's capacity / 100, truncated per edge. Trusters
//      without a rank contribute nothing.
//
// Only ranked targets get a score row. The owner always has rank 0 and
// capacity 100.
//
// Incremental updates exploit that, as long as every touched trustee keeps
// a positive truster one rank above it, no rank can grow. New positive edges
// can then only lower ranks, which a bucket-ordered relaxation from the
// touched edges finds exactly. Anything else falls back to a full pass.

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use wot_core::error::{RowKind, WotError};
use wot_core::identity::IdentityId;
use wot_core::trust::{EdgeKey, Score};
use wot_store::TrustGraph;

use crate::capacity::CapacityTable;

/// How a tree was brought up to date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecomputeMode {
    Full,
    Incremental,
}

/// Summary of one recomputation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecomputeStats {
    pub owner: IdentityId,
    pub mode: RecomputeMode,
    /// Score rows inserted or changed.
    pub written: usize,
    /// Score rows deleted.
    pub removed: usize,
    /// Rows in the tree after the pass.
    pub tree_size: usize,
}

/// Contribution of one trust edge to its trustee's score.
fn contribution(value: i8, capacity: u8) -> i32 {
    i32::from(value) * i32::from(capacity) / 100
}

fn dangling(from: IdentityId, to: IdentityId) -> WotError {
    WotError::DanglingReference {
        entity: RowKind::Trust,
        key: EdgeKey::new(from, to).to_string(),
        missing: to,
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScoreEngine {
    capacities: CapacityTable,
}

impl ScoreEngine {
    pub fn new(capacities: CapacityTable) -> Self {
        Self { capacities }
    }

    pub fn capacities(&self) -> &CapacityTable {
        &self.capacities
    }

    fn ensure_owner(graph: &TrustGraph, owner: &IdentityId) -> Result<(), WotError> {
        if graph.identity_or_err(owner)?.is_own() {
            Ok(())
        } else {
            Err(WotError::NotOwnIdentity(*owner))
        }
    }

    /// Breadth-first rank assignment over positive edges.
    pub fn compute_ranks(
        &self,
        graph: &TrustGraph,
        owner: &IdentityId,
    ) -> Result<HashMap<IdentityId, u32>, WotError> {
        let mut ranks = HashMap::new();
        let mut queue = VecDeque::new();
        ranks.insert(*owner, 0);
        queue.push_back((*owner, 0u32));

        while let Some((node, rank)) = queue.pop_front() {
            for trustee in graph.positive_trustees(&node) {
                if !graph.contains(&trustee) {
                    return Err(dangling(node, trustee));
                }
                if let Entry::Vacant(slot) = ranks.entry(trustee) {
                    slot.insert(rank + 1);
                    queue.push_back((trustee, rank + 1));
                }
            }
        }
        Ok(ranks)
    }

    /// Every score row `owner`'s tree should hold for the current graph.
    /// Reads only; the graph is not modified.
    pub fn compute_tree(
        &self,
        graph: &TrustGraph,
        owner: &IdentityId,
    ) -> Result<BTreeMap<IdentityId, Score>, WotError> {
        Self::ensure_owner(graph, owner)?;
        let ranks = self.compute_ranks(graph, owner)?;

        let mut rows: BTreeMap<IdentityId, Score> = ranks
            .iter()
            .map(|(&target, &rank)| {
                let score = Score {
                    owner: *owner,
                    target,
                    rank,
                    capacity: self.capacities.capacity(rank),
                    value: 0,
                };
                (target, score)
            })
            .collect();

        // Second pass: every ranked truster hands out all of its edges.
        for (truster, &rank) in &ranks {
            let capacity = self.capacities.capacity(rank);
            for trust in graph.given_trusts(truster) {
                if let Some(row) = rows.get_mut(&trust.trustee) {
                    row.value += contribution(trust.value, capacity);
                }
            }
        }
        Ok(rows)
    }

    /// Recompute `owner`'s whole tree and replace its rows.
    pub fn full_recompute(
        &self,
        graph: &mut TrustGraph,
        owner: &IdentityId,
    ) -> Result<RecomputeStats, WotError> {
        let rows = self.compute_tree(graph, owner)?;

        let stale: Vec<IdentityId> = graph
            .tree(owner)
            .map(|score| score.target)
            .filter(|target| !rows.contains_key(target))
            .collect();
        for target in &stale {
            graph.remove_score(owner, target);
        }

        let mut written = 0;
        for (target, row) in rows {
            if graph.score(owner, &target) != Some(&row) {
                graph.put_score(row);
                written += 1;
            }
        }

        let stats = RecomputeStats {
            owner: *owner,
            mode: RecomputeMode::Full,
            written,
            removed: stale.len(),
            tree_size: graph.tree_len(owner),
        };
        tracing::debug!(
            "Full recompute for {}: {} written, {} removed, {} rows",
            owner.short(),
            stats.written,
            stats.removed,
            stats.tree_size
        );
        Ok(stats)
    }

    /// Bring `owner`'s tree up to date after the trust edges in `edges` were
    /// inserted, changed or removed. Falls back to `full_recompute` when the
    /// change may have raised a rank or the tree was never computed.
    pub fn incremental_update(
        &self,
        graph: &mut TrustGraph,
        owner: &IdentityId,
        edges: &BTreeSet<EdgeKey>,
    ) -> Result<RecomputeStats, WotError> {
        Self::ensure_owner(graph, owner)?;
        if graph.score(owner, owner).is_none() {
            return self.full_recompute(graph, owner);
        }

        let touched: BTreeSet<IdentityId> = edges.iter().map(|edge| edge.trustee).collect();
        if let Some(unsupported) = touched.iter().find(|&x| !self.still_supported(graph, owner, x)) {
            tracing::debug!(
                "Rank of {} in tree of {} may have grown, falling back to full recompute",
                unsupported.short(),
                owner.short()
            );
            return self.full_recompute(graph, owner);
        }

        let lowered = self.relax(graph, owner, edges)?;

        // Targets whose score inputs changed: trustees of touched edges,
        // nodes whose rank dropped, and everything those nodes trust when
        // their capacity changed.
        let mut affected: BTreeSet<IdentityId> = touched;
        for (id, &rank) in &lowered {
            affected.insert(*id);
            let before = graph.rank(owner, id).map(|old| self.capacities.capacity(old));
            if before != Some(self.capacities.capacity(rank)) {
                affected.extend(graph.given_trusts(id).map(|trust| trust.trustee));
            }
        }

        // Read phase: the new row (or its absence) for every affected target.
        let view: &TrustGraph = graph;
        let rank_of = |id: &IdentityId| -> Option<u32> {
            lowered.get(id).copied().or_else(|| view.rank(owner, id))
        };
        let updates: Vec<(IdentityId, Option<Score>)> = affected
            .iter()
            .map(|target| {
                let row = rank_of(target).map(|rank| Score {
                    owner: *owner,
                    target: *target,
                    rank,
                    capacity: self.capacities.capacity(rank),
                    value: view
                        .received_trusts(target)
                        .filter_map(|trust| {
                            let truster_rank = rank_of(&trust.truster)?;
                            Some(contribution(trust.value, self.capacities.capacity(truster_rank)))
                        })
                        .sum(),
                });
                (*target, row)
            })
            .collect();

        let mut written = 0;
        let mut removed = 0;
        for (target, row) in updates {
            match row {
                Some(row) if graph.score(owner, &target) != Some(&row) => {
                    graph.put_score(row);
                    written += 1;
                }
                Some(_) => {}
                None => {
                    if graph.remove_score(owner, &target).is_some() {
                        removed += 1;
                    }
                }
            }
        }

        let stats = RecomputeStats {
            owner: *owner,
            mode: RecomputeMode::Incremental,
            written,
            removed,
            tree_size: graph.tree_len(owner),
        };
        tracing::debug!(
            "Incremental update for {} ({} edges): {} written, {} lowered, {} rows",
            owner.short(),
            edges.len(),
            stats.written,
            lowered.len(),
            stats.tree_size
        );
        Ok(stats)
    }

    /// Whether `target` still has a positive truster exactly one rank above
    /// its current row. Unranked targets are trivially fine.
    fn still_supported(&self, graph: &TrustGraph, owner: &IdentityId, target: &IdentityId) -> bool {
        match graph.rank(owner, target) {
            None | Some(0) => true,
            Some(rank) => graph
                .positive_trusters(target)
                .any(|truster| graph.rank(owner, &truster) == Some(rank - 1)),
        }
    }

    /// Lower ranks reachable through the touched positive edges, visiting
    /// candidates in rank order. Returns only the ids whose rank dropped
    /// (or that became ranked).
    fn relax(
        &self,
        graph: &TrustGraph,
        owner: &IdentityId,
        edges: &BTreeSet<EdgeKey>,
    ) -> Result<HashMap<IdentityId, u32>, WotError> {
        let mut buckets: BTreeMap<u32, Vec<IdentityId>> = BTreeMap::new();
        for edge in edges {
            let positive = graph
                .trust(&edge.truster, &edge.trustee)
                .is_some_and(|trust| trust.is_positive());
            if !positive {
                continue;
            }
            if let Some(rank) = graph.rank(owner, &edge.truster) {
                buckets.entry(rank + 1).or_default().push(edge.trustee);
            }
        }

        let mut lowered: HashMap<IdentityId, u32> = HashMap::new();
        while let Some(entry) = buckets.first_entry() {
            let (rank, candidates) = entry.remove_entry();
            for id in candidates {
                let best = lowered.get(&id).copied().or_else(|| graph.rank(owner, &id));
                if best.is_some_and(|best| best <= rank) {
                    continue;
                }
                if !graph.contains(&id) {
                    return Err(WotError::DanglingReference {
                        entity: RowKind::Trust,
                        key: format!("*->{}", id),
                        missing: id,
                    });
                }
                lowered.insert(id, rank);
                buckets
                    .entry(rank + 1)
                    .or_default()
                    .extend(graph.positive_trustees(&id));
            }
        }
        Ok(lowered)
    }
}
