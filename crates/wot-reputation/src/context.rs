// crates/wot-reputation/src/context.rs
//
// WebOfTrust: the explicit context value holding the store, score engine and
// recomputation scheduler. Constructed once and handed to every collaborator.
//
// Queries read an immutable snapshot of the committed graph. Mutations run in
// one store transaction each and, once committed, report the trust edges they
// changed to the scheduler.

use std::sync::Arc;

use tokio::task::JoinHandle;

use wot_core::crypto::Keypair;
use wot_core::error::WotError;
use wot_core::identity::{Identity, IdentityId};
use wot_core::trust::{EdgeKey, Score, ScoreSign, Trust, TrustListEntry};
use wot_store::{integrity, GraphStore, IdentityRemoval, IntegrityReport, TrustListOutcome};

use crate::capacity::CapacityTable;
use crate::engine::{RecomputeStats, ScoreEngine};
use crate::scheduler::{PendingWork, RecomputationScheduler, SchedulerConfig};

pub struct WebOfTrust {
    store: Arc<GraphStore>,
    engine: Arc<ScoreEngine>,
    scheduler: Arc<RecomputationScheduler>,
}

impl WebOfTrust {
    pub fn new(store: Arc<GraphStore>, capacities: CapacityTable, config: SchedulerConfig) -> Self {
        let engine = Arc::new(ScoreEngine::new(capacities));
        let scheduler = Arc::new(RecomputationScheduler::new(
            Arc::clone(&store),
            Arc::clone(&engine),
            config,
        ));
        Self {
            store,
            engine,
            scheduler,
        }
    }

    /// Non-persistent context with default capacities and scheduling.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(GraphStore::in_memory()),
            CapacityTable::default(),
            SchedulerConfig::default(),
        )
    }

    pub fn store(&self) -> &Arc<GraphStore> {
        &self.store
    }

    pub fn engine(&self) -> &ScoreEngine {
        &self.engine
    }

    pub fn scheduler(&self) -> &Arc<RecomputationScheduler> {
        &self.scheduler
    }

    // -----------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------

    /// Verify the loaded graph and queue a full recompute of every tree.
    pub fn init(&self) -> Result<IntegrityReport, WotError> {
        let snapshot = self.store.snapshot()?;
        let report = integrity::verify(&snapshot)?;
        tracing::info!(
            "Integrity check passed: {} identities ({} own), {} trusts, {} scores",
            report.identities,
            report.own_identities,
            report.trusts,
            report.scores
        );
        self.scheduler.schedule_all(&snapshot);
        Ok(report)
    }

    /// Stop background recomputation and close the store.
    pub fn terminate(&self) {
        self.scheduler.shutdown();
        self.store.close();
        tracing::info!("Web of trust terminated");
    }

    /// Drain queued recomputation on the calling thread.
    pub fn run_pending(&self) -> Result<Vec<RecomputeStats>, WotError> {
        self.scheduler.run_pending()
    }

    pub fn spawn_worker(&self) -> JoinHandle<()> {
        self.scheduler.spawn_worker()
    }

    // -----------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------

    pub fn get_score(&self, owner: &IdentityId, target: &IdentityId) -> Result<Option<Score>, WotError> {
        self.store.read(|graph| graph.score(owner, target).cloned())
    }

    pub fn require_score(&self, owner: &IdentityId, target: &IdentityId) -> Result<Score, WotError> {
        self.get_score(owner, target)?.ok_or(WotError::NotInTrustTree {
            owner: *owner,
            target: *target,
        })
    }

    pub fn get_trust(&self, truster: &IdentityId, trustee: &IdentityId) -> Result<Option<Trust>, WotError> {
        self.store.read(|graph| graph.trust(truster, trustee).cloned())
    }

    pub fn require_trust(&self, truster: &IdentityId, trustee: &IdentityId) -> Result<Trust, WotError> {
        self.get_trust(truster, trustee)?.ok_or(WotError::NotTrusted {
            truster: *truster,
            trustee: *trustee,
        })
    }

    /// Rows of `owner`'s tree with a score of the given sign, highest score
    /// first, ties by target id. The owner's own row is not listed.
    pub fn identities_by_score(&self, owner: &IdentityId, sign: ScoreSign) -> Result<Vec<Score>, WotError> {
        self.store.read(|graph| {
            let mut rows: Vec<Score> = graph
                .tree(owner)
                .filter(|score| score.target != *owner && sign.matches(score.value))
                .cloned()
                .collect();
            rows.sort_by(|a, b| b.value.cmp(&a.value).then_with(|| a.target.cmp(&b.target)));
            rows
        })
    }

    /// Highest score `target` has in any tree.
    pub fn best_score(&self, target: &IdentityId) -> Result<Option<i32>, WotError> {
        self.store
            .read(|graph| graph.scores_of(target).map(|score| score.value).max())
    }

    /// Highest capacity `target` has in any tree, 0 if it is in none.
    pub fn best_capacity(&self, target: &IdentityId) -> Result<u8, WotError> {
        self.store.read(|graph| {
            graph
                .scores_of(target)
                .map(|score| score.capacity)
                .max()
                .unwrap_or(0)
        })
    }

    pub fn scores_of(&self, target: &IdentityId) -> Result<Vec<Score>, WotError> {
        self.store.read(|graph| graph.scores_of(target).cloned().collect())
    }

    /// Trust received by `trustee`.
    pub fn trusters_of(&self, trustee: &IdentityId) -> Result<Vec<Trust>, WotError> {
        self.store
            .read(|graph| graph.received_trusts(trustee).cloned().collect())
    }

    /// Trust given by `truster`.
    pub fn trustees_of(&self, truster: &IdentityId) -> Result<Vec<Trust>, WotError> {
        self.store
            .read(|graph| graph.given_trusts(truster).cloned().collect())
    }

    pub fn received_trust_count(&self, trustee: &IdentityId) -> Result<usize, WotError> {
        self.store.read(|graph| graph.received_trust_count(trustee))
    }

    pub fn given_trust_count(&self, truster: &IdentityId) -> Result<usize, WotError> {
        self.store.read(|graph| graph.given_trust_count(truster))
    }

    pub fn identity(&self, id: &IdentityId) -> Result<Option<Identity>, WotError> {
        self.store.read(|graph| graph.identity(id).cloned())
    }

    pub fn all_identities(&self) -> Result<Vec<Identity>, WotError> {
        self.store.read(|graph| graph.identities().cloned().collect())
    }

    pub fn own_identities(&self) -> Result<Vec<Identity>, WotError> {
        self.store.read(|graph| graph.own_identities().cloned().collect())
    }

    pub fn identities_with_context(&self, context: &str) -> Result<Vec<Identity>, WotError> {
        self.store
            .read(|graph| graph.identities_with_context(context).cloned().collect())
    }

    pub fn get_property(&self, id: &IdentityId, name: &str) -> Result<Option<String>, WotError> {
        self.store
            .read(|graph| graph.property(id, name).map(|value| value.map(str::to_string)))?
    }

    // -----------------------------------------------------------------
    // Trust mutations
    // -----------------------------------------------------------------

    fn edges_changed(&self, edges: &[EdgeKey]) -> Result<(), WotError> {
        let snapshot = self.store.snapshot()?;
        self.scheduler.schedule_edges(&snapshot, edges);
        Ok(())
    }

    /// Local trust edit by an own identity.
    pub fn set_trust(
        &self,
        truster: &IdentityId,
        trustee: &IdentityId,
        value: i8,
        comment: &str,
    ) -> Result<(), WotError> {
        let changed = self
            .store
            .transaction(|graph| graph.set_trust(truster, trustee, value, comment))?;
        match changed {
            Some(edge) => self.edges_changed(&[edge]),
            None => Ok(()),
        }
    }

    pub fn remove_trust(&self, truster: &IdentityId, trustee: &IdentityId) -> Result<Option<Trust>, WotError> {
        let removed = self
            .store
            .transaction(|graph| graph.remove_trust(truster, trustee))?;
        if let Some(trust) = &removed {
            self.edges_changed(&[trust.key()])?;
        }
        Ok(removed)
    }

    /// Replace the whole published trust list of a remote identity.
    /// Stale editions change nothing.
    pub fn apply_remote_trust_list(
        &self,
        truster: &IdentityId,
        entries: &[TrustListEntry],
        edition: u64,
    ) -> Result<TrustListOutcome, WotError> {
        let outcome = self
            .store
            .transaction(|graph| graph.apply_remote_trust_list(truster, entries, edition))?;
        self.trust_list_committed(truster, edition, &outcome)?;
        Ok(outcome)
    }

    /// Like `apply_remote_trust_list`, but an unknown truster is added in the
    /// same transaction as its list. A list that fails validation leaves no
    /// identity behind. The flag is true if the truster was new.
    pub fn import_trust_list(
        &self,
        truster: &IdentityId,
        entries: &[TrustListEntry],
        edition: u64,
    ) -> Result<(TrustListOutcome, bool), WotError> {
        let (outcome, created) = self.store.transaction(|graph| {
            let created = graph.identity(truster).is_none();
            if created {
                graph.add_identity(*truster)?;
            }
            let outcome = graph.apply_remote_trust_list(truster, entries, edition)?;
            Ok((outcome, created))
        })?;
        self.trust_list_committed(truster, edition, &outcome)?;
        Ok((outcome, created))
    }

    fn trust_list_committed(
        &self,
        truster: &IdentityId,
        edition: u64,
        outcome: &TrustListOutcome,
    ) -> Result<(), WotError> {
        match outcome {
            TrustListOutcome::Applied(diff) => {
                tracing::debug!(
                    "Applied trust list of {} edition {}: +{} ~{} -{}",
                    truster.short(),
                    edition,
                    diff.added,
                    diff.updated,
                    diff.removed
                );
                self.edges_changed(&diff.changed)
            }
            TrustListOutcome::Stale {
                offered,
                last_applied,
            } => {
                tracing::debug!(
                    "Ignoring stale trust list of {}: edition {} <= {}",
                    truster.short(),
                    offered,
                    last_applied
                );
                Ok(())
            }
        }
    }

    // -----------------------------------------------------------------
    // Identity mutations
    // -----------------------------------------------------------------

    pub fn add_identity(&self, id: IdentityId) -> Result<(), WotError> {
        self.store.transaction(|graph| graph.add_identity(id))
    }

    /// Create an own identity and queue the first computation of its tree.
    pub fn create_own_identity(&self, keypair: &Keypair, nickname: Option<&str>) -> Result<IdentityId, WotError> {
        let id = self
            .store
            .transaction(|graph| graph.create_own_identity(keypair, nickname))?;
        tracing::info!("Created own identity {}", id.short());
        self.scheduler.schedule_full(id);
        Ok(id)
    }

    pub fn delete_own_identity(&self, id: &IdentityId) -> Result<usize, WotError> {
        self.store.transaction(|graph| graph.delete_own_identity(id))
    }

    pub fn delete_identity(&self, id: &IdentityId) -> Result<IdentityRemoval, WotError> {
        let before = self.store.snapshot()?;
        let removal = self.store.transaction(|graph| graph.delete_identity(id))?;

        // Trees the identity was ranked in lost whatever it contributed.
        for owner in &removal.scored_in {
            let work = if removal.edges.is_empty() {
                PendingWork::Full
            } else {
                PendingWork::Edges(removal.edges.iter().copied().collect())
            };
            self.scheduler.schedule(*owner, work);
        }
        // Owners whose trees ranked a truster of the identity.
        self.scheduler.schedule_edges(&before, &removal.edges);
        Ok(removal)
    }

    pub fn set_nickname(&self, id: &IdentityId, nickname: &str) -> Result<(), WotError> {
        self.store.transaction(|graph| graph.set_nickname(id, nickname))
    }

    pub fn add_context(&self, id: &IdentityId, context: &str) -> Result<bool, WotError> {
        self.store.transaction(|graph| graph.add_context(id, context))
    }

    pub fn remove_context(&self, id: &IdentityId, context: &str) -> Result<bool, WotError> {
        self.store.transaction(|graph| graph.remove_context(id, context))
    }

    pub fn set_property(&self, id: &IdentityId, name: &str, value: &str) -> Result<Option<String>, WotError> {
        self.store
            .transaction(|graph| graph.set_property(id, name, value))
    }

    pub fn remove_property(&self, id: &IdentityId, name: &str) -> Result<Option<String>, WotError> {
        self.store.transaction(|graph| graph.remove_property(id, name))
    }
}

impl std::fmt::Debug for WebOfTrust {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebOfTrust")
            .field("store", &self.store)
            .field("scheduler", &self.scheduler)
            .finish()
    }
}
