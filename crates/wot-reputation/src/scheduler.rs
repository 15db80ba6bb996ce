// crates/wot-reputation/src/scheduler.rs
//
// RecomputationScheduler: tracks dirty tree owners and drives the ScoreEngine.
//
// Mutations report the trust edges they changed. Every own identity whose
// tree could see those edges gets pending work: either a set of edges for an
// incremental pass or a full recompute. Work for an owner that has not
// started yet is merged in place, so a burst of mutations costs one pass.
//
// Passes run one at a time, in enqueue order, each inside its own store
// transaction. `run_pending` drains synchronously; `spawn_worker` runs the
// same drain on a tokio background task after a short coalescing delay.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::mem;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;

use wot_core::error::{ErrorKind, WotError};
use wot_core::identity::IdentityId;
use wot_core::trust::EdgeKey;
use wot_store::{GraphStore, TrustGraph};

use crate::engine::{RecomputeStats, ScoreEngine};

/// Default delay between the first notification and the drain.
pub const DEFAULT_COALESCE_DELAY: Duration = Duration::from_millis(250);

/// Work waiting for one tree owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingWork {
    Full,
    Edges(BTreeSet<EdgeKey>),
}

impl PendingWork {
    /// Union of two requests. `Full` absorbs everything.
    pub fn merge(&mut self, other: PendingWork) {
        match (&mut *self, other) {
            (PendingWork::Full, _) => {}
            (this, PendingWork::Full) => *this = PendingWork::Full,
            (PendingWork::Edges(mine), PendingWork::Edges(theirs)) => mine.extend(theirs),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub coalesce_delay: Duration,
    /// Delete unreferenced identities after each drain.
    pub prune_unreferenced: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            coalesce_delay: DEFAULT_COALESCE_DELAY,
            prune_unreferenced: true,
        }
    }
}

#[derive(Debug, Default)]
struct Queue {
    order: VecDeque<IdentityId>,
    work: HashMap<IdentityId, PendingWork>,
    /// Owner whose pass has been dequeued but not yet committed.
    in_flight: Option<IdentityId>,
    /// A drain is running.
    draining: bool,
    /// Something was scheduled since the last drain.
    dirty: bool,
}

impl Queue {
    fn push(&mut self, owner: IdentityId, work: PendingWork) {
        match self.work.get_mut(&owner) {
            Some(pending) => {
                tracing::trace!("Coalescing recompute request for {}", owner.short());
                pending.merge(work);
            }
            None => {
                self.order.push_back(owner);
                self.work.insert(owner, work);
            }
        }
    }

    fn pop(&mut self) -> Option<(IdentityId, PendingWork)> {
        while let Some(owner) = self.order.pop_front() {
            if let Some(work) = self.work.remove(&owner) {
                self.in_flight = Some(owner);
                return Some((owner, work));
            }
        }
        None
    }

    /// Put failed work back at the head of the queue.
    fn push_front(&mut self, owner: IdentityId, mut work: PendingWork) {
        if let Some(newer) = self.work.remove(&owner) {
            work.merge(newer);
            self.order.retain(|queued| *queued != owner);
        }
        self.order.push_front(owner);
        self.work.insert(owner, work);
    }
}

pub struct RecomputationScheduler {
    store: Arc<GraphStore>,
    engine: Arc<ScoreEngine>,
    config: SchedulerConfig,
    queue: Mutex<Queue>,
    drain_lock: Mutex<()>,
    notify: Notify,
    shutdown: watch::Sender<bool>,
}

impl RecomputationScheduler {
    pub fn new(store: Arc<GraphStore>, engine: Arc<ScoreEngine>, config: SchedulerConfig) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            store,
            engine,
            config,
            queue: Mutex::new(Queue::default()),
            drain_lock: Mutex::new(()),
            notify: Notify::new(),
            shutdown,
        }
    }

    fn queue(&self) -> MutexGuard<'_, Queue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue work for one owner and wake the worker.
    pub fn schedule(&self, owner: IdentityId, work: PendingWork) {
        {
            let mut queue = self.queue();
            queue.push(owner, work);
            queue.dirty = true;
        }
        self.notify.notify_one();
    }

    pub fn schedule_full(&self, owner: IdentityId) {
        self.schedule(owner, PendingWork::Full);
    }

    /// Queue a full recompute for every own identity in `graph`.
    pub fn schedule_all(&self, graph: &TrustGraph) {
        for identity in graph.own_identities() {
            self.schedule_full(identity.id);
        }
    }

    /// Queue the owners whose trees could see a change of `edges`.
    ///
    /// An owner is affected when it gave one of the edges, when the truster
    /// of one of the edges holds a score row in its tree, or when it already
    /// has work pending (its rows may be behind the graph).
    pub fn schedule_edges(&self, graph: &TrustGraph, edges: &[EdgeKey]) {
        {
            let mut queue = self.queue();
            queue.dirty = true;
            for owner in graph.own_identities().map(|identity| identity.id) {
                let behind = queue.work.contains_key(&owner) || queue.in_flight == Some(owner);
                let relevant: BTreeSet<EdgeKey> = edges
                    .iter()
                    .filter(|edge| {
                        behind
                            || edge.truster == owner
                            || graph.score(&owner, &edge.truster).is_some()
                    })
                    .copied()
                    .collect();
                if !relevant.is_empty() {
                    queue.push(owner, PendingWork::Edges(relevant));
                }
            }
        }
        self.notify.notify_one();
    }

    /// Nothing queued, nothing running, nothing scheduled since the last drain.
    pub fn is_idle(&self) -> bool {
        let queue = self.queue();
        queue.order.is_empty() && !queue.draining && !queue.dirty
    }

    pub fn pending_owners(&self) -> Vec<IdentityId> {
        self.queue().order.iter().copied().collect()
    }

    /// Process every queued owner, one pass at a time.
    ///
    /// A consistency error in an incremental pass leaves the tree untouched
    /// and queues a full recompute for the next drain; in a full pass it is
    /// logged and dropped. Storage failures stop the drain and are returned with the
    /// failed work back at the head of the queue.
    pub fn run_pending(&self) -> Result<Vec<RecomputeStats>, WotError> {
        let _drain = self.drain_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let prune_due = {
            let mut queue = self.queue();
            queue.draining = true;
            mem::take(&mut queue.dirty)
        };

        let result = self.drain(prune_due);

        let mut queue = self.queue();
        queue.in_flight = None;
        queue.draining = false;
        result
    }

    fn drain(&self, prune_due: bool) -> Result<Vec<RecomputeStats>, WotError> {
        let mut passes = Vec::new();
        // Owners whose incremental pass hit a consistency error. Their full
        // recompute waits for the next drain.
        let mut retry_full = Vec::new();
        loop {
            let next = self.queue().pop();
            let Some((owner, work)) = next else {
                break;
            };
            match self.run_pass(&owner, &work) {
                Ok(Some(stats)) => passes.push(stats),
                Ok(None) => {
                    tracing::debug!("Skipping recompute for {}: no longer an own identity", owner.short());
                }
                Err(e) if e.kind() == ErrorKind::Consistency => {
                    tracing::error!("Recompute for {} aborted: {}", owner.short(), e);
                    if matches!(work, PendingWork::Edges(_)) {
                        retry_full.push(owner);
                    }
                }
                Err(e) if e.kind() == ErrorKind::Upstream => {
                    tracing::warn!("Recompute for {} failed: {}", owner.short(), e);
                    self.queue().push_front(owner, work);
                    self.requeue_full(retry_full);
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!("Dropping recompute for {}: {}", owner.short(), e);
                }
            }
            self.queue().in_flight = None;
        }
        self.requeue_full(retry_full);

        if prune_due && self.config.prune_unreferenced {
            let pruned = self.store.transaction(|graph| Ok(graph.prune_unreferenced()))?;
            if !pruned.is_empty() {
                tracing::debug!("Pruned {} unreferenced identities", pruned.len());
            }
        }
        Ok(passes)
    }

    fn requeue_full(&self, owners: Vec<IdentityId>) {
        if owners.is_empty() {
            return;
        }
        {
            let mut queue = self.queue();
            for owner in owners {
                tracing::info!("Scheduling full recompute for {} after failed update", owner.short());
                queue.push(owner, PendingWork::Full);
            }
            queue.dirty = true;
        }
        self.notify.notify_one();
    }

    fn run_pass(
        &self,
        owner: &IdentityId,
        work: &PendingWork,
    ) -> Result<Option<RecomputeStats>, WotError> {
        self.store.transaction(|graph| {
            if !graph.is_own(owner) {
                return Ok(None);
            }
            let stats = match work {
                PendingWork::Full => self.engine.full_recompute(graph, owner)?,
                PendingWork::Edges(edges) => self.engine.incremental_update(graph, owner, edges)?,
            };
            Ok(Some(stats))
        })
    }

    /// Run the drain loop on a tokio task until `shutdown` is called.
    pub fn spawn_worker(self: &Arc<Self>) -> JoinHandle<()> {
        let scheduler = Arc::clone(self);
        let mut shutdown = self.shutdown.subscribe();
        tokio::spawn(async move {
            tracing::info!(
                "Recomputation worker started (coalesce_delay={:?})",
                scheduler.config.coalesce_delay
            );
            loop {
                if *shutdown.borrow() {
                    break;
                }
                tokio::select! {
                    _ = scheduler.notify.notified() => {}
                    _ = shutdown.changed() => break,
                }
                // Let a burst of mutations pile up before draining.
                tokio::select! {
                    _ = tokio::time::sleep(scheduler.config.coalesce_delay) => {}
                    _ = shutdown.changed() => break,
                }

                let worker = Arc::clone(&scheduler);
                match tokio::task::spawn_blocking(move || worker.run_pending()).await {
                    Ok(Ok(passes)) if !passes.is_empty() => {
                        tracing::debug!("Recomputation drain finished ({} passes)", passes.len());
                    }
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => {
                        tracing::warn!("Recomputation drain stopped: {}", e);
                    }
                    Err(e) => {
                        tracing::error!("Recomputation drain panicked: {}", e);
                    }
                }
            }
            tracing::info!("Recomputation worker stopped");
        })
    }

    /// Stop the background worker. A pass already running finishes first.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Wait until the queue is empty and no drain is running.
    pub async fn wait_idle(&self) {
        while !self.is_idle() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

impl std::fmt::Debug for RecomputationScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecomputationScheduler")
            .field("pending", &self.queue().order.len())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::RecomputeMode;
    use wot_core::crypto::Keypair;
    use wot_core::trust::{Score, Trust, TrustListEntry};

    fn id(n: u8) -> IdentityId {
        IdentityId::from_bytes([n; 32])
    }

    fn edge(a: u8, b: u8) -> EdgeKey {
        EdgeKey::new(id(a), id(b))
    }

    fn scheduler() -> (Arc<GraphStore>, RecomputationScheduler) {
        let store = Arc::new(GraphStore::in_memory());
        let scheduler = RecomputationScheduler::new(
            Arc::clone(&store),
            Arc::new(ScoreEngine::default()),
            SchedulerConfig::default(),
        );
        (store, scheduler)
    }

    #[test]
    fn test_merge_rules() {
        let mut work = PendingWork::Edges(BTreeSet::from([edge(1, 2)]));
        work.merge(PendingWork::Edges(BTreeSet::from([edge(2, 3)])));
        assert_eq!(work, PendingWork::Edges(BTreeSet::from([edge(1, 2), edge(2, 3)])));
        work.merge(PendingWork::Full);
        assert_eq!(work, PendingWork::Full);
        work.merge(PendingWork::Edges(BTreeSet::from([edge(4, 5)])));
        assert_eq!(work, PendingWork::Full);
    }

    #[test]
    fn test_requests_coalesce_in_place() {
        let (_, scheduler) = scheduler();
        scheduler.schedule(id(1), PendingWork::Edges(BTreeSet::from([edge(1, 2)])));
        scheduler.schedule_full(id(2));
        scheduler.schedule(id(1), PendingWork::Edges(BTreeSet::from([edge(1, 3)])));
        assert_eq!(scheduler.pending_owners(), vec![id(1), id(2)]);
        assert_eq!(
            scheduler.queue().work.get(&id(1)),
            Some(&PendingWork::Edges(BTreeSet::from([edge(1, 2), edge(1, 3)])))
        );
    }

    #[test]
    fn test_push_front_keeps_newer_work() {
        let mut queue = Queue::default();
        queue.push(id(1), PendingWork::Full);
        queue.push(id(2), PendingWork::Edges(BTreeSet::from([edge(2, 3)])));
        let (owner, work) = queue.pop().unwrap();
        queue.push(id(1), PendingWork::Edges(BTreeSet::from([edge(1, 4)])));
        queue.push_front(owner, work);
        assert_eq!(queue.order, VecDeque::from([id(1), id(2)]));
        assert_eq!(queue.work.get(&id(1)), Some(&PendingWork::Full));
    }

    #[test]
    fn test_unrelated_edges_do_not_enqueue() {
        let (store, scheduler) = scheduler();
        let owner = store
            .transaction(|graph| {
                let owner = graph.create_own_identity(&Keypair::generate(), None)?;
                graph.add_identity(id(1))?;
                graph.apply_remote_trust_list(
                    &id(1),
                    &[TrustListEntry {
                        trustee: id(2),
                        value: 50,
                        comment: String::new(),
                    }],
                    1,
                )?;
                Ok(owner)
            })
            .unwrap();
        scheduler.schedule_full(owner);
        scheduler.run_pending().unwrap();
        assert!(scheduler.is_idle());

        // id(1) is not in the owner's tree, so its list cannot matter.
        scheduler.schedule_edges(&store.snapshot().unwrap(), &[edge(1, 2)]);
        assert!(scheduler.pending_owners().is_empty());
        assert!(!scheduler.is_idle());
        scheduler.run_pending().unwrap();
        assert!(scheduler.is_idle());
    }

    #[test]
    fn test_drain_skips_demoted_owner() {
        let (store, scheduler) = scheduler();
        let owner = store
            .transaction(|graph| graph.create_own_identity(&Keypair::generate(), None))
            .unwrap();
        scheduler.schedule_full(owner);
        store
            .transaction(|graph| graph.delete_own_identity(&owner))
            .unwrap();
        assert!(scheduler.run_pending().unwrap().is_empty());
        assert_eq!(store.snapshot().unwrap().tree_len(&owner), 0);
    }

    #[test]
    fn test_closed_store_keeps_work_queued() {
        let (store, scheduler) = scheduler();
        let owner = store
            .transaction(|graph| graph.create_own_identity(&Keypair::generate(), None))
            .unwrap();
        scheduler.schedule_full(owner);
        store.close();
        let err = scheduler.run_pending().unwrap_err();
        assert!(matches!(err, WotError::StoreClosed));
        assert_eq!(scheduler.pending_owners(), vec![owner]);
    }

    #[test]
    fn test_prune_after_drain() {
        let (store, scheduler) = scheduler();
        store
            .transaction(|graph| {
                graph.add_identity(id(1))?;
                graph.apply_remote_trust_list(
                    &id(1),
                    &[TrustListEntry {
                        trustee: id(2),
                        value: 10,
                        comment: String::new(),
                    }],
                    1,
                )?;
                graph.apply_remote_trust_list(&id(1), &[], 2)?;
                Ok(())
            })
            .unwrap();
        scheduler.schedule_edges(&store.snapshot().unwrap(), &[edge(1, 2)]);
        scheduler.run_pending().unwrap();
        let snapshot = store.snapshot().unwrap();
        assert!(snapshot.contains(&id(1)));
        assert!(!snapshot.contains(&id(2)));
    }

    #[test]
    fn test_corrupt_incremental_pass_keeps_tree_and_queues_full() {
        let (store, scheduler) = scheduler();
        let owner = store
            .transaction(|graph| {
                let owner = graph.create_own_identity(&Keypair::from_seed(&[3; 32]), None)?;
                graph.add_identity(id(1))?;
                graph.set_trust(&owner, &id(1), 80, "")?;
                Ok(owner)
            })
            .unwrap();
        scheduler.schedule_full(owner);
        scheduler.run_pending().unwrap();
        let tree = || -> Vec<Score> { store.snapshot().unwrap().tree(&owner).cloned().collect() };
        let before = tree();
        assert_eq!(before.len(), 2);

        // A positive edge to an identity with no row.
        let planted = Trust {
            truster: owner,
            trustee: id(9),
            value: 50,
            comment: String::new(),
            truster_edition: 0,
        };
        store.apply_unverified(|graph| graph.insert_trust_unchecked(planted.clone()));
        scheduler.schedule(owner, PendingWork::Edges(BTreeSet::from([planted.key()])));

        let passes = scheduler.run_pending().unwrap();
        assert!(passes.is_empty());
        assert_eq!(tree(), before);
        assert_eq!(scheduler.pending_owners(), vec![owner]);
        assert_eq!(scheduler.queue().work.get(&owner), Some(&PendingWork::Full));

        store.apply_unverified(|graph| graph.remove_trust_unchecked(&planted.key()));
        let passes = scheduler.run_pending().unwrap();
        assert_eq!(passes.len(), 1);
        assert_eq!(passes[0].mode, RecomputeMode::Full);
        assert_eq!(tree(), before);
        assert!(scheduler.is_idle());
    }

    #[test]
    fn test_burst_of_edges_drains_as_one_incremental_pass() {
        let (store, scheduler) = scheduler();
        let owner = store
            .transaction(|graph| {
                let owner = graph.create_own_identity(&Keypair::from_seed(&[4; 32]), None)?;
                for n in 1..=3 {
                    graph.add_identity(id(n))?;
                }
                Ok(owner)
            })
            .unwrap();
        scheduler.schedule_full(owner);
        scheduler.run_pending().unwrap();

        for n in 1..=3 {
            let edge = store
                .transaction(|graph| graph.set_trust(&owner, &id(n), 30 * n as i8, ""))
                .unwrap();
            let edges: Vec<EdgeKey> = edge.into_iter().collect();
            scheduler.schedule_edges(&store.snapshot().unwrap(), &edges);
        }
        let passes = scheduler.run_pending().unwrap();
        assert_eq!(passes.len(), 1);
        assert_eq!(passes[0].mode, RecomputeMode::Incremental);
        assert_eq!(passes[0].tree_size, 4);

        let snapshot = store.snapshot().unwrap();
        let expected = ScoreEngine::default().compute_tree(&snapshot, &owner).unwrap();
        let stored: Vec<Score> = snapshot.tree(&owner).cloned().collect();
        assert_eq!(stored, expected.into_values().collect::<Vec<_>>());
    }
}
