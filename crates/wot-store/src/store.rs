// crates/wot-store/src/store.rs
//
// GraphStore: the single transactional entry point to trust-graph state.
//
// The committed graph is an `Arc<TrustGraph>` behind a RwLock. Readers clone
// the Arc and work on an immutable snapshot for as long as they like.
// Writers are serialized by a mutex and hold the write lock for the whole
// transaction, so readers see the graph either before or after it. The
// transaction edits the graph in place (copy-on-write only while an older
// snapshot is still alive); the touched rows are verified and persisted in
// one atomic batch. An error anywhere replays the graph's undo log, so no
// partial write is ever observable.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockWriteGuard};

use wot_core::error::WotError;
use wot_core::traits::GraphBackend;

use crate::graph::TrustGraph;
use crate::integrity;
use crate::rocks::RocksBackend;

pub struct GraphStore {
    committed: RwLock<Arc<TrustGraph>>,
    writer: Mutex<()>,
    backend: Option<Box<dyn GraphBackend>>,
    closed: AtomicBool,
}

impl GraphStore {
    /// A store with no persistence. State lives as long as the value.
    pub fn in_memory() -> Self {
        Self {
            committed: RwLock::new(Arc::new(TrustGraph::new())),
            writer: Mutex::new(()),
            backend: None,
            closed: AtomicBool::new(false),
        }
    }

    /// Load every row from `backend` and keep persisting through it.
    pub fn with_backend(backend: Box<dyn GraphBackend>) -> Result<Self, WotError> {
        let rows = backend.load()?;
        let row_count = rows.len();
        let graph = TrustGraph::from_rows(rows)?;
        tracing::info!(
            "Loaded {} rows ({} identities, {} trusts, {} scores)",
            row_count,
            graph.identity_count(),
            graph.trust_count(),
            graph.score_count()
        );
        Ok(Self {
            committed: RwLock::new(Arc::new(graph)),
            writer: Mutex::new(()),
            backend: Some(backend),
            closed: AtomicBool::new(false),
        })
    }

    /// Open (or create) a RocksDB-backed store at `path`.
    pub fn open(path: &str) -> Result<Self, WotError> {
        Self::with_backend(Box::new(RocksBackend::open(path)?))
    }

    fn ensure_open(&self) -> Result<(), WotError> {
        if self.closed.load(Ordering::Acquire) {
            Err(WotError::StoreClosed)
        } else {
            Ok(())
        }
    }

    /// Write access to the committed graph. A transaction that panicked
    /// left its rows half-written; they are rolled back here.
    fn committed_mut(&self) -> RwLockWriteGuard<'_, Arc<TrustGraph>> {
        match self.committed.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                let mut guard = poisoned.into_inner();
                if guard.has_uncommitted() {
                    tracing::warn!("Recovering from an aborted transaction");
                    Arc::make_mut(&mut guard).rollback();
                }
                self.committed.clear_poison();
                guard
            }
        }
    }

    /// The current committed graph. Later commits never affect it.
    pub fn snapshot(&self) -> Result<Arc<TrustGraph>, WotError> {
        self.ensure_open()?;
        if let Ok(guard) = self.committed.read() {
            return Ok(Arc::clone(&guard));
        }
        let guard = self.committed_mut();
        Ok(Arc::clone(&guard))
    }

    /// Run a read-only query against the current snapshot.
    pub fn read<T>(&self, f: impl FnOnce(&TrustGraph) -> T) -> Result<T, WotError> {
        let snapshot = self.snapshot()?;
        Ok(f(&snapshot))
    }

    /// Run `f` as one all-or-nothing write transaction.
    ///
    /// `f` edits the committed graph directly while readers wait. If it
    /// returns `Ok`, the touched rows are checked and persisted. Otherwise,
    /// or if that fails, every touched row is restored and nothing changes.
    ///
    /// `f` must not call back into this store.
    pub fn transaction<T>(
        &self,
        f: impl FnOnce(&mut TrustGraph) -> Result<T, WotError>,
    ) -> Result<T, WotError> {
        self.ensure_open()?;
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        self.ensure_open()?;

        let mut committed = self.committed_mut();
        let graph = Arc::make_mut(&mut committed);
        graph.take_journal();

        match f(graph).and_then(|value| self.persist(graph).map(|()| value)) {
            Ok(value) => {
                graph.take_journal();
                Ok(value)
            }
            Err(e) => {
                graph.rollback();
                Err(e)
            }
        }
    }

    /// Check the rows touched by the current transaction and write them
    /// through to the backend as one batch.
    fn persist(&self, graph: &TrustGraph) -> Result<(), WotError> {
        if let Err(e) = integrity::verify_touched(graph) {
            tracing::error!("Rolling back transaction: {}", e);
            return Err(e);
        }

        let writes = graph.pending_writes();
        if !writes.is_empty() {
            if let Some(backend) = &self.backend {
                backend.commit(&writes)?;
            }
            tracing::trace!("Committed {} row writes", writes.len());
        }
        Ok(())
    }

    /// Apply `f` to the committed graph with no integrity check and no
    /// backend write.
    #[cfg(feature = "test-util")]
    pub fn apply_unverified(&self, f: impl FnOnce(&mut TrustGraph)) {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let mut committed = self.committed_mut();
        let graph = Arc::make_mut(&mut committed);
        f(graph);
        graph.take_journal();
    }

    /// Refuse all further reads and writes.
    pub fn close(&self) {
        // Wait for an in-flight transaction to finish first.
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn is_persistent(&self) -> bool {
        self.backend.is_some()
    }
}

impl std::fmt::Debug for GraphStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphStore")
            .field("persistent", &self.is_persistent())
            .field("closed", &self.is_closed())
            .finish()
    }
}
