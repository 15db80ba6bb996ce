// crates/wot-store/src/graph.rs
//
// TrustGraph: the in-memory view of all identity, trust and score rows.
//
// Rows live in ordered maps keyed by their unique key, so iteration order is
// deterministic. Secondary indices:
//   - out/in adjacency for all trust edges
//   - out/in adjacency restricted to strictly positive edges (the sign index
//     rank propagation walks)
//   - context name -> identities
//   - per-owner tree: owner -> target -> Score
//   - target -> owners holding a score row for it
//
// Every row mutation is recorded in a journal of touched keys. The store
// turns the journal into one atomic backend batch on commit. The first touch
// of a key also saves the row as it was, so an aborted transaction can put
// every touched row back without copying the graph.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use wot_core::error::{RowKind, WotError};
use wot_core::identity::{Identity, IdentityId};
use wot_core::traits::{RowWrite, StoredRow};
use wot_core::trust::{EdgeKey, Score, Trust};

/// Key of a row touched since the last commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Touched {
    Identity(IdentityId),
    Trust(EdgeKey),
    Score { owner: IdentityId, target: IdentityId },
}

/// A row as it was before its first touch in the current transaction.
#[derive(Debug, Clone)]
enum Prior {
    Identity(Option<Identity>),
    Trust(Option<Trust>),
    Score(Option<Score>),
}

type Adjacency = HashMap<IdentityId, BTreeSet<IdentityId>>;

#[derive(Debug, Clone, Default)]
pub struct TrustGraph {
    pub(crate) identities: BTreeMap<IdentityId, Identity>,
    pub(crate) trusts: BTreeMap<EdgeKey, Trust>,
    pub(crate) trustees: Adjacency,
    pub(crate) trusters: Adjacency,
    pub(crate) positive_trustees: Adjacency,
    pub(crate) positive_trusters: Adjacency,
    pub(crate) contexts: BTreeMap<String, BTreeSet<IdentityId>>,
    pub(crate) trees: BTreeMap<IdentityId, BTreeMap<IdentityId, Score>>,
    pub(crate) scored_in: Adjacency,
    pub(crate) journal: BTreeSet<Touched>,
    undo: BTreeMap<Touched, Prior>,
}

fn link(index: &mut Adjacency, from: IdentityId, to: IdentityId) {
    index.entry(from).or_default().insert(to);
}

fn unlink(index: &mut Adjacency, from: &IdentityId, to: &IdentityId) {
    if let Some(set) = index.get_mut(from) {
        set.remove(to);
        if set.is_empty() {
            index.remove(from);
        }
    }
}

fn neighbours<'a>(index: &'a Adjacency, id: &IdentityId) -> impl Iterator<Item = IdentityId> + 'a {
    index.get(id).into_iter().flat_map(|set| set.iter().copied())
}

impl TrustGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a graph from persisted rows, rejecting duplicates and
    /// dangling references.
    pub fn from_rows(rows: Vec<StoredRow>) -> Result<Self, WotError> {
        let mut identities = Vec::new();
        let mut trusts = Vec::new();
        let mut scores = Vec::new();
        for row in rows {
            match row {
                StoredRow::Identity(identity) => identities.push(identity),
                StoredRow::Trust(trust) => trusts.push(trust),
                StoredRow::Score(score) => scores.push(score),
            }
        }

        let mut graph = Self::new();
        for identity in identities {
            if graph.identities.contains_key(&identity.id) {
                return Err(WotError::DuplicateRow {
                    entity: RowKind::Identity,
                    key: identity.id.to_string(),
                });
            }
            graph.insert_identity(identity);
        }
        for trust in trusts {
            let key = trust.key();
            if graph.trusts.contains_key(&key) {
                return Err(WotError::DuplicateRow {
                    entity: RowKind::Trust,
                    key: key.to_string(),
                });
            }
            for endpoint in [key.truster, key.trustee] {
                if !graph.contains(&endpoint) {
                    return Err(WotError::DanglingReference {
                        entity: RowKind::Trust,
                        key: key.to_string(),
                        missing: endpoint,
                    });
                }
            }
            graph.put_trust(trust);
        }
        for score in scores {
            let key = format!("{}:{}", score.owner, score.target);
            if graph.score(&score.owner, &score.target).is_some() {
                return Err(WotError::DuplicateRow {
                    entity: RowKind::Score,
                    key,
                });
            }
            for endpoint in [score.owner, score.target] {
                if !graph.contains(&endpoint) {
                    return Err(WotError::DanglingReference {
                        entity: RowKind::Score,
                        key,
                        missing: endpoint,
                    });
                }
            }
            graph.put_score(score);
        }
        graph.take_journal();
        Ok(graph)
    }

    // -----------------------------------------------------------------
    // Identities
    // -----------------------------------------------------------------

    pub fn identity(&self, id: &IdentityId) -> Option<&Identity> {
        self.identities.get(id)
    }

    /// Like `identity`, but a missing id is a validation error.
    pub fn identity_or_err(&self, id: &IdentityId) -> Result<&Identity, WotError> {
        self.identities.get(id).ok_or(WotError::UnknownIdentity(*id))
    }

    pub fn contains(&self, id: &IdentityId) -> bool {
        self.identities.contains_key(id)
    }

    pub fn is_own(&self, id: &IdentityId) -> bool {
        self.identities.get(id).is_some_and(Identity::is_own)
    }

    pub fn identities(&self) -> impl Iterator<Item = &Identity> {
        self.identities.values()
    }

    pub fn own_identities(&self) -> impl Iterator<Item = &Identity> {
        self.identities.values().filter(|identity| identity.is_own())
    }

    pub fn identity_count(&self) -> usize {
        self.identities.len()
    }

    pub fn identities_with_context<'a>(
        &'a self,
        context: &str,
    ) -> impl Iterator<Item = &'a Identity> + 'a {
        self.contexts
            .get(context)
            .into_iter()
            .flat_map(|ids| ids.iter())
            .filter_map(|id| self.identities.get(id))
    }

    /// Insert or replace an identity row, keeping the context index in step.
    pub(crate) fn insert_identity(&mut self, identity: Identity) {
        let id = identity.id;
        self.touch(Touched::Identity(id));
        if let Some(previous) = self.identities.get(&id) {
            let stale: Vec<String> = previous.contexts.iter().cloned().collect();
            for context in stale {
                self.unindex_context(&context, &id);
            }
        }
        for context in &identity.contexts {
            self.contexts.entry(context.clone()).or_default().insert(id);
        }
        self.identities.insert(id, identity);
    }

    /// Mutate an identity row in place through `f`, re-indexing afterwards.
    pub(crate) fn update_identity<T>(
        &mut self,
        id: &IdentityId,
        f: impl FnOnce(&mut Identity) -> Result<T, WotError>,
    ) -> Result<T, WotError> {
        let mut identity = self.identity_or_err(id)?.clone();
        let value = f(&mut identity)?;
        identity.touch();
        self.insert_identity(identity);
        Ok(value)
    }

    /// Remove an identity row. Callers must have removed every edge and
    /// score row referencing it first.
    pub(crate) fn remove_identity_row(&mut self, id: &IdentityId) -> Option<Identity> {
        if !self.identities.contains_key(id) {
            return None;
        }
        self.touch(Touched::Identity(*id));
        let removed = self.identities.remove(id)?;
        for context in &removed.contexts {
            self.unindex_context(context, id);
        }
        Some(removed)
    }

    fn unindex_context(&mut self, context: &str, id: &IdentityId) {
        if let Some(ids) = self.contexts.get_mut(context) {
            ids.remove(id);
            if ids.is_empty() {
                self.contexts.remove(context);
            }
        }
    }

    // -----------------------------------------------------------------
    // Trust edges
    // -----------------------------------------------------------------

    pub fn trust(&self, truster: &IdentityId, trustee: &IdentityId) -> Option<&Trust> {
        self.trusts.get(&EdgeKey::new(*truster, *trustee))
    }

    pub fn trusts(&self) -> impl Iterator<Item = &Trust> {
        self.trusts.values()
    }

    pub fn trust_count(&self) -> usize {
        self.trusts.len()
    }

    /// Trust given by `truster`, ordered by trustee.
    pub fn given_trusts<'a>(&'a self, truster: &IdentityId) -> impl Iterator<Item = &'a Trust> + 'a {
        let truster = *truster;
        neighbours(&self.trustees, &truster)
            .filter_map(move |trustee| self.trusts.get(&EdgeKey::new(truster, trustee)))
    }

    /// Trust received by `trustee`, ordered by truster.
    pub fn received_trusts<'a>(
        &'a self,
        trustee: &IdentityId,
    ) -> impl Iterator<Item = &'a Trust> + 'a {
        let trustee = *trustee;
        neighbours(&self.trusters, &trustee)
            .filter_map(move |truster| self.trusts.get(&EdgeKey::new(truster, trustee)))
    }

    /// Identities `truster` gives strictly positive trust to.
    pub fn positive_trustees<'a>(
        &'a self,
        truster: &IdentityId,
    ) -> impl Iterator<Item = IdentityId> + 'a {
        neighbours(&self.positive_trustees, truster)
    }

    /// Identities giving strictly positive trust to `trustee`.
    pub fn positive_trusters<'a>(
        &'a self,
        trustee: &IdentityId,
    ) -> impl Iterator<Item = IdentityId> + 'a {
        neighbours(&self.positive_trusters, trustee)
    }

    pub fn given_trust_count(&self, truster: &IdentityId) -> usize {
        self.trustees.get(truster).map_or(0, BTreeSet::len)
    }

    pub fn received_trust_count(&self, trustee: &IdentityId) -> usize {
        self.trusters.get(trustee).map_or(0, BTreeSet::len)
    }

    /// Insert or replace a trust row. Returns the previous row.
    pub(crate) fn put_trust(&mut self, trust: Trust) -> Option<Trust> {
        let key = trust.key();
        self.touch(Touched::Trust(key));
        let previous = self.remove_trust_indices(&key);
        link(&mut self.trustees, key.truster, key.trustee);
        link(&mut self.trusters, key.trustee, key.truster);
        if trust.is_positive() {
            link(&mut self.positive_trustees, key.truster, key.trustee);
            link(&mut self.positive_trusters, key.trustee, key.truster);
        }
        self.trusts.insert(key, trust);
        previous
    }

    pub(crate) fn remove_trust_row(&mut self, key: &EdgeKey) -> Option<Trust> {
        if !self.trusts.contains_key(key) {
            return None;
        }
        self.touch(Touched::Trust(*key));
        self.remove_trust_indices(key)
    }

    fn remove_trust_indices(&mut self, key: &EdgeKey) -> Option<Trust> {
        let removed = self.trusts.remove(key)?;
        unlink(&mut self.trustees, &key.truster, &key.trustee);
        unlink(&mut self.trusters, &key.trustee, &key.truster);
        unlink(&mut self.positive_trustees, &key.truster, &key.trustee);
        unlink(&mut self.positive_trusters, &key.trustee, &key.truster);
        Some(removed)
    }

    // -----------------------------------------------------------------
    // Scores
    // -----------------------------------------------------------------

    pub fn score(&self, owner: &IdentityId, target: &IdentityId) -> Option<&Score> {
        self.trees.get(owner).and_then(|tree| tree.get(target))
    }

    /// Rank of `target` in the tree of `owner`, if it has a row.
    pub fn rank(&self, owner: &IdentityId, target: &IdentityId) -> Option<u32> {
        self.score(owner, target).map(|score| score.rank)
    }

    /// All score rows of one tree, ordered by target.
    pub fn tree<'a>(&'a self, owner: &IdentityId) -> impl Iterator<Item = &'a Score> + 'a {
        self.trees.get(owner).into_iter().flat_map(|tree| tree.values())
    }

    pub fn tree_len(&self, owner: &IdentityId) -> usize {
        self.trees.get(owner).map_or(0, BTreeMap::len)
    }

    /// Score rows for `target` across every tree it appears in.
    pub fn scores_of<'a>(&'a self, target: &IdentityId) -> impl Iterator<Item = &'a Score> + 'a {
        let target = *target;
        neighbours(&self.scored_in, &target).filter_map(move |owner| self.score(&owner, &target))
    }

    pub fn score_count(&self) -> usize {
        self.trees.values().map(BTreeMap::len).sum()
    }

    /// Insert or replace a score row. Writes that change nothing are not
    /// journaled.
    pub fn put_score(&mut self, score: Score) {
        let (owner, target) = (score.owner, score.target);
        if self.score(&owner, &target) == Some(&score) {
            return;
        }
        self.touch(Touched::Score { owner, target });
        self.trees.entry(owner).or_default().insert(target, score);
        link(&mut self.scored_in, target, owner);
    }

    pub fn remove_score(&mut self, owner: &IdentityId, target: &IdentityId) -> Option<Score> {
        self.score(owner, target)?;
        self.touch(Touched::Score {
            owner: *owner,
            target: *target,
        });
        let tree = self.trees.get_mut(owner)?;
        let removed = tree.remove(target)?;
        if tree.is_empty() {
            self.trees.remove(owner);
        }
        unlink(&mut self.scored_in, target, owner);
        Some(removed)
    }

    /// Drop every row of one tree. Returns the number of rows removed.
    pub fn clear_tree(&mut self, owner: &IdentityId) -> usize {
        let targets: Vec<IdentityId> = self
            .trees
            .get(owner)
            .map(|tree| tree.keys().copied().collect())
            .unwrap_or_default();
        for target in &targets {
            self.remove_score(owner, target);
        }
        targets.len()
    }

    // -----------------------------------------------------------------
    // Journal
    // -----------------------------------------------------------------

    /// Journal `touched`, saving its current row on the first touch since
    /// the journal was last taken. Must run before the row changes.
    fn touch(&mut self, touched: Touched) {
        if !self.journal.insert(touched) {
            return;
        }
        let prior = match touched {
            Touched::Identity(id) => Prior::Identity(self.identities.get(&id).cloned()),
            Touched::Trust(key) => Prior::Trust(self.trusts.get(&key).cloned()),
            Touched::Score { owner, target } => Prior::Score(self.score(&owner, &target).cloned()),
        };
        self.undo.insert(touched, prior);
    }

    /// Forget the touched keys and their saved rows: the current state is
    /// now the baseline.
    pub(crate) fn take_journal(&mut self) -> BTreeSet<Touched> {
        self.undo.clear();
        std::mem::take(&mut self.journal)
    }

    /// Put every row touched since the journal was last taken back the way
    /// it was, indices included.
    pub(crate) fn rollback(&mut self) {
        let undo = std::mem::take(&mut self.undo);
        if undo.is_empty() {
            return;
        }
        tracing::debug!("Rolling back {} touched rows", undo.len());
        for (touched, prior) in undo {
            match (touched, prior) {
                (_, Prior::Identity(Some(identity))) => self.insert_identity(identity),
                (Touched::Identity(id), Prior::Identity(None)) => {
                    self.remove_identity_row(&id);
                }
                (_, Prior::Trust(Some(trust))) => {
                    self.put_trust(trust);
                }
                (Touched::Trust(key), Prior::Trust(None)) => {
                    self.remove_trust_row(&key);
                }
                (_, Prior::Score(Some(score))) => self.put_score(score),
                (Touched::Score { owner, target }, Prior::Score(None)) => {
                    self.remove_score(&owner, &target);
                }
                _ => {}
            }
        }
        self.take_journal();
    }

    pub(crate) fn has_uncommitted(&self) -> bool {
        !self.journal.is_empty()
    }

    /// Backend writes reproducing every touched row's current state.
    pub(crate) fn pending_writes(&self) -> Vec<RowWrite> {
        self.journal
            .iter()
            .map(|touched| match *touched {
                Touched::Identity(id) => match self.identities.get(&id) {
                    Some(identity) => RowWrite::Put(StoredRow::Identity(identity.clone())),
                    None => RowWrite::DeleteIdentity(id),
                },
                Touched::Trust(key) => match self.trusts.get(&key) {
                    Some(trust) => RowWrite::Put(StoredRow::Trust(trust.clone())),
                    None => RowWrite::DeleteTrust(key),
                },
                Touched::Score { owner, target } => match self.score(&owner, &target) {
                    Some(score) => RowWrite::Put(StoredRow::Score(score.clone())),
                    None => RowWrite::DeleteScore { owner, target },
                },
            })
            .collect()
    }
}

#[cfg(feature = "test-util")]
impl TrustGraph {
    /// Insert a trust row without validating its endpoints.
    pub fn insert_trust_unchecked(&mut self, trust: Trust) {
        self.put_trust(trust);
    }

    pub fn remove_trust_unchecked(&mut self, key: &EdgeKey) {
        self.remove_trust_row(key);
    }
}
