// crates/wot-store/src/registry.rs
//
// IdentityRegistry: identity lifecycle and attribute mutation on a TrustGraph.
//
// Identities are created on first reference (a trust list naming them) or by
// explicit registration. Own identities additionally root a trust tree. Every
// operation validates its input before touching any row.

use wot_core::crypto::Keypair;
use wot_core::error::WotError;
use wot_core::identity::{Identity, IdentityId, IdentityKind, IdentityOrigin};
use wot_core::trust::EdgeKey;
use wot_core::validation::{
    validate_context_name, validate_nickname, validate_property, MAX_CONTEXT_AMOUNT,
    MAX_PROPERTY_AMOUNT,
};

use crate::graph::TrustGraph;

/// What `delete_identity` removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityRemoval {
    /// Trust edges removed in either direction.
    pub edges: Vec<EdgeKey>,
    /// Owners whose tree held a row for the identity.
    pub scored_in: Vec<IdentityId>,
    /// Whether the identity rooted a tree of its own.
    pub was_own: bool,
}

impl TrustGraph {
    /// Register an identity explicitly.
    ///
    /// An identity already known by reference is upgraded to explicit;
    /// registering an explicit or own identity twice is an error.
    pub fn add_identity(&mut self, id: IdentityId) -> Result<(), WotError> {
        let origin = self.identity(&id).map(|existing| existing.origin);
        match origin {
            Some(IdentityOrigin::Referenced) => {
                self.update_identity(&id, |identity| {
                    identity.origin = IdentityOrigin::Explicit;
                    Ok(())
                })
            }
            Some(_) => Err(WotError::IdentityExists(id)),
            None => {
                self.insert_identity(Identity::new(id, IdentityOrigin::Explicit));
                Ok(())
            }
        }
    }

    /// Create an own identity for `keypair`.
    ///
    /// If the id is already known as a remote identity it is promoted in
    /// place, keeping the trust it gave and received.
    pub fn create_own_identity(
        &mut self,
        keypair: &Keypair,
        nickname: Option<&str>,
    ) -> Result<IdentityId, WotError> {
        if let Some(nickname) = nickname {
            validate_nickname(nickname)?;
        }
        let id = keypair.identity_id();
        let insert_key = keypair.seed();
        let existing_is_own = self.identity(&id).map(Identity::is_own);
        match existing_is_own {
            Some(true) => return Err(WotError::IdentityExists(id)),
            Some(false) => {
                self.update_identity(&id, |identity| {
                    identity.kind = IdentityKind::Own { insert_key };
                    identity.origin = IdentityOrigin::Explicit;
                    if let Some(nickname) = nickname {
                        identity.nickname = Some(nickname.to_string());
                    }
                    Ok(())
                })?;
            }
            None => {
                let mut identity = Identity::new_own(id, insert_key);
                identity.nickname = nickname.map(str::to_string);
                self.insert_identity(identity);
            }
        }
        Ok(id)
    }

    /// Turn an own identity back into a regular one. Its tree is dropped;
    /// trust it gave and received is kept. Returns the number of score rows
    /// removed.
    pub fn delete_own_identity(&mut self, id: &IdentityId) -> Result<usize, WotError> {
        if !self.identity_or_err(id)?.is_own() {
            return Err(WotError::NotOwnIdentity(*id));
        }
        let removed = self.clear_tree(id);
        self.update_identity(id, |identity| {
            identity.kind = IdentityKind::Remote;
            Ok(())
        })?;
        Ok(removed)
    }

    /// Delete an identity with every trust edge touching it, every score row
    /// naming it, and its own tree if it has one.
    pub fn delete_identity(&mut self, id: &IdentityId) -> Result<IdentityRemoval, WotError> {
        let was_own = self.identity_or_err(id)?.is_own();

        let mut edges: Vec<EdgeKey> = self.given_trusts(id).map(|trust| trust.key()).collect();
        edges.extend(self.received_trusts(id).map(|trust| trust.key()));
        for key in &edges {
            self.remove_trust_row(key);
        }

        let scored_in: Vec<IdentityId> = self
            .scores_of(id)
            .map(|score| score.owner)
            .filter(|owner| owner != id)
            .collect();
        for owner in &scored_in {
            self.remove_score(owner, id);
        }
        if was_own {
            self.clear_tree(id);
        }
        self.remove_identity_row(id);

        Ok(IdentityRemoval {
            edges,
            scored_in,
            was_own,
        })
    }

    /// Make sure `id` exists, creating it as a referenced identity.
    /// Returns true if it was created.
    pub(crate) fn ensure_referenced(&mut self, id: IdentityId) -> bool {
        if self.contains(&id) {
            return false;
        }
        self.insert_identity(Identity::new(id, IdentityOrigin::Referenced));
        true
    }

    pub fn set_nickname(&mut self, id: &IdentityId, nickname: &str) -> Result<(), WotError> {
        validate_nickname(nickname)?;
        self.update_identity(id, |identity| {
            identity.nickname = Some(nickname.to_string());
            Ok(())
        })
    }

    /// Returns false if the identity already had the context.
    pub fn add_context(&mut self, id: &IdentityId, context: &str) -> Result<bool, WotError> {
        validate_context_name(context)?;
        let identity = self.identity_or_err(id)?;
        if identity.has_context(context) {
            return Ok(false);
        }
        if identity.contexts.len() >= MAX_CONTEXT_AMOUNT {
            return Err(WotError::invalid(
                "context",
                format!("identity already has {} contexts", MAX_CONTEXT_AMOUNT),
            ));
        }
        self.update_identity(id, |identity| Ok(identity.contexts.insert(context.to_string())))
    }

    /// Returns false if the identity did not have the context.
    pub fn remove_context(&mut self, id: &IdentityId, context: &str) -> Result<bool, WotError> {
        if !self.identity_or_err(id)?.has_context(context) {
            return Ok(false);
        }
        self.update_identity(id, |identity| Ok(identity.contexts.remove(context)))
    }

    /// Returns the previous value of the property.
    pub fn set_property(
        &mut self,
        id: &IdentityId,
        name: &str,
        value: &str,
    ) -> Result<Option<String>, WotError> {
        validate_property(name, value)?;
        let identity = self.identity_or_err(id)?;
        if !identity.properties.contains_key(name)
            && identity.properties.len() >= MAX_PROPERTY_AMOUNT
        {
            return Err(WotError::invalid(
                "property name",
                format!("identity already has {} properties", MAX_PROPERTY_AMOUNT),
            ));
        }
        self.update_identity(id, |identity| {
            Ok(identity.properties.insert(name.to_string(), value.to_string()))
        })
    }

    pub fn property(&self, id: &IdentityId, name: &str) -> Result<Option<&str>, WotError> {
        Ok(self
            .identity_or_err(id)?
            .properties
            .get(name)
            .map(String::as_str))
    }

    /// Returns the removed value, if there was one.
    pub fn remove_property(
        &mut self,
        id: &IdentityId,
        name: &str,
    ) -> Result<Option<String>, WotError> {
        if !self.identity_or_err(id)?.properties.contains_key(name) {
            return Ok(None);
        }
        self.update_identity(id, |identity| Ok(identity.properties.remove(name)))
    }

    /// Delete referenced identities nothing points at any more: not own, not
    /// explicitly registered, no trust in either direction, no score row.
    pub fn prune_unreferenced(&mut self) -> Vec<IdentityId> {
        let unreferenced: Vec<IdentityId> = self
            .identities()
            .filter(|identity| {
                !identity.is_own()
                    && identity.origin == IdentityOrigin::Referenced
                    && self.given_trust_count(&identity.id) == 0
                    && self.received_trust_count(&identity.id) == 0
                    && self.scores_of(&identity.id).next().is_none()
            })
            .map(|identity| identity.id)
            .collect();
        for id in &unreferenced {
            self.remove_identity_row(id);
        }
        unreferenced
    }
}
