// crates/wot-core/src/crypto.rs

use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

use crate::identity::IdentityId;

/// An ed25519 keypair backing an own identity.
pub struct Keypair {
    pub signing_key: SigningKey,
    pub verifying_key: VerifyingKey,
}

impl Keypair {
    /// Generate a new random ed25519 keypair.
    pub fn generate() -> Self {
        Self::from_seed(&SigningKey::generate(&mut OsRng).to_bytes())
    }

    /// Rebuild a keypair from a stored 32-byte seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(seed);
        let verifying_key = signing_key.verifying_key();
        Keypair {
            signing_key,
            verifying_key,
        }
    }

    pub fn seed(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.verifying_key.to_bytes()
    }

    /// The identity id published for this keypair.
    pub fn identity_id(&self) -> IdentityId {
        identity_id_for(&self.public_key_bytes())
    }
}

/// Derive an identity id from an ed25519 public key.
pub fn identity_id_for(public_key: &[u8; 32]) -> IdentityId {
    IdentityId::from_bytes(hash_bytes(public_key))
}

/// SHA-256 of the given bytes.
pub fn hash_bytes(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}
