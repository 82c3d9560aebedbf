//! Symmetric key types: pairwise session keys and group keys.
//!
//! Both are 32-byte XChaCha20-Poly1305 keys. They differ only in
//! provenance: a [`SessionKey`] is derived via Diffie-Hellman and is never
//! persisted anywhere, while a [`GroupKey`] is randomly generated once by
//! the group creator and transported to members wrapped under pairwise
//! session keys.

use rand::{CryptoRng, RngCore};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;

/// Symmetric key length in bytes.
pub const SYMMETRIC_KEY_SIZE: usize = 32;

/// Anything usable as an XChaCha20-Poly1305 key.
///
/// The seam between key provenance (derived vs. generated vs. unwrapped)
/// and the cipher, which only cares about the raw bytes.
pub trait SymmetricKey {
    /// The raw key bytes.
    fn key_bytes(&self) -> &[u8; SYMMETRIC_KEY_SIZE];
}

/// A pairwise session key for one 1:1 conversation.
///
/// Derived deterministically from one private identity key and one public
/// identity key; both parties compute the same value independently. Cached
/// per conversation on the deriving device only, never synced or persisted
/// server-side. Zeroized on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey([u8; SYMMETRIC_KEY_SIZE]);

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionKey(..)")
    }
}

impl SessionKey {
    /// Build a session key from raw shared-secret bytes.
    pub fn from_bytes(bytes: [u8; SYMMETRIC_KEY_SIZE]) -> Self {
        Self(bytes)
    }
}

impl SymmetricKey for SessionKey {
    fn key_bytes(&self) -> &[u8; SYMMETRIC_KEY_SIZE] {
        &self.0
    }
}

/// The shared symmetric key of one group conversation.
///
/// Generated once at group creation by the creator and never transmitted
/// in the clear. Members receive it wrapped under their pairwise session
/// key with the creator. Removing a member deletes their wrapped copy but
/// does not rotate the key itself - a removed member who cached the key
/// retains the ability to read future ciphertext, a documented protocol
/// weakness. Zeroized on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct GroupKey([u8; SYMMETRIC_KEY_SIZE]);

impl std::fmt::Debug for GroupKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("GroupKey(..)")
    }
}

impl GroupKey {
    /// Generate a fresh random group key.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut bytes = [0u8; SYMMETRIC_KEY_SIZE];
        rng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// The raw key bytes, for wrapping under a session key.
    pub fn to_bytes(&self) -> [u8; SYMMETRIC_KEY_SIZE] {
        self.0
    }

    /// Rebuild a group key from unwrapped bytes, rejecting wrong lengths.
    pub fn try_from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let array: [u8; SYMMETRIC_KEY_SIZE] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidKeyMaterial { expected: SYMMETRIC_KEY_SIZE, actual: bytes.len() }
        })?;
        Ok(Self(array))
    }
}

impl SymmetricKey for GroupKey {
    fn key_bytes(&self) -> &[u8; SYMMETRIC_KEY_SIZE] {
        &self.0
    }
}
