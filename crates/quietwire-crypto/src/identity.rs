//! Long-lived X25519 identity keypairs.
//!
//! One keypair per user, generated at account creation. The public half is
//! published server-side for anyone to fetch; the private half never leaves
//! the owning device. Regenerating a lost keypair orphans all ciphertext
//! produced under keys derived from it - a documented trade-off of the
//! no-escrow design, not a bug.

use rand::{CryptoRng, RngCore};
use sha2::{Digest, Sha256};
use x25519_dalek::{PublicKey, StaticSecret};

use crate::{error::CryptoError, session::SessionKey};

/// Serialized X25519 public key length in bytes.
pub const PUBLIC_KEY_SIZE: usize = 32;

/// The published half of a user's identity keypair.
///
/// Safe to store server-side and hand to any peer; deriving a session key
/// from it additionally requires a private key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicIdentityKey(PublicKey);

impl PublicIdentityKey {
    /// Serialize to the 32-byte X25519 wire format.
    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        self.0.to_bytes()
    }

    /// Deserialize from the 32-byte X25519 wire format.
    pub fn from_bytes(bytes: [u8; PUBLIC_KEY_SIZE]) -> Self {
        Self(PublicKey::from(bytes))
    }

    /// Deserialize from a slice, rejecting wrong lengths.
    pub fn try_from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let array: [u8; PUBLIC_KEY_SIZE] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidKeyMaterial { expected: PUBLIC_KEY_SIZE, actual: bytes.len() }
        })?;
        Ok(Self::from_bytes(array))
    }

    /// SHA-256 fingerprint of the public key, hex-encoded.
    ///
    /// Shown to users for out-of-band verification (compare fingerprints
    /// over a separate channel to detect a swapped key).
    pub fn fingerprint(&self) -> String {
        hex::encode(Sha256::digest(self.0.as_bytes()))
    }
}

/// A user's X25519 identity keypair.
///
/// The secret half is deliberately unreachable except through
/// [`secret_bytes`](Self::secret_bytes) (for passphrase-wrapped local
/// persistence) and [`derive_session_key`](Self::derive_session_key).
#[derive(Clone)]
pub struct IdentityKeypair {
    secret: StaticSecret,
    public: PublicIdentityKey,
}

impl std::fmt::Debug for IdentityKeypair {
    // The secret half must never reach logs.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityKeypair").field("public", &self.public).finish_non_exhaustive()
    }
}

impl IdentityKeypair {
    /// Generate a fresh keypair from the given RNG.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let secret = StaticSecret::random_from_rng(rng);
        let public = PublicIdentityKey(PublicKey::from(&secret));
        Self { secret, public }
    }

    /// Reconstruct a keypair from previously exported secret bytes.
    pub fn from_secret_bytes(bytes: [u8; 32]) -> Self {
        let secret = StaticSecret::from(bytes);
        let public = PublicIdentityKey(PublicKey::from(&secret));
        Self { secret, public }
    }

    /// Export the secret half for local persistence.
    ///
    /// Callers are expected to wrap these bytes under a user-chosen
    /// passphrase before writing them anywhere. The bytes must never be
    /// sent to a server.
    pub fn secret_bytes(&self) -> [u8; 32] {
        self.secret.to_bytes()
    }

    /// The published half of this keypair.
    pub fn public(&self) -> &PublicIdentityKey {
        &self.public
    }

    /// Derive the pairwise session key shared with `peer`.
    ///
    /// Runs X25519 Diffie-Hellman and uses the raw shared secret directly
    /// as the symmetric key. Deterministic and commutative:
    /// `a.derive_session_key(b.public()) == b.derive_session_key(a.public())`
    /// for matching keypairs - the correctness property the whole protocol
    /// depends on.
    ///
    /// No KDF stretching is applied to the shared secret. That matches the
    /// deployed protocol and is a known hardening gap; changing it would
    /// break compatibility with existing ciphertext.
    pub fn derive_session_key(&self, peer: &PublicIdentityKey) -> SessionKey {
        let shared = self.secret.diffie_hellman(&peer.0);
        SessionKey::from_bytes(shared.to_bytes())
    }
}
