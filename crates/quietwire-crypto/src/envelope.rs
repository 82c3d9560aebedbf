//! Self-contained ciphertext envelopes using `XChaCha20-Poly1305`.
//!
//! The envelope is a tagged, explicitly-schemed structure (algorithm id,
//! nonce, ciphertext) rather than a loose blob, so decrypt can validate
//! shape before touching any cryptographic state and fail fast with a
//! typed error. Serialized as CBOR; the bytes are binary-safe and can be
//! base64-encoded wherever a text transport requires it.

use chacha20poly1305::{
    XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit},
};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

use crate::{error::CryptoError, session::SymmetricKey};

/// XChaCha20 nonce length in bytes.
pub const NONCE_SIZE: usize = 24;

/// Poly1305 tag size (16 bytes)
const POLY1305_TAG_SIZE: usize = 16;

/// Algorithm tag carried in every envelope.
///
/// A plain byte rather than a closed enum so that an envelope produced by
/// a newer build deserializes cleanly and is rejected with
/// [`CryptoError::UnsupportedAlgorithm`] instead of a generic parse error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlgorithmId(pub u8);

impl AlgorithmId {
    /// XChaCha20-Poly1305 AEAD, the only algorithm this build implements.
    pub const XCHACHA20_POLY1305: Self = Self(1);
}

/// An encrypted payload with everything needed to decrypt it (given the key).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Which cipher produced this envelope.
    pub algorithm: AlgorithmId,
    /// The 24-byte XChaCha20 nonce, freshly random per encryption.
    pub nonce: [u8; NONCE_SIZE],
    /// The ciphertext including the 16-byte Poly1305 tag.
    pub ciphertext: Vec<u8>,
}

impl Envelope {
    /// Plaintext length (ciphertext length minus authentication tag).
    pub fn plaintext_len(&self) -> usize {
        self.ciphertext.len().saturating_sub(POLY1305_TAG_SIZE)
    }

    /// Serialize to CBOR bytes for storage or transport.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.ciphertext.len() + NONCE_SIZE + 8);
        let Ok(()) = ciborium::into_writer(self, &mut buf) else {
            unreachable!("CBOR serialization into a Vec cannot fail");
        };
        buf
    }

    /// Deserialize from CBOR bytes, validating the schema.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        ciborium::from_reader(bytes)
            .map_err(|e| CryptoError::MalformedEnvelope { reason: e.to_string() })
    }
}

/// Encrypt a payload under a symmetric key.
///
/// The nonce is freshly random on every call and travels inside the
/// envelope. Nonce reuse under the same key breaks confidentiality for
/// this AEAD mode, which is why callers cannot supply their own.
pub fn encrypt<K: SymmetricKey, R: RngCore + CryptoRng>(
    plaintext: &[u8],
    key: &K,
    rng: &mut R,
) -> Envelope {
    let mut nonce = [0u8; NONCE_SIZE];
    rng.fill_bytes(&mut nonce);

    let cipher = XChaCha20Poly1305::new(key.key_bytes().into());
    let Ok(ciphertext) = cipher.encrypt(XNonce::from_slice(&nonce), plaintext) else {
        unreachable!("XChaCha20-Poly1305 encryption cannot fail with valid inputs");
    };

    Envelope { algorithm: AlgorithmId::XCHACHA20_POLY1305, nonce, ciphertext }
}

/// Decrypt an envelope under a symmetric key.
///
/// # Errors
///
/// - `UnsupportedAlgorithm`: envelope carries an unknown algorithm tag
/// - `DecryptionFailed`: authentication tag or key is wrong (tampering,
///   corruption, or a mismatched key)
pub fn decrypt<K: SymmetricKey>(envelope: &Envelope, key: &K) -> Result<Vec<u8>, CryptoError> {
    if envelope.algorithm != AlgorithmId::XCHACHA20_POLY1305 {
        return Err(CryptoError::UnsupportedAlgorithm { tag: envelope.algorithm.0 });
    }

    let cipher = XChaCha20Poly1305::new(key.key_bytes().into());
    let nonce = XNonce::from_slice(&envelope.nonce);

    cipher.decrypt(nonce, envelope.ciphertext.as_slice()).map_err(|_| {
        CryptoError::DecryptionFailed { reason: "authentication failed".to_string() }
    })
}
