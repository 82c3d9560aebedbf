//! Quietwire Cryptographic Primitives
//!
//! Cryptographic building blocks for the Quietwire key lifecycle. Pure
//! functions with deterministic outputs. Callers provide the RNG so tests
//! can run deterministically.
//!
//! # Key Lifecycle
//!
//! Every user holds one long-lived X25519 identity keypair. A 1:1
//! conversation key is derived by running Diffie-Hellman between the local
//! private key and the peer's published public key. Group conversations use
//! one symmetric group key, transported to each member wrapped under the
//! pairwise session key between the group creator and that member.
//!
//! ```text
//! Identity Keypair (X25519, long-lived)
//!        │
//!        ▼
//! Diffie-Hellman → Session Key (per 1:1 conversation)
//!        │
//!        ├──────────────► AEAD Encryption → Message Envelope
//!        ▼
//! Key Wrapping → Wrapped Group Key (per group, per member)
//!        │
//!        ▼
//! Group Key → AEAD Encryption → Group Message Envelope
//! ```
//!
//! # Security
//!
//! Authenticity:
//! - XChaCha20-Poly1305 AEAD provides tamper-proof encryption
//! - Nonces are freshly random per encryption call, never reused
//! - Failed authentication tag -> typed `DecryptionFailed` error
//!
//! Known limitations (inherited from the protocol, not bugs):
//! - Identity keys are static; there is no ratchet, so compromise of a
//!   private key exposes all traffic derivable from it (no forward secrecy).
//! - The raw Diffie-Hellman shared secret is used directly as the session
//!   key with no KDF stretching.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod envelope;
mod error;
mod identity;
mod session;

pub use envelope::{AlgorithmId, Envelope, NONCE_SIZE, decrypt, encrypt};
pub use error::CryptoError;
pub use identity::{IdentityKeypair, PublicIdentityKey};
pub use session::{GroupKey, SessionKey, SymmetricKey};
