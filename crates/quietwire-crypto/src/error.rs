//! Error types for cryptographic operations.
//!
//! Every failure mode a caller can recover from gets its own variant.
//! Decryption failures in particular must surface as typed values so UI
//! layers can render a "cannot decrypt" placeholder instead of crashing.

use thiserror::Error;

/// Errors produced by the cryptographic primitives.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Authentication or decryption failed (wrong key, corruption, tampering).
    #[error("decryption failed: {reason}")]
    DecryptionFailed {
        /// Human-readable failure cause for logs; never contains key material.
        reason: String,
    },

    /// Envelope carries an algorithm tag this build does not implement.
    ///
    /// Checked before any cryptographic work so a malformed or
    /// forward-versioned envelope fails fast with a typed error.
    #[error("unsupported envelope algorithm: {tag:#04x}")]
    UnsupportedAlgorithm {
        /// The unrecognized algorithm tag.
        tag: u8,
    },

    /// Envelope bytes did not deserialize into the expected schema.
    #[error("malformed envelope: {reason}")]
    MalformedEnvelope {
        /// What the deserializer rejected.
        reason: String,
    },

    /// Key material had the wrong length.
    #[error("invalid key material: expected {expected} bytes, got {actual}")]
    InvalidKeyMaterial {
        /// Required length in bytes.
        expected: usize,
        /// Length actually provided.
        actual: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_never_leaks_key_material() {
        let err = CryptoError::DecryptionFailed { reason: "authentication failed".to_string() };
        assert_eq!(err.to_string(), "decryption failed: authentication failed");
    }

    #[test]
    fn unsupported_algorithm_reports_tag() {
        let err = CryptoError::UnsupportedAlgorithm { tag: 0x7f };
        assert!(err.to_string().contains("0x7f"));
    }
}
