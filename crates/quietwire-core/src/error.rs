//! Error types for the key lifecycle.
//!
//! Strongly-typed errors per recovery path: every variant of
//! [`LifecycleError`] maps to a specific caller behavior (prompt key setup,
//! render a placeholder, fall back to plaintext, retry the wrap). Raw
//! cryptographic or storage failures never propagate past this crate
//! untyped.

use thiserror::Error;

use quietwire_crypto::CryptoError;

use crate::model::{GroupId, UserId};

/// Errors from the storage collaborator.
///
/// The store reports only backend faults here; "row not found" is
/// expressed through `Option`/`bool` return types, because absence is a
/// normal state for most rows in this model.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backing store failed to execute an operation.
    #[error("storage backend: {reason}")]
    Backend {
        /// Backend-specific failure description.
        reason: String,
    },
}

/// Errors surfaced by key lifecycle operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    /// No public key has been published for this user.
    ///
    /// Recoverable: prompt the user (or peer) to complete key setup.
    #[error("no public key published for user {0:?}")]
    KeyNotFound(UserId),

    /// The group has no wrapped key row for this member.
    ///
    /// Recoverable: treated as "group has no encryption configured", so
    /// the caller proceeds in plaintext mode rather than deadlocking.
    #[error("no group key available for group {0:?}")]
    NoGroupKey(GroupId),

    /// A user other than the group's creator attempted to wrap the
    /// group key.
    ///
    /// Unwrapping always derives against the creator's published key, so
    /// a non-creator's wrap would store a row the member can never
    /// decrypt. The call is rejected before anything is written.
    #[error("user {user_id:?} is not the creator of group {group_id:?}")]
    NotGroupCreator {
        /// Group whose key was being wrapped.
        group_id: GroupId,
        /// The non-creator who attempted the wrap.
        user_id: UserId,
    },

    /// Wrapping the group key for one member failed.
    ///
    /// Never aborts a distribution batch; the member is retried
    /// individually and cannot decrypt group traffic until then.
    #[error("wrapping group key for member {member_id:?} failed: {reason}")]
    WrapFailed {
        /// Member whose wrap step failed.
        member_id: UserId,
        /// What went wrong.
        reason: String,
    },

    /// A cryptographic operation failed.
    ///
    /// `DecryptionFailed` in particular is recoverable: render a "cannot
    /// decrypt" placeholder, never garbage bytes and never a crash.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// The storage collaborator failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl LifecycleError {
    /// Returns true if the caller can degrade gracefully instead of
    /// failing the surrounding operation.
    ///
    /// Storage faults are the only non-recoverable case: they indicate
    /// the collaborator itself is broken, not a key state the UI can
    /// route around.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Store(_))
    }
}
