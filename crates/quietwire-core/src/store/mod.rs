//! Storage abstraction for the key lifecycle.
//!
//! Trait-based abstraction over the rows this subsystem reads and writes:
//! published public keys, wrapped group keys, read statuses, deletion
//! markers, group membership, and conversation toggles. The trait is
//! synchronous (no async) so protocol logic stays runtime-free and
//! directly testable.

mod memory;

pub use memory::MemoryStore;

use quietwire_crypto::PublicIdentityKey;

use crate::{
    error::StoreError,
    model::{
        ConversationId, ConversationSettings, GroupId, MessageId, ReadStatus, TimestampMs, UserId,
        WrappedGroupKey,
    },
};

/// Row-level storage the key lifecycle consumes.
///
/// Must be `Clone` (handles are passed to the scheduler and to per-user
/// sessions), `Send + Sync`, and synchronous. Implementations typically
/// share internal state via `Arc`, so clones access the same underlying
/// rows.
pub trait Store: Clone + Send + Sync + 'static {
    // --- identity keys ---

    /// Store a user's public identity key, overwriting any previous key.
    ///
    /// Overwrite semantics are deliberate: the private half is never
    /// escrowed, so republishing after key loss is the only recovery
    /// path, at the documented cost of orphaning old ciphertext.
    fn publish_identity_key(
        &self,
        user_id: UserId,
        key: &PublicIdentityKey,
    ) -> Result<(), StoreError>;

    /// Fetch a user's published public key. `None` if never published.
    fn identity_key(&self, user_id: UserId) -> Result<Option<PublicIdentityKey>, StoreError>;

    // --- group membership (owned by the membership collaborator; this
    //     subsystem reads it and keeps wrapped-key rows consistent) ---

    /// Create a group with its creator as the first accepted member.
    fn create_group(&self, group_id: GroupId, creator: UserId) -> Result<(), StoreError>;

    /// The user who created the group. `None` if the group is unknown.
    fn group_creator(&self, group_id: GroupId) -> Result<Option<UserId>, StoreError>;

    /// Currently-accepted members of the group, in insertion order.
    fn group_members(&self, group_id: GroupId) -> Result<Vec<UserId>, StoreError>;

    /// Record an accepted member. Idempotent.
    fn add_group_member(&self, group_id: GroupId, member_id: UserId) -> Result<(), StoreError>;

    /// Remove a member. Returns false if they were not a member (no-op).
    fn remove_group_member(&self, group_id: GroupId, member_id: UserId)
    -> Result<bool, StoreError>;

    // --- wrapped group keys ---

    /// Store a wrapped group key row, replacing any existing row for the
    /// same `(group_id, member_id)`. Upsert keeps the one-row-per-member
    /// invariant under retried wraps.
    fn put_wrapped_group_key(&self, row: &WrappedGroupKey) -> Result<(), StoreError>;

    /// Fetch the wrapped key row for one member. `None` if absent.
    fn wrapped_group_key(
        &self,
        group_id: GroupId,
        member_id: UserId,
    ) -> Result<Option<WrappedGroupKey>, StoreError>;

    /// Delete one member's wrapped key row. Returns false if no row
    /// existed (deleting twice is a no-op, not an error).
    fn delete_wrapped_group_key(
        &self,
        group_id: GroupId,
        member_id: UserId,
    ) -> Result<bool, StoreError>;

    // --- read statuses and deletion markers ---

    /// Insert a read-status row. Replaces any existing row for the same
    /// `(message_id, user_id)`.
    fn insert_read_status(&self, status: &ReadStatus) -> Result<(), StoreError>;

    /// Fetch one recipient's read status for one message.
    fn read_status(
        &self,
        message_id: MessageId,
        user_id: UserId,
    ) -> Result<Option<ReadStatus>, StoreError>;

    /// Overwrite an existing read-status row (used to stamp `read_at` and
    /// `delete_at`).
    fn update_read_status(&self, status: &ReadStatus) -> Result<(), StoreError>;

    /// Read-status rows overdue for deletion at `now`: read, deadline
    /// passed, and no deletion marker present yet. At most `limit` rows;
    /// stragglers are picked up by the next sweep cycle.
    fn due_read_statuses(
        &self,
        now: TimestampMs,
        limit: usize,
    ) -> Result<Vec<ReadStatus>, StoreError>;

    /// Insert a deletion marker. Returns true if the marker is new, false
    /// if it already existed. Never errors on duplicates - this is the
    /// uniqueness constraint that makes the sweep idempotent and safe to
    /// run concurrently with itself.
    fn insert_deletion_marker(
        &self,
        message_id: MessageId,
        user_id: UserId,
    ) -> Result<bool, StoreError>;

    /// Whether a deletion marker exists for `(message_id, user_id)`.
    fn has_deletion_marker(
        &self,
        message_id: MessageId,
        user_id: UserId,
    ) -> Result<bool, StoreError>;

    // --- conversation and user settings ---

    /// Store a conversation's disappearing-messages settings.
    fn set_conversation_settings(
        &self,
        conversation_id: ConversationId,
        settings: &ConversationSettings,
    ) -> Result<(), StoreError>;

    /// Fetch a conversation's settings. `None` means the toggle was never
    /// touched (equivalent to disabled).
    fn conversation_settings(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Option<ConversationSettings>, StoreError>;

    /// Set a user's personal default disappearing TTL in milliseconds.
    fn set_default_disappearing_ms(&self, user_id: UserId, ttl_ms: u64) -> Result<(), StoreError>;

    /// Fetch a user's personal default disappearing TTL. `None` if the
    /// user never chose one.
    fn default_disappearing_ms(&self, user_id: UserId) -> Result<Option<u64>, StoreError>;
}
