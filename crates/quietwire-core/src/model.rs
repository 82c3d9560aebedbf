//! Identifiers, storage rows, and settings for the key lifecycle.
//!
//! These mirror the relational rows the subsystem reads and writes. Only
//! public key material and ciphertext ever appear here; private keys and
//! plaintext symmetric keys stay in `quietwire-crypto` types on the owning
//! device.

use serde::{Deserialize, Serialize};

/// A user's stable identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub u64);

/// A 1:1 conversation identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConversationId(pub u128);

/// A group conversation identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupId(pub u128);

/// A message identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(pub u128);

/// Milliseconds since the Unix epoch.
///
/// Lifecycle functions take `now` as a parameter instead of reading a
/// clock, so tests drive time explicitly.
pub type TimestampMs = u64;

/// One group key encrypted for one member.
///
/// The payload is a CBOR-serialized `Envelope` (algorithm id, nonce,
/// ciphertext) of the group key under the pairwise session key between the
/// group creator and `member_id`. Binary-safe; base64-encode for text
/// transports.
///
/// # Invariants
///
/// - Exactly one row exists per currently-accepted member of the group
/// - Rows of removed members are deleted (the group key itself is not
///   rotated)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrappedGroupKey {
    /// Group this key belongs to.
    pub group_id: GroupId,
    /// Member this copy was wrapped for.
    pub member_id: UserId,
    /// Serialized envelope of the encrypted group key.
    pub payload: Vec<u8>,
}

/// Per-recipient read state of one message.
///
/// Created for every recipient other than the sender at send time.
/// `conversation_id` is denormalized onto the row so the read path can
/// resolve the conversation's disappearing toggle without a join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadStatus {
    /// Message this row tracks.
    pub message_id: MessageId,
    /// Recipient this row tracks.
    pub user_id: UserId,
    /// Conversation the message was sent in.
    pub conversation_id: ConversationId,
    /// Whether the recipient has read the message.
    pub is_read: bool,
    /// When the recipient read the message. `None` until read.
    pub read_at: Option<TimestampMs>,
    /// Deletion deadline. Stamped at read time iff the conversation has
    /// disappearing messages enabled; `None` otherwise.
    pub delete_at: Option<TimestampMs>,
}

impl ReadStatus {
    /// A fresh unread row, created at message send time.
    pub fn unread(message_id: MessageId, user_id: UserId, conversation_id: ConversationId) -> Self {
        Self { message_id, user_id, conversation_id, is_read: false, read_at: None, delete_at: None }
    }

    /// Whether this row is overdue for deletion at `now`.
    pub fn is_due(&self, now: TimestampMs) -> bool {
        self.is_read && self.delete_at.is_some_and(|deadline| deadline <= now)
    }
}

/// Per-user soft deletion of one message.
///
/// Presence hides the message from that user only; the message row itself
/// survives while any other recipient can still see it. Insertion is
/// idempotent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeletionMarker {
    /// Hidden message.
    pub message_id: MessageId,
    /// User it is hidden from.
    pub user_id: UserId,
}

/// Conversation-level disappearing-messages toggle.
///
/// The TTL applied to read messages is the *enabling* user's personal
/// default, not the reading user's - an intentional asymmetry of the
/// protocol that must be preserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSettings {
    /// Whether disappearing messages are on.
    pub disappearing_enabled: bool,
    /// Who flipped the toggle on. Determines which user's default TTL
    /// applies to every recipient's deadline.
    pub enabled_by: Option<UserId>,
}

impl ConversationSettings {
    /// Settings for a conversation that has never enabled disappearing
    /// messages.
    pub fn plaintext_retention() -> Self {
        Self { disappearing_enabled: false, enabled_by: None }
    }
}
