//! In-memory store implementation for testing and single-process use.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard},
};

use quietwire_crypto::PublicIdentityKey;

use super::Store;
use crate::{
    error::StoreError,
    model::{
        ConversationId, ConversationSettings, GroupId, MessageId, ReadStatus, TimestampMs, UserId,
        WrappedGroupKey,
    },
};

/// In-memory [`Store`] backed by `HashMap`s.
///
/// All state is wrapped in `Arc<Mutex<>>` so clones share the same rows.
/// Thread-safe through the mutex, but uses `lock().expect()` which will
/// panic if the mutex is poisoned - acceptable for test and
/// single-process code. All operations are O(1) except
/// `due_read_statuses`, which scans all read-status rows.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryStoreInner>>,
}

#[derive(Default)]
struct MemoryStoreInner {
    /// Published public keys, one per user (publish overwrites).
    identity_keys: HashMap<UserId, PublicIdentityKey>,

    /// Group creator and accepted members, in acceptance order.
    groups: HashMap<GroupId, GroupRecord>,

    /// Wrapped group keys, one row per `(group, member)`.
    wrapped_keys: HashMap<(GroupId, UserId), WrappedGroupKey>,

    /// Read statuses, one row per `(message, recipient)`.
    read_statuses: HashMap<(MessageId, UserId), ReadStatus>,

    /// Deletion markers; set membership is the uniqueness constraint.
    deletion_markers: HashSet<(MessageId, UserId)>,

    /// Disappearing-messages toggle per conversation.
    conversation_settings: HashMap<ConversationId, ConversationSettings>,

    /// Personal default disappearing TTL per user, milliseconds.
    default_ttls: HashMap<UserId, u64>,
}

struct GroupRecord {
    creator: UserId,
    members: Vec<UserId>,
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of wrapped key rows across all groups. For test assertions.
    pub fn wrapped_key_count(&self) -> usize {
        self.lock().wrapped_keys.len()
    }

    /// Number of deletion markers. For test assertions.
    pub fn deletion_marker_count(&self) -> usize {
        self.lock().deletion_markers.len()
    }

    /// # Panics
    ///
    /// Panics if the mutex is poisoned (a thread panicked while holding
    /// the lock). Acceptable for test and single-process code.
    #[allow(clippy::expect_used)]
    fn lock(&self) -> MutexGuard<'_, MemoryStoreInner> {
        self.inner.lock().expect("MemoryStore mutex poisoned")
    }
}

impl Store for MemoryStore {
    fn publish_identity_key(
        &self,
        user_id: UserId,
        key: &PublicIdentityKey,
    ) -> Result<(), StoreError> {
        self.lock().identity_keys.insert(user_id, key.clone());
        Ok(())
    }

    fn identity_key(&self, user_id: UserId) -> Result<Option<PublicIdentityKey>, StoreError> {
        Ok(self.lock().identity_keys.get(&user_id).cloned())
    }

    fn create_group(&self, group_id: GroupId, creator: UserId) -> Result<(), StoreError> {
        self.lock()
            .groups
            .entry(group_id)
            .or_insert_with(|| GroupRecord { creator, members: vec![creator] });
        Ok(())
    }

    fn group_creator(&self, group_id: GroupId) -> Result<Option<UserId>, StoreError> {
        Ok(self.lock().groups.get(&group_id).map(|record| record.creator))
    }

    fn group_members(&self, group_id: GroupId) -> Result<Vec<UserId>, StoreError> {
        Ok(self.lock().groups.get(&group_id).map(|record| record.members.clone()).unwrap_or_default())
    }

    fn add_group_member(&self, group_id: GroupId, member_id: UserId) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if let Some(record) = inner.groups.get_mut(&group_id)
            && !record.members.contains(&member_id)
        {
            record.members.push(member_id);
        }
        Ok(())
    }

    fn remove_group_member(
        &self,
        group_id: GroupId,
        member_id: UserId,
    ) -> Result<bool, StoreError> {
        let mut inner = self.lock();
        let Some(record) = inner.groups.get_mut(&group_id) else {
            return Ok(false);
        };
        let before = record.members.len();
        record.members.retain(|m| *m != member_id);
        Ok(record.members.len() != before)
    }

    fn put_wrapped_group_key(&self, row: &WrappedGroupKey) -> Result<(), StoreError> {
        self.lock().wrapped_keys.insert((row.group_id, row.member_id), row.clone());
        Ok(())
    }

    fn wrapped_group_key(
        &self,
        group_id: GroupId,
        member_id: UserId,
    ) -> Result<Option<WrappedGroupKey>, StoreError> {
        Ok(self.lock().wrapped_keys.get(&(group_id, member_id)).cloned())
    }

    fn delete_wrapped_group_key(
        &self,
        group_id: GroupId,
        member_id: UserId,
    ) -> Result<bool, StoreError> {
        Ok(self.lock().wrapped_keys.remove(&(group_id, member_id)).is_some())
    }

    fn insert_read_status(&self, status: &ReadStatus) -> Result<(), StoreError> {
        self.lock().read_statuses.insert((status.message_id, status.user_id), status.clone());
        Ok(())
    }

    fn read_status(
        &self,
        message_id: MessageId,
        user_id: UserId,
    ) -> Result<Option<ReadStatus>, StoreError> {
        Ok(self.lock().read_statuses.get(&(message_id, user_id)).cloned())
    }

    fn update_read_status(&self, status: &ReadStatus) -> Result<(), StoreError> {
        self.insert_read_status(status)
    }

    fn due_read_statuses(
        &self,
        now: TimestampMs,
        limit: usize,
    ) -> Result<Vec<ReadStatus>, StoreError> {
        let inner = self.lock();
        let mut due: Vec<ReadStatus> = inner
            .read_statuses
            .values()
            .filter(|row| {
                row.is_due(now)
                    && !inner.deletion_markers.contains(&(row.message_id, row.user_id))
            })
            .cloned()
            .collect();

        // HashMap iteration order is arbitrary; sort for a stable batch.
        due.sort_by_key(|row| (row.message_id, row.user_id));
        due.truncate(limit);
        Ok(due)
    }

    fn insert_deletion_marker(
        &self,
        message_id: MessageId,
        user_id: UserId,
    ) -> Result<bool, StoreError> {
        Ok(self.lock().deletion_markers.insert((message_id, user_id)))
    }

    fn has_deletion_marker(
        &self,
        message_id: MessageId,
        user_id: UserId,
    ) -> Result<bool, StoreError> {
        Ok(self.lock().deletion_markers.contains(&(message_id, user_id)))
    }

    fn set_conversation_settings(
        &self,
        conversation_id: ConversationId,
        settings: &ConversationSettings,
    ) -> Result<(), StoreError> {
        self.lock().conversation_settings.insert(conversation_id, *settings);
        Ok(())
    }

    fn conversation_settings(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Option<ConversationSettings>, StoreError> {
        Ok(self.lock().conversation_settings.get(&conversation_id).copied())
    }

    fn set_default_disappearing_ms(&self, user_id: UserId, ttl_ms: u64) -> Result<(), StoreError> {
        self.lock().default_ttls.insert(user_id, ttl_ms);
        Ok(())
    }

    fn default_disappearing_ms(&self, user_id: UserId) -> Result<Option<u64>, StoreError> {
        Ok(self.lock().default_ttls.get(&user_id).copied())
    }
}
