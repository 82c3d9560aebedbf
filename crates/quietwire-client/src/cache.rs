//! Device-local symmetric key caches.
//!
//! An explicit object owned by the user's session, passed by reference to
//! whatever needs it - never ambient global state. Contents are
//! device-local only: session keys are re-derivable from the identity
//! keys, group keys re-unwrappable from the stored rows, so the cache is
//! purely an optimization and can be dropped at any time.

use std::collections::HashMap;

use quietwire_core::model::{ConversationId, GroupId};
use quietwire_crypto::{GroupKey, SessionKey};

/// Per-session cache of derived session keys and unwrapped group keys.
///
/// Re-deriving a key is deterministic, so a redundant concurrent first
/// write would be harmless; within a session, the entry check before
/// derivation is the single-flight guard against redundant expensive
/// work.
#[derive(Default)]
pub struct KeyCache {
    sessions: HashMap<ConversationId, SessionKey>,
    groups: HashMap<GroupId, GroupKey>,
}

impl KeyCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached session key for a conversation, if derived before.
    pub fn session(&self, conversation_id: ConversationId) -> Option<&SessionKey> {
        self.sessions.get(&conversation_id)
    }

    /// Cache a derived session key.
    pub fn insert_session(&mut self, conversation_id: ConversationId, key: SessionKey) {
        self.sessions.insert(conversation_id, key);
    }

    /// Drop one conversation's cached key (e.g. on contact removal).
    pub fn evict_session(&mut self, conversation_id: ConversationId) -> bool {
        self.sessions.remove(&conversation_id).is_some()
    }

    /// Cached group key, if unwrapped before.
    pub fn group(&self, group_id: GroupId) -> Option<&GroupKey> {
        self.groups.get(&group_id)
    }

    /// Cache an unwrapped group key.
    pub fn insert_group(&mut self, group_id: GroupId, key: GroupKey) {
        self.groups.insert(group_id, key);
    }

    /// Drop one group's cached key.
    pub fn evict_group(&mut self, group_id: GroupId) -> bool {
        self.groups.remove(&group_id).is_some()
    }

    /// Number of cached keys of both kinds.
    pub fn len(&self) -> usize {
        self.sessions.len() + self.groups.len()
    }

    /// True if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty() && self.groups.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicting_an_absent_key_is_a_noop() {
        let mut cache = KeyCache::new();
        assert!(!cache.evict_session(ConversationId(1)));
        assert!(!cache.evict_group(GroupId(1)));
    }

    #[test]
    fn insert_then_evict() {
        let mut cache = KeyCache::new();
        cache.insert_session(ConversationId(1), SessionKey::from_bytes([1u8; 32]));
        assert_eq!(cache.len(), 1);

        assert!(cache.evict_session(ConversationId(1)));
        assert!(cache.is_empty());
    }

    #[test]
    fn caches_are_keyed_independently() {
        let mut cache = KeyCache::new();
        cache.insert_session(ConversationId(1), SessionKey::from_bytes([1u8; 32]));

        assert!(cache.session(ConversationId(1)).is_some());
        assert!(cache.session(ConversationId(2)).is_none());
        assert!(cache.group(GroupId(1)).is_none());
    }
}
