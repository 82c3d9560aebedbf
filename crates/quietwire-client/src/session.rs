//! The per-user session context and its API surface.

use rand::{CryptoRng, RngCore};
use tracing::debug;

use quietwire_core::{
    LifecycleError,
    disappearing::set_disappearing,
    event::{Notifier, NullNotifier},
    group::{self, DistributionOutcome},
    model::{ConversationId, GroupId, UserId},
    store::Store,
};
use quietwire_crypto::{Envelope, GroupKey, IdentityKeypair, SessionKey, decrypt, encrypt};

use crate::cache::KeyCache;

/// Result of flipping a conversation's disappearing-messages toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisappearingToggle {
    /// The new state of the toggle.
    pub enabled: bool,
    /// Whose personal default TTL now governs deadlines in this
    /// conversation. `None` when disabled.
    pub effective_ttl_source: Option<UserId>,
}

/// One logged-in user's view of the key lifecycle.
///
/// Owns the identity keypair and the device-local [`KeyCache`]; talks to
/// the storage collaborator through `S` and fires push events through
/// `N`. Cryptographic failures come back as typed [`LifecycleError`]
/// values - a message that cannot be decrypted is rendered as a
/// placeholder by the caller, never a crash.
pub struct ClientSession<S: Store, N: Notifier = NullNotifier> {
    user_id: UserId,
    keypair: IdentityKeypair,
    store: S,
    notifier: N,
    cache: KeyCache,
}

impl<S: Store> ClientSession<S> {
    /// Create a session with no push transport attached.
    pub fn new(user_id: UserId, keypair: IdentityKeypair, store: S) -> Self {
        Self::with_notifier(user_id, keypair, store, NullNotifier)
    }
}

impl<S: Store, N: Notifier> ClientSession<S, N> {
    /// Create a session that fires push events through `notifier`.
    pub fn with_notifier(user_id: UserId, keypair: IdentityKeypair, store: S, notifier: N) -> Self {
        Self { user_id, keypair, store, notifier, cache: KeyCache::new() }
    }

    /// This session's user.
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Hex SHA-256 fingerprint of our public key, for out-of-band
    /// verification.
    pub fn fingerprint(&self) -> String {
        self.keypair.public().fingerprint()
    }

    /// Publish our public key server-side, overwriting any previous one.
    pub fn publish_identity(&self) -> Result<(), LifecycleError> {
        self.store.publish_identity_key(self.user_id, self.keypair.public())?;
        Ok(())
    }

    /// The session key for a 1:1 conversation with `peer`, derived lazily
    /// on first use and cached per conversation afterwards.
    ///
    /// # Errors
    ///
    /// `KeyNotFound` if `peer` never published a public key; callers
    /// prompt key setup rather than failing hard.
    pub fn session_key(
        &mut self,
        conversation_id: ConversationId,
        peer: UserId,
    ) -> Result<SessionKey, LifecycleError> {
        // Entry check doubles as the single-flight guard: derivation is
        // deterministic, so the worst case of racing sessions is
        // redundant work, never divergent keys.
        if let Some(key) = self.cache.session(conversation_id) {
            return Ok(key.clone());
        }

        let peer_key = self.store.identity_key(peer)?.ok_or(LifecycleError::KeyNotFound(peer))?;
        let key = self.keypair.derive_session_key(&peer_key);

        debug!(conversation_id = conversation_id.0, peer = peer.0, "session key derived");
        self.cache.insert_session(conversation_id, key.clone());
        Ok(key)
    }

    /// Encrypt a message for a 1:1 conversation.
    pub fn encrypt_for_conversation<R: RngCore + CryptoRng>(
        &mut self,
        conversation_id: ConversationId,
        peer: UserId,
        plaintext: &[u8],
        rng: &mut R,
    ) -> Result<Envelope, LifecycleError> {
        let key = self.session_key(conversation_id, peer)?;
        Ok(encrypt(plaintext, &key, rng))
    }

    /// Decrypt a message from a 1:1 conversation.
    ///
    /// # Errors
    ///
    /// `DecryptionFailed` on a wrong key, corruption, or tampering. The
    /// caller shows a "cannot decrypt" placeholder - never garbage bytes
    /// and never a blank message.
    pub fn decrypt_for_conversation(
        &mut self,
        conversation_id: ConversationId,
        peer: UserId,
        envelope: &Envelope,
    ) -> Result<Vec<u8>, LifecycleError> {
        let key = self.session_key(conversation_id, peer)?;
        Ok(decrypt(envelope, &key)?)
    }

    /// Drop a conversation's cached session key (e.g. on contact
    /// removal). The key is re-derived on next use.
    pub fn evict_conversation_key(&mut self, conversation_id: ConversationId) -> bool {
        self.cache.evict_session(conversation_id)
    }

    /// Create a group we own and distribute its key to every accepted
    /// member.
    ///
    /// One member's wrap failure never aborts the others; failed members
    /// are listed in the outcome for individual retry via
    /// [`wrap_group_key_for_new_member`](Self::wrap_group_key_for_new_member).
    pub fn create_group<R: RngCore + CryptoRng>(
        &mut self,
        group_id: GroupId,
        rng: &mut R,
    ) -> Result<DistributionOutcome, LifecycleError> {
        self.store.create_group(group_id, self.user_id)?;
        let (group_key, outcome) =
            group::create_group_key(&self.store, &self.notifier, group_id, &self.keypair, rng)?;
        self.cache.insert_group(group_id, group_key);
        Ok(outcome)
    }

    /// Accept a new member into a group we created: record the
    /// membership and wrap the existing group key for them.
    ///
    /// The group key is not rotated; the member gains access to future
    /// traffic only.
    ///
    /// # Errors
    ///
    /// `NotGroupCreator` if we did not create the group. Members unwrap
    /// against the creator's published key, so only the creator's wraps
    /// are decryptable; a non-creator's wrap would upsert a row the new
    /// member could never open.
    pub fn wrap_group_key_for_new_member<R: RngCore + CryptoRng>(
        &mut self,
        group_id: GroupId,
        member_id: UserId,
        rng: &mut R,
    ) -> Result<(), LifecycleError> {
        if self.store.group_creator(group_id)? != Some(self.user_id) {
            return Err(LifecycleError::NotGroupCreator { group_id, user_id: self.user_id });
        }

        let group_key = self.group_key(group_id)?;
        self.store.add_group_member(group_id, member_id)?;
        group::wrap_for_member(
            &self.store,
            &self.notifier,
            group_id,
            member_id,
            &group_key,
            &self.keypair,
            rng,
        )
    }

    /// The group key for a group we belong to, unwrapped lazily from our
    /// stored row on first use and cached per group afterwards.
    ///
    /// # Errors
    ///
    /// `NoGroupKey` if we have no wrapped row - treated as "group has no
    /// encryption configured", so callers fall back to plaintext mode.
    pub fn group_key(&mut self, group_id: GroupId) -> Result<GroupKey, LifecycleError> {
        if let Some(key) = self.cache.group(group_id) {
            return Ok(key.clone());
        }

        let key = group::unwrap_group_key(&self.store, group_id, &self.keypair, self.user_id)?;
        debug!(group_id = group_id.0, "group key unwrapped");
        self.cache.insert_group(group_id, key.clone());
        Ok(key)
    }

    /// Encrypt a message for a group conversation under the group key.
    ///
    /// Bulk group content is always encrypted under the group key;
    /// pairwise session keys are used only to wrap that key.
    pub fn encrypt_for_group<R: RngCore + CryptoRng>(
        &mut self,
        group_id: GroupId,
        plaintext: &[u8],
        rng: &mut R,
    ) -> Result<Envelope, LifecycleError> {
        let key = self.group_key(group_id)?;
        Ok(encrypt(plaintext, &key, rng))
    }

    /// Decrypt a group message.
    pub fn decrypt_for_group(
        &mut self,
        group_id: GroupId,
        envelope: &Envelope,
    ) -> Result<Vec<u8>, LifecycleError> {
        let key = self.group_key(group_id)?;
        Ok(decrypt(envelope, &key)?)
    }

    /// Remove a member from a group: drop the membership and delete
    /// their wrapped key row. Removing twice is a no-op.
    ///
    /// The group key is not rotated, so a removed member who cached it
    /// retains the ability to read future ciphertext - the documented
    /// protocol weakness.
    pub fn remove_group_member(
        &mut self,
        group_id: GroupId,
        member_id: UserId,
    ) -> Result<bool, LifecycleError> {
        group::remove_member(&self.store, group_id, member_id)
    }

    /// Flip the disappearing-messages toggle on a conversation.
    ///
    /// Enabling makes *our* personal default TTL govern every
    /// recipient's deadline in this conversation. Toggling never
    /// retroactively affects already-read messages.
    pub fn toggle_disappearing(
        &self,
        conversation_id: ConversationId,
        enabled: bool,
    ) -> Result<DisappearingToggle, LifecycleError> {
        let settings = set_disappearing(&self.store, conversation_id, enabled, self.user_id)?;
        Ok(DisappearingToggle {
            enabled: settings.disappearing_enabled,
            effective_ttl_source: settings.enabled_by,
        })
    }
}
