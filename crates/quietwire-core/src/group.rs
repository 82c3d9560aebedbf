//! Group key distribution.
//!
//! One symmetric key per group, generated once by the creator. It is never
//! sent in the clear: each member receives it wrapped (encrypted) under the
//! pairwise session key between the creator and that member, one
//! `WrappedGroupKey` row per member. A joining member unwraps with nothing
//! but their own private key and the creator's published public key.
//!
//! Removing a member deletes their row but does not rotate the group key.
//! A removed member who cached the key client-side therefore retains the
//! cryptographic ability to read future ciphertext - a known protocol
//! weakness, preserved here rather than silently "fixed", because rotation
//! would change observable behavior for every remaining member.

use rand::{CryptoRng, RngCore};
use tracing::{debug, warn};

use quietwire_crypto::{Envelope, GroupKey, IdentityKeypair, decrypt, encrypt};

use crate::{
    error::LifecycleError,
    event::{Notifier, PushEvent},
    model::{GroupId, UserId, WrappedGroupKey},
    store::Store,
};

/// Per-member result of one distribution batch.
///
/// A failed member does not abort the batch; they stay listed here so the
/// caller can retry the wrap individually. Until then that member cannot
/// decrypt group traffic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributionOutcome {
    /// Members whose wrapped key row was stored.
    pub wrapped: Vec<UserId>,
    /// Members whose wrap step failed, with the failure.
    pub failed: Vec<(UserId, LifecycleError)>,
}

impl DistributionOutcome {
    /// True if every member received a wrapped key.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Generate a group key and wrap it for every currently-accepted member.
///
/// The creation protocol: generate a fresh [`GroupKey`], then for each
/// member derive the creator-member pairwise session key, encrypt the
/// group key under it, and store the row. One member's failure is logged
/// and recorded in the outcome but never aborts the others.
///
/// Returns the plaintext group key (for the creator's own cache) along
/// with the per-member outcome.
pub fn create_group_key<S: Store, N: Notifier, R: RngCore + CryptoRng>(
    store: &S,
    notifier: &N,
    group_id: GroupId,
    creator: &IdentityKeypair,
    rng: &mut R,
) -> Result<(GroupKey, DistributionOutcome), LifecycleError> {
    let group_key = GroupKey::generate(rng);
    let members = store.group_members(group_id)?;

    let mut outcome =
        DistributionOutcome { wrapped: Vec::with_capacity(members.len()), failed: Vec::new() };

    for member_id in members {
        match wrap_for_member(store, notifier, group_id, member_id, &group_key, creator, rng) {
            Ok(()) => outcome.wrapped.push(member_id),
            Err(err) => {
                warn!(
                    group_id = group_id.0,
                    member_id = member_id.0,
                    error = %err,
                    "group key wrap failed; member will be retried"
                );
                outcome.failed.push((
                    member_id,
                    LifecycleError::WrapFailed { member_id, reason: err.to_string() },
                ));
            },
        }
    }

    debug!(
        group_id = group_id.0,
        wrapped = outcome.wrapped.len(),
        failed = outcome.failed.len(),
        "group key distributed"
    );

    Ok((group_key, outcome))
}

/// Wrap an existing group key for one member and store the row.
///
/// The join/accept path: when member `n` is accepted into the group, the
/// creator (the only party holding the plaintext group key) calls this to
/// give `n` read access. The group key is *not* rotated; `n` gains access
/// to future traffic only.
pub fn wrap_for_member<S: Store, N: Notifier, R: RngCore + CryptoRng>(
    store: &S,
    notifier: &N,
    group_id: GroupId,
    member_id: UserId,
    group_key: &GroupKey,
    creator: &IdentityKeypair,
    rng: &mut R,
) -> Result<(), LifecycleError> {
    let member_key =
        store.identity_key(member_id)?.ok_or(LifecycleError::KeyNotFound(member_id))?;

    let session_key = creator.derive_session_key(&member_key);
    let envelope = encrypt(&group_key.to_bytes(), &session_key, rng);

    store.put_wrapped_group_key(&WrappedGroupKey {
        group_id,
        member_id,
        payload: envelope.to_bytes(),
    })?;

    notifier.notify(PushEvent::GroupKeyWrapped { group_id, member_id });
    Ok(())
}

/// Unwrap the group key as a member.
///
/// Fetches the member's wrapped row and the creator's published public
/// key, derives the pairwise session key locally, and decrypts. A missing
/// row yields [`LifecycleError::NoGroupKey`], which callers treat as
/// "group has no encryption configured" and fall back to plaintext mode
/// rather than deadlocking.
pub fn unwrap_group_key<S: Store>(
    store: &S,
    group_id: GroupId,
    member: &IdentityKeypair,
    member_id: UserId,
) -> Result<GroupKey, LifecycleError> {
    let row = store
        .wrapped_group_key(group_id, member_id)?
        .ok_or(LifecycleError::NoGroupKey(group_id))?;

    // A group without a recorded creator has no encryption configured.
    let creator_id =
        store.group_creator(group_id)?.ok_or(LifecycleError::NoGroupKey(group_id))?;
    let creator_key =
        store.identity_key(creator_id)?.ok_or(LifecycleError::KeyNotFound(creator_id))?;

    let session_key = member.derive_session_key(&creator_key);
    let envelope = Envelope::from_bytes(&row.payload)?;
    let key_bytes = decrypt(&envelope, &session_key)?;

    Ok(GroupKey::try_from_slice(&key_bytes)?)
}

/// Remove a member: drop them from the membership and delete their
/// wrapped key row.
///
/// Returns true if a row was deleted. Removing an already-removed member
/// is a no-op, not an error. The group key is not rotated (see module
/// docs).
pub fn remove_member<S: Store>(
    store: &S,
    group_id: GroupId,
    member_id: UserId,
) -> Result<bool, LifecycleError> {
    store.remove_group_member(group_id, member_id)?;
    let deleted = store.delete_wrapped_group_key(group_id, member_id)?;

    if deleted {
        debug!(group_id = group_id.0, member_id = member_id.0, "wrapped group key deleted");
    }

    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use rand::rngs::OsRng;

    use super::*;
    use crate::{event::CollectingNotifier, store::MemoryStore};

    fn published_keypair(store: &MemoryStore, user_id: UserId) -> IdentityKeypair {
        let keypair = IdentityKeypair::generate(&mut OsRng);
        store.publish_identity_key(user_id, keypair.public()).unwrap();
        keypair
    }

    #[test]
    fn creator_can_unwrap_their_own_row() {
        let store = MemoryStore::new();
        let notifier = CollectingNotifier::new();
        let group = GroupId(1);
        let creator_id = UserId(10);
        let creator = published_keypair(&store, creator_id);
        store.create_group(group, creator_id).unwrap();

        let (group_key, outcome) =
            create_group_key(&store, &notifier, group, &creator, &mut OsRng).unwrap();

        assert!(outcome.is_complete());
        assert_eq!(outcome.wrapped, vec![creator_id]);

        let unwrapped = unwrap_group_key(&store, group, &creator, creator_id).unwrap();
        assert_eq!(unwrapped, group_key);
    }

    #[test]
    fn member_unwraps_exact_key_bytes() {
        let store = MemoryStore::new();
        let notifier = CollectingNotifier::new();
        let group = GroupId(1);
        let creator_id = UserId(10);
        let member_id = UserId(20);

        let creator = published_keypair(&store, creator_id);
        let member = published_keypair(&store, member_id);
        store.create_group(group, creator_id).unwrap();
        store.add_group_member(group, member_id).unwrap();

        let (group_key, outcome) =
            create_group_key(&store, &notifier, group, &creator, &mut OsRng).unwrap();
        assert!(outcome.is_complete());

        let unwrapped = unwrap_group_key(&store, group, &member, member_id).unwrap();
        assert_eq!(unwrapped.to_bytes(), group_key.to_bytes());
    }

    #[test]
    fn late_joiner_gets_the_same_key_without_existing_members_acting() {
        let store = MemoryStore::new();
        let notifier = CollectingNotifier::new();
        let group = GroupId(1);
        let creator_id = UserId(10);
        let joiner_id = UserId(30);

        let creator = published_keypair(&store, creator_id);
        store.create_group(group, creator_id).unwrap();

        let (group_key, _) =
            create_group_key(&store, &notifier, group, &creator, &mut OsRng).unwrap();

        // Joiner is accepted after creation.
        let joiner = published_keypair(&store, joiner_id);
        store.add_group_member(group, joiner_id).unwrap();
        wrap_for_member(&store, &notifier, group, joiner_id, &group_key, &creator, &mut OsRng)
            .unwrap();

        let unwrapped = unwrap_group_key(&store, group, &joiner, joiner_id).unwrap();
        assert_eq!(unwrapped, group_key);
    }

    #[test]
    fn missing_row_is_no_group_key_not_a_hard_error() {
        let store = MemoryStore::new();
        let group = GroupId(1);
        let creator_id = UserId(10);
        let outsider_id = UserId(99);

        let _creator = published_keypair(&store, creator_id);
        store.create_group(group, creator_id).unwrap();

        let outsider = IdentityKeypair::generate(&mut OsRng);
        let err = unwrap_group_key(&store, group, &outsider, outsider_id).unwrap_err();

        assert!(err.is_recoverable());
        assert!(matches!(err, LifecycleError::NoGroupKey(g) if g == group));
    }

    #[test]
    fn unpublished_member_fails_without_aborting_batch() {
        let store = MemoryStore::new();
        let notifier = CollectingNotifier::new();
        let group = GroupId(1);
        let creator_id = UserId(10);
        let keyless_id = UserId(20);
        let ready_id = UserId(30);

        let creator = published_keypair(&store, creator_id);
        let _ready = published_keypair(&store, ready_id);
        store.create_group(group, creator_id).unwrap();
        store.add_group_member(group, keyless_id).unwrap(); // never published a key
        store.add_group_member(group, ready_id).unwrap();

        let (_, outcome) =
            create_group_key(&store, &notifier, group, &creator, &mut OsRng).unwrap();

        assert_eq!(outcome.wrapped, vec![creator_id, ready_id]);
        assert_eq!(outcome.failed.len(), 1);
        let (member, err) = &outcome.failed[0];
        assert_eq!(*member, keyless_id);
        assert!(matches!(
            err,
            LifecycleError::WrapFailed { member_id, .. } if *member_id == keyless_id
        ));

        // Failed member has no row; successful ones do.
        assert!(store.wrapped_group_key(group, keyless_id).unwrap().is_none());
        assert!(store.wrapped_group_key(group, ready_id).unwrap().is_some());
    }

    #[test]
    fn wrap_emits_one_event_per_stored_row() {
        let store = MemoryStore::new();
        let notifier = CollectingNotifier::new();
        let group = GroupId(1);
        let creator_id = UserId(10);
        let member_id = UserId(20);

        let creator = published_keypair(&store, creator_id);
        let _member = published_keypair(&store, member_id);
        store.create_group(group, creator_id).unwrap();
        store.add_group_member(group, member_id).unwrap();

        create_group_key(&store, &notifier, group, &creator, &mut OsRng).unwrap();

        let events = notifier.events();
        assert_eq!(events.len(), 2);
        assert!(events.contains(&PushEvent::GroupKeyWrapped { group_id: group, member_id }));
    }

    #[test]
    fn remove_member_deletes_exactly_one_row_and_is_idempotent() {
        let store = MemoryStore::new();
        let notifier = CollectingNotifier::new();
        let group = GroupId(1);
        let creator_id = UserId(10);
        let member_id = UserId(20);

        let creator = published_keypair(&store, creator_id);
        let _member = published_keypair(&store, member_id);
        store.create_group(group, creator_id).unwrap();
        store.add_group_member(group, member_id).unwrap();
        create_group_key(&store, &notifier, group, &creator, &mut OsRng).unwrap();
        assert_eq!(store.wrapped_key_count(), 2);

        assert!(remove_member(&store, group, member_id).unwrap());
        assert_eq!(store.wrapped_key_count(), 1);

        // Second removal is a no-op, not an error.
        assert!(!remove_member(&store, group, member_id).unwrap());
        assert_eq!(store.wrapped_key_count(), 1);
    }

    #[test]
    fn wrong_member_key_fails_with_decryption_error() {
        let store = MemoryStore::new();
        let notifier = CollectingNotifier::new();
        let group = GroupId(1);
        let creator_id = UserId(10);
        let member_id = UserId(20);

        let creator = published_keypair(&store, creator_id);
        let _member = published_keypair(&store, member_id);
        store.create_group(group, creator_id).unwrap();
        store.add_group_member(group, member_id).unwrap();
        create_group_key(&store, &notifier, group, &creator, &mut OsRng).unwrap();

        // An impostor keypair cannot derive the right session key.
        let impostor = IdentityKeypair::generate(&mut OsRng);
        let result = unwrap_group_key(&store, group, &impostor, member_id);

        assert!(matches!(
            result,
            Err(LifecycleError::Crypto(quietwire_crypto::CryptoError::DecryptionFailed { .. }))
        ));
    }
}
