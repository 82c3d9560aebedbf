//! Read-triggered disappearing messages.
//!
//! State machine per `(message, recipient)` read-status row:
//!
//! ```text
//! Unread → Read → (toggle on) TimerArmed → Expired/Deleted
//! ```
//!
//! The deadline is stamped at read time as `read_at + TTL`, where the TTL
//! is the personal default of the user who *enabled* the toggle on the
//! conversation - never the reading user's own preference. A periodic
//! sweep then turns overdue deadlines into per-recipient deletion markers.
//!
//! The sweep is a fixed-interval poll over a bounded batch. Idempotence
//! comes from the marker uniqueness constraint: a second sweep over the
//! same rows inserts nothing and fires no events, so overlapping or
//! repeated sweeps are harmless.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::{sync::watch, time::MissedTickBehavior};
use tracing::{debug, warn};

use crate::{
    error::{LifecycleError, StoreError},
    event::{Notifier, PushEvent},
    model::{ConversationId, ConversationSettings, MessageId, ReadStatus, TimestampMs, UserId},
    store::Store,
};

/// TTL applied when the enabling user never chose a personal default.
/// Matches the application default of one day.
pub const DEFAULT_DISAPPEARING_TTL_MS: u64 = 86_400_000;

/// How often the scheduler sweeps by default.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Maximum rows processed per sweep cycle by default. Stragglers are
/// picked up next cycle.
pub const DEFAULT_SWEEP_BATCH: usize = 256;

/// Create unread read-status rows for a message's recipients.
///
/// One row per participant other than the sender. Rows start unread with
/// no deadline; the deadline is only ever stamped at read time.
pub fn register_message<S: Store>(
    store: &S,
    message_id: MessageId,
    conversation_id: ConversationId,
    sender: UserId,
    participants: &[UserId],
) -> Result<(), LifecycleError> {
    for &user_id in participants.iter().filter(|&&p| p != sender) {
        store.insert_read_status(&ReadStatus::unread(message_id, user_id, conversation_id))?;
    }
    Ok(())
}

/// Mark a message read by one recipient.
///
/// Stamps `read_at`, and - iff the conversation has disappearing messages
/// enabled - arms the deletion timer on this recipient's row only:
/// `delete_at = now + enabler_default_ttl`. Other recipients' rows are
/// untouched; deletion is per-user throughout.
///
/// Returns the armed deadline, `None` if no timer applies. Reading twice
/// is idempotent: the original `read_at` and deadline are kept.
pub fn mark_read<S: Store>(
    store: &S,
    message_id: MessageId,
    user_id: UserId,
    now: TimestampMs,
) -> Result<Option<TimestampMs>, LifecycleError> {
    let Some(mut row) = store.read_status(message_id, user_id)? else {
        // Reader is not a recipient of this message; nothing to track.
        return Ok(None);
    };

    if row.is_read {
        return Ok(row.delete_at);
    }

    row.is_read = true;
    row.read_at = Some(now);
    row.delete_at = disappearing_deadline(store, row.conversation_id, now)?;

    store.update_read_status(&row)?;
    Ok(row.delete_at)
}

/// Compute the deadline for a message read at `now`, if the conversation's
/// toggle is on.
fn disappearing_deadline<S: Store>(
    store: &S,
    conversation_id: ConversationId,
    now: TimestampMs,
) -> Result<Option<TimestampMs>, LifecycleError> {
    // A conversation whose toggle was never touched retains plaintext.
    let settings = store
        .conversation_settings(conversation_id)?
        .unwrap_or_else(ConversationSettings::plaintext_retention);
    if !settings.disappearing_enabled {
        return Ok(None);
    }
    let Some(enabler) = settings.enabled_by else {
        return Ok(None);
    };

    let ttl = store.default_disappearing_ms(enabler)?.unwrap_or(DEFAULT_DISAPPEARING_TTL_MS);
    Ok(Some(now.saturating_add(ttl)))
}

/// Flip a conversation's disappearing-messages toggle.
///
/// Enabling records `enabled_by`, which selects whose default TTL applies
/// to every subsequent read in the conversation. Toggling never
/// retroactively stamps deadlines on already-read messages.
pub fn set_disappearing<S: Store>(
    store: &S,
    conversation_id: ConversationId,
    enabled: bool,
    toggled_by: UserId,
) -> Result<ConversationSettings, LifecycleError> {
    let settings = ConversationSettings {
        disappearing_enabled: enabled,
        enabled_by: enabled.then_some(toggled_by),
    };
    store.set_conversation_settings(conversation_id, &settings)?;
    Ok(settings)
}

/// Counters from one sweep cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Markers newly inserted (one event fired each).
    pub deleted: usize,
    /// Rows whose marker already existed (no event fired).
    pub already_marked: usize,
    /// Rows whose marker write failed; they stay eligible next cycle.
    pub failed: usize,
}

/// One sweep pass: soft-delete every overdue read-status row.
///
/// Selects up to `batch_limit` rows that are read, past their deadline,
/// and not yet marked; inserts a deletion marker for each and fires
/// [`PushEvent::MessageDeleted`] once per *newly inserted* marker.
///
/// Idempotent and safe to run concurrently with itself: the marker insert
/// is a check-then-insert under a uniqueness constraint, so a second
/// overlapping sweep cannot double-insert or double-notify. One row's
/// write failure is logged and never aborts the rest of the batch.
///
/// # Errors
///
/// Only the due-row query itself can fail; per-row failures are counted
/// in the report.
pub fn sweep<S: Store, N: Notifier>(
    store: &S,
    notifier: &N,
    now: TimestampMs,
    batch_limit: usize,
) -> Result<SweepReport, StoreError> {
    let due = store.due_read_statuses(now, batch_limit)?;
    let mut report = SweepReport::default();

    for row in due {
        match store.insert_deletion_marker(row.message_id, row.user_id) {
            Ok(true) => {
                notifier.notify(PushEvent::MessageDeleted {
                    message_id: row.message_id,
                    user_id: row.user_id,
                });
                report.deleted += 1;
            },
            Ok(false) => report.already_marked += 1,
            Err(err) => {
                // No marker was written, so the row stays eligible and
                // is retried on the next cycle.
                warn!(
                    message_id = row.message_id.0,
                    user_id = row.user_id.0,
                    error = %err,
                    "deletion marker write failed; row will be retried"
                );
                report.failed += 1;
            },
        }
    }

    Ok(report)
}

/// Background task running the sweep at a fixed interval.
///
/// A single task per deployment: one loop means two sweeps can never
/// overlap. Stopping via [`SchedulerHandle::stop`] (or dropping the
/// handle) is observed between sweeps; an in-flight sweep always runs its
/// rows to completion first. Multi-instance deployments would need to
/// elect one sweeper or make the marker insert SQL-level atomic, which
/// this implementation does not attempt.
pub struct Scheduler<S, N> {
    store: S,
    notifier: N,
    interval: Duration,
    batch_limit: usize,
    clock: Box<dyn Fn() -> TimestampMs + Send>,
    stop_rx: watch::Receiver<bool>,
}

/// Stops a running [`Scheduler`].
pub struct SchedulerHandle {
    stop_tx: watch::Sender<bool>,
}

impl SchedulerHandle {
    /// Ask the scheduler to stop after the current sweep (if any).
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }
}

fn system_now_ms() -> TimestampMs {
    SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |d| d.as_millis() as u64)
}

impl<S: Store, N: Notifier> Scheduler<S, N> {
    /// Create a scheduler with the default interval, batch size, and the
    /// system clock.
    pub fn new(store: S, notifier: N) -> (Self, SchedulerHandle) {
        Self::with_clock(store, notifier, Box::new(system_now_ms))
    }

    /// Create a scheduler with an injected clock. Tests pair this with
    /// paused tokio time to drive sweeps deterministically.
    pub fn with_clock(
        store: S,
        notifier: N,
        clock: Box<dyn Fn() -> TimestampMs + Send>,
    ) -> (Self, SchedulerHandle) {
        let (stop_tx, stop_rx) = watch::channel(false);
        let scheduler = Self {
            store,
            notifier,
            interval: DEFAULT_SWEEP_INTERVAL,
            batch_limit: DEFAULT_SWEEP_BATCH,
            clock,
            stop_rx,
        };
        (scheduler, SchedulerHandle { stop_tx })
    }

    /// Override the sweep interval.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Override the per-cycle batch limit.
    pub fn batch_limit(mut self, limit: usize) -> Self {
        self.batch_limit = limit;
        self
    }

    /// Run until stopped. The first sweep fires immediately, then once
    /// per interval.
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let now = (self.clock)();
                    match sweep(&self.store, &self.notifier, now, self.batch_limit) {
                        Ok(report) if report.deleted > 0 || report.failed > 0 => {
                            debug!(
                                deleted = report.deleted,
                                already_marked = report.already_marked,
                                failed = report.failed,
                                "sweep completed"
                            );
                        },
                        Ok(_) => {},
                        Err(err) => {
                            warn!(error = %err, "sweep query failed; retrying next cycle");
                        },
                    }
                },
                changed = self.stop_rx.changed() => {
                    // A dropped handle also stops the loop.
                    if changed.is_err() || *self.stop_rx.borrow() {
                        break;
                    }
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{event::CollectingNotifier, store::MemoryStore};

    const CONVERSATION: ConversationId = ConversationId(7);
    const ENABLER: UserId = UserId(1);
    const READER: UserId = UserId(2);

    fn store_with_enabled_toggle(enabler_ttl_ms: u64) -> MemoryStore {
        let store = MemoryStore::new();
        store.set_default_disappearing_ms(ENABLER, enabler_ttl_ms).unwrap();
        set_disappearing(&store, CONVERSATION, true, ENABLER).unwrap();
        store
    }

    #[test]
    fn register_skips_the_sender() {
        let store = MemoryStore::new();
        let participants = [UserId(1), UserId(2), UserId(3)];

        register_message(&store, MessageId(1), CONVERSATION, UserId(1), &participants).unwrap();

        assert!(store.read_status(MessageId(1), UserId(1)).unwrap().is_none());
        assert!(store.read_status(MessageId(1), UserId(2)).unwrap().is_some());
        assert!(store.read_status(MessageId(1), UserId(3)).unwrap().is_some());
    }

    #[test]
    fn deadline_uses_the_enablers_ttl_not_the_readers() {
        let store = store_with_enabled_toggle(300_000);
        // The reader's own preference must be ignored.
        store.set_default_disappearing_ms(READER, 5_000).unwrap();
        register_message(&store, MessageId(1), CONVERSATION, ENABLER, &[ENABLER, READER])
            .unwrap();

        let deadline = mark_read(&store, MessageId(1), READER, 1_000).unwrap();

        assert_eq!(deadline, Some(301_000));
    }

    #[test]
    fn no_deadline_when_toggle_is_off() {
        let store = MemoryStore::new();
        register_message(&store, MessageId(1), CONVERSATION, ENABLER, &[ENABLER, READER])
            .unwrap();

        let deadline = mark_read(&store, MessageId(1), READER, 1_000).unwrap();

        assert_eq!(deadline, None);
        let row = store.read_status(MessageId(1), READER).unwrap().unwrap();
        assert!(row.is_read);
        assert_eq!(row.read_at, Some(1_000));
        assert_eq!(row.delete_at, None);
    }

    #[test]
    fn enabling_after_read_is_not_retroactive() {
        let store = MemoryStore::new();
        register_message(&store, MessageId(1), CONVERSATION, ENABLER, &[ENABLER, READER])
            .unwrap();
        mark_read(&store, MessageId(1), READER, 1_000).unwrap();

        set_disappearing(&store, CONVERSATION, true, ENABLER).unwrap();

        // Re-reading is idempotent and must not stamp a deadline now.
        let deadline = mark_read(&store, MessageId(1), READER, 2_000).unwrap();
        assert_eq!(deadline, None);

        let row = store.read_status(MessageId(1), READER).unwrap().unwrap();
        assert_eq!(row.read_at, Some(1_000));
        assert_eq!(row.delete_at, None);
    }

    #[test]
    fn enabler_without_personal_ttl_falls_back_to_default() {
        let store = MemoryStore::new();
        set_disappearing(&store, CONVERSATION, true, ENABLER).unwrap();
        register_message(&store, MessageId(1), CONVERSATION, ENABLER, &[ENABLER, READER])
            .unwrap();

        let deadline = mark_read(&store, MessageId(1), READER, 0).unwrap();

        assert_eq!(deadline, Some(DEFAULT_DISAPPEARING_TTL_MS));
    }

    #[test]
    fn other_recipients_rows_are_untouched_by_a_read() {
        let store = store_with_enabled_toggle(300_000);
        let third = UserId(3);
        register_message(&store, MessageId(1), CONVERSATION, ENABLER, &[ENABLER, READER, third])
            .unwrap();

        mark_read(&store, MessageId(1), READER, 1_000).unwrap();

        let other = store.read_status(MessageId(1), third).unwrap().unwrap();
        assert!(!other.is_read);
        assert_eq!(other.delete_at, None);
    }

    #[test]
    fn sweep_marks_overdue_rows_and_notifies_once_each() {
        let store = store_with_enabled_toggle(300_000);
        let notifier = CollectingNotifier::new();
        register_message(&store, MessageId(1), CONVERSATION, ENABLER, &[ENABLER, READER])
            .unwrap();
        mark_read(&store, MessageId(1), READER, 1_000).unwrap();

        // Before the deadline nothing happens.
        let report = sweep(&store, &notifier, 200_000, DEFAULT_SWEEP_BATCH).unwrap();
        assert_eq!(report, SweepReport::default());
        assert!(notifier.is_empty());

        // At the deadline the row is marked and one event fires.
        let report = sweep(&store, &notifier, 301_000, DEFAULT_SWEEP_BATCH).unwrap();
        assert_eq!(report.deleted, 1);
        assert!(store.has_deletion_marker(MessageId(1), READER).unwrap());
        assert_eq!(
            notifier.events(),
            vec![PushEvent::MessageDeleted { message_id: MessageId(1), user_id: READER }]
        );
    }

    #[test]
    fn double_sweep_is_idempotent() {
        let store = store_with_enabled_toggle(100);
        let notifier = CollectingNotifier::new();

        for i in 0..3u128 {
            register_message(&store, MessageId(i), CONVERSATION, ENABLER, &[ENABLER, READER])
                .unwrap();
            mark_read(&store, MessageId(i), READER, 0).unwrap();
        }

        let first = sweep(&store, &notifier, 1_000, DEFAULT_SWEEP_BATCH).unwrap();
        let second = sweep(&store, &notifier, 1_000, DEFAULT_SWEEP_BATCH).unwrap();

        assert_eq!(first.deleted, 3);
        assert_eq!(second, SweepReport::default());
        assert_eq!(store.deletion_marker_count(), 3);
        assert_eq!(notifier.len(), 3);
    }

    #[test]
    fn sweep_respects_batch_limit_and_catches_up() {
        let store = store_with_enabled_toggle(100);
        let notifier = CollectingNotifier::new();

        for i in 0..5u128 {
            register_message(&store, MessageId(i), CONVERSATION, ENABLER, &[ENABLER, READER])
                .unwrap();
            mark_read(&store, MessageId(i), READER, 0).unwrap();
        }

        let first = sweep(&store, &notifier, 1_000, 2).unwrap();
        assert_eq!(first.deleted, 2);

        let second = sweep(&store, &notifier, 1_000, 2).unwrap();
        let third = sweep(&store, &notifier, 1_000, 2).unwrap();
        assert_eq!(first.deleted + second.deleted + third.deleted, 5);
        assert_eq!(store.deletion_marker_count(), 5);
    }

    #[test]
    fn explicit_deletion_before_sweep_counts_as_already_marked() {
        let store = store_with_enabled_toggle(100);
        let notifier = CollectingNotifier::new();
        register_message(&store, MessageId(1), CONVERSATION, ENABLER, &[ENABLER, READER])
            .unwrap();
        mark_read(&store, MessageId(1), READER, 0).unwrap();

        // User deleted the message for themselves before the timer fired.
        store.insert_deletion_marker(MessageId(1), READER).unwrap();

        let report = sweep(&store, &notifier, 1_000, DEFAULT_SWEEP_BATCH).unwrap();
        // The due query already excludes marked rows.
        assert_eq!(report, SweepReport::default());
        assert!(notifier.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn scheduler_sweeps_on_its_interval_and_stops_cleanly() {
        let store = store_with_enabled_toggle(100);
        let notifier = CollectingNotifier::new();
        register_message(&store, MessageId(1), CONVERSATION, ENABLER, &[ENABLER, READER])
            .unwrap();
        mark_read(&store, MessageId(1), READER, 0).unwrap();

        let (scheduler, handle) =
            Scheduler::with_clock(store.clone(), notifier.clone(), Box::new(|| 1_000));
        let task = tokio::spawn(scheduler.interval(Duration::from_secs(30)).run());

        // Paused time auto-advances; one interval is enough for the first
        // sweep to have fired.
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert!(store.has_deletion_marker(MessageId(1), READER).unwrap());
        assert_eq!(notifier.len(), 1);

        handle.stop();
        task.await.unwrap();
    }

    mod properties {
        use proptest::prelude::*;

        use super::*;

        proptest! {
            #[test]
            fn deadline_is_read_time_plus_enabler_ttl(
                ttl in 1u64..=u64::MAX / 2,
                read_at in 0u64..=u64::MAX / 2,
            ) {
                let store = MemoryStore::new();
                store.set_default_disappearing_ms(ENABLER, ttl).unwrap();
                set_disappearing(&store, CONVERSATION, true, ENABLER).unwrap();
                register_message(&store, MessageId(1), CONVERSATION, ENABLER, &[ENABLER, READER])
                    .unwrap();

                let deadline = mark_read(&store, MessageId(1), READER, read_at).unwrap();
                prop_assert_eq!(deadline, Some(read_at + ttl));
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_handle_stops_the_scheduler() {
        let store = MemoryStore::new();
        let (scheduler, handle) =
            Scheduler::with_clock(store, crate::event::NullNotifier, Box::new(|| 0));
        let task = tokio::spawn(scheduler.run());

        drop(handle);
        task.await.unwrap();
    }
}
