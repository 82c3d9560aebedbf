//! Push events fired at the transport collaborator.
//!
//! The lifecycle never talks to a socket; it hands events to a
//! [`Notifier`] and the transport layer decides how to deliver them to
//! live sessions. Delivery is fire-and-forget: a session that is offline
//! simply misses the push and reconciles from storage on reconnect.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::model::{GroupId, MessageId, UserId};

/// Events the key lifecycle emits for live-session delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushEvent {
    /// A message was soft-deleted for one user.
    ///
    /// Fired exactly once per successful deletion-marker insert; a sweep
    /// that finds the marker already present does not fire again.
    MessageDeleted {
        /// The hidden message.
        message_id: MessageId,
        /// The user it is now hidden from.
        user_id: UserId,
    },

    /// A group key was wrapped and stored for one member.
    ///
    /// Fired once per stored `WrappedGroupKey` row, both at group creation
    /// and when a later join is accepted.
    GroupKeyWrapped {
        /// Group whose key was wrapped.
        group_id: GroupId,
        /// Member who can now unwrap it.
        member_id: UserId,
    },
}

/// Sink for push events.
///
/// Implementations must be cheap to clone and must never block: the sweep
/// loop calls `notify` while iterating rows.
pub trait Notifier: Clone + Send + Sync + 'static {
    /// Deliver one event. Infallible by design; an undeliverable push is
    /// dropped, not retried (storage remains the source of truth).
    fn notify(&self, event: PushEvent);
}

/// Notifier that forwards events into a tokio channel.
///
/// The production wiring: the transport layer owns the receiving half and
/// fans events out to connected sessions.
#[derive(Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<PushEvent>,
}

impl ChannelNotifier {
    /// Create a notifier and the receiver the transport layer drains.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PushEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, event: PushEvent) {
        // A closed receiver means no transport is listening; drop the event.
        let _ = self.tx.send(event);
    }
}

/// Notifier that discards everything. For deployments without a push
/// transport and for tests that do not assert on events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&self, _event: PushEvent) {}
}

/// Notifier that records every event for later assertion. Test-only in
/// spirit, but exported so downstream crates can use it in their tests.
#[derive(Clone, Default)]
pub struct CollectingNotifier {
    events: Arc<Mutex<Vec<PushEvent>>>,
}

impl CollectingNotifier {
    /// Create an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all events received so far, in delivery order.
    pub fn events(&self) -> Vec<PushEvent> {
        self.events.lock().map(|guard| guard.clone()).unwrap_or_default()
    }

    /// Number of events received so far.
    pub fn len(&self) -> usize {
        self.events.lock().map(|guard| guard.len()).unwrap_or(0)
    }

    /// True if no events were received.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Notifier for CollectingNotifier {
    fn notify(&self, event: PushEvent) {
        if let Ok(mut guard) = self.events.lock() {
            guard.push(event);
        }
    }
}
