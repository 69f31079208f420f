//! Store-side registry of listeners and snapshot broadcasting.

use crossbeam_channel::{bounded, Sender};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

use super::types::{
    DropReason, ListenEvent, ListenTarget, SubscriptionConfig, SubscriptionHandle, SubscriptionId,
};
use crate::snapshot::Snapshot;

/// Internal subscription state.
struct Subscription {
    target: ListenTarget,
    sender: Sender<ListenEvent>,
    /// Snapshot slots; the channel holds one extra slot for the drop notice.
    buffer_size: usize,
}

impl Subscription {
    /// Try to send a snapshot. Returns false if the buffer is full.
    fn try_send(&self, event: ListenEvent) -> bool {
        if self.sender.len() >= self.buffer_size {
            return false;
        }
        self.sender.try_send(event).is_ok()
    }

    fn notify_dropped(&self, id: SubscriptionId, reason: DropReason) {
        // Best effort: the receiver may already be gone.
        let _ = self.sender.try_send(ListenEvent::Dropped {
            subscription: id,
            reason,
        });
    }
}

/// Tracks live listeners and pushes snapshots to them.
pub struct SubscriptionManager {
    /// Active subscriptions by ID.
    subscriptions: RwLock<HashMap<SubscriptionId, Subscription>>,
    /// Counter for generating subscription IDs.
    next_id: AtomicU64,
}

impl SubscriptionManager {
    /// Create a new subscription manager.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            subscriptions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        })
    }

    /// Register a listener for `target`.
    ///
    /// The returned handle unregisters itself when released or dropped; it
    /// holds only a weak reference, so it may outlive the manager.
    pub fn subscribe(self: &Arc<Self>, target: ListenTarget, config: &SubscriptionConfig) -> SubscriptionHandle {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let buffer_size = config.buffer_size.max(1);
        let (sender, receiver) = bounded(buffer_size + 1);

        debug!(subscription = id.0, path = %target.path(), "listener registered");
        self.subscriptions.write().insert(
            id,
            Subscription {
                target,
                sender,
                buffer_size,
            },
        );

        let manager: Weak<Self> = Arc::downgrade(self);
        SubscriptionHandle::new(id, receiver, move |id| {
            if let Some(manager) = manager.upgrade() {
                manager.unsubscribe(id);
            }
        })
    }

    /// Unsubscribe and clean up. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        if self.subscriptions.write().remove(&id).is_some() {
            debug!(subscription = id.0, "listener released");
        }
    }

    /// Get subscription count.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    /// Send a snapshot directly to one subscription.
    /// Returns false if the subscription is gone or was dropped.
    pub fn send_to(&self, id: SubscriptionId, snapshot: Snapshot) -> bool {
        let delivered = {
            let subs = self.subscriptions.read();
            match subs.get(&id) {
                Some(sub) => sub.try_send(ListenEvent::Snapshot {
                    subscription: id,
                    snapshot,
                }),
                None => return false,
            }
        };
        if !delivered {
            self.drop_subscriptions(vec![id], DropReason::BufferOverflow);
        }
        delivered
    }

    /// Push a snapshot to every subscription for which `snapshot_for`
    /// returns one. Drops subscribers whose buffer is full.
    pub fn broadcast<F>(&self, mut snapshot_for: F)
    where
        F: FnMut(&ListenTarget) -> Option<Snapshot>,
    {
        let mut to_remove = Vec::new();

        {
            let subs = self.subscriptions.read();
            for (id, sub) in subs.iter() {
                let Some(snapshot) = snapshot_for(&sub.target) else {
                    continue;
                };
                let event = ListenEvent::Snapshot {
                    subscription: *id,
                    snapshot,
                };
                if !sub.try_send(event) {
                    to_remove.push(*id);
                }
            }
        }

        if !to_remove.is_empty() {
            self.drop_subscriptions(to_remove, DropReason::BufferOverflow);
        }
    }

    /// Terminate every subscription whose target matches, notifying it.
    pub fn fail_matching<F>(&self, matches: F, reason: DropReason) -> usize
    where
        F: Fn(&ListenTarget) -> bool,
    {
        let ids: Vec<SubscriptionId> = self
            .subscriptions
            .read()
            .iter()
            .filter(|(_, sub)| matches(&sub.target))
            .map(|(id, _)| *id)
            .collect();
        let count = ids.len();
        self.drop_subscriptions(ids, reason);
        count
    }

    fn drop_subscriptions(&self, ids: Vec<SubscriptionId>, reason: DropReason) {
        let mut subs = self.subscriptions.write();
        for id in ids {
            if let Some(sub) = subs.remove(&id) {
                warn!(subscription = id.0, ?reason, "dropping subscriber");
                sub.notify_dropped(id, reason.clone());
            }
        }
    }
}
