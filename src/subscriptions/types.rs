//! Subscription types for live snapshot delivery.

use crate::query::Query;
use crate::snapshot::Snapshot;
use crate::types::{CollectionRef, DocumentRef};
use crossbeam_channel::Receiver;
use std::fmt;

/// Configuration for a subscription.
#[derive(Clone, Debug)]
pub struct SubscriptionConfig {
    /// Max buffered snapshots before the subscriber is dropped.
    /// Default: 1000
    pub buffer_size: usize,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self { buffer_size: 1000 }
    }
}

/// What a listener watches.
#[derive(Clone, Debug, PartialEq)]
pub enum ListenTarget {
    Query(Query),
    Document(DocumentRef),
}

impl ListenTarget {
    pub fn collection(&self) -> &CollectionRef {
        match self {
            ListenTarget::Query(query) => query.collection_ref(),
            ListenTarget::Document(doc) => doc.collection(),
        }
    }

    /// Slash-separated path, used for permission checks and logs.
    pub fn path(&self) -> String {
        match self {
            ListenTarget::Query(query) => query.collection_ref().path().to_string(),
            ListenTarget::Document(doc) => doc.path(),
        }
    }

    /// Whether a write to `doc` can change what this target sees.
    pub fn affected_by(&self, doc: &DocumentRef) -> bool {
        match self {
            ListenTarget::Query(_) => self.collection() == doc.collection(),
            ListenTarget::Document(target) => target == doc,
        }
    }
}

impl From<Query> for ListenTarget {
    fn from(query: Query) -> Self {
        ListenTarget::Query(query)
    }
}

impl From<DocumentRef> for ListenTarget {
    fn from(doc: DocumentRef) -> Self {
        ListenTarget::Document(doc)
    }
}

/// Events pushed to a subscriber.
#[derive(Clone, Debug, PartialEq)]
pub enum ListenEvent {
    /// Current state of the target.
    Snapshot {
        subscription: SubscriptionId,
        snapshot: Snapshot,
    },

    /// The store terminated the subscription; no further events follow.
    Dropped {
        subscription: SubscriptionId,
        reason: DropReason,
    },
}

impl ListenEvent {
    pub fn subscription(&self) -> SubscriptionId {
        match self {
            ListenEvent::Snapshot { subscription, .. } => *subscription,
            ListenEvent::Dropped { subscription, .. } => *subscription,
        }
    }
}

/// Why a subscription was dropped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DropReason {
    /// Send buffer overflowed (slow consumer).
    BufferOverflow,
    /// The store stopped delivering without saying why.
    Disconnected,
    /// Access to the target was revoked mid-stream.
    PermissionDenied(String),
    /// Internal store error.
    Error(String),
}

/// Unique identifier for a subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

type Release = Box<dyn FnOnce(SubscriptionId) + Send>;

/// Owned registration of one listener.
///
/// Releasing is idempotent, and dropping the handle releases it.
pub struct SubscriptionHandle {
    id: SubscriptionId,
    receiver: Receiver<ListenEvent>,
    release: Option<Release>,
}

impl SubscriptionHandle {
    pub fn new(
        id: SubscriptionId,
        receiver: Receiver<ListenEvent>,
        release: impl FnOnce(SubscriptionId) + Send + 'static,
    ) -> Self {
        Self {
            id,
            receiver,
            release: Some(Box::new(release)),
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// False once the handle has been released.
    pub fn is_active(&self) -> bool {
        self.release.is_some()
    }

    /// Release the listener registration. Safe to call more than once.
    pub fn unsubscribe(&mut self) {
        if let Some(release) = self.release.take() {
            release(self.id);
        }
    }

    /// Receive the next event (blocking).
    pub fn recv(&self) -> Result<ListenEvent, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> Result<ListenEvent, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<ListenEvent, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}
