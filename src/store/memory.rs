//! In-process document store with live listeners.

use crate::error::{Result, StoreError};
use crate::query::Query;
use crate::snapshot::{
    get_field, DocumentSnapshot, PendingTimestamp, QuerySnapshot, RawDocument, Snapshot,
};
use crate::subscriptions::{
    DropReason, ListenTarget, SubscriptionConfig, SubscriptionHandle, SubscriptionManager,
};
use crate::types::{CollectionRef, DocumentRef, RecordId, Timestamp};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

use super::{DocumentStore, DocumentWrite};

/// Memory store configuration.
#[derive(Clone, Debug)]
pub struct MemoryStoreConfig {
    /// Keep server-timestamp fields pending until `commit_pending`.
    /// When false, every write is committed immediately.
    pub latency_compensation: bool,
}

impl Default for MemoryStoreConfig {
    fn default() -> Self {
        Self {
            latency_compensation: true,
        }
    }
}

#[derive(Default)]
struct AccessRules {
    /// Path prefixes that reject reads and listens.
    denied: Vec<String>,
    offline: bool,
}

impl AccessRules {
    fn check(&self, path: &str) -> Result<()> {
        if self.offline {
            return Err(StoreError::Unavailable("store is offline".into()));
        }
        if self.denied.iter().any(|prefix| covers(prefix, path)) {
            return Err(StoreError::PermissionDenied(path.to_string()));
        }
        Ok(())
    }
}

/// True if `path` equals `prefix` or lies beneath it.
fn covers(prefix: &str, path: &str) -> bool {
    path == prefix
        || path
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}

type Collection = BTreeMap<RecordId, RawDocument>;

struct Inner {
    config: MemoryStoreConfig,
    collections: RwLock<HashMap<CollectionRef, Collection>>,
    subscriptions: Arc<SubscriptionManager>,
    rules: RwLock<AccessRules>,
    /// One-shot reads served.
    reads: AtomicU64,
    /// Serializes writes, listens and their broadcasts.
    write_lock: Mutex<()>,
}

/// Shared, cloneable in-memory store.
///
/// Writes are visible to listeners immediately. Fields requested with
/// [`DocumentWrite::server_timestamp`] stay pending, carrying a local
/// estimate, until [`MemoryStore::commit_pending`] plays the server
/// acknowledgement.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    /// Create an empty store with the default config.
    pub fn new() -> Self {
        Self::with_config(MemoryStoreConfig::default())
    }

    /// Create an empty store.
    pub fn with_config(config: MemoryStoreConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                collections: RwLock::new(HashMap::new()),
                subscriptions: SubscriptionManager::new(),
                rules: RwLock::new(AccessRules::default()),
                reads: AtomicU64::new(0),
                write_lock: Mutex::new(()),
            }),
        }
    }

    // --- Writes ---

    /// Create or replace a document.
    pub fn set(&self, doc: &DocumentRef, write: DocumentWrite) -> Result<()> {
        let _lock = self.inner.write_lock.lock();
        {
            let mut collections = self.inner.collections.write();
            let collection = collections.entry(doc.collection().clone()).or_default();
            let previous = collection.get(doc.id());
            let raw = self.apply_write(RawDocument::default(), previous, write);
            collection.insert(doc.id().clone(), raw);
        }
        debug!(path = %doc.path(), "document set");
        self.broadcast_change(doc);
        Ok(())
    }

    /// Merge fields into an existing document.
    pub fn update(&self, doc: &DocumentRef, write: DocumentWrite) -> Result<()> {
        let _lock = self.inner.write_lock.lock();
        {
            let mut collections = self.inner.collections.write();
            let existing = collections
                .get_mut(doc.collection())
                .and_then(|c| c.get_mut(doc.id()))
                .ok_or_else(|| StoreError::NotFound(doc.path()))?;
            let base = existing.clone();
            *existing = self.apply_write(base.clone(), Some(&base), write);
        }
        debug!(path = %doc.path(), "document updated");
        self.broadcast_change(doc);
        Ok(())
    }

    /// Delete a document. Deleting a missing document is a no-op.
    pub fn delete(&self, doc: &DocumentRef) -> Result<()> {
        let _lock = self.inner.write_lock.lock();
        let removed = self
            .inner
            .collections
            .write()
            .get_mut(doc.collection())
            .and_then(|c| c.remove(doc.id()))
            .is_some();
        if removed {
            debug!(path = %doc.path(), "document deleted");
            self.broadcast_change(doc);
        }
        Ok(())
    }

    /// Acknowledge every pending write, stamping server times with now.
    pub fn commit_pending(&self) -> usize {
        self.commit_pending_at(Timestamp::now())
    }

    /// Acknowledge every pending write, stamping server times with `at`.
    /// Returns the number of documents committed.
    pub fn commit_pending_at(&self, at: Timestamp) -> usize {
        let _lock = self.inner.write_lock.lock();
        let mut committed = Vec::new();
        {
            let mut collections = self.inner.collections.write();
            for (collection, docs) in collections.iter_mut() {
                for (id, raw) in docs.iter_mut().filter(|(_, raw)| raw.has_pending()) {
                    raw.commit_pending(at);
                    if let Ok(doc) = collection.doc(id.clone()) {
                        committed.push(doc);
                    }
                }
            }
        }
        for doc in &committed {
            self.broadcast_change(doc);
        }
        debug!(count = committed.len(), "pending writes committed");
        committed.len()
    }

    fn apply_write(
        &self,
        mut raw: RawDocument,
        previous: Option<&RawDocument>,
        write: DocumentWrite,
    ) -> RawDocument {
        for (path, value) in write.fields {
            raw.write_field(&path, value);
        }

        let now = Timestamp::now();
        for field in write.server_timestamps {
            let committed = previous.and_then(|p| get_field(p.fields(), &field).cloned());
            raw.mark_pending(
                field,
                PendingTimestamp {
                    estimate: now,
                    previous: committed,
                },
            );
        }
        if !self.inner.config.latency_compensation {
            raw.commit_pending(now);
        }
        raw
    }

    // --- Access control & faults ---

    /// Reject reads and listens at or below `prefix`, and terminate the
    /// listeners already registered there.
    pub fn deny(&self, prefix: &str) -> usize {
        self.inner.rules.write().denied.push(prefix.to_string());
        self.fail_listeners(prefix, DropReason::PermissionDenied(prefix.to_string()))
    }

    /// Lift every rule added with [`MemoryStore::deny`] for `prefix`.
    pub fn allow(&self, prefix: &str) {
        self.inner.rules.write().denied.retain(|p| p != prefix);
    }

    /// Make every read and listen fail with `Unavailable`.
    pub fn set_offline(&self, offline: bool) {
        self.inner.rules.write().offline = offline;
    }

    /// Terminate listeners at or below `prefix` mid-stream.
    pub fn fail_listeners(&self, prefix: &str, reason: DropReason) -> usize {
        self.inner
            .subscriptions
            .fail_matching(|target| covers(prefix, &target.path()), reason)
    }

    // --- Introspection ---

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.inner.subscriptions.subscription_count()
    }

    /// Number of one-shot reads served so far.
    pub fn read_count(&self) -> u64 {
        self.inner.reads.load(Ordering::SeqCst)
    }

    // --- Snapshots ---

    fn snapshot_for(&self, target: &ListenTarget) -> Snapshot {
        match target {
            ListenTarget::Query(query) => Snapshot::Query(self.query_snapshot(query)),
            ListenTarget::Document(doc) => Snapshot::Document(self.document_snapshot(doc)),
        }
    }

    fn query_snapshot(&self, query: &Query) -> QuerySnapshot {
        let collections = self.inner.collections.read();
        let entries = collections
            .get(query.collection_ref())
            .map(|docs| query.evaluate(docs.iter()))
            .unwrap_or_default();
        QuerySnapshot::new(entries)
    }

    fn document_snapshot(&self, doc: &DocumentRef) -> DocumentSnapshot {
        let raw = self
            .inner
            .collections
            .read()
            .get(doc.collection())
            .and_then(|docs| docs.get(doc.id()))
            .cloned();
        DocumentSnapshot::new(doc.id().clone(), raw)
    }

    fn broadcast_change(&self, doc: &DocumentRef) {
        self.inner.subscriptions.broadcast(|target| {
            target
                .affected_by(doc)
                .then(|| self.snapshot_for(target))
        });
    }

    fn check_target(&self, target: &ListenTarget) -> Result<()> {
        if let ListenTarget::Query(query) = target {
            query.validate()?;
        }
        self.inner.rules.read().check(&target.path())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn listen(&self, target: ListenTarget, config: &SubscriptionConfig) -> Result<SubscriptionHandle> {
        self.check_target(&target)?;

        let _lock = self.inner.write_lock.lock();
        let snapshot = self.snapshot_for(&target);
        let handle = self.inner.subscriptions.subscribe(target, config);
        self.inner.subscriptions.send_to(handle.id(), snapshot);
        Ok(handle)
    }

    async fn get_query(&self, query: &Query) -> Result<QuerySnapshot> {
        let target = ListenTarget::Query(query.clone());
        self.check_target(&target)?;
        self.inner.reads.fetch_add(1, Ordering::SeqCst);
        trace!(path = %target.path(), "one-shot query read");
        Ok(self.query_snapshot(query))
    }

    async fn get_document(&self, doc: &DocumentRef) -> Result<DocumentSnapshot> {
        self.inner.rules.read().check(&doc.path())?;
        self.inner.reads.fetch_add(1, Ordering::SeqCst);
        trace!(path = %doc.path(), "one-shot document read");
        Ok(self.document_snapshot(doc))
    }
}
