//! Live binding of a descriptor to caller-owned state.

use crate::convert::{DecodeOptions, TypeConverter};
use crate::error::{Result, StoreError};
use crate::query::Query;
use crate::store::DocumentStore;
use crate::subscriptions::{
    DropReason, ListenEvent, SubscriptionConfig, SubscriptionHandle, SubscriptionId,
};
use crate::types::DocumentRef;
use crossbeam_channel::{RecvTimeoutError, TryRecvError};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

use super::target::BindTarget;

/// Caller-visible view of a binding.
#[derive(Debug, PartialEq)]
pub struct BindingState<'a, V> {
    /// Latest decoded value; `None` is the no-value sentinel.
    pub value: Option<&'a V>,
    /// True once the first snapshot has been delivered.
    pub initialized: bool,
    /// Last delivery failure, if any.
    pub error: Option<&'a StoreError>,
}

/// Keeps the latest decoded result of one live subscription.
///
/// A binding owns at most one [`SubscriptionHandle`]. [`Binding::bind`]
/// compares the dependency set with the one it is currently bound under and
/// only rebinds when it changed, releasing the old listener before the new
/// one is registered. Events are applied on the owning thread through
/// [`Binding::poll`] or [`Binding::wait`], and only when they come from the
/// live handle.
pub struct Binding<K: BindTarget, T, D: PartialEq = ()> {
    store: Arc<dyn DocumentStore>,
    converter: TypeConverter<T>,
    config: SubscriptionConfig,
    active: Option<SubscriptionHandle>,
    deps: Option<D>,
    value: Option<K::Value<T>>,
    initialized: bool,
    error: Option<StoreError>,
    _target: PhantomData<fn() -> K>,
}

/// Binding to the result set of a query.
pub type QueryBinding<T, D = ()> = Binding<Query, T, D>;

/// Binding to a single document.
pub type DocumentBinding<T, D = ()> = Binding<DocumentRef, T, D>;

impl<K: BindTarget, T, D: PartialEq> Binding<K, T, D> {
    /// Create an unbound binding with the default subscription config.
    pub fn new(store: Arc<dyn DocumentStore>, converter: TypeConverter<T>) -> Self {
        Self::with_config(store, converter, SubscriptionConfig::default())
    }

    /// Create an unbound binding whose listeners use `config`.
    pub fn with_config(
        store: Arc<dyn DocumentStore>,
        converter: TypeConverter<T>,
        config: SubscriptionConfig,
    ) -> Self {
        Self {
            store,
            converter,
            config,
            active: None,
            deps: None,
            value: None,
            initialized: false,
            error: None,
            _target: PhantomData,
        }
    }

    /// Bind to `target` under `deps`.
    ///
    /// Does nothing if `deps` equals the dependency set of the current
    /// binding. Otherwise the active listener is released, then a new one is
    /// registered for `Some(target)`; `None` clears the value and leaves no
    /// listener. `initialized` is never reset here.
    ///
    /// A registration failure is returned and leaves the binding unbound,
    /// with the value cleared as for `None`; the failure is not stored in
    /// [`Binding::error`].
    pub fn bind(&mut self, target: Option<K>, deps: D) -> Result<BindingState<'_, K::Value<T>>> {
        if self.deps.as_ref() == Some(&deps) {
            return Ok(self.state());
        }

        self.unbind();
        self.error = None;

        match target {
            Some(target) => {
                let listen_target = target.listen_target();
                let path = listen_target.path();
                let handle = match self.store.listen(listen_target, &self.config) {
                    Ok(handle) => handle,
                    Err(e) => {
                        warn!(error = %e, %path, "binding failed to listen");
                        self.value = None;
                        return Err(e);
                    }
                };
                debug!(subscription = handle.id().0, %path, "binding established");
                self.active = Some(handle);
            }
            None => {
                debug!("binding cleared");
                self.value = None;
            }
        }
        self.deps = Some(deps);

        self.poll();
        Ok(self.state())
    }

    /// Release the active listener. Safe to call when nothing is bound.
    ///
    /// The next [`Binding::bind`] always rebinds, whatever its dependencies.
    pub fn unbind(&mut self) {
        self.deps = None;
        if let Some(mut handle) = self.active.take() {
            handle.unsubscribe();
            debug!(subscription = handle.id().0, "binding released");
        }
    }

    /// Apply every event already delivered. Returns how many were applied.
    pub fn poll(&mut self) -> usize {
        let mut applied = 0;
        while let Some(handle) = self.active.as_ref() {
            match handle.try_recv() {
                Ok(event) => {
                    if self.apply_event(event) {
                        applied += 1;
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.terminate(DropReason::Disconnected);
                    break;
                }
            }
        }
        applied
    }

    /// Block up to `timeout` for the next event, then drain the rest.
    /// Returns true if anything was applied.
    pub fn wait(&mut self, timeout: Duration) -> bool {
        let received = match self.active.as_ref() {
            Some(handle) => handle.recv_timeout(timeout),
            None => return false,
        };
        let applied = match received {
            Ok(event) => self.apply_event(event),
            Err(RecvTimeoutError::Timeout) => return false,
            Err(RecvTimeoutError::Disconnected) => {
                self.terminate(DropReason::Disconnected);
                return false;
            }
        };
        self.poll() > 0 || applied
    }

    /// Apply one event on the owning context.
    ///
    /// Events that do not belong to the live listener are discarded, so a
    /// torn-down listener can never write to this binding. Returns true if
    /// the event was applied.
    pub fn apply_event(&mut self, event: ListenEvent) -> bool {
        if self.subscription_id() != Some(event.subscription()) {
            trace!(subscription = event.subscription().0, "discarding stale event");
            return false;
        }

        match event {
            ListenEvent::Snapshot { snapshot, .. } => {
                match K::map_snapshot(&snapshot, &self.converter, &DecodeOptions::estimate()) {
                    Ok(value) => {
                        self.value = value;
                        self.error = None;
                    }
                    Err(e) => {
                        warn!(error = %e, "failed to decode snapshot");
                        self.error = Some(e);
                    }
                }
                self.initialized = true;
            }
            ListenEvent::Dropped { reason, .. } => self.terminate(reason),
        }
        true
    }

    fn terminate(&mut self, reason: DropReason) {
        if let Some(mut handle) = self.active.take() {
            warn!(subscription = handle.id().0, ?reason, "subscription terminated by store");
            handle.unsubscribe();
        }
        self.error = Some(StoreError::SubscriptionDropped(reason));
    }

    /// Current value, initialized flag and last error.
    pub fn state(&self) -> BindingState<'_, K::Value<T>> {
        BindingState {
            value: self.value.as_ref(),
            initialized: self.initialized,
            error: self.error.as_ref(),
        }
    }

    /// Latest decoded value, or `None` if there is none.
    pub fn value(&self) -> Option<&K::Value<T>> {
        self.value.as_ref()
    }

    /// True once any snapshot has been delivered.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Last delivery or termination error.
    pub fn error(&self) -> Option<&StoreError> {
        self.error.as_ref()
    }

    /// True while a listener is registered.
    pub fn is_live(&self) -> bool {
        self.active.is_some()
    }

    /// Liveness token of the current listener.
    pub fn subscription_id(&self) -> Option<SubscriptionId> {
        self.active.as_ref().map(SubscriptionHandle::id)
    }
}

impl<K: BindTarget, T, D: PartialEq> Drop for Binding<K, T, D> {
    fn drop(&mut self) {
        self.unbind();
    }
}

impl<K: BindTarget, T, D: PartialEq> fmt::Debug for Binding<K, T, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("subscription", &self.subscription_id())
            .field("initialized", &self.initialized)
            .field("has_value", &self.value.is_some())
            .field("error", &self.error)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Query;
    use crate::snapshot::{QuerySnapshot, Snapshot};
    use crate::store::{DocumentWrite, MemoryStore};
    use crate::subscriptions::ListenTarget;
    use crate::types::CollectionRef;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    struct Admin {
        email: String,
    }

    /// Records how many listeners were live at each registration.
    struct RecordingStore {
        inner: MemoryStore,
        live_at_listen: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl DocumentStore for RecordingStore {
        fn listen(
            &self,
            target: ListenTarget,
            config: &SubscriptionConfig,
        ) -> Result<SubscriptionHandle> {
            self.live_at_listen.lock().push(self.inner.listener_count());
            self.inner.listen(target, config)
        }

        async fn get_query(&self, query: &Query) -> Result<QuerySnapshot> {
            self.inner.get_query(query).await
        }

        async fn get_document(
            &self,
            doc: &DocumentRef,
        ) -> Result<crate::snapshot::DocumentSnapshot> {
            self.inner.get_document(doc).await
        }
    }

    fn put(store: &MemoryStore, id: &str, email: &str) {
        let doc = CollectionRef::new("admins").unwrap().doc(id).unwrap();
        store
            .set(&doc, DocumentWrite::from_value(json!({ "email": email })).unwrap())
            .unwrap();
    }

    fn admins() -> Query {
        Query::collection("admins").unwrap()
    }

    #[test]
    fn test_same_deps_do_not_rebind() {
        let store = MemoryStore::new();
        let mut binding: QueryBinding<Admin, u32> =
            Binding::new(Arc::new(store.clone()), TypeConverter::serde());

        binding.bind(Some(admins()), 1).unwrap();
        let first = binding.subscription_id();
        binding.bind(Some(admins()), 1).unwrap();
        assert_eq!(binding.subscription_id(), first);
        assert_eq!(store.listener_count(), 1);

        binding.bind(Some(admins()), 2).unwrap();
        assert_ne!(binding.subscription_id(), first);
        assert_eq!(store.listener_count(), 1);
    }

    #[test]
    fn test_rebind_releases_before_listening() {
        let recording = Arc::new(RecordingStore {
            inner: MemoryStore::new(),
            live_at_listen: Mutex::new(Vec::new()),
        });
        let mut binding: QueryBinding<Admin, u32> =
            Binding::new(recording.clone(), TypeConverter::serde());

        for deps in 0..4 {
            binding.bind(Some(admins()), deps).unwrap();
        }
        assert_eq!(*recording.live_at_listen.lock(), vec![0, 0, 0, 0]);
    }

    #[test]
    fn test_stale_event_is_discarded() {
        let store = MemoryStore::new();
        put(&store, "a", "a@example.com");
        let mut binding: QueryBinding<Admin, u32> =
            Binding::new(Arc::new(store.clone()), TypeConverter::serde());

        binding.bind(Some(admins()), 1).unwrap();
        let old = binding.subscription_id().unwrap();
        binding.bind(Some(admins()), 2).unwrap();

        let stale = ListenEvent::Snapshot {
            subscription: old,
            snapshot: Snapshot::Query(QuerySnapshot::default()),
        };
        assert!(!binding.apply_event(stale));
        assert_eq!(binding.value().map(Vec::len), Some(1));

        binding.unbind();
        let after_teardown = ListenEvent::Snapshot {
            subscription: old,
            snapshot: Snapshot::Query(QuerySnapshot::default()),
        };
        assert!(!binding.apply_event(after_teardown));
        assert_eq!(binding.value().map(Vec::len), Some(1));
    }

    #[test]
    fn test_unbind_is_idempotent_and_drop_releases() {
        let store = MemoryStore::new();
        {
            let mut binding: QueryBinding<Admin> =
                Binding::new(Arc::new(store.clone()), TypeConverter::serde());
            binding.bind(Some(admins()), ()).unwrap();
            assert_eq!(store.listener_count(), 1);

            binding.unbind();
            binding.unbind();
            assert_eq!(store.listener_count(), 0);
            assert!(!binding.is_live());

            binding.bind(Some(admins()), ()).unwrap();
            assert_eq!(store.listener_count(), 1);
        }
        assert_eq!(store.listener_count(), 0);
    }

    #[test]
    fn test_snapshot_kind_mismatch_is_reported() {
        let store = MemoryStore::new();
        let mut binding: QueryBinding<Admin> =
            Binding::new(Arc::new(store.clone()), TypeConverter::serde());
        binding.bind(Some(admins()), ()).unwrap();

        let id = binding.subscription_id().unwrap();
        let wrong = ListenEvent::Snapshot {
            subscription: id,
            snapshot: Snapshot::Document(crate::snapshot::DocumentSnapshot::missing("x".into())),
        };
        assert!(binding.apply_event(wrong));
        assert!(matches!(
            binding.error(),
            Some(StoreError::SnapshotMismatch { expected: "query", .. })
        ));
        assert!(binding.is_live());
    }
}
