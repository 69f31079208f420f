//! # docbind
//!
//! Typed live and one-shot reads over a document-oriented store.
//!
//! ## Core Concepts
//!
//! - **Bindings**: a query or document plus a dependency set, kept in sync
//!   with the store through one owned listener
//! - **Fetcher**: single reads that never leave a listener behind
//! - **Converters**: pure encode/decode pairs between domain types and wire values
//! - **Snapshots**: ordered, identified results; no data is `None`, never an
//!   empty collection
//!
//! ## Example
//!
//! ```ignore
//! use docbind::{Binding, DocumentWrite, MemoryStore, Query, QueryBinding, TypeConverter};
//!
//! let store = MemoryStore::new();
//! let mut admins: QueryBinding<Admin> =
//!     Binding::new(Arc::new(store.clone()), TypeConverter::serde());
//!
//! admins.bind(Some(Query::collection("admins")?), ())?;
//!
//! store.set(
//!     &DocumentRef::parse("admins/a1")?,
//!     DocumentWrite::encode(&TypeConverter::serde(), &Admin { email: "a@example.com".into() })?,
//! )?;
//!
//! admins.poll();
//! assert_eq!(admins.value().map(Vec::len), Some(1));
//! ```

pub mod binding;
pub mod convert;
pub mod error;
pub mod fetch;
pub mod mapper;
pub mod query;
pub mod snapshot;
pub mod store;
pub mod subscriptions;
pub mod types;

// Re-exports
pub use binding::{BindTarget, Binding, BindingState, DocumentBinding, QueryBinding};
pub use convert::{DecodeOptions, TimestampStrategy, TypeConverter};
pub use error::{Result, StoreError};
pub use fetch::Fetcher;
pub use mapper::{map_document, map_query};
pub use query::{Direction, Filter, FilterOp, OrderBy, Query};
pub use snapshot::{
    DocumentSnapshot, PendingTimestamp, QueryEntry, QuerySnapshot, RawDocument, Snapshot,
    SnapshotMetadata,
};
pub use store::{DocumentStore, DocumentWrite, MemoryStore, MemoryStoreConfig};
pub use subscriptions::{
    DropReason, ListenEvent, ListenTarget, SubscriptionConfig, SubscriptionHandle, SubscriptionId,
    SubscriptionManager,
};
pub use types::*;
