//! The document store seam.
//!
//! [`DocumentStore`] is what bindings and fetchers talk to: a listen call
//! that returns an owned [`SubscriptionHandle`], and two async one-shot
//! reads. [`MemoryStore`] is a complete in-process implementation with
//! latency-compensated writes.

mod memory;
mod write;

pub use memory::{MemoryStore, MemoryStoreConfig};
pub use write::DocumentWrite;

use crate::error::Result;
use crate::query::Query;
use crate::snapshot::{DocumentSnapshot, QuerySnapshot};
use crate::subscriptions::{ListenTarget, SubscriptionConfig, SubscriptionHandle};
use crate::types::DocumentRef;
use async_trait::async_trait;

/// A remote document-oriented store.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Register a listener. The current snapshot of `target` is delivered
    /// first, then a fresh snapshot after every change.
    ///
    /// Errors here are registration failures (permission, invalid target).
    fn listen(&self, target: ListenTarget, config: &SubscriptionConfig) -> Result<SubscriptionHandle>;

    /// Read a query once, without registering a listener.
    async fn get_query(&self, query: &Query) -> Result<QuerySnapshot>;

    /// Read a document once, without registering a listener.
    async fn get_document(&self, doc: &DocumentRef) -> Result<DocumentSnapshot>;
}
