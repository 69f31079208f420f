//! Subscription system for live snapshot delivery.
//!
//! Each listener owns a bounded channel; the store pushes full snapshots
//! into it and the consumer drains it on its own thread. Subscriptions
//! support:
//! - Query and single-document targets
//! - Bounded buffers with slow-subscriber dropping
//! - Scoped release through [`SubscriptionHandle`]
//!
//! # Example
//!
//! ```ignore
//! let manager = SubscriptionManager::new();
//! let handle = manager.subscribe(query.into(), &SubscriptionConfig::default());
//!
//! loop {
//!     match handle.recv() {
//!         Ok(ListenEvent::Snapshot { snapshot, .. }) => println!("{snapshot:?}"),
//!         Ok(ListenEvent::Dropped { reason, .. }) => break,
//!         Err(_) => break,
//!     }
//! }
//! ```

mod manager;
mod types;

pub use manager::SubscriptionManager;
pub use types::{
    DropReason, ListenEvent, ListenTarget, SubscriptionConfig, SubscriptionHandle, SubscriptionId,
};
