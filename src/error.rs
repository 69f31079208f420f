//! Error types for bindings, reads and the document store.

use crate::subscriptions::DropReason;
use crate::types::RecordId;
use thiserror::Error;

/// Main error type for store, binding and fetch operations.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum StoreError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Failed to decode document {id}: {message}")]
    Decode { id: RecordId, message: String },

    #[error("Subscription dropped: {0:?}")]
    SubscriptionDropped(DropReason),

    #[error("Snapshot kind mismatch: expected {expected}, got {got}")]
    SnapshotMismatch {
        expected: &'static str,
        got: &'static str,
    },
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
