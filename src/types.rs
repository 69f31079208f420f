//! Core types: identities, timestamps, references and decoded records.

use crate::error::{Result, StoreError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::time::{SystemTime, UNIX_EPOCH};

/// Identity of a document within its parent collection.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        RecordId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordId({})", self.0)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        RecordId(s.to_string())
    }
}

impl From<String> for RecordId {
    fn from(s: String) -> Self {
        RecordId(s)
    }
}

/// Microseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as i64)
            .unwrap_or_default();
        Timestamp(micros)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// A decoded payload together with the identity it was read under.
///
/// The identity is never part of `T`; it is attached at read time. The
/// record derefs to its payload and serializes flattened, so
/// `{ "id": ..., ...payload }` is the wire shape.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DomainRecord<T> {
    pub id: RecordId,
    #[serde(flatten)]
    pub data: T,
}

impl<T> DomainRecord<T> {
    pub fn new(id: impl Into<RecordId>, data: T) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }

    /// Discard the identity and keep the payload.
    pub fn into_inner(self) -> T {
        self.data
    }
}

impl<T> Deref for DomainRecord<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.data
    }
}

impl<T> DerefMut for DomainRecord<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.data
    }
}

/// Split a slash-separated path, rejecting empty segments.
fn segments(path: &str) -> Result<Vec<&str>> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        return Err(StoreError::InvalidPath(path.to_string()));
    }
    let parts: Vec<&str> = trimmed.split('/').collect();
    if parts.iter().any(|p| p.is_empty()) {
        return Err(StoreError::InvalidPath(path.to_string()));
    }
    Ok(parts)
}

/// Reference to a collection, e.g. `books` or `books/b1/chapters`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CollectionRef {
    path: String,
}

impl CollectionRef {
    /// Validate and build a collection reference (odd number of segments).
    pub fn new(path: &str) -> Result<Self> {
        let parts = segments(path)?;
        if parts.len() % 2 == 0 {
            return Err(StoreError::InvalidPath(format!(
                "{path} names a document, not a collection"
            )));
        }
        Ok(Self {
            path: parts.join("/"),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Reference a document inside this collection.
    pub fn doc(&self, id: impl Into<RecordId>) -> Result<DocumentRef> {
        let id = id.into();
        if id.0.is_empty() || id.0.contains('/') {
            return Err(StoreError::InvalidPath(format!("{}/{}", self.path, id)));
        }
        Ok(DocumentRef {
            collection: self.clone(),
            id,
        })
    }
}

/// Reference to a single document.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DocumentRef {
    collection: CollectionRef,
    id: RecordId,
}

impl DocumentRef {
    /// Parse a full document path (even number of segments).
    pub fn parse(path: &str) -> Result<Self> {
        let parts = segments(path)?;
        if parts.len() % 2 != 0 {
            return Err(StoreError::InvalidPath(format!(
                "{path} names a collection, not a document"
            )));
        }
        let (id, parent) = parts.split_last().ok_or_else(|| {
            StoreError::InvalidPath(path.to_string())
        })?;
        CollectionRef::new(&parent.join("/"))?.doc(*id)
    }

    pub fn id(&self) -> &RecordId {
        &self.id
    }

    pub fn collection(&self) -> &CollectionRef {
        &self.collection
    }

    pub fn path(&self) -> String {
        format!("{}/{}", self.collection.path, self.id)
    }
}
