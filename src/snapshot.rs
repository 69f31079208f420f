//! Snapshot events as delivered by the store.

use crate::convert::{DecodeOptions, TimestampStrategy};
use crate::types::{RecordId, Timestamp};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A server-assigned time field that the store has not committed yet.
#[derive(Clone, Debug, PartialEq)]
pub struct PendingTimestamp {
    /// Local estimate of the value the server will assign.
    pub estimate: Timestamp,
    /// Last committed value of the field, if any.
    pub previous: Option<Value>,
}

/// Raw document data plus the fields awaiting a server-assigned time.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawDocument {
    fields: Map<String, Value>,
    pending: BTreeMap<String, PendingTimestamp>,
}

impl RawDocument {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self {
            fields,
            pending: BTreeMap::new(),
        }
    }

    /// Mark a (dotted) field path as awaiting a server-assigned time.
    pub fn mark_pending(&mut self, field: impl Into<String>, pending: PendingTimestamp) {
        self.pending.insert(field.into(), pending);
    }

    /// Resolve every pending field to `at`.
    pub fn commit_pending(&mut self, at: Timestamp) {
        for (field, _) in std::mem::take(&mut self.pending) {
            set_field(&mut self.fields, &field, Value::from(at.0));
        }
    }

    /// Overwrite a committed (dotted) field, clearing pending state at,
    /// beneath or above that path.
    pub fn write_field(&mut self, field: &str, value: Value) {
        self.pending
            .retain(|pending, _| !is_prefix_path(field, pending) && !is_prefix_path(pending, field));
        set_field(&mut self.fields, field, value);
    }

    /// True while any field awaits a server-assigned time.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Committed fields. A pending field holds its last committed value, if any.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Decode call: materialize pending fields according to `options`.
    pub fn data(&self, options: &DecodeOptions) -> Value {
        let mut fields = self.fields.clone();
        for (field, pending) in &self.pending {
            let value = match options.timestamp_strategy {
                TimestampStrategy::Estimate => Value::from(pending.estimate.0),
                TimestampStrategy::Exact => Value::Null,
                TimestampStrategy::Previous => pending.previous.clone().unwrap_or(Value::Null),
            };
            set_field(&mut fields, field, value);
        }
        Value::Object(fields)
    }
}

/// True if `path` equals `prefix` or names a field nested under it.
fn is_prefix_path(prefix: &str, path: &str) -> bool {
    path.strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('.'))
}

/// Look up a dotted field path.
pub(crate) fn get_field<'a>(fields: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = fields.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

/// Set a dotted field path, creating intermediate maps as needed.
pub(crate) fn set_field(fields: &mut Map<String, Value>, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            fields.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let child = fields
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !child.is_object() {
                *child = Value::Object(Map::new());
            }
            if let Value::Object(map) = child {
                set_field(map, rest, value);
            }
        }
    }
}

/// Metadata attached to every snapshot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SnapshotMetadata {
    /// True if the snapshot contains local writes not yet committed.
    pub has_pending_writes: bool,
}

/// One identified entry of a collection snapshot.
#[derive(Clone, Debug, PartialEq)]
pub struct QueryEntry {
    pub id: RecordId,
    pub raw: RawDocument,
}

/// Point-in-time result of a query, in store delivery order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QuerySnapshot {
    pub entries: Vec<QueryEntry>,
    pub metadata: SnapshotMetadata,
}

impl QuerySnapshot {
    /// Build a snapshot, deriving its metadata from the entries.
    pub fn new(entries: Vec<QueryEntry>) -> Self {
        let has_pending_writes = entries.iter().any(|e| e.raw.has_pending());
        Self {
            entries,
            metadata: SnapshotMetadata { has_pending_writes },
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Point-in-time state of a single document.
#[derive(Clone, Debug, PartialEq)]
pub struct DocumentSnapshot {
    pub id: RecordId,
    /// `None` when the document does not exist.
    pub raw: Option<RawDocument>,
    pub metadata: SnapshotMetadata,
}

impl DocumentSnapshot {
    pub fn new(id: RecordId, raw: Option<RawDocument>) -> Self {
        let has_pending_writes = raw.as_ref().is_some_and(RawDocument::has_pending);
        Self {
            id,
            raw,
            metadata: SnapshotMetadata { has_pending_writes },
        }
    }

    /// Snapshot of a document that does not exist.
    pub fn missing(id: RecordId) -> Self {
        Self::new(id, None)
    }

    pub fn exists(&self) -> bool {
        self.raw.is_some()
    }
}

/// Either shape of snapshot a listener can deliver.
#[derive(Clone, Debug, PartialEq)]
pub enum Snapshot {
    Query(QuerySnapshot),
    Document(DocumentSnapshot),
}

impl Snapshot {
    pub fn kind(&self) -> &'static str {
        match self {
            Snapshot::Query(_) => "query",
            Snapshot::Document(_) => "document",
        }
    }
}
