//! What a binding can be bound to, and how its snapshots decode.

use crate::convert::{DecodeOptions, TypeConverter};
use crate::error::{Result, StoreError};
use crate::mapper::{map_document, map_query};
use crate::query::Query;
use crate::snapshot::Snapshot;
use crate::subscriptions::ListenTarget;
use crate::types::{DocumentRef, DomainRecord};

/// A listenable descriptor with a fixed output shape.
pub trait BindTarget: Clone {
    /// Decoded value held by the binding.
    type Value<T>;

    fn listen_target(&self) -> ListenTarget;

    fn map_snapshot<T>(
        snapshot: &Snapshot,
        converter: &TypeConverter<T>,
        options: &DecodeOptions,
    ) -> Result<Option<Self::Value<T>>>;
}

impl BindTarget for Query {
    type Value<T> = Vec<DomainRecord<T>>;

    fn listen_target(&self) -> ListenTarget {
        ListenTarget::Query(self.clone())
    }

    fn map_snapshot<T>(
        snapshot: &Snapshot,
        converter: &TypeConverter<T>,
        options: &DecodeOptions,
    ) -> Result<Option<Self::Value<T>>> {
        match snapshot {
            Snapshot::Query(snapshot) => map_query(snapshot, converter, options),
            other => Err(StoreError::SnapshotMismatch {
                expected: "query",
                got: other.kind(),
            }),
        }
    }
}

impl BindTarget for DocumentRef {
    type Value<T> = DomainRecord<T>;

    fn listen_target(&self) -> ListenTarget {
        ListenTarget::Document(self.clone())
    }

    fn map_snapshot<T>(
        snapshot: &Snapshot,
        converter: &TypeConverter<T>,
        options: &DecodeOptions,
    ) -> Result<Option<Self::Value<T>>> {
        match snapshot {
            Snapshot::Document(snapshot) => map_document(snapshot, converter, options),
            other => Err(StoreError::SnapshotMismatch {
                expected: "document",
                got: other.kind(),
            }),
        }
    }
}
