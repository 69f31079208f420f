//! Maps raw snapshots into identified domain records.
//!
//! `None` is the no-value sentinel: an empty query result and a missing
//! document both map to it, never to an empty `Vec` or an error.

use crate::convert::{DecodeOptions, TypeConverter};
use crate::error::Result;
use crate::snapshot::{DocumentSnapshot, QuerySnapshot};
use crate::types::DomainRecord;

/// Decode every entry of a query snapshot, preserving delivery order.
pub fn map_query<T>(
    snapshot: &QuerySnapshot,
    converter: &TypeConverter<T>,
    options: &DecodeOptions,
) -> Result<Option<Vec<DomainRecord<T>>>> {
    if snapshot.is_empty() {
        return Ok(None);
    }

    snapshot
        .entries
        .iter()
        .map(|entry| {
            let data = converter.decode(&entry.id, &entry.raw, options)?;
            Ok(DomainRecord {
                id: entry.id.clone(),
                data,
            })
        })
        .collect::<Result<Vec<_>>>()
        .map(Some)
}

/// Decode a document snapshot; a missing document maps to `None`.
pub fn map_document<T>(
    snapshot: &DocumentSnapshot,
    converter: &TypeConverter<T>,
    options: &DecodeOptions,
) -> Result<Option<DomainRecord<T>>> {
    let Some(raw) = snapshot.raw.as_ref() else {
        return Ok(None);
    };

    let data = converter.decode(&snapshot.id, raw, options)?;
    Ok(Some(DomainRecord {
        id: snapshot.id.clone(),
        data,
    }))
}
