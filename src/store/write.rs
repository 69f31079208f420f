//! Write payloads for the in-memory store.

use crate::convert::TypeConverter;
use crate::error::{Result, StoreError};
use serde_json::{Map, Value};

/// Document data to write, plus fields the server should stamp with its
/// commit time.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DocumentWrite {
    pub(crate) fields: Map<String, Value>,
    pub(crate) server_timestamps: Vec<String>,
}

impl DocumentWrite {
    /// Wrap a wire value; only objects are documents.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(fields) => Ok(Self {
                fields,
                server_timestamps: Vec::new(),
            }),
            other => Err(StoreError::Serialization(format!(
                "document data must be an object, got {other}"
            ))),
        }
    }

    /// Encode a domain value through its converter.
    pub fn encode<T>(converter: &TypeConverter<T>, value: &T) -> Result<Self> {
        Self::from_value(converter.encode(value)?)
    }

    /// Ask the server to fill the (dotted) `field` with its commit time.
    pub fn server_timestamp(mut self, field: impl Into<String>) -> Self {
        self.server_timestamps.push(field.into());
        self
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}
