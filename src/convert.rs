//! Typed boundary between domain records and their wire representation.

use crate::error::{Result, StoreError};
use crate::snapshot::RawDocument;
use crate::types::RecordId;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// How fields whose server-assigned time is not yet committed are decoded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampStrategy {
    /// Surface the locally estimated time.
    Estimate,
    /// Surface only committed values; pending fields decode as `null`.
    #[default]
    Exact,
    /// Surface the last committed value, or `null` if there was none.
    Previous,
}

/// Options applied when raw document data is decoded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodeOptions {
    pub timestamp_strategy: TimestampStrategy,
}

impl DecodeOptions {
    /// Options used by every live subscription.
    pub fn estimate() -> Self {
        Self {
            timestamp_strategy: TimestampStrategy::Estimate,
        }
    }

    pub fn exact() -> Self {
        Self {
            timestamp_strategy: TimestampStrategy::Exact,
        }
    }

    pub fn previous() -> Self {
        Self {
            timestamp_strategy: TimestampStrategy::Previous,
        }
    }
}

/// Pair of pure functions converting `T` to and from its wire value.
pub struct TypeConverter<T> {
    to_wire: fn(&T) -> std::result::Result<Value, serde_json::Error>,
    from_wire: fn(Value) -> std::result::Result<T, serde_json::Error>,
}

impl<T> TypeConverter<T> {
    pub fn new(
        to_wire: fn(&T) -> std::result::Result<Value, serde_json::Error>,
        from_wire: fn(Value) -> std::result::Result<T, serde_json::Error>,
    ) -> Self {
        Self { to_wire, from_wire }
    }

    /// Convert a domain value into its wire form.
    pub fn encode(&self, value: &T) -> Result<Value> {
        Ok((self.to_wire)(value)?)
    }

    /// Decode raw document data, materializing pending fields per `options`.
    pub fn decode(&self, id: &RecordId, raw: &RawDocument, options: &DecodeOptions) -> Result<T> {
        (self.from_wire)(raw.data(options)).map_err(|e| StoreError::Decode {
            id: id.clone(),
            message: e.to_string(),
        })
    }
}

impl<T: Serialize + DeserializeOwned> TypeConverter<T> {
    /// Converter backed by `T`'s serde implementation.
    pub fn serde() -> Self {
        Self {
            to_wire: |value: &T| serde_json::to_value(value),
            from_wire: serde_json::from_value,
        }
    }
}

impl<T: Serialize + DeserializeOwned> Default for TypeConverter<T> {
    fn default() -> Self {
        Self::serde()
    }
}

impl<T> Clone for TypeConverter<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for TypeConverter<T> {}

impl<T> fmt::Debug for TypeConverter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeConverter")
            .field("type", &std::any::type_name::<T>())
            .finish()
    }
}
