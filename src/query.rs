//! Query descriptors and their evaluation against raw documents.

use crate::convert::DecodeOptions;
use crate::error::{Result, StoreError};
use crate::snapshot::{get_field, QueryEntry, RawDocument};
use crate::types::{CollectionRef, RecordId};
use serde_json::Value;
use std::cmp::Ordering;

/// Max number of values accepted by an `In` filter.
pub const MAX_IN_VALUES: usize = 30;

/// Comparison applied by a filter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterOp {
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    ArrayContains,
    In,
}

impl FilterOp {
    fn is_range(self) -> bool {
        matches!(
            self,
            FilterOp::NotEqual
                | FilterOp::LessThan
                | FilterOp::LessThanOrEqual
                | FilterOp::GreaterThan
                | FilterOp::GreaterThanOrEqual
        )
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Direction {
    #[default]
    Ascending,
    Descending,
}

#[derive(Clone, Debug, PartialEq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

/// Filtered, ordered and limited selection of documents in one collection.
///
/// Immutable once built; the builder methods consume and return `self`.
#[derive(Clone, Debug, PartialEq)]
pub struct Query {
    collection: CollectionRef,
    filters: Vec<Filter>,
    order_by: Vec<OrderBy>,
    limit: Option<usize>,
}

impl Query {
    /// Select every document of `path`.
    pub fn collection(path: &str) -> Result<Self> {
        Ok(Self::from(CollectionRef::new(path)?))
    }

    pub fn where_field(mut self, field: impl Into<String>, op: FilterOp, value: impl Into<Value>) -> Self {
        self.filters.push(Filter {
            field: field.into(),
            op,
            value: value.into(),
        });
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by.push(OrderBy {
            field: field.into(),
            direction,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn collection_ref(&self) -> &CollectionRef {
        &self.collection
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    /// Check the descriptor before any read or listen is issued.
    pub fn validate(&self) -> Result<()> {
        if self.limit == Some(0) {
            return Err(StoreError::InvalidQuery("limit must be positive".into()));
        }

        let fields = self
            .filters
            .iter()
            .map(|f| f.field.as_str())
            .chain(self.order_by.iter().map(|o| o.field.as_str()));
        for field in fields {
            if field.is_empty() || field.split('.').any(str::is_empty) {
                return Err(StoreError::InvalidQuery(format!("invalid field path '{field}'")));
            }
        }

        for filter in &self.filters {
            if filter.op == FilterOp::In {
                match filter.value.as_array() {
                    Some(values) if !values.is_empty() && values.len() <= MAX_IN_VALUES => {}
                    _ => {
                        return Err(StoreError::InvalidQuery(format!(
                            "'in' filter on '{}' needs 1..={MAX_IN_VALUES} values",
                            filter.field
                        )))
                    }
                }
            }
        }

        let mut range_fields = self
            .filters
            .iter()
            .filter(|f| f.op.is_range())
            .map(|f| f.field.as_str());
        if let Some(range_field) = range_fields.next() {
            if range_fields.any(|f| f != range_field) {
                return Err(StoreError::InvalidQuery(
                    "range filters must all target the same field".into(),
                ));
            }
            if let Some(first) = self.order_by.first() {
                if first.field != range_field {
                    return Err(StoreError::InvalidQuery(format!(
                        "first order_by must be the range field '{range_field}'"
                    )));
                }
            }
        }

        Ok(())
    }

    /// True if the document passes every filter and has every ordered field.
    pub fn matches(&self, raw: &RawDocument) -> bool {
        let data = raw.data(&DecodeOptions::estimate());
        let Some(fields) = data.as_object() else {
            return false;
        };

        let has_order_fields = self
            .order_by
            .iter()
            .all(|o| get_field(fields, &o.field).is_some());

        has_order_fields
            && self.filters.iter().all(|filter| {
                get_field(fields, &filter.field).is_some_and(|value| filter_matches(filter, value))
            })
    }

    /// Evaluate the query over `(id, document)` pairs of its collection.
    pub fn evaluate<'a>(
        &self,
        documents: impl IntoIterator<Item = (&'a RecordId, &'a RawDocument)>,
    ) -> Vec<QueryEntry> {
        let mut matched: Vec<(&RecordId, &RawDocument, Value)> = documents
            .into_iter()
            .filter(|(_, raw)| self.matches(raw))
            .map(|(id, raw)| (id, raw, raw.data(&DecodeOptions::estimate())))
            .collect();

        matched.sort_by(|(a_id, _, a), (b_id, _, b)| {
            for order in &self.order_by {
                let (Some(a_fields), Some(b_fields)) = (a.as_object(), b.as_object()) else {
                    break;
                };
                let ordering = compare_values(
                    get_field(a_fields, &order.field).unwrap_or(&Value::Null),
                    get_field(b_fields, &order.field).unwrap_or(&Value::Null),
                );
                let ordering = match order.direction {
                    Direction::Ascending => ordering,
                    Direction::Descending => ordering.reverse(),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            a_id.cmp(b_id)
        });

        matched
            .into_iter()
            .take(self.limit.unwrap_or(usize::MAX))
            .map(|(id, raw, _)| QueryEntry {
                id: id.clone(),
                raw: raw.clone(),
            })
            .collect()
    }
}

impl From<CollectionRef> for Query {
    fn from(collection: CollectionRef) -> Self {
        Self {
            collection,
            filters: Vec::new(),
            order_by: Vec::new(),
            limit: None,
        }
    }
}

fn filter_matches(filter: &Filter, value: &Value) -> bool {
    let same_type = type_rank(value) == type_rank(&filter.value);
    match filter.op {
        FilterOp::Equal => values_equal(value, &filter.value),
        FilterOp::NotEqual => !value.is_null() && !values_equal(value, &filter.value),
        FilterOp::LessThan => same_type && compare_values(value, &filter.value) == Ordering::Less,
        FilterOp::LessThanOrEqual => {
            same_type && compare_values(value, &filter.value) != Ordering::Greater
        }
        FilterOp::GreaterThan => {
            same_type && compare_values(value, &filter.value) == Ordering::Greater
        }
        FilterOp::GreaterThanOrEqual => {
            same_type && compare_values(value, &filter.value) != Ordering::Less
        }
        FilterOp::ArrayContains => value
            .as_array()
            .is_some_and(|items| items.iter().any(|item| values_equal(item, &filter.value))),
        FilterOp::In => filter
            .value
            .as_array()
            .is_some_and(|options| options.iter().any(|option| values_equal(value, option))),
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    compare_values(a, b) == Ordering::Equal
}

/// Total order over wire values: by type first, then by value.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.total_cmp(&y)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (a, b) in x.iter().zip(y) {
                let ordering = compare_values(a, b);
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            x.len().cmp(&y.len())
        }
        (Value::Object(x), Value::Object(y)) => {
            let mut xs: Vec<_> = x.iter().collect();
            let mut ys: Vec<_> = y.iter().collect();
            xs.sort_by(|a, b| a.0.cmp(b.0));
            ys.sort_by(|a, b| a.0.cmp(b.0));
            for ((ka, va), (kb, vb)) in xs.iter().zip(&ys) {
                let ordering = ka.cmp(kb).then_with(|| compare_values(va, vb));
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            xs.len().cmp(&ys.len())
        }
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> RawDocument {
        RawDocument::new(value.as_object().cloned().unwrap())
    }

    fn books() -> Vec<(RecordId, RawDocument)> {
        vec![
            (RecordId::from("b1"), doc(json!({ "title": "Rust", "price": 30, "published": true, "tags": ["lang"] }))),
            (RecordId::from("b2"), doc(json!({ "title": "Go", "price": 20, "published": false, "tags": [] }))),
            (RecordId::from("b3"), doc(json!({ "title": "Zig", "price": 25, "published": true }))),
            (RecordId::from("b4"), doc(json!({ "price": 10, "published": true }))),
        ]
    }

    fn run(query: &Query) -> Vec<String> {
        let docs = books();
        query
            .evaluate(docs.iter().map(|(id, raw)| (id, raw)))
            .into_iter()
            .map(|e| e.id.0)
            .collect()
    }

    #[test]
    fn test_unordered_falls_back_to_id() {
        let query = Query::collection("books").unwrap();
        assert_eq!(run(&query), vec!["b1", "b2", "b3", "b4"]);
    }

    #[test]
    fn test_filter_order_limit() {
        let query = Query::collection("books")
            .unwrap()
            .where_field("published", FilterOp::Equal, true)
            .order_by("price", Direction::Descending)
            .limit(2);
        assert_eq!(run(&query), vec!["b1", "b3"]);
    }

    #[test]
    fn test_order_by_excludes_missing_field() {
        let query = Query::collection("books")
            .unwrap()
            .order_by("title", Direction::Ascending);
        assert_eq!(run(&query), vec!["b2", "b1", "b3"]);
    }

    #[test]
    fn test_array_contains_and_in() {
        let contains = Query::collection("books")
            .unwrap()
            .where_field("tags", FilterOp::ArrayContains, "lang");
        assert_eq!(run(&contains), vec!["b1"]);

        let within = Query::collection("books")
            .unwrap()
            .where_field("price", FilterOp::In, json!([10, 20]));
        assert_eq!(run(&within), vec!["b2", "b4"]);
    }

    #[test]
    fn test_range_filters_ignore_other_types() {
        let query = Query::collection("books")
            .unwrap()
            .where_field("title", FilterOp::GreaterThan, "H");
        assert_eq!(run(&query), vec!["b1", "b3"]);
    }

    #[test]
    fn test_validation() {
        let base = Query::collection("books").unwrap();
        assert!(base.clone().validate().is_ok());
        assert!(base.clone().limit(0).validate().is_err());
        assert!(base
            .clone()
            .where_field("price", FilterOp::In, json!([]))
            .validate()
            .is_err());
        assert!(base
            .clone()
            .where_field("price", FilterOp::LessThan, 3)
            .where_field("title", FilterOp::GreaterThan, "a")
            .validate()
            .is_err());
        assert!(base
            .clone()
            .where_field("price", FilterOp::LessThan, 3)
            .order_by("title", Direction::Ascending)
            .validate()
            .is_err());
        assert!(base.where_field("a..b", FilterOp::Equal, 1).validate().is_err());
    }

    #[test]
    fn test_compare_values_orders_types() {
        assert_eq!(compare_values(&json!(null), &json!(false)), Ordering::Less);
        assert_eq!(compare_values(&json!(1), &json!(1.0)), Ordering::Equal);
        assert_eq!(compare_values(&json!("a"), &json!(5)), Ordering::Greater);
    }
}
