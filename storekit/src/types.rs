use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::str::FromStr;

use crate::errors::StoreError;

/// Key types a store can be keyed by.
pub trait StoreKey: Serialize + DeserializeOwned + Ord + Clone + Debug + Send + Sync + 'static {}

impl<K> StoreKey for K where K: Serialize + DeserializeOwned + Ord + Clone + Debug + Send + Sync + 'static {}

/// Record types a store can persist. A record must serialize into a JSON
/// object whose fields are mapped columns; fields left out of a projection
/// come back missing, so optional fields should be `#[serde(default)]`.
pub trait Persistent: Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> Persistent for T where T: Serialize + DeserializeOwned + Send + Sync + 'static {}

/// A materialized result row.
#[derive(Debug, Clone, PartialEq)]
pub struct Row<K, T> {
    pub key: K,
    pub value: T,
}

/// A row as produced by a backend, before filtering and materialization.
#[derive(Debug, Clone)]
pub struct RawRow<K> {
    pub key: K,
    pub fields: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsistencyLevel {
    Any,
    #[default]
    One,
    Two,
    Three,
    Quorum,
    All,
    LocalQuorum,
    EachQuorum,
    LocalOne,
}

impl FromStr for ConsistencyLevel {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "any" => Ok(ConsistencyLevel::Any),
            "one" => Ok(ConsistencyLevel::One),
            "two" => Ok(ConsistencyLevel::Two),
            "three" => Ok(ConsistencyLevel::Three),
            "quorum" => Ok(ConsistencyLevel::Quorum),
            "all" => Ok(ConsistencyLevel::All),
            "local_quorum" => Ok(ConsistencyLevel::LocalQuorum),
            "each_quorum" => Ok(ConsistencyLevel::EachQuorum),
            "local_one" => Ok(ConsistencyLevel::LocalOne),
            other => Err(StoreError::ConfigError(format!("unknown consistency level: {}", other))),
        }
    }
}

impl From<ConsistencyLevel> for scylla::statement::Consistency {
    fn from(level: ConsistencyLevel) -> Self {
        use scylla::statement::Consistency;

        match level {
            ConsistencyLevel::Any => Consistency::Any,
            ConsistencyLevel::One => Consistency::One,
            ConsistencyLevel::Two => Consistency::Two,
            ConsistencyLevel::Three => Consistency::Three,
            ConsistencyLevel::Quorum => Consistency::Quorum,
            ConsistencyLevel::All => Consistency::All,
            ConsistencyLevel::LocalQuorum => Consistency::LocalQuorum,
            ConsistencyLevel::EachQuorum => Consistency::EachQuorum,
            ConsistencyLevel::LocalOne => Consistency::LocalOne,
        }
    }
}

/// Comparison applied by a field filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

/// Single-field value filter, evaluated against each row before it is
/// handed to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub operand: serde_json::Value,
    /// Drop rows that do not carry the field (or carry it as null).
    #[serde(default = "default_filter_if_missing")]
    pub filter_if_missing: bool,
}

fn default_filter_if_missing() -> bool {
    true
}

impl Filter {
    pub fn new(field: impl Into<String>, op: FilterOp, operand: impl Into<serde_json::Value>) -> Self {
        Self {
            field: field.into(),
            op,
            operand: operand.into(),
            filter_if_missing: true,
        }
    }

    pub fn keep_if_missing(mut self) -> Self {
        self.filter_if_missing = false;
        self
    }

    /// Whether the row passes this filter.
    pub fn accepts(&self, fields: &serde_json::Map<String, serde_json::Value>) -> bool {
        let value = match fields.get(&self.field) {
            None | Some(serde_json::Value::Null) => return !self.filter_if_missing,
            Some(value) => value,
        };

        let ordering = match self.op {
            FilterOp::Eq => return json_eq(value, &self.operand),
            FilterOp::NotEq => return !json_eq(value, &self.operand),
            _ => json_cmp(value, &self.operand),
        };

        match (self.op, ordering) {
            (FilterOp::Lt, Some(ordering)) => ordering.is_lt(),
            (FilterOp::LtEq, Some(ordering)) => ordering.is_le(),
            (FilterOp::Gt, Some(ordering)) => ordering.is_gt(),
            (FilterOp::GtEq, Some(ordering)) => ordering.is_ge(),
            _ => false,
        }
    }
}

fn json_eq(left: &serde_json::Value, right: &serde_json::Value) -> bool {
    match (left, right) {
        (serde_json::Value::Number(l), serde_json::Value::Number(r)) => number_cmp(l, r).map_or(false, |o| o.is_eq()),
        _ => left == right,
    }
}

fn json_cmp(left: &serde_json::Value, right: &serde_json::Value) -> Option<std::cmp::Ordering> {
    use serde_json::Value;

    match (left, right) {
        (Value::Number(l), Value::Number(r)) => number_cmp(l, r),
        (Value::String(l), Value::String(r)) => Some(l.cmp(r)),
        (Value::Bool(l), Value::Bool(r)) => Some(l.cmp(r)),
        _ => None,
    }
}

/// Integers compare exactly over the full i64/u64 range; f64 only when a
/// side is fractional.
fn number_cmp(left: &serde_json::Number, right: &serde_json::Number) -> Option<std::cmp::Ordering> {
    fn exact(n: &serde_json::Number) -> Option<i128> {
        n.as_i64().map(i128::from).or_else(|| n.as_u64().map(i128::from))
    }

    match (exact(left), exact(right)) {
        (Some(l), Some(r)) => Some(l.cmp(&r)),
        _ => left.as_f64()?.partial_cmp(&right.as_f64()?),
    }
}

/// CQL identifiers accepted in mappings: lower-case, unquoted.
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c == '_' => {}
        _ => return false,
    }
    name.len() <= 48 && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_numeric_filters() {
        let row = fields(json!({"salary": 100, "name": "ana"}));
        assert!(Filter::new("salary", FilterOp::Eq, 100.0).accepts(&row));
        assert!(Filter::new("salary", FilterOp::Gt, 50).accepts(&row));
        assert!(Filter::new("salary", FilterOp::LtEq, 100).accepts(&row));
        assert!(!Filter::new("salary", FilterOp::Lt, 100).accepts(&row));
        assert!(Filter::new("name", FilterOp::NotEq, "bob").accepts(&row));
    }

    #[test]
    fn test_large_integers_compare_exactly() {
        let row = fields(json!({"ts": 9_007_199_254_740_993_i64, "big": u64::MAX}));
        assert!(!Filter::new("ts", FilterOp::Eq, 9_007_199_254_740_992_i64).accepts(&row));
        assert!(Filter::new("ts", FilterOp::NotEq, 9_007_199_254_740_992_i64).accepts(&row));
        assert!(Filter::new("ts", FilterOp::Gt, 9_007_199_254_740_992_i64).accepts(&row));

        let near_max = fields(json!({"ts": i64::MAX - 1}));
        assert!(Filter::new("ts", FilterOp::Lt, i64::MAX).accepts(&near_max));
        assert!(!Filter::new("ts", FilterOp::Eq, i64::MAX).accepts(&near_max));

        assert!(Filter::new("big", FilterOp::Gt, i64::MAX).accepts(&row));
        assert!(Filter::new("big", FilterOp::Gt, -1).accepts(&row));
        assert!(Filter::new("ts", FilterOp::Lt, 9.1e15).accepts(&row));
    }

    #[test]
    fn test_missing_field_handling() {
        let row = fields(json!({"name": "ana", "ssn": null}));
        assert!(!Filter::new("salary", FilterOp::Eq, 1).accepts(&row));
        assert!(Filter::new("salary", FilterOp::Eq, 1).keep_if_missing().accepts(&row));
        assert!(!Filter::new("ssn", FilterOp::Eq, "x").accepts(&row));
    }

    #[test]
    fn test_mismatched_types_never_compare() {
        let row = fields(json!({"name": "ana"}));
        assert!(!Filter::new("name", FilterOp::Gt, 3).accepts(&row));
    }

    #[test]
    fn test_identifier_rules() {
        assert!(is_valid_identifier("webpage"));
        assert!(is_valid_identifier("_ts2"));
        assert!(!is_valid_identifier("2ts"));
        assert!(!is_valid_identifier("Employee"));
        assert!(!is_valid_identifier("a-b"));
        assert!(!is_valid_identifier(""));
    }

    #[test]
    fn test_consistency_from_str() {
        assert_eq!("LOCAL_QUORUM".parse::<ConsistencyLevel>().unwrap(), ConsistencyLevel::LocalQuorum);
        assert_eq!("local-one".parse::<ConsistencyLevel>().unwrap(), ConsistencyLevel::LocalOne);
        assert!("most".parse::<ConsistencyLevel>().is_err());
    }
}
