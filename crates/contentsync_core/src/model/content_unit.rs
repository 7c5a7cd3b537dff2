//! Content unit domain model.
//!
//! # Responsibility
//! - Define the record shared by every content type.
//! - Provide the canonical natural-key encoding used for uniqueness.
//!
//! # Invariants
//! - `id` is `None` until the unit has been persisted once.
//! - `unit_key` is unique within `type_id`; its canonical encoding is stable
//!   because keys are kept in a sorted map.
//! - `children` lists are ordered by link time and free of duplicates.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Store-assigned surrogate id of a persisted unit.
pub type UnitId = Uuid;

/// Natural key: one value per declared key field.
pub type UnitKey = BTreeMap<String, Value>;

/// Arbitrary mutable unit metadata.
pub type Metadata = BTreeMap<String, Value>;

/// One piece of synchronized content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentUnit {
    pub id: Option<UnitId>,
    pub type_id: String,
    pub unit_key: UnitKey,
    pub metadata: Metadata,
    /// Absolute payload location, computed from a caller-relative path.
    pub storage_path: Option<String>,
    /// Child type id -> linked child unit ids.
    #[serde(default)]
    pub children: BTreeMap<String, Vec<UnitId>>,
    /// Unix epoch milliseconds of the last persisted write.
    #[serde(default)]
    pub updated_at: Option<i64>,
}

impl ContentUnit {
    /// Creates an unpersisted unit.
    pub fn new(type_id: impl Into<String>, unit_key: UnitKey, metadata: Metadata) -> Self {
        Self {
            id: None,
            type_id: type_id.into(),
            unit_key,
            metadata,
            storage_path: None,
            children: BTreeMap::new(),
            updated_at: None,
        }
    }

    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }

    /// Returns linked child ids of one child type, in link order.
    pub fn child_ids(&self, child_type_id: &str) -> &[UnitId] {
        self.children
            .get(child_type_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Renders the unit as one flat document.
    ///
    /// Metadata and key fields share the top level; engine-owned fields are
    /// prefixed with `_`, and child links appear as `_<child_type_id>_children`.
    pub fn to_document(&self) -> Map<String, Value> {
        let mut document = Map::new();
        for (field, value) in &self.metadata {
            document.insert(field.clone(), value.clone());
        }
        for (field, value) in &self.unit_key {
            document.insert(field.clone(), value.clone());
        }

        document.insert(
            "_id".to_string(),
            self.id
                .map(|id| Value::String(id.to_string()))
                .unwrap_or(Value::Null),
        );
        document.insert(
            "_content_type_id".to_string(),
            Value::String(self.type_id.clone()),
        );
        document.insert(
            "_storage_path".to_string(),
            self.storage_path
                .clone()
                .map(Value::String)
                .unwrap_or(Value::Null),
        );
        if let Some(updated_at) = self.updated_at {
            document.insert("_last_updated".to_string(), Value::from(updated_at));
        }
        for (child_type_id, ids) in &self.children {
            document.insert(
                children_field_name(child_type_id),
                Value::Array(
                    ids.iter()
                        .map(|id| Value::String(id.to_string()))
                        .collect(),
                ),
            );
        }

        document
    }
}

/// Document field name holding children of `child_type_id`.
pub fn children_field_name(child_type_id: &str) -> String {
    format!("_{child_type_id}_children")
}

/// Encodes a unit key into the string stored under the uniqueness constraint.
///
/// Integral floats are written as integers, so `1` and `1.0` name the same unit.
pub fn canonical_unit_key(unit_key: &UnitKey) -> Result<String, serde_json::Error> {
    let normalized: BTreeMap<&str, Value> = unit_key
        .iter()
        .map(|(field, value)| (field.as_str(), normalize_key_value(value)))
        .collect();
    serde_json::to_string(&normalized)
}

fn normalize_key_value(value: &Value) -> Value {
    match value {
        Value::Number(number) => match number.as_f64() {
            Some(float)
                if number.is_f64()
                    && float.fract() == 0.0
                    && float >= -9.223_372_036_854_776e18
                    && float < 9.223_372_036_854_776e18 =>
            {
                Value::from(float as i64)
            }
            _ => value.clone(),
        },
        Value::Array(items) => Value::Array(items.iter().map(normalize_key_value).collect()),
        Value::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|(field, item)| (field.clone(), normalize_key_value(item)))
                .collect(),
        ),
        _ => value.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::{canonical_unit_key, children_field_name, ContentUnit, UnitKey};
    use serde_json::json;
    use uuid::Uuid;

    fn key(pairs: &[(&str, &str)]) -> UnitKey {
        pairs
            .iter()
            .map(|(field, value)| (field.to_string(), json!(value)))
            .collect()
    }

    #[test]
    fn canonical_key_ignores_insertion_order() {
        let a = key(&[("key-2a", "x"), ("key-2b", "y")]);
        let b = key(&[("key-2b", "y"), ("key-2a", "x")]);
        assert_eq!(canonical_unit_key(&a).unwrap(), canonical_unit_key(&b).unwrap());
    }

    #[test]
    fn canonical_key_treats_integral_floats_as_integers() {
        let mut int_key = UnitKey::new();
        int_key.insert("epoch".to_string(), json!(1));
        let mut float_key = UnitKey::new();
        float_key.insert("epoch".to_string(), json!(1.0));
        let mut fractional_key = UnitKey::new();
        fractional_key.insert("epoch".to_string(), json!(1.5));

        let canonical = canonical_unit_key(&int_key).unwrap();
        assert_eq!(canonical, canonical_unit_key(&float_key).unwrap());
        assert_eq!(canonical, r#"{"epoch":1}"#);
        assert_ne!(canonical, canonical_unit_key(&fractional_key).unwrap());
    }

    #[test]
    fn document_exposes_children_under_type_scoped_field() {
        let child = Uuid::new_v4();
        let mut unit = ContentUnit::new("type-2", key(&[("key-2a", "a")]), Default::default());
        unit.children.insert("type-1".to_string(), vec![child]);

        let document = unit.to_document();
        assert_eq!(children_field_name("type-1"), "_type-1_children");
        assert_eq!(document["_type-1_children"], json!([child.to_string()]));
        assert_eq!(document["key-2a"], json!("a"));
        assert_eq!(document["_id"], json!(null));
    }

    #[test]
    fn child_ids_of_unknown_type_is_empty() {
        let unit = ContentUnit::new("type-2", UnitKey::new(), Default::default());
        assert!(unit.child_ids("type-1").is_empty());
        assert!(!unit.is_persisted());
    }
}
