//! Content type definition and declaration-level validation.
//!
//! # Invariants
//! - `unit_key_fields` is non-empty and free of duplicates.
//! - Type ids and field names match `IDENTIFIER_RE`; a leading `_` is
//!   reserved for engine-owned document fields.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.\-]*$").expect("valid identifier regex"));

/// Declaration of one pluggable content type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDefinition {
    /// Stable type id, e.g. `rpm`.
    pub id: String,
    /// User-facing name.
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    /// Ordered natural-key fields. Composite when more than one.
    pub unit_key_fields: Vec<String>,
    /// Metadata fields worth indexing for search.
    #[serde(default)]
    pub search_fields: Vec<String>,
    /// Type ids this type may parent.
    #[serde(default)]
    pub child_type_ids: Vec<String>,
}

impl TypeDefinition {
    pub fn new<K, S, C>(
        id: impl Into<String>,
        display_name: impl Into<String>,
        description: impl Into<String>,
        unit_key_fields: K,
        search_fields: S,
        child_type_ids: C,
    ) -> Self
    where
        K: IntoIterator,
        K::Item: Into<String>,
        S: IntoIterator,
        S::Item: Into<String>,
        C: IntoIterator,
        C::Item: Into<String>,
    {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            description: description.into(),
            unit_key_fields: unit_key_fields.into_iter().map(Into::into).collect(),
            search_fields: search_fields.into_iter().map(Into::into).collect(),
            child_type_ids: child_type_ids.into_iter().map(Into::into).collect(),
        }
    }

    /// Validates declaration-level invariants.
    pub fn validate(&self) -> Result<(), TypeDefinitionError> {
        if self.id.trim().is_empty() {
            return Err(TypeDefinitionError::EmptyId);
        }
        if !is_valid_identifier(&self.id) {
            return Err(TypeDefinitionError::InvalidId(self.id.clone()));
        }
        if self.unit_key_fields.is_empty() {
            return Err(TypeDefinitionError::EmptyUnitKey(self.id.clone()));
        }

        let mut seen = BTreeSet::new();
        for field in &self.unit_key_fields {
            if !is_valid_identifier(field) {
                return Err(TypeDefinitionError::InvalidField {
                    type_id: self.id.clone(),
                    field: field.clone(),
                });
            }
            if !seen.insert(field.as_str()) {
                return Err(TypeDefinitionError::DuplicateKeyField {
                    type_id: self.id.clone(),
                    field: field.clone(),
                });
            }
        }

        for field in &self.search_fields {
            if !is_valid_identifier(field) {
                return Err(TypeDefinitionError::InvalidField {
                    type_id: self.id.clone(),
                    field: field.clone(),
                });
            }
        }

        for child_type_id in &self.child_type_ids {
            if !is_valid_identifier(child_type_id) {
                return Err(TypeDefinitionError::InvalidId(child_type_id.clone()));
            }
        }

        Ok(())
    }

    /// Returns whether both definitions share id and natural-key fields.
    ///
    /// Only these two decide unit identity; everything else may be replaced
    /// by a later registration.
    pub fn same_unit_key(&self, other: &TypeDefinition) -> bool {
        self.id == other.id && self.unit_key_fields == other.unit_key_fields
    }

    /// Returns whether `child_type_id` is declared as a child of this type.
    pub fn declares_child(&self, child_type_id: &str) -> bool {
        self.child_type_ids.iter().any(|id| id == child_type_id)
    }
}

/// Returns whether `value` is usable as a type id or field name.
pub fn is_valid_identifier(value: &str) -> bool {
    IDENTIFIER_RE.is_match(value)
}

/// Declaration-level validation errors for [`TypeDefinition`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeDefinitionError {
    EmptyId,
    InvalidId(String),
    EmptyUnitKey(String),
    InvalidField { type_id: String, field: String },
    DuplicateKeyField { type_id: String, field: String },
}

impl Display for TypeDefinitionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyId => write!(f, "type id must not be empty"),
            Self::InvalidId(value) => write!(f, "type id is invalid: `{value}`"),
            Self::EmptyUnitKey(type_id) => {
                write!(f, "type `{type_id}` must declare at least one unit key field")
            }
            Self::InvalidField { type_id, field } => {
                write!(f, "type `{type_id}` declares invalid field name `{field}`")
            }
            Self::DuplicateKeyField { type_id, field } => {
                write!(f, "type `{type_id}` declares unit key field `{field}` twice")
            }
        }
    }
}

impl Error for TypeDefinitionError {}
