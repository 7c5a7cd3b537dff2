//! In-process content type registry.
//!
//! # Responsibility
//! - Hold the active set of [`TypeDefinition`] values.
//! - Reject re-registration that would change a type's natural key.
//!
//! # Invariants
//! - Every stored definition passed `TypeDefinition::validate()`.
//! - `register` is all-or-nothing for one batch.

use crate::types::definition::{TypeDefinition, TypeDefinitionError};
use log::info;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Type registration/lookup errors.
#[derive(Debug)]
pub enum TypeRegistryError {
    Invalid(TypeDefinitionError),
    /// Id already registered (or repeated in a batch) with other key fields.
    Conflict(String),
    NotFound(String),
    Parse(serde_json::Error),
}

impl Display for TypeRegistryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Invalid(err) => write!(f, "{err}"),
            Self::Conflict(type_id) => write!(
                f,
                "type `{type_id}` is already registered with different unit key fields"
            ),
            Self::NotFound(type_id) => write!(f, "content type not found: {type_id}"),
            Self::Parse(err) => write!(f, "invalid type descriptor document: {err}"),
        }
    }
}

impl Error for TypeRegistryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Invalid(err) => Some(err),
            Self::Parse(err) => Some(err),
            Self::Conflict(_) | Self::NotFound(_) => None,
        }
    }
}

impl From<TypeDefinitionError> for TypeRegistryError {
    fn from(value: TypeDefinitionError) -> Self {
        Self::Invalid(value)
    }
}

impl From<serde_json::Error> for TypeRegistryError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

#[derive(Debug, Deserialize)]
struct TypeDescriptorDocument {
    types: Vec<TypeDefinition>,
}

/// Active content type definitions keyed by type id.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    definitions: BTreeMap<String, TypeDefinition>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from a JSON descriptor document:
    /// `{"types": [{"id": ..., "display_name": ..., "unit_key_fields": [...]}]}`.
    pub fn from_json(document: &str) -> Result<Self, TypeRegistryError> {
        let mut registry = Self::new();
        registry.register_json(document)?;
        Ok(registry)
    }

    /// Merges definitions from a JSON descriptor document.
    pub fn register_json(&mut self, document: &str) -> Result<(), TypeRegistryError> {
        let parsed: TypeDescriptorDocument = serde_json::from_str(document)?;
        self.register(parsed.types)
    }

    /// Merges `definitions` into the active set.
    ///
    /// A re-registration replaces the stored definition as long as its unit key
    /// fields are unchanged; a key field change is a conflict. Nothing is
    /// applied when one definition in the batch fails.
    pub fn register(
        &mut self,
        definitions: impl IntoIterator<Item = TypeDefinition>,
    ) -> Result<(), TypeRegistryError> {
        let mut staged: BTreeMap<String, TypeDefinition> = BTreeMap::new();
        for definition in definitions {
            definition.validate()?;
            let existing = staged
                .get(&definition.id)
                .or_else(|| self.definitions.get(&definition.id));
            if let Some(existing) = existing {
                if !existing.same_unit_key(&definition) {
                    return Err(TypeRegistryError::Conflict(definition.id));
                }
            }
            staged.insert(definition.id.clone(), definition);
        }

        let count = staged.len();
        self.definitions.extend(staged);
        info!(
            "event=types_register module=types status=ok registered={} total={}",
            count,
            self.definitions.len()
        );
        Ok(())
    }

    /// Looks up one definition by id.
    pub fn get(&self, type_id: &str) -> Result<&TypeDefinition, TypeRegistryError> {
        self.definitions
            .get(type_id)
            .ok_or_else(|| TypeRegistryError::NotFound(type_id.to_string()))
    }

    pub fn contains(&self, type_id: &str) -> bool {
        self.definitions.contains_key(type_id)
    }

    /// Returns sorted type ids.
    pub fn type_ids(&self) -> Vec<String> {
        self.definitions.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::{TypeRegistry, TypeRegistryError};
    use crate::types::definition::TypeDefinition;

    fn def(id: &str, key: &[&str]) -> TypeDefinition {
        TypeDefinition::new(
            id,
            id.to_uppercase(),
            "",
            key.iter().copied(),
            Vec::<String>::new(),
            Vec::<String>::new(),
        )
    }

    #[test]
    fn failed_batch_leaves_registry_untouched() {
        let mut registry = TypeRegistry::new();
        let err = registry
            .register([def("a", &["k"]), def("b", &[])])
            .unwrap_err();
        assert!(matches!(err, TypeRegistryError::Invalid(_)));
        assert!(registry.is_empty());
    }

    #[test]
    fn conflicting_ids_within_one_batch_are_rejected() {
        let mut registry = TypeRegistry::new();
        let err = registry
            .register([def("a", &["k"]), def("a", &["other"])])
            .unwrap_err();
        assert!(matches!(err, TypeRegistryError::Conflict(id) if id == "a"));
    }
}
