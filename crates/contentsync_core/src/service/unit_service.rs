//! Content unit store use-cases.
//!
//! # Responsibility
//! - Build unpersisted units validated against their type definition.
//! - Persist units with natural-key identity (create-if-absent).
//!
//! # Invariants
//! - Unit keys cover exactly the declared key fields of their type.
//! - `init_unit` performs no I/O.
//! - Saving the same natural key twice yields the same id.

use crate::model::content_unit::{canonical_unit_key, ContentUnit, Metadata, UnitId, UnitKey};
use crate::repo::unit_repo::{RepoError, UnitRepository};
use crate::service::error::{ContentError, ContentResult};
use crate::storage::path::StoragePathAllocator;
use crate::types::definition::TypeDefinition;
use crate::types::registry::TypeRegistry;
use log::{debug, info};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

/// Typed content storage over one unit repository.
pub struct ContentUnitStore<R: UnitRepository> {
    registry: Arc<TypeRegistry>,
    paths: Arc<dyn StoragePathAllocator>,
    repo: R,
}

impl<R: UnitRepository> ContentUnitStore<R> {
    pub fn new(registry: Arc<TypeRegistry>, paths: Arc<dyn StoragePathAllocator>, repo: R) -> Self {
        Self {
            registry,
            paths,
            repo,
        }
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Builds an unpersisted unit.
    ///
    /// # Errors
    /// - `UnknownType` when `type_id` is not registered.
    /// - `SchemaMismatch` when `unit_key` fields differ from the declared ones.
    /// - `InvalidStoragePath` when the relative path is blank or escapes the root.
    pub fn init_unit(
        &self,
        type_id: &str,
        unit_key: UnitKey,
        metadata: Metadata,
        relative_storage_path: Option<&str>,
    ) -> ContentResult<ContentUnit> {
        let definition = self.registry.get(type_id)?;
        validate_unit_key(definition, &unit_key)?;

        let storage_path = match relative_storage_path {
            Some(relative) => Some(self.paths.allocate(type_id, relative)?),
            None => None,
        };

        let mut unit = ContentUnit::new(type_id, unit_key, metadata);
        unit.storage_path = storage_path;
        Ok(unit)
    }

    /// Persists `unit` and returns the stored record.
    ///
    /// Without an id the natural key decides identity: an existing record is
    /// reused and takes the given metadata/storage path. With an id the record
    /// is updated in place and its unit key must match the stored one. On both
    /// paths an absent storage path keeps the stored one.
    pub fn save_unit(&self, unit: &ContentUnit) -> ContentResult<ContentUnit> {
        let started_at = Instant::now();
        let definition = self.registry.get(&unit.type_id)?;
        validate_unit_key(definition, &unit.unit_key)?;

        let (id, created) = match unit.id {
            Some(id) => {
                self.ensure_key_unchanged(id, unit)?;
                self.repo.update_unit(id, unit)?;
                (id, false)
            }
            None => {
                let outcome = self.repo.upsert_unit(unit)?;
                (outcome.id, outcome.created)
            }
        };

        info!(
            "event=unit_save module=unit_store status=ok type_id={} unit_id={} created={} duration_ms={}",
            unit.type_id,
            id,
            created,
            started_at.elapsed().as_millis()
        );
        self.get_by_id(&unit.type_id, id)
    }

    fn ensure_key_unchanged(&self, id: UnitId, unit: &ContentUnit) -> ContentResult<()> {
        let stored = self.get_by_id(&unit.type_id, id)?;
        let stored_key = canonical_unit_key(&stored.unit_key).map_err(RepoError::from)?;
        let given_key = canonical_unit_key(&unit.unit_key).map_err(RepoError::from)?;
        if stored_key != given_key {
            return Err(ContentError::Precondition(format!(
                "unit key of persisted unit {}/{id} cannot change from {stored_key} to {given_key}",
                unit.type_id
            )));
        }
        Ok(())
    }

    pub fn get_by_id(&self, type_id: &str, id: UnitId) -> ContentResult<ContentUnit> {
        self.repo
            .get_unit(type_id, id)?
            .ok_or_else(|| ContentError::UnitNotFound {
                type_id: type_id.to_string(),
                id,
            })
    }

    /// Looks a unit up by natural key.
    pub fn get_by_key(
        &self,
        type_id: &str,
        unit_key: &UnitKey,
    ) -> ContentResult<Option<ContentUnit>> {
        let definition = self.registry.get(type_id)?;
        validate_unit_key(definition, unit_key)?;
        Ok(self.repo.find_unit_by_key(type_id, unit_key)?)
    }

    /// Merges `metadata` into a persisted unit and returns the result.
    pub fn update_metadata(
        &self,
        type_id: &str,
        id: UnitId,
        metadata: &Metadata,
    ) -> ContentResult<ContentUnit> {
        self.registry.get(type_id)?;
        self.repo.merge_metadata(type_id, id, metadata)?;
        debug!(
            "event=unit_metadata_merge module=unit_store status=ok type_id={} unit_id={} fields={}",
            type_id,
            id,
            metadata.len()
        );
        self.get_by_id(type_id, id)
    }

    pub fn count(&self, type_id: &str) -> ContentResult<u64> {
        self.registry.get(type_id)?;
        Ok(self.repo.count_units(type_id)?)
    }
}

/// Checks that `unit_key` has exactly the fields declared by `definition`
/// and that none of them is `null`.
pub fn validate_unit_key(definition: &TypeDefinition, unit_key: &UnitKey) -> ContentResult<()> {
    let expected: BTreeSet<&str> = definition
        .unit_key_fields
        .iter()
        .map(String::as_str)
        .collect();
    let actual: BTreeSet<&str> = unit_key.keys().map(String::as_str).collect();
    if expected != actual {
        return Err(ContentError::SchemaMismatch {
            type_id: definition.id.clone(),
            expected: definition.unit_key_fields.clone(),
            actual: unit_key.keys().cloned().collect(),
        });
    }

    if let Some((field, _)) = unit_key.iter().find(|(_, value)| value.is_null()) {
        return Err(ContentError::NullKeyValue {
            type_id: definition.id.clone(),
            field: field.clone(),
        });
    }
    Ok(())
}
