//! Repository sync conduit.
//!
//! # Responsibility
//! - Give sync plugins one facade for unit init/save/get/remove/link within a
//!   single bound repository.
//! - Wrap every component failure into `RepoSyncConduitError`.
//!
//! # Invariants
//! - The bound repository is fixed for the conduit's lifetime.
//! - `save_unit` is retry-safe as a whole: both the unit upsert and the
//!   association insert are idempotent.
//! - `remove_unit` only drops the association; the unit record survives.
//! - A listed association whose unit is missing fails the whole listing.

use crate::config::{ConfigError, EngineConfig};
use crate::model::association::AssociationOwner;
use crate::model::content_unit::{ContentUnit, Metadata, UnitKey};
use crate::repo::association_repo::{
    AssociationQuery, AssociationRepository, SqliteAssociationRepository,
};
use crate::repo::unit_repo::{SqliteUnitRepository, UnitRepository};
use crate::service::association_service::AssociationStore;
use crate::service::error::{ContentError, ContentResult};
use crate::service::linking_service::LinkingEngine;
use crate::service::unit_service::ContentUnitStore;
use crate::types::registry::TypeRegistry;
use log::{error, info};
use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Instant;

pub type ConduitResult<T> = Result<T, RepoSyncConduitError>;

/// Conduit entry point that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConduitOperation {
    InitUnit,
    SaveUnit,
    GetUnits,
    GetUnitByKey,
    RemoveUnit,
    LinkChildUnit,
}

impl ConduitOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InitUnit => "init_unit",
            Self::SaveUnit => "save_unit",
            Self::GetUnits => "get_units",
            Self::GetUnitByKey => "get_unit_by_key",
            Self::RemoveUnit => "remove_unit",
            Self::LinkChildUnit => "link_child_unit",
        }
    }
}

/// Single error family surfaced to sync plugins.
#[derive(Debug)]
pub struct RepoSyncConduitError {
    operation: ConduitOperation,
    repo_id: String,
    cause: ContentError,
}

impl RepoSyncConduitError {
    pub fn operation(&self) -> ConduitOperation {
        self.operation
    }

    pub fn repo_id(&self) -> &str {
        &self.repo_id
    }

    pub fn cause(&self) -> &ContentError {
        &self.cause
    }

    pub fn into_cause(self) -> ContentError {
        self.cause
    }
}

impl Display for RepoSyncConduitError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "repo sync conduit `{}` failed for repository `{}`: {}",
            self.operation.as_str(),
            self.repo_id,
            self.cause
        )
    }
}

impl Error for RepoSyncConduitError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.cause)
    }
}

/// Facade bound to one repository.
pub struct RepoSyncConduit<U: UnitRepository, A: AssociationRepository> {
    repo_id: String,
    owner: AssociationOwner,
    units: ContentUnitStore<U>,
    associations: AssociationStore<A>,
    linker: LinkingEngine<U>,
}

impl<'conn> RepoSyncConduit<SqliteUnitRepository<'conn>, SqliteAssociationRepository<'conn>> {
    /// Wires a conduit over one SQLite connection.
    ///
    /// Associations are recorded as owned by the importer `importer_id`.
    ///
    /// # Errors
    /// - `ConfigError::Invalid` when `config` fails [`EngineConfig::validate`].
    pub fn sqlite(
        repo_id: impl Into<String>,
        importer_id: impl Into<String>,
        conn: &'conn Connection,
        registry: Arc<TypeRegistry>,
        config: &EngineConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let unit_repo = SqliteUnitRepository::new(conn);
        let association_repo =
            SqliteAssociationRepository::with_page_size(conn, config.association_page_size);
        Ok(Self::new(
            repo_id,
            AssociationOwner::importer(importer_id),
            ContentUnitStore::new(
                Arc::clone(&registry),
                Arc::new(config.path_allocator()),
                unit_repo,
            ),
            AssociationStore::new(association_repo),
            LinkingEngine::new(registry, unit_repo, config.link_policy),
        ))
    }
}

impl<U: UnitRepository, A: AssociationRepository> RepoSyncConduit<U, A> {
    pub fn new(
        repo_id: impl Into<String>,
        owner: AssociationOwner,
        units: ContentUnitStore<U>,
        associations: AssociationStore<A>,
        linker: LinkingEngine<U>,
    ) -> Self {
        Self {
            repo_id: repo_id.into(),
            owner,
            units,
            associations,
            linker,
        }
    }

    pub fn repo_id(&self) -> &str {
        &self.repo_id
    }

    /// Builds an unpersisted unit of `type_id`; `id` stays unset until saved.
    pub fn init_unit(
        &self,
        type_id: &str,
        unit_key: UnitKey,
        metadata: Metadata,
        relative_storage_path: Option<&str>,
    ) -> ConduitResult<ContentUnit> {
        self.units
            .init_unit(type_id, unit_key, metadata, relative_storage_path)
            .map_err(|err| self.wrap(ConduitOperation::InitUnit, err))
    }

    /// Persists `unit` and associates it with the bound repository.
    pub fn save_unit(&self, unit: &ContentUnit) -> ConduitResult<ContentUnit> {
        self.try_save_unit(unit)
            .map_err(|err| self.wrap(ConduitOperation::SaveUnit, err))
    }

    /// Returns every unit associated with the bound repository.
    pub fn get_units(&self) -> ConduitResult<Vec<ContentUnit>> {
        self.collect_units(&AssociationQuery::default())
            .map_err(|err| self.wrap(ConduitOperation::GetUnits, err))
    }

    /// Returns associated units of the given types only.
    pub fn get_units_by_type<I>(&self, type_ids: I) -> ConduitResult<Vec<ContentUnit>>
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.collect_units(&AssociationQuery::for_types(type_ids))
            .map_err(|err| self.wrap(ConduitOperation::GetUnits, err))
    }

    /// Looks a unit up by natural key, whether or not the repository holds it.
    pub fn get_unit_by_key(
        &self,
        type_id: &str,
        unit_key: &UnitKey,
    ) -> ConduitResult<Option<ContentUnit>> {
        self.units
            .get_by_key(type_id, unit_key)
            .map_err(|err| self.wrap(ConduitOperation::GetUnitByKey, err))
    }

    /// Removes `unit` from the bound repository. The unit record is kept.
    pub fn remove_unit(&self, unit: &ContentUnit) -> ConduitResult<()> {
        self.try_remove_unit(unit)
            .map_err(|err| self.wrap(ConduitOperation::RemoveUnit, err))
    }

    /// Links `child` under `parent`; returns the refreshed parent.
    pub fn link_child_unit(
        &self,
        parent: &ContentUnit,
        child: &ContentUnit,
    ) -> ConduitResult<ContentUnit> {
        self.linker
            .link(parent, child)
            .map_err(|err| self.wrap(ConduitOperation::LinkChildUnit, err))
    }

    fn try_save_unit(&self, unit: &ContentUnit) -> ContentResult<ContentUnit> {
        let saved = self.units.save_unit(unit)?;
        let Some(unit_id) = saved.id else {
            return Err(ContentError::Precondition(format!(
                "store returned unit of type `{}` without an id",
                saved.type_id
            )));
        };
        self.associations
            .associate(&self.repo_id, unit_id, &saved.type_id, &self.owner)?;
        Ok(saved)
    }

    fn try_remove_unit(&self, unit: &ContentUnit) -> ContentResult<()> {
        let unit_id = unit.id.ok_or_else(|| {
            ContentError::Precondition(format!(
                "unit of type `{}` was never saved and cannot be removed",
                unit.type_id
            ))
        })?;
        self.associations
            .disassociate(&self.repo_id, unit_id, &unit.type_id)?;
        Ok(())
    }

    fn collect_units(&self, query: &AssociationQuery) -> ContentResult<Vec<ContentUnit>> {
        let started_at = Instant::now();
        let mut units = Vec::new();
        for association in self.associations.units_for_repo(&self.repo_id, query) {
            let association = association?;
            match self
                .units
                .get_by_id(&association.unit_type_id, association.unit_id)
            {
                Ok(unit) => units.push(unit),
                Err(ContentError::UnitNotFound { .. }) => {
                    error!(
                        "event=repo_units_list module=conduit status=error error_code=dangling_association repo_id={} type_id={} unit_id={}",
                        self.repo_id, association.unit_type_id, association.unit_id
                    );
                    return Err(ContentError::ConsistencyFault {
                        repo_id: self.repo_id.clone(),
                        unit_type_id: association.unit_type_id,
                        unit_id: association.unit_id,
                    });
                }
                Err(err) => return Err(err),
            }
        }

        info!(
            "event=repo_units_list module=conduit status=ok repo_id={} count={} duration_ms={}",
            self.repo_id,
            units.len(),
            started_at.elapsed().as_millis()
        );
        Ok(units)
    }

    fn wrap(&self, operation: ConduitOperation, cause: ContentError) -> RepoSyncConduitError {
        RepoSyncConduitError {
            operation,
            repo_id: self.repo_id.clone(),
            cause,
        }
    }
}
