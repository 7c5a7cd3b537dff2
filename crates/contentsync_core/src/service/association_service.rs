//! Repository association use-cases.
//!
//! # Invariants
//! - Associate and disassociate are idempotent.
//! - Association changes never modify unit records.

use crate::model::association::{AssociationOwner, RepoContentUnit};
use crate::model::content_unit::UnitId;
use crate::repo::association_repo::{AssociationPages, AssociationQuery, AssociationRepository};
use crate::service::error::{ContentError, ContentResult};
use log::debug;

/// Join-table service between repositories and content units.
pub struct AssociationStore<A: AssociationRepository> {
    repo: A,
}

impl<A: AssociationRepository> AssociationStore<A> {
    pub fn new(repo: A) -> Self {
        Self { repo }
    }

    /// Associates a unit with a repository; returns whether a row was added.
    pub fn associate(
        &self,
        repo_id: &str,
        unit_id: UnitId,
        unit_type_id: &str,
        owner: &AssociationOwner,
    ) -> ContentResult<bool> {
        require_repo_id(repo_id)?;
        let inserted = self.repo.associate(repo_id, unit_id, unit_type_id, owner)?;
        debug!(
            "event=unit_associate module=association status=ok repo_id={} type_id={} unit_id={} inserted={}",
            repo_id, unit_type_id, unit_id, inserted
        );
        Ok(inserted)
    }

    /// Removes an association; returns whether a row was removed.
    pub fn disassociate(
        &self,
        repo_id: &str,
        unit_id: UnitId,
        unit_type_id: &str,
    ) -> ContentResult<bool> {
        require_repo_id(repo_id)?;
        let removed = self.repo.disassociate(repo_id, unit_id, unit_type_id)?;
        debug!(
            "event=unit_disassociate module=association status=ok repo_id={} type_id={} unit_id={} removed={}",
            repo_id, unit_type_id, unit_id, removed
        );
        Ok(removed)
    }

    pub fn get(
        &self,
        repo_id: &str,
        unit_id: UnitId,
        unit_type_id: &str,
    ) -> ContentResult<Option<RepoContentUnit>> {
        Ok(self.repo.get_association(repo_id, unit_id, unit_type_id)?)
    }

    /// Lazily walks `repo_id` associations in insertion order.
    pub fn units_for_repo(
        &self,
        repo_id: &str,
        query: &AssociationQuery,
    ) -> AssociationPages<'_, A> {
        self.repo.units_for_repo(repo_id, query)
    }

    pub fn repos_for_unit(
        &self,
        unit_id: UnitId,
        unit_type_id: &str,
    ) -> ContentResult<Vec<RepoContentUnit>> {
        Ok(self.repo.repos_for_unit(unit_id, unit_type_id)?)
    }

    pub fn count_for_repo(&self, repo_id: &str) -> ContentResult<u64> {
        Ok(self.repo.count_for_repo(repo_id)?)
    }
}

fn require_repo_id(repo_id: &str) -> ContentResult<()> {
    if repo_id.trim().is_empty() {
        return Err(ContentError::Precondition(
            "repository id must not be empty".to_string(),
        ));
    }
    Ok(())
}
