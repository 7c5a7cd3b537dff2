//! Parent/child unit linking.
//!
//! # Responsibility
//! - Record parent -> child references keyed by the child's type id.
//! - Optionally enforce the parent type's declared child types.
//!
//! # Invariants
//! - Both units must be persisted before linking.
//! - Linking the same pair twice leaves one reference.
//! - Appends are atomic set-inserts; concurrent linkers keep every child.

use crate::model::content_unit::{ContentUnit, UnitId};
use crate::repo::unit_repo::UnitRepository;
use crate::service::error::{ContentError, ContentResult};
use crate::types::registry::TypeRegistry;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Child type checking mode for [`LinkingEngine::link`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkPolicy {
    /// Any persisted unit may be linked under any parent.
    #[default]
    Permissive,
    /// Child type must appear in the parent type's `child_type_ids`.
    Strict,
}

pub struct LinkingEngine<R: UnitRepository> {
    registry: Arc<TypeRegistry>,
    repo: R,
    policy: LinkPolicy,
}

impl<R: UnitRepository> LinkingEngine<R> {
    pub fn new(registry: Arc<TypeRegistry>, repo: R, policy: LinkPolicy) -> Self {
        Self {
            registry,
            repo,
            policy,
        }
    }

    pub fn policy(&self) -> LinkPolicy {
        self.policy
    }

    /// Links `child` under `parent` and returns the refreshed parent.
    ///
    /// # Errors
    /// - `Precondition` when either unit has no id.
    /// - `UnitNotFound` when either unit is not in the store.
    /// - `TypeIncompatible` in strict mode for undeclared child types.
    pub fn link(&self, parent: &ContentUnit, child: &ContentUnit) -> ContentResult<ContentUnit> {
        let (parent_id, child_id) = self.resolve_pair(parent, child)?;

        let added = self.repo.add_child(parent_id, &child.type_id, child_id)?;
        info!(
            "event=unit_link module=linking status=ok parent_type_id={} parent_id={} child_type_id={} child_id={} added={}",
            parent.type_id, parent_id, child.type_id, child_id, added
        );
        self.load(&parent.type_id, parent_id)
    }

    /// Removes the `child` reference from `parent`, if present.
    pub fn unlink(&self, parent: &ContentUnit, child: &ContentUnit) -> ContentResult<ContentUnit> {
        let parent_id = require_id(parent, "parent")?;
        let child_id = require_id(child, "child")?;
        self.load(&parent.type_id, parent_id)?;

        let removed = self.repo.remove_child(parent_id, &child.type_id, child_id)?;
        info!(
            "event=unit_unlink module=linking status=ok parent_id={} child_type_id={} child_id={} removed={}",
            parent_id, child.type_id, child_id, removed
        );
        self.load(&parent.type_id, parent_id)
    }

    /// Lists linked child ids of `child_type_id` in link order.
    pub fn children(
        &self,
        parent: &ContentUnit,
        child_type_id: &str,
    ) -> ContentResult<Vec<UnitId>> {
        let parent_id = require_id(parent, "parent")?;
        Ok(self.repo.list_children(parent_id, child_type_id)?)
    }

    fn resolve_pair(
        &self,
        parent: &ContentUnit,
        child: &ContentUnit,
    ) -> ContentResult<(UnitId, UnitId)> {
        let child_id = require_id(child, "child")?;
        let parent_id = require_id(parent, "parent")?;

        let parent_definition = self.registry.get(&parent.type_id)?;
        self.registry.get(&child.type_id)?;
        if !parent_definition.declares_child(&child.type_id) {
            match self.policy {
                LinkPolicy::Strict => {
                    return Err(ContentError::TypeIncompatible {
                        parent_type_id: parent.type_id.clone(),
                        child_type_id: child.type_id.clone(),
                    });
                }
                LinkPolicy::Permissive => warn!(
                    "event=unit_link module=linking status=undeclared_child parent_type_id={} child_type_id={}",
                    parent.type_id, child.type_id
                ),
            }
        }

        self.load(&parent.type_id, parent_id)?;
        self.load(&child.type_id, child_id)?;
        Ok((parent_id, child_id))
    }

    fn load(&self, type_id: &str, id: UnitId) -> ContentResult<ContentUnit> {
        self.repo
            .get_unit(type_id, id)?
            .ok_or_else(|| ContentError::UnitNotFound {
                type_id: type_id.to_string(),
                id,
            })
    }
}

fn require_id(unit: &ContentUnit, role: &str) -> ContentResult<UnitId> {
    unit.id.ok_or_else(|| {
        ContentError::Precondition(format!(
            "{role} unit of type `{}` must be saved before linking",
            unit.type_id
        ))
    })
}
