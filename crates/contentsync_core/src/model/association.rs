//! Repository to content unit association model.

use crate::model::content_unit::UnitId;
use serde::{Deserialize, Serialize};

/// Who created an association.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnerType {
    /// Added by an importer during sync.
    Importer,
    /// Added directly by a user.
    User,
}

impl OwnerType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Importer => "importer",
            Self::User => "user",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "importer" => Some(Self::Importer),
            "user" => Some(Self::User),
            _ => None,
        }
    }
}

/// Owner metadata recorded with an association.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssociationOwner {
    pub owner_type: OwnerType,
    pub owner_id: String,
}

impl AssociationOwner {
    pub fn importer(owner_id: impl Into<String>) -> Self {
        Self {
            owner_type: OwnerType::Importer,
            owner_id: owner_id.into(),
        }
    }

    pub fn user(owner_id: impl Into<String>) -> Self {
        Self {
            owner_type: OwnerType::User,
            owner_id: owner_id.into(),
        }
    }
}

/// One row of the repository/unit join table.
///
/// `(repo_id, unit_id, unit_type_id)` is unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoContentUnit {
    /// Insertion sequence; orders a repository's units.
    pub seq: i64,
    pub repo_id: String,
    pub unit_id: UnitId,
    pub unit_type_id: String,
    pub owner: AssociationOwner,
    /// Epoch ms.
    pub created_at: i64,
    /// Epoch ms.
    pub updated_at: i64,
}
