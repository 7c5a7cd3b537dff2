//! Error taxonomy shared by the unit, association and linking services.

use crate::model::content_unit::UnitId;
use crate::repo::unit_repo::RepoError;
use crate::storage::path::StoragePathError;
use crate::types::registry::TypeRegistryError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type ContentResult<T> = Result<T, ContentError>;

#[derive(Debug)]
pub enum ContentError {
    /// Unit key fields differ from the type's declared key fields.
    SchemaMismatch {
        type_id: String,
        expected: Vec<String>,
        actual: Vec<String>,
    },
    /// A declared key field carries `null`.
    NullKeyValue { type_id: String, field: String },
    UnknownType(String),
    UnitNotFound { type_id: String, id: UnitId },
    /// Operation requires state the caller has not established yet.
    Precondition(String),
    /// Strict link mode: child type not declared by the parent type.
    TypeIncompatible {
        parent_type_id: String,
        child_type_id: String,
    },
    /// An association points at a unit that no longer resolves.
    ConsistencyFault {
        repo_id: String,
        unit_type_id: String,
        unit_id: UnitId,
    },
    InvalidStoragePath(StoragePathError),
    /// Type registration failure other than an unknown id.
    Registry(TypeRegistryError),
    Storage(RepoError),
}

impl ContentError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::UnknownType(_) | Self::UnitNotFound { .. })
    }
}

impl Display for ContentError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SchemaMismatch {
                type_id,
                expected,
                actual,
            } => write!(
                f,
                "unit key for type `{type_id}` must have fields [{}], got [{}]",
                expected.join(", "),
                actual.join(", ")
            ),
            Self::NullKeyValue { type_id, field } => {
                write!(f, "unit key field `{field}` of type `{type_id}` must not be null")
            }
            Self::UnknownType(type_id) => write!(f, "content type not found: {type_id}"),
            Self::UnitNotFound { type_id, id } => {
                write!(f, "content unit not found: {type_id}/{id}")
            }
            Self::Precondition(message) => write!(f, "precondition failed: {message}"),
            Self::TypeIncompatible {
                parent_type_id,
                child_type_id,
            } => write!(
                f,
                "type `{parent_type_id}` does not declare `{child_type_id}` as a child type"
            ),
            Self::ConsistencyFault {
                repo_id,
                unit_type_id,
                unit_id,
            } => write!(
                f,
                "repository `{repo_id}` is associated with missing unit {unit_type_id}/{unit_id}"
            ),
            Self::InvalidStoragePath(err) => write!(f, "{err}"),
            Self::Registry(err) => write!(f, "{err}"),
            Self::Storage(err) => write!(f, "storage failure: {err}"),
        }
    }
}

impl Error for ContentError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidStoragePath(err) => Some(err),
            Self::Registry(err) => Some(err),
            Self::Storage(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for ContentError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::UnitNotFound { type_id, id } => Self::UnitNotFound { type_id, id },
            other => Self::Storage(other),
        }
    }
}

impl From<TypeRegistryError> for ContentError {
    fn from(value: TypeRegistryError) -> Self {
        match value {
            TypeRegistryError::NotFound(type_id) => Self::UnknownType(type_id),
            other => Self::Registry(other),
        }
    }
}

impl From<StoragePathError> for ContentError {
    fn from(value: StoragePathError) -> Self {
        Self::InvalidStoragePath(value)
    }
}
