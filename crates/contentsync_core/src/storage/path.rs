//! Payload storage path allocation.
//!
//! # Invariants
//! - Allocated paths always live under the allocator root.
//! - `..` components in caller-relative paths are rejected.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Component, Path, PathBuf};

/// Maps a type id and caller-relative path to an absolute payload path.
pub trait StoragePathAllocator: Send + Sync {
    fn allocate(&self, type_id: &str, relative_path: &str) -> Result<String, StoragePathError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoragePathError {
    EmptyRelativePath,
    EscapesRoot(String),
}

impl Display for StoragePathError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyRelativePath => write!(f, "relative storage path must not be empty"),
            Self::EscapesRoot(path) => {
                write!(f, "relative storage path escapes storage root: `{path}`")
            }
        }
    }
}

impl Error for StoragePathError {}

/// Allocates `<root>/<type_id>/<relative_path>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootedPathAllocator {
    root: PathBuf,
}

impl RootedPathAllocator {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl StoragePathAllocator for RootedPathAllocator {
    fn allocate(&self, type_id: &str, relative_path: &str) -> Result<String, StoragePathError> {
        let trimmed = relative_path.trim().trim_start_matches('/');
        if trimmed.is_empty() {
            return Err(StoragePathError::EmptyRelativePath);
        }

        let relative = Path::new(trimmed);
        let escapes = relative
            .components()
            .any(|component| !matches!(component, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(StoragePathError::EscapesRoot(relative_path.to_string()));
        }

        Ok(self
            .root
            .join(type_id)
            .join(relative)
            .to_string_lossy()
            .into_owned())
    }
}
