//! Content unit storage, repository association and linking engine.
//! Sync plugins reach it through [`RepoSyncConduit`].

pub mod conduit;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;
pub mod storage;
pub mod types;

pub use conduit::repo_sync::{
    ConduitOperation, ConduitResult, RepoSyncConduit, RepoSyncConduitError,
};
pub use config::{ConfigError, EngineConfig};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::association::{AssociationOwner, OwnerType, RepoContentUnit};
pub use model::content_unit::{children_field_name, ContentUnit, Metadata, UnitId, UnitKey};
pub use repo::association_repo::{
    AssociationPages, AssociationQuery, AssociationRepository, SqliteAssociationRepository,
};
pub use repo::unit_repo::{
    RepoError, RepoResult, SqliteUnitRepository, UnitRepository, UpsertOutcome,
};
pub use service::association_service::AssociationStore;
pub use service::error::{ContentError, ContentResult};
pub use service::linking_service::{LinkPolicy, LinkingEngine};
pub use service::unit_service::ContentUnitStore;
pub use storage::path::{RootedPathAllocator, StoragePathAllocator, StoragePathError};
pub use types::definition::{TypeDefinition, TypeDefinitionError};
pub use types::registry::{TypeRegistry, TypeRegistryError};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
