use contentsync_core::db::open_db_in_memory;
use contentsync_core::{
    ConduitOperation, ConfigError, ContentError, EngineConfig, Metadata, RepoSyncConduit,
    SqliteAssociationRepository, SqliteUnitRepository, TypeDefinition, TypeRegistry, UnitKey,
};
use rusqlite::Connection;
use serde_json::json;
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

fn registry() -> Arc<TypeRegistry> {
    let mut registry = TypeRegistry::new();
    registry
        .register([
            TypeDefinition::new(
                "type-1",
                "Type 1",
                "One",
                ["key-1"],
                ["search-1"],
                Vec::<String>::new(),
            ),
            TypeDefinition::new(
                "type-2",
                "Type 2",
                "Two",
                ["key-2a", "key-2b"],
                Vec::<String>::new(),
                ["type-1"],
            ),
        ])
        .unwrap();
    Arc::new(registry)
}

fn config() -> EngineConfig {
    EngineConfig {
        storage_root: PathBuf::from("/srv/content"),
        ..EngineConfig::default()
    }
}

fn bound_conduit<'c>(
    conn: &'c Connection,
    repo_id: &str,
) -> RepoSyncConduit<SqliteUnitRepository<'c>, SqliteAssociationRepository<'c>> {
    RepoSyncConduit::sqlite(repo_id, "importer-1", conn, registry(), &config()).unwrap()
}

fn key(pairs: &[(&str, &str)]) -> UnitKey {
    pairs
        .iter()
        .map(|(field, value)| (field.to_string(), json!(value)))
        .collect()
}

fn metadata(pairs: &[(&str, &str)]) -> Metadata {
    pairs
        .iter()
        .map(|(field, value)| (field.to_string(), json!(value)))
        .collect()
}

fn association_count(conn: &Connection, repo_id: &str) -> i64 {
    conn.query_row(
        "SELECT COUNT(*) FROM repo_content_units WHERE repo_id = ?1;",
        [repo_id],
        |row| row.get(0),
    )
    .unwrap()
}

#[test]
fn init_and_save_unit_persists_and_associates() {
    let conn = open_db_in_memory().unwrap();
    let conduit = bound_conduit(&conn, "repo-1");

    let unit_1_key = key(&[("key-1", "unit_1")]);
    let unit_1_metadata = metadata(&[("meta_1", "value_1")]);
    let unit_1 = conduit
        .init_unit("type-1", unit_1_key.clone(), unit_1_metadata.clone(), Some("/foo/bar"))
        .unwrap();

    assert_eq!(unit_1.unit_key, unit_1_key);
    assert_eq!(unit_1.type_id, "type-1");
    assert_eq!(unit_1.metadata, unit_1_metadata);
    assert!(unit_1.id.is_none());
    assert!(unit_1.storage_path.as_deref().unwrap().contains("/foo/bar"));

    let unit_1 = conduit.save_unit(&unit_1).unwrap();
    assert!(unit_1.id.is_some());

    let db_unit = conduit
        .get_unit_by_key("type-1", &unit_1_key)
        .unwrap()
        .unwrap();
    assert_eq!(db_unit.id, unit_1.id);
    assert_eq!(association_count(&conn, "repo-1"), 1);
}

#[test]
fn saving_same_key_twice_keeps_one_unit_and_one_association() {
    let conn = open_db_in_memory().unwrap();
    let conduit = bound_conduit(&conn, "repo-1");

    let unit = conduit
        .init_unit("type-1", key(&[("key-1", "unit_1")]), Metadata::new(), Some("/foo/bar"))
        .unwrap();
    let first = conduit.save_unit(&unit).unwrap();
    let second = conduit.save_unit(&unit).unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(association_count(&conn, "repo-1"), 1);
}

#[test]
fn get_and_remove_unit_keeps_unit_record() {
    let conn = open_db_in_memory().unwrap();
    let conduit = bound_conduit(&conn, "repo-1");

    let unit_1_key = key(&[("key-1", "unit_1")]);
    let unit_1 = conduit
        .init_unit(
            "type-1",
            unit_1_key.clone(),
            metadata(&[("meta_1", "value_1")]),
            Some("/foo/bar"),
        )
        .unwrap();
    let saved = conduit.save_unit(&unit_1).unwrap();

    let units = conduit.get_units().unwrap();
    assert_eq!(units.len(), 1);
    assert_eq!(units[0].unit_key, unit_1_key);
    assert!(units[0].id.is_some());

    conduit.remove_unit(&units[0]).unwrap();
    assert_eq!(association_count(&conn, "repo-1"), 0);
    assert!(conduit.get_units().unwrap().is_empty());

    let db_unit = conduit
        .get_unit_by_key("type-1", &unit_1_key)
        .unwrap()
        .unwrap();
    assert_eq!(db_unit.id, saved.id);
}

#[test]
fn link_child_unit_records_child_on_parent() {
    let conn = open_db_in_memory().unwrap();
    let conduit = bound_conduit(&conn, "repo-1");

    let unit_1 = conduit
        .init_unit(
            "type-1",
            key(&[("key-1", "unit_1")]),
            metadata(&[("meta_1", "value_1")]),
            Some("/foo/bar"),
        )
        .unwrap();
    let unit_1 = conduit.save_unit(&unit_1).unwrap();

    let unit_2_key = key(&[("key-2a", "unit_2"), ("key-2b", "unit_2")]);
    let unit_2 = conduit
        .init_unit("type-2", unit_2_key.clone(), Metadata::new(), Some("/foo/bar"))
        .unwrap();
    let unit_2 = conduit.save_unit(&unit_2).unwrap();

    conduit.link_child_unit(&unit_2, &unit_1).unwrap();

    let parent = conduit
        .get_unit_by_key("type-2", &unit_2_key)
        .unwrap()
        .unwrap();
    let document = parent.to_document();
    let children = document["_type-1_children"].as_array().unwrap();
    assert!(children.contains(&json!(unit_1.id.unwrap().to_string())));
}

#[test]
fn get_units_only_sees_bound_repository() {
    let conn = open_db_in_memory().unwrap();
    let repo_1 = bound_conduit(&conn, "repo-1");
    let repo_2 = bound_conduit(&conn, "repo-2");

    let shared = repo_1
        .init_unit("type-1", key(&[("key-1", "shared")]), Metadata::new(), None)
        .unwrap();
    let in_repo_1 = repo_1.save_unit(&shared).unwrap();
    let in_repo_2 = repo_2.save_unit(&shared).unwrap();
    assert_eq!(in_repo_1.id, in_repo_2.id);

    let only_1 = repo_1
        .init_unit("type-2", key(&[("key-2a", "a"), ("key-2b", "b")]), Metadata::new(), None)
        .unwrap();
    repo_1.save_unit(&only_1).unwrap();

    assert_eq!(repo_1.get_units().unwrap().len(), 2);
    assert_eq!(repo_2.get_units().unwrap().len(), 1);
    assert_eq!(repo_1.get_units_by_type(["type-2"]).unwrap().len(), 1);

    repo_2.remove_unit(&in_repo_2).unwrap();
    assert_eq!(repo_1.get_units().unwrap().len(), 2);
}

#[test]
fn dangling_association_is_a_consistency_fault() {
    let conn = open_db_in_memory().unwrap();
    let conduit = bound_conduit(&conn, "repo-1");

    let unit = conduit
        .init_unit("type-1", key(&[("key-1", "doomed")]), Metadata::new(), None)
        .unwrap();
    let saved = conduit.save_unit(&unit).unwrap();

    conn.execute(
        "DELETE FROM content_units WHERE id = ?1;",
        [saved.id.unwrap().to_string()],
    )
    .unwrap();

    let err = conduit.get_units().unwrap_err();
    assert_eq!(err.operation(), ConduitOperation::GetUnits);
    assert!(matches!(
        err.cause(),
        ContentError::ConsistencyFault { unit_id, .. } if Some(*unit_id) == saved.id
    ));
}

#[test]
fn component_failures_are_wrapped_with_cause() {
    let conn = open_db_in_memory().unwrap();
    let conduit = bound_conduit(&conn, "repo-1");

    let err = conduit
        .init_unit("type-2", key(&[("key-1", "wrong")]), Metadata::new(), None)
        .unwrap_err();

    assert_eq!(err.operation(), ConduitOperation::InitUnit);
    assert_eq!(err.repo_id(), "repo-1");
    assert!(matches!(err.cause(), ContentError::SchemaMismatch { .. }));
    assert!(err.source().is_some());
    assert!(err.to_string().contains("init_unit"));
}

#[test]
fn removing_or_linking_unsaved_units_fails() {
    let conn = open_db_in_memory().unwrap();
    let conduit = bound_conduit(&conn, "repo-1");

    let draft = conduit
        .init_unit("type-1", key(&[("key-1", "draft")]), Metadata::new(), None)
        .unwrap();
    let parent = conduit
        .init_unit("type-2", key(&[("key-2a", "a"), ("key-2b", "b")]), Metadata::new(), None)
        .unwrap();
    let parent = conduit.save_unit(&parent).unwrap();

    let remove_err = conduit.remove_unit(&draft).unwrap_err();
    assert!(matches!(remove_err.cause(), ContentError::Precondition(_)));

    let link_err = conduit.link_child_unit(&parent, &draft).unwrap_err();
    assert_eq!(link_err.operation(), ConduitOperation::LinkChildUnit);
    assert!(matches!(link_err.cause(), ContentError::Precondition(_)));
}

#[test]
fn invalid_config_is_rejected_when_wiring_conduit() {
    let conn = open_db_in_memory().unwrap();
    let relative_root = EngineConfig {
        storage_root: PathBuf::from("content"),
        ..EngineConfig::default()
    };

    let err = RepoSyncConduit::sqlite("repo-1", "importer-1", &conn, registry(), &relative_root)
        .err()
        .unwrap();
    assert!(matches!(err, ConfigError::Invalid(message) if message.contains("storage_root")));
}
