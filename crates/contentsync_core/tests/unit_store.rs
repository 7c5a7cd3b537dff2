use contentsync_core::db::open_db_in_memory;
use contentsync_core::{
    ContentError, ContentUnitStore, Metadata, RootedPathAllocator, SqliteUnitRepository,
    TypeDefinition, TypeRegistry, UnitKey,
};
use rusqlite::Connection;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

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

fn store(conn: &Connection) -> ContentUnitStore<SqliteUnitRepository<'_>> {
    ContentUnitStore::new(
        registry(),
        Arc::new(RootedPathAllocator::new("/srv/content")),
        SqliteUnitRepository::new(conn),
    )
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

#[test]
fn init_unit_builds_unpersisted_unit_with_storage_path() {
    let conn = open_db_in_memory().unwrap();
    let store = store(&conn);

    let unit = store
        .init_unit(
            "type-1",
            key(&[("key-1", "unit_1")]),
            metadata(&[("meta_1", "value_1")]),
            Some("/foo/bar"),
        )
        .unwrap();

    assert_eq!(unit.id, None);
    assert_eq!(unit.type_id, "type-1");
    assert_eq!(unit.unit_key, key(&[("key-1", "unit_1")]));
    assert_eq!(unit.metadata, metadata(&[("meta_1", "value_1")]));
    let path = unit.storage_path.as_deref().unwrap();
    assert!(path.contains("/foo/bar"));
    assert!(path.starts_with("/srv/content/type-1"));
    assert_eq!(store.count("type-1").unwrap(), 0);
}

#[test]
fn init_unit_without_relative_path_has_no_storage_path() {
    let conn = open_db_in_memory().unwrap();
    let unit = store(&conn)
        .init_unit("type-1", key(&[("key-1", "u")]), Metadata::new(), None)
        .unwrap();
    assert_eq!(unit.storage_path, None);
}

#[test]
fn init_unit_rejects_key_not_matching_type() {
    let conn = open_db_in_memory().unwrap();
    let err = store(&conn)
        .init_unit("type-2", key(&[("key-2a", "only")]), Metadata::new(), None)
        .unwrap_err();
    assert!(matches!(err, ContentError::SchemaMismatch { type_id, .. } if type_id == "type-2"));
}

#[test]
fn init_unit_rejects_unknown_type() {
    let conn = open_db_in_memory().unwrap();
    let err = store(&conn)
        .init_unit("type-9", key(&[("key-1", "u")]), Metadata::new(), None)
        .unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn save_assigns_id_and_is_idempotent_per_natural_key() {
    let conn = open_db_in_memory().unwrap();
    let store = store(&conn);

    let unit = store
        .init_unit("type-1", key(&[("key-1", "unit_1")]), Metadata::new(), Some("a"))
        .unwrap();
    let first = store.save_unit(&unit).unwrap();
    let second = store.save_unit(&unit).unwrap();

    let id = first.id.unwrap();
    assert!(!id.is_nil());
    assert_eq!(second.id, Some(id));
    assert_eq!(store.count("type-1").unwrap(), 1);
    assert!(first.updated_at.is_some());
}

#[test]
fn saving_existing_key_takes_new_metadata() {
    let conn = open_db_in_memory().unwrap();
    let store = store(&conn);

    let original = store
        .init_unit(
            "type-1",
            key(&[("key-1", "unit_1")]),
            metadata(&[("checksum", "abc")]),
            Some("v1/pkg"),
        )
        .unwrap();
    let saved = store.save_unit(&original).unwrap();

    let rediscovered = store
        .init_unit(
            "type-1",
            key(&[("key-1", "unit_1")]),
            metadata(&[("checksum", "def")]),
            None,
        )
        .unwrap();
    let resaved = store.save_unit(&rediscovered).unwrap();

    assert_eq!(resaved.id, saved.id);
    assert_eq!(resaved.metadata, metadata(&[("checksum", "def")]));
    assert_eq!(resaved.storage_path, saved.storage_path);
}

#[test]
fn same_key_values_in_different_types_are_distinct_units() {
    let conn = open_db_in_memory().unwrap();
    let mut registry = TypeRegistry::new();
    registry
        .register([
            TypeDefinition::new("a", "A", "", ["name"], Vec::<String>::new(), Vec::<String>::new()),
            TypeDefinition::new("b", "B", "", ["name"], Vec::<String>::new(), Vec::<String>::new()),
        ])
        .unwrap();
    let store = ContentUnitStore::new(
        Arc::new(registry),
        Arc::new(RootedPathAllocator::new("/srv/content")),
        SqliteUnitRepository::new(&conn),
    );

    let a = store
        .save_unit(&store.init_unit("a", key(&[("name", "x")]), Metadata::new(), None).unwrap())
        .unwrap();
    let b = store
        .save_unit(&store.init_unit("b", key(&[("name", "x")]), Metadata::new(), None).unwrap())
        .unwrap();
    assert_ne!(a.id, b.id);
}

#[test]
fn save_with_id_updates_metadata_in_place() {
    let conn = open_db_in_memory().unwrap();
    let store = store(&conn);

    let mut unit = store
        .save_unit(
            &store
                .init_unit("type-1", key(&[("key-1", "u")]), metadata(&[("a", "1")]), None)
                .unwrap(),
        )
        .unwrap();
    unit.metadata = metadata(&[("b", "2")]);
    unit.storage_path = Some("/srv/content/type-1/moved".to_string());

    let updated = store.save_unit(&unit).unwrap();
    assert_eq!(updated.id, unit.id);
    assert_eq!(updated.metadata, metadata(&[("b", "2")]));
    assert_eq!(
        updated.storage_path.as_deref(),
        Some("/srv/content/type-1/moved")
    );
}

#[test]
fn save_with_unknown_id_is_not_found() {
    let conn = open_db_in_memory().unwrap();
    let store = store(&conn);

    let mut unit = store
        .init_unit("type-1", key(&[("key-1", "u")]), Metadata::new(), None)
        .unwrap();
    let ghost = Uuid::new_v4();
    unit.id = Some(ghost);

    let err = store.save_unit(&unit).unwrap_err();
    assert!(matches!(err, ContentError::UnitNotFound { id, .. } if id == ghost));
}

#[test]
fn get_by_id_and_key_resolve_the_same_record() {
    let conn = open_db_in_memory().unwrap();
    let store = store(&conn);

    let unit_key = key(&[("key-2a", "unit_2"), ("key-2b", "unit_2")]);
    let saved = store
        .save_unit(
            &store
                .init_unit("type-2", unit_key.clone(), Metadata::new(), Some("/foo/bar"))
                .unwrap(),
        )
        .unwrap();

    let by_id = store.get_by_id("type-2", saved.id.unwrap()).unwrap();
    let by_key = store.get_by_key("type-2", &unit_key).unwrap().unwrap();
    assert_eq!(by_id, by_key);
    assert_eq!(by_id.unit_key, unit_key);

    let missing = store
        .get_by_key("type-2", &key(&[("key-2a", "x"), ("key-2b", "y")]))
        .unwrap();
    assert!(missing.is_none());
}

#[test]
fn get_by_id_is_scoped_to_type() {
    let conn = open_db_in_memory().unwrap();
    let store = store(&conn);

    let saved = store
        .save_unit(
            &store
                .init_unit("type-1", key(&[("key-1", "u")]), Metadata::new(), None)
                .unwrap(),
        )
        .unwrap();

    let err = store.get_by_id("type-2", saved.id.unwrap()).unwrap_err();
    assert!(matches!(err, ContentError::UnitNotFound { .. }));
}

#[test]
fn update_metadata_merges_fields() {
    let conn = open_db_in_memory().unwrap();
    let store = store(&conn);

    let saved = store
        .save_unit(
            &store
                .init_unit(
                    "type-1",
                    key(&[("key-1", "u")]),
                    metadata(&[("a", "1"), ("b", "2")]),
                    None,
                )
                .unwrap(),
        )
        .unwrap();

    let merged = store
        .update_metadata("type-1", saved.id.unwrap(), &metadata(&[("b", "3"), ("c", "4")]))
        .unwrap();
    assert_eq!(
        merged.metadata,
        metadata(&[("a", "1"), ("b", "3"), ("c", "4")])
    );
}

#[test]
fn save_with_id_rejects_changed_unit_key_and_keeps_storage_path() {
    let conn = open_db_in_memory().unwrap();
    let store = store(&conn);

    let saved = store
        .save_unit(
            &store
                .init_unit("type-1", key(&[("key-1", "a")]), Metadata::new(), Some("p"))
                .unwrap(),
        )
        .unwrap();

    let mut rekeyed = saved.clone();
    rekeyed.unit_key = key(&[("key-1", "b")]);
    let err = store.save_unit(&rekeyed).unwrap_err();
    assert!(matches!(err, ContentError::Precondition(message) if message.contains("unit key")));

    let mut pathless = saved.clone();
    pathless.storage_path = None;
    pathless.metadata = metadata(&[("checksum", "abc")]);
    let updated = store.save_unit(&pathless).unwrap();
    assert_eq!(updated.unit_key, key(&[("key-1", "a")]));
    assert_eq!(updated.storage_path, saved.storage_path);
    assert_eq!(updated.metadata, metadata(&[("checksum", "abc")]));
    assert!(store.get_by_key("type-1", &key(&[("key-1", "b")])).unwrap().is_none());
}

#[test]
fn integral_float_and_integer_keys_name_the_same_unit() {
    let conn = open_db_in_memory().unwrap();
    let store = store(&conn);

    let mut int_key = UnitKey::new();
    int_key.insert("key-1".to_string(), json!(1));
    let mut float_key = UnitKey::new();
    float_key.insert("key-1".to_string(), json!(1.0));

    let first = store
        .save_unit(&store.init_unit("type-1", int_key, Metadata::new(), None).unwrap())
        .unwrap();
    let float_unit = store
        .init_unit("type-1", float_key.clone(), Metadata::new(), None)
        .unwrap();
    let second = store.save_unit(&float_unit).unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(store.count("type-1").unwrap(), 1);
    assert_eq!(
        store.get_by_key("type-1", &float_key).unwrap().unwrap().id,
        first.id
    );
}

#[test]
fn null_key_value_is_rejected_at_init() {
    let conn = open_db_in_memory().unwrap();
    let mut null_key = UnitKey::new();
    null_key.insert("key-1".to_string(), json!(null));

    let err = store(&conn)
        .init_unit("type-1", null_key, Metadata::new(), None)
        .unwrap_err();
    assert!(matches!(err, ContentError::NullKeyValue { field, .. } if field == "key-1"));
}
