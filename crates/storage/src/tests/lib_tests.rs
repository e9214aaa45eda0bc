use super::*;

async fn storage_with_project() -> Storage {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage
        .create_database(&DatabaseHandle::new("001", "Home"))
        .await
        .expect("database");
    storage
}

#[tokio::test]
async fn health_check_succeeds_for_live_pool() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage.health_check().await.expect("health check");
}

#[tokio::test]
async fn creates_and_lists_databases_in_number_order() {
    let storage = storage_with_project().await;
    storage
        .create_database(&DatabaseHandle::new("000", "Personal"))
        .await
        .expect("database");

    let databases = storage.list_databases().await.expect("list");
    assert_eq!(
        databases,
        vec![
            DatabaseHandle::new("000", "Personal"),
            DatabaseHandle::new("001", "Home")
        ]
    );
}

#[tokio::test]
async fn duplicate_database_is_an_error() {
    let storage = storage_with_project().await;
    let err = storage
        .create_database(&DatabaseHandle::new("001", "Again"))
        .await
        .expect_err("duplicate");
    assert!(err.to_string().contains("001"));
}

#[tokio::test]
async fn upsert_replaces_title_and_meta() {
    let storage = storage_with_project().await;
    let mut meta = Meta::new();
    meta.insert("pinned".into(), serde_json::json!(true));

    storage
        .upsert_record("001", &FlatRecord::new(ItemKind::Area, "10-19", "Admin"))
        .await
        .expect("insert");
    storage
        .upsert_record(
            "001",
            &FlatRecord::new(ItemKind::Area, "10-19", "Life admin").with_meta(meta.clone()),
        )
        .await
        .expect("update");

    let records = storage.list_records("001").await.expect("records");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].title, "Life admin");
    assert_eq!(records[0].meta, Some(meta));
}

#[tokio::test]
async fn records_are_scoped_per_project() {
    let storage = storage_with_project().await;
    storage
        .create_database(&DatabaseHandle::new("002", "Work"))
        .await
        .expect("database");
    storage
        .upsert_record("001", &FlatRecord::new(ItemKind::Category, "11", "Documents"))
        .await
        .expect("insert");

    assert_eq!(storage.list_records("001").await.expect("records").len(), 1);
    assert!(storage.list_records("002").await.expect("records").is_empty());
}

#[tokio::test]
async fn project_records_are_rejected() {
    let storage = storage_with_project().await;
    let err = storage
        .upsert_record("001", &FlatRecord::new(ItemKind::Project, "001", "Home"))
        .await
        .expect_err("projects live in the databases table");
    assert_eq!(
        err.downcast_ref::<ApiException>().map(|err| err.code),
        Some(ErrorCode::Validation)
    );
}

#[tokio::test]
async fn writes_publish_changes() {
    let storage = storage_with_project().await;
    let mut changes = storage.subscribe_changes();

    storage
        .upsert_record("001", &FlatRecord::new(ItemKind::Area, "10-19", "Admin"))
        .await
        .expect("insert");
    assert_eq!(
        changes.recv().await.expect("change"),
        StoreChange::Records {
            project: "001".into()
        }
    );

    assert!(storage
        .delete_record("001", ItemKind::Area, "10-19")
        .await
        .expect("delete"));
    assert_eq!(
        changes.recv().await.expect("change"),
        StoreChange::Records {
            project: "001".into()
        }
    );

    assert!(!storage
        .delete_record("001", ItemKind::Area, "10-19")
        .await
        .expect("second delete"));
}

#[tokio::test]
async fn rename_and_delete_database() {
    let storage = storage_with_project().await;
    storage
        .upsert_record("001", &FlatRecord::new(ItemKind::Area, "10-19", "Admin"))
        .await
        .expect("insert");

    assert!(storage.rename_database("001", "House").await.expect("rename"));
    assert_eq!(
        storage.database("001").await.expect("lookup"),
        Some(DatabaseHandle::new("001", "House"))
    );

    assert!(storage.delete_database("001").await.expect("delete"));
    assert!(storage.list_databases().await.expect("list").is_empty());
    assert!(storage.list_records("001").await.expect("records").is_empty());
}

#[tokio::test]
async fn creates_database_file_when_missing() {
    let temp_root = tempfile::tempdir().expect("tempdir");
    let db_path = temp_root.path().join("nested").join("storage.db");
    let database_url = format!("sqlite://{}", db_path.to_string_lossy().replace('\\', "/"));

    let storage = Storage::new(&database_url).await.expect("db");
    drop(storage);

    assert!(
        db_path.exists(),
        "database file should exist: {}",
        db_path.display()
    );
}
