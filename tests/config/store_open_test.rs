//! Opening each configured store backend.

use kev::config::{StoreConfig, StoreKind};
use kev::SecretValue;

#[tokio::test]
async fn memory_store_opens_empty() {
    let config = StoreConfig {
        kind: StoreKind::Memory,
        path: None,
    };
    let store = config.open().await.expect("open");
    assert!(store.list_keys().await.expect("list").is_empty());
}

#[tokio::test]
async fn file_store_reads_dotenv_entries() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("secrets.env");
    std::fs::write(&path, "DB_PASSWORD=secret123\nAPI_KEY=abc\n").expect("write");
    let config = StoreConfig {
        kind: StoreKind::File,
        path: Some(path),
    };

    let store = config.open().await.expect("open");

    assert_eq!(
        store.get("DB_PASSWORD").await.expect("get").expose(),
        "secret123"
    );
    let mut keys = store.list_keys().await.expect("list");
    keys.sort();
    assert_eq!(keys, vec!["API_KEY", "DB_PASSWORD"]);
}

#[tokio::test]
async fn sqlite_store_is_created_and_persists() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = StoreConfig {
        kind: StoreKind::Sqlite,
        path: Some(dir.path().join("kv.db")),
    };

    let store = config.open().await.expect("open");
    store
        .set("CI_TOKEN", SecretValue::new("tok"))
        .await
        .expect("set");
    store.close().await.expect("close");

    let reopened = config.open().await.expect("reopen");
    assert_eq!(
        reopened.get("CI_TOKEN").await.expect("get").expose(),
        "tok"
    );
    reopened.close().await.expect("close");
}

#[test]
fn default_paths_live_under_config_dir() {
    let sqlite = StoreConfig::default().resolved_path().expect("path");
    let file = StoreConfig {
        kind: StoreKind::File,
        path: None,
    }
    .resolved_path()
    .expect("path");

    assert!(sqlite.ends_with(".kevd/kv.db"));
    assert!(file.ends_with(".kevd/secrets.env"));
}
