//! Store failures during evaluation: vanished keys and unavailable reads.

use std::sync::Arc;

use kev::{EngineError, PolicyEngine};

use crate::support::{cmdline, proc, Fault, FaultyStore, RecordingObserver};

const ENTRIES: &[(&str, &str)] = &[("A", "1"), ("B", "2"), ("C", "3")];

#[tokio::test]
async fn key_deleted_between_list_and_get_is_omitted() {
    let store = FaultyStore::new(ENTRIES, Fault::VanishOnGet("B".to_owned()));
    let observer = Arc::new(RecordingObserver::default());
    let engine = PolicyEngine::new(Arc::new(store), vec![cmdline(".*", &["A", "B", "C"])])
        .with_observer(Arc::clone(&observer) as _);

    let env = engine.allowed_env(&proc("run")).await.expect("evaluate");

    assert_eq!(env.keys().collect::<Vec<_>>(), vec!["A", "C"]);
    assert_eq!(
        observer.events(),
        vec!["vanished B", "completed granted=3 released=2"]
    );
}

#[tokio::test]
async fn unavailable_get_aborts_without_partial_result() {
    let store = FaultyStore::new(ENTRIES, Fault::GetUnavailable("B".to_owned()));
    let observer = Arc::new(RecordingObserver::default());
    let engine = PolicyEngine::new(Arc::new(store), vec![cmdline(".*", &["A", "B", "C"])])
        .with_observer(Arc::clone(&observer) as _);

    let result = engine.allowed_env(&proc("run")).await;

    assert!(matches!(result, Err(EngineError::StoreUnavailable(_))));
    assert_eq!(observer.events(), vec!["failed"]);
}

#[tokio::test]
async fn unavailable_get_of_ungranted_key_is_never_attempted() {
    let store = FaultyStore::new(ENTRIES, Fault::GetUnavailable("C".to_owned()));
    let engine = PolicyEngine::new(Arc::new(store), vec![cmdline(".*", &["A"])]);

    let env = engine.allowed_env(&proc("run")).await.expect("evaluate");

    assert_eq!(env.get("A"), Some("1"));
    assert_eq!(env.len(), 1);
}

#[tokio::test]
async fn closed_store_fails_evaluation() {
    use kev::store::InMemoryStore;
    use kev::KvStore;

    let store = Arc::new(InMemoryStore::with_entries(ENTRIES.iter().copied()));
    let engine = PolicyEngine::new(
        Arc::clone(&store) as Arc<dyn KvStore>,
        vec![cmdline(".*", &["A"])],
    );
    store.close().await.expect("close");

    let err = engine
        .allowed_env(&proc("run"))
        .await
        .expect_err("closed store must fail");

    assert!(err.to_string().contains("unavailable"));
}
