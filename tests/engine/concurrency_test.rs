//! Concurrent evaluations racing with store mutation.

use std::sync::Arc;

use kev::{KvStore, PolicyEngine, SecretValue};

use crate::support::{cmdline, proc, store};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn evaluations_tolerate_concurrent_deletes_and_writes() {
    let store = store(&[("STABLE", "s"), ("FLAPPING", "f0")]);
    let engine = Arc::new(PolicyEngine::new(
        Arc::clone(&store) as Arc<dyn KvStore>,
        vec![cmdline(".*", &["STABLE", "FLAPPING"])],
    ));

    let writer = {
        let store = Arc::clone(&store);
        tokio::spawn(async move {
            let mut present = true;
            for i in 0..200u32 {
                if present {
                    let _ = store.delete("FLAPPING").await;
                } else {
                    store
                        .set("FLAPPING", SecretValue::new(format!("f{i}")))
                        .await
                        .expect("set");
                }
                present = !present;
                tokio::task::yield_now().await;
            }
        })
    };

    let mut readers = Vec::new();
    for _ in 0..8 {
        let engine = Arc::clone(&engine);
        readers.push(tokio::spawn(async move {
            let process = proc("worker");
            for _ in 0..50 {
                let env = engine.allowed_env(&process).await.expect("evaluate");
                assert_eq!(env.get("STABLE"), Some("s"));
                assert!(env.keys().all(|k| k == "STABLE" || k == "FLAPPING"));
                tokio::task::yield_now().await;
            }
        }));
    }

    writer.await.expect("writer task");
    for reader in readers {
        reader.await.expect("reader task");
    }
}
