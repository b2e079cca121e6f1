//! In-process broker bound to an ephemeral port.

use std::net::SocketAddr;
use std::sync::Arc;

use kev::server::{env_router, BasicAuthUsers};
use kev::store::InMemoryStore;
use kev::{CmdlinePolicy, KvStore, Policy, PolicyEngine};

/// Serve a broker releasing `DB_PASSWORD` to `deploy ...` and `sh ...`
/// command lines. Returns the base URL of the env endpoint.
pub async fn spawn_broker(store: Arc<dyn KvStore>, users: BasicAuthUsers) -> String {
    let policies: Vec<Policy> = vec![
        CmdlinePolicy::new("^deploy ", ["DB_PASSWORD"])
            .expect("valid pattern")
            .into(),
        CmdlinePolicy::new("^sh ", ["DB_PASSWORD"])
            .expect("valid pattern")
            .into(),
    ];
    let engine = Arc::new(PolicyEngine::new(store, policies));
    let router = env_router(engine, "/env", users);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr: SocketAddr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    format!("http://{addr}/env")
}

pub fn secret_store() -> Arc<dyn KvStore> {
    Arc::new(InMemoryStore::with_entries([
        ("DB_PASSWORD", "secret123"),
        ("API_KEY", "abc"),
    ]))
}
