//! Write-only administrative interface.
//!
//! Only `PUT` is routed. Reading or listing secrets over this listener would
//! bypass the policy engine entirely, so no such route exists.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    middleware,
    routing::put,
    Json, Router,
};
use serde::Deserialize;
use tracing::{error, info};

use super::auth::{basic_auth_middleware, BasicAuthUsers};
use crate::store::{KvStore, SecretValue, StoreError};

/// Body of a `PUT` request.
#[derive(Deserialize)]
pub struct SetRequest {
    /// Case-sensitive key name.
    pub key: String,
    /// Secret value.
    pub value: String,
}

impl std::fmt::Debug for SetRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SetRequest")
            .field("key", &self.key)
            .field("value", &"[REDACTED]")
            .finish()
    }
}

/// Build the admin router serving `base_path`.
pub fn admin_router(store: Arc<dyn KvStore>, base_path: &str, users: BasicAuthUsers) -> Router {
    Router::new()
        .route(base_path, put(set_handler))
        .layer(middleware::from_fn_with_state(users, basic_auth_middleware))
        .with_state(store)
}

async fn set_handler(
    State(store): State<Arc<dyn KvStore>>,
    payload: Result<Json<SetRequest>, JsonRejection>,
) -> StatusCode {
    let Ok(Json(request)) = payload else {
        return StatusCode::BAD_REQUEST;
    };
    if request.key.is_empty() {
        return StatusCode::BAD_REQUEST;
    }

    match store.set(&request.key, SecretValue::new(request.value)).await {
        Ok(()) => {
            info!(key = %request.key, "secret stored via admin interface");
            StatusCode::CREATED
        }
        Err(StoreError::Unavailable(reason)) => {
            error!(key = %request.key, reason = %reason, "admin write failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
        Err(err) => {
            error!(key = %request.key, error = %err, "admin write failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
