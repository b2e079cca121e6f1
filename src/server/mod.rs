//! HTTP transport for the broker.
//!
//! Two independent routers:
//! - the env router answers process descriptors with authorized secrets;
//! - the admin router accepts writes into the store and exposes no read or
//!   list operation, so nothing can bypass the policy engine over HTTP.

pub mod admin;
pub mod auth;
pub mod listen;

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use tracing::{debug, info_span, Instrument};
use uuid::Uuid;

use crate::engine::PolicyEngine;
use crate::process::ProcessDescriptor;

pub use admin::admin_router;
pub use auth::BasicAuthUsers;
pub use listen::{serve, ListenAddr};

/// Build the router serving `base_path`.
///
/// Both `GET` (with a body, as older clients send it) and `POST` accept a JSON
/// process descriptor body.
pub fn env_router(engine: Arc<PolicyEngine>, base_path: &str, users: BasicAuthUsers) -> Router {
    Router::new()
        .route(base_path, get(env_handler).post(env_handler))
        .layer(middleware::from_fn_with_state(
            users,
            auth::basic_auth_middleware,
        ))
        .with_state(engine)
}

fn error_body(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

async fn env_handler(
    State(engine): State<Arc<PolicyEngine>>,
    payload: Result<Json<ProcessDescriptor>, JsonRejection>,
) -> Response {
    let request_id = Uuid::new_v4();
    let span = info_span!("env_request", %request_id);

    async move {
        let Json(process) = match payload {
            Ok(payload) => payload,
            Err(rejection) => {
                debug!(error = %rejection.body_text(), "rejected malformed descriptor");
                return error_body(rejection.status(), "malformed process descriptor");
            }
        };

        match engine.allowed_env(&process).await {
            Ok(env) => Json(env).into_response(),
            // The reason was already reported by the engine's observer.
            Err(_) => error_body(StatusCode::SERVICE_UNAVAILABLE, "secret store unavailable"),
        }
    }
    .instrument(span)
    .await
}
