//! HTTP basic authentication middleware.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use subtle::ConstantTimeEq;
use tracing::warn;

use crate::store::SecretValue;

/// Username to password table for one listener.
///
/// An empty table disables authentication for that listener.
#[derive(Clone, Default)]
pub struct BasicAuthUsers(Arc<HashMap<String, SecretValue>>);

impl std::fmt::Debug for BasicAuthUsers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicAuthUsers")
            .field("users", &self.0.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl BasicAuthUsers {
    /// Build the table from plain `user -> password` pairs.
    pub fn new<I, U, P>(users: I) -> Self
    where
        I: IntoIterator<Item = (U, P)>,
        U: Into<String>,
        P: Into<String>,
    {
        Self(Arc::new(
            users
                .into_iter()
                .map(|(u, p)| (u.into(), SecretValue::new(p)))
                .collect(),
        ))
    }

    /// Whether any credentials are configured.
    pub fn is_enabled(&self) -> bool {
        !self.0.is_empty()
    }

    /// Check a decoded `user:password` pair.
    pub fn verify(&self, user: &str, password: &str) -> bool {
        let Some(expected) = self.0.get(user) else {
            return false;
        };
        expected.expose().as_bytes().ct_eq(password.as_bytes()).into()
    }
}

/// Parse an `Authorization: Basic ...` header value into `(user, password)`.
pub fn parse_basic(header_value: &str) -> Option<(String, String)> {
    let encoded = header_value.strip_prefix("Basic ")?.trim();
    let decoded = STANDARD.decode(encoded).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, password) = decoded.split_once(':')?;
    Some((user.to_owned(), password.to_owned()))
}

fn unauthorized() -> Response {
    let mut response = StatusCode::UNAUTHORIZED.into_response();
    response.headers_mut().insert(
        header::WWW_AUTHENTICATE,
        HeaderValue::from_static("Basic realm=\"kevd\""),
    );
    response
}

/// Reject requests without valid basic credentials.
pub async fn basic_auth_middleware(
    State(users): State<BasicAuthUsers>,
    request: Request,
    next: Next,
) -> Response {
    if !users.is_enabled() {
        return next.run(request).await;
    }

    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let Some(auth_value) = auth_header else {
        warn!("basic auth failed: missing Authorization header");
        return unauthorized();
    };

    let Some((user, password)) = parse_basic(auth_value) else {
        warn!("basic auth failed: malformed Authorization header");
        return unauthorized();
    };

    if users.verify(&user, &password) {
        next.run(request).await
    } else {
        warn!(user = %user, "basic auth failed: bad credentials");
        unauthorized()
    }
}
