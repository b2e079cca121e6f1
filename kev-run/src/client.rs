//! HTTP client for the broker's secret endpoint.

use std::collections::BTreeMap;

use kev::ProcessDescriptor;
use thiserror::Error;
use tracing::debug;
use url::Url;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Failure to obtain an answer from the broker.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The broker URI could not be parsed.
    #[error("invalid broker URI {uri:?}: {reason}")]
    InvalidUri {
        /// The rejected URI.
        uri: String,
        /// Why it was rejected.
        reason: String,
    },
    /// The request could not be sent or the body could not be read.
    #[error("broker request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// The broker answered with a non-success status.
    #[error("broker returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, as text.
        body: String,
    },
}

/// Basic-auth credentials sent with every request.
#[derive(Clone)]
pub struct Credentials {
    /// Username.
    pub user: String,
    /// Password.
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Client bound to one broker endpoint.
#[derive(Debug, Clone)]
pub struct BrokerClient {
    http: reqwest::Client,
    uri: Url,
    credentials: Option<Credentials>,
}

impl BrokerClient {
    /// Create a client for `uri` (e.g. `http://127.0.0.1:8080/env`).
    ///
    /// Explicit `credentials` take precedence over any `user:password@`
    /// embedded in the URI; otherwise the embedded pair is used.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidUri`] when `uri` is not an absolute
    /// `http` or `https` URL, and [`ClientError::Request`] when the HTTP
    /// client cannot be initialised (e.g. no TLS backend).
    pub fn new(uri: &str, credentials: Option<Credentials>) -> Result<Self, ClientError> {
        let invalid = |reason: String| ClientError::InvalidUri {
            uri: uri.to_owned(),
            reason,
        };
        let mut parsed = Url::parse(uri).map_err(|e| invalid(e.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(invalid(format!(
                "unsupported scheme {:?}, expected http or https",
                parsed.scheme()
            )));
        }
        if credentials.is_some() {
            // Only one Authorization header may be sent.
            let _ = parsed.set_username("");
            let _ = parsed.set_password(None);
        }

        let http = reqwest::Client::builder()
            .user_agent(format!("kev-run/{VERSION}"))
            .build()?;

        Ok(Self {
            http,
            uri: parsed,
            credentials,
        })
    }

    /// Ask the broker which secrets `process` may receive.
    ///
    /// An empty map means nothing was granted.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Request`] on transport or decoding failure and
    /// [`ClientError::Status`] on any non-success response, including the
    /// broker's `503` for an unavailable store.
    pub async fn fetch_env(
        &self,
        process: &ProcessDescriptor,
    ) -> Result<BTreeMap<String, String>, ClientError> {
        let mut request = self.http.post(self.uri.clone()).json(process);
        if let Some(creds) = &self.credentials {
            request = request.basic_auth(&creds.user, Some(&creds.password));
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let env: BTreeMap<String, String> = response.json().await?;
        debug!(released = env.len(), "broker answered");
        Ok(env)
    }
}
