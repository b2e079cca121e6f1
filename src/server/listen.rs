//! Listen address parsing and the serve loop.
//!
//! Addresses are URLs: `tcp://host:port` or `unix:///path/to/socket`.

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Context;
use axum::Router;
use tracing::{info, warn};
use url::Url;

/// Where a listener binds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenAddr {
    /// TCP `host:port`.
    Tcp(String),
    /// Unix domain socket path.
    Unix(PathBuf),
}

impl FromStr for ListenAddr {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let url = Url::parse(s).with_context(|| format!("invalid listen address {s:?}"))?;
        match url.scheme() {
            "tcp" => {
                let host = url
                    .host()
                    .ok_or_else(|| anyhow::anyhow!("listen address {s:?} has no host"))?;
                let port = url
                    .port()
                    .ok_or_else(|| anyhow::anyhow!("listen address {s:?} has no port"))?;
                Ok(Self::Tcp(format!("{host}:{port}")))
            }
            "unix" => {
                let path = url.path();
                anyhow::ensure!(!path.is_empty(), "listen address {s:?} has no socket path");
                Ok(Self::Unix(PathBuf::from(path)))
            }
            other => Err(anyhow::anyhow!(
                "unsupported listen scheme {other:?} (expected tcp or unix)"
            )),
        }
    }
}

impl fmt::Display for ListenAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp(addr) => write!(f, "tcp://{addr}"),
            Self::Unix(path) => write!(f, "unix://{}", path.display()),
        }
    }
}

/// Bind `addr` and serve `router` until `shutdown` resolves.
///
/// A unix socket left over from a previous run is removed before binding,
/// and the socket is removed again after shutdown. Any other kind of file
/// at the socket path is left alone and the bind fails.
///
/// # Errors
///
/// Returns an error if the address cannot be bound, the socket path is
/// occupied by something other than a socket, or the server fails.
pub async fn serve<F>(addr: &ListenAddr, router: Router, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    match addr {
        ListenAddr::Tcp(host_port) => {
            let listener = tokio::net::TcpListener::bind(host_port)
                .await
                .with_context(|| format!("failed to bind {addr}"))?;
            info!(addr = %addr, "listening");
            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown)
                .await
                .with_context(|| format!("server on {addr} failed"))
        }
        #[cfg(unix)]
        ListenAddr::Unix(path) => {
            clear_stale_socket(path)?;
            let listener = tokio::net::UnixListener::bind(path)
                .with_context(|| format!("failed to bind {addr}"))?;
            info!(addr = %addr, "listening");
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(shutdown)
                .await
                .with_context(|| format!("server on {addr} failed"));
            if let Err(e) = clear_stale_socket(path) {
                warn!(error = %e, "unix socket not cleaned up");
            }
            result
        }
        #[cfg(not(unix))]
        ListenAddr::Unix(_) => Err(anyhow::anyhow!(
            "unix sockets are not supported on this platform"
        )),
    }
}

/// Remove the socket at `path`, if any. Refuses to touch anything that is
/// not a socket.
#[cfg(unix)]
fn clear_stale_socket(path: &std::path::Path) -> anyhow::Result<()> {
    use std::os::unix::fs::FileTypeExt;

    let metadata = match std::fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => {
            return Err(e).with_context(|| format!("failed to inspect {}", path.display()));
        }
    };
    anyhow::ensure!(
        metadata.file_type().is_socket(),
        "refusing to replace {}: it exists and is not a unix socket",
        path.display()
    );
    std::fs::remove_file(path)
        .with_context(|| format!("failed to remove unix socket {}", path.display()))?;
    info!(path = %path.display(), "removed unix socket");
    Ok(())
}
