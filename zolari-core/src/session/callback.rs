//! Loopback server that receives the identity provider's redirect.
//!
//! The browser lands on the application origin with `?code=...&state=...`. The
//! listener hands the full location back to the caller, which completes the
//! login through `SessionManager::complete_redirect_if_present`.

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use crate::error::AuthError;

/// How long to wait for the browser to come back.
pub const REDIRECT_TIMEOUT: Duration = Duration::from_secs(120);

const LANDING_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>Zolari</title></head>
<body style="font-family: system-ui; text-align: center; padding-top: 80px;">
<h2>Signed in to Zolari</h2>
<p>You can close this tab and return to the terminal.</p>
</body>
</html>"#;

/// A bound loopback listener waiting for one redirect.
pub struct RedirectListener {
    local_addr: SocketAddr,
    rx: oneshot::Receiver<Url>,
    shutdown: CancellationToken,
}

impl RedirectListener {
    /// Bind on the host and port of the application origin.
    ///
    /// `localhost` binds `127.0.0.1`. Port 0 picks a free port; the reported
    /// location then carries the actual port.
    pub async fn bind(origin: &Url) -> Result<Self, AuthError> {
        let host = match origin.host_str() {
            Some("localhost") | None => "127.0.0.1",
            Some(host) => host,
        };
        let port = origin.port_or_known_default().unwrap_or(80);

        let listener = tokio::net::TcpListener::bind((host, port))
            .await
            .map_err(|e| AuthError::Redirect {
                message: format!(
                    "Failed to bind redirect listener on {}:{}: {}. \
                     Make sure no other process is using this port.",
                    host, port, e
                ),
            })?;
        let local_addr = listener.local_addr().map_err(|e| AuthError::Redirect {
            message: format!("Redirect listener has no local address: {}", e),
        })?;

        let mut base = origin.clone();
        if port == 0 {
            let _ = base.set_port(Some(local_addr.port()));
        }

        let (tx, rx) = oneshot::channel::<Url>();
        let tx = Arc::new(Mutex::new(Some(tx)));
        let app = build_router(base, tx);

        let shutdown = CancellationToken::new();
        let stop = shutdown.clone();
        tokio::spawn(async move {
            let server = axum::serve(listener, app).with_graceful_shutdown(stop.cancelled_owned());
            let _ = tokio::time::timeout(REDIRECT_TIMEOUT, server.into_future()).await;
        });

        debug!(addr = %local_addr, "Redirect listener started");
        Ok(Self {
            local_addr,
            rx,
            shutdown,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Wait for the redirect and stop the server.
    pub async fn wait(self, timeout: Duration) -> Result<Url, AuthError> {
        let result = tokio::time::timeout(timeout, self.rx).await;
        self.shutdown.cancel();
        result
            .map_err(|_| AuthError::Redirect {
                message: format!(
                    "Login redirect timed out after {} seconds",
                    timeout.as_secs()
                ),
            })?
            .map_err(|_| AuthError::Redirect {
                message: "Redirect listener closed unexpectedly".to_string(),
            })
    }
}

fn build_router(base: Url, tx: Arc<Mutex<Option<oneshot::Sender<Url>>>>) -> axum::Router {
    axum::Router::new().fallback(move |uri: axum::http::Uri| {
        let tx = tx.clone();
        let base = base.clone();
        async move {
            let query = uri.query().unwrap_or_default();
            // Ignore favicon and other incidental requests.
            if !(query.contains("code=") || query.contains("error=")) {
                return (axum::http::StatusCode::NOT_FOUND, axum::response::Html(""));
            }

            let path_and_query = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");
            if let Ok(location) = base.join(path_and_query) {
                if let Some(sender) = tx.lock().await.take() {
                    let _ = sender.send(location);
                }
            }
            (axum::http::StatusCode::OK, axum::response::Html(LANDING_PAGE))
        }
    })
}
