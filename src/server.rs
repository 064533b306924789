//! Ephemeral static file server for validation runs.
//!
//! Generated pages are served over real HTTP so fetches, relative URLs and
//! shared storage behave like production. Each validator call owns its
//! server exclusively: bind an ephemeral port, serve for the duration of the
//! run, shut down on every exit path.

use std::net::SocketAddr;
use std::path::Path;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::services::ServeDir;

use crate::error::ServerError;

/// A directory served on an ephemeral localhost port.
pub struct StaticServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl StaticServer {
    /// Binds `127.0.0.1:0` and serves `dir` until [`Self::shutdown`].
    pub async fn serve(dir: &Path) -> Result<Self, ServerError> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(ServerError::Bind)?;
        let addr = listener.local_addr().map_err(ServerError::Bind)?;

        let service = ServeDir::new(dir).append_index_html_on_directories(true);
        let app = Router::new().fallback_service(service);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(err) = result {
                tracing::warn!(error = %err, "Static server terminated with error");
            }
        });

        tracing::debug!(%addr, dir = %dir.display(), "Static server listening");
        Ok(Self {
            addr,
            shutdown: Some(shutdown_tx),
            handle,
        })
    }

    /// Base URL of the server, e.g. `http://127.0.0.1:49152`.
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// URL of one served file.
    pub fn url_for(&self, file: &str) -> String {
        format!("{}/{}", self.base_url(), file.trim_start_matches('/'))
    }

    /// Stops the server and waits for the serve task to finish.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = (&mut self.handle).await;
    }
}

impl Drop for StaticServer {
    fn drop(&mut self) {
        // Covers exit paths that bypass shutdown(), including panics in the
        // owning validator.
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn serves_files_from_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("index.html"), "<h1>hello</h1>").expect("write");

        let server = StaticServer::serve(dir.path()).await.expect("serve");
        let body = reqwest::get(server.url_for("index.html"))
            .await
            .expect("request")
            .text()
            .await
            .expect("body");
        assert_eq!(body, "<h1>hello</h1>");

        server.shutdown().await;
    }

    #[tokio::test]
    async fn missing_files_return_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let server = StaticServer::serve(dir.path()).await.expect("serve");

        let status = reqwest::get(server.url_for("nope.html"))
            .await
            .expect("request")
            .status();
        assert_eq!(status.as_u16(), 404);

        server.shutdown().await;
    }

    #[tokio::test]
    async fn two_servers_bind_distinct_ports() {
        let dir = tempfile::tempdir().expect("tempdir");
        let a = StaticServer::serve(dir.path()).await.expect("serve a");
        let b = StaticServer::serve(dir.path()).await.expect("serve b");
        assert_ne!(a.base_url(), b.base_url());
        a.shutdown().await;
        b.shutdown().await;
    }
}
