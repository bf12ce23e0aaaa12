//! Static server implementation.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::services::ServeDir;

/// How long a stopping server may spend draining open connections.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for the static server.
#[derive(Debug, Clone)]
pub struct StaticServerConfig {
    /// Directory served at `/`
    pub root: PathBuf,

    /// Host to bind to
    pub host: String,

    /// Port to listen on (0 picks a free port)
    pub port: u16,
}

impl Default for StaticServerConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("build"),
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

/// Errors that can occur with the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind to {0}: {1}")]
    BindError(String, String),

    #[error("Directory not found: {0}")]
    RootNotFound(String),

    #[error("Server error: {0}")]
    ServeError(String),
}

/// A bound, not yet serving, static server.
///
/// Binding happens eagerly so that a port conflict surfaces before any
/// client is pointed at the server.
#[derive(Debug)]
pub struct StaticServer {
    config: StaticServerConfig,
    listener: TcpListener,
}

impl StaticServer {
    /// Bind the listener for `config.root`.
    pub async fn bind(config: StaticServerConfig) -> Result<Self, ServerError> {
        if !config.root.is_dir() {
            return Err(ServerError::RootNotFound(config.root.display().to_string()));
        }

        let addr = format!("{}:{}", config.host, config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| ServerError::BindError(addr.clone(), e.to_string()))?;

        Ok(Self { config, listener })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.listener
            .local_addr()
            .map_err(|e| ServerError::ServeError(e.to_string()))
    }

    fn router(&self) -> Router {
        Router::new().fallback_service(ServeDir::new(&self.config.root))
    }

    /// Serve in a background task until [`ServerHandle::stop`] is called.
    pub fn spawn(self) -> Result<ServerHandle, ServerError> {
        let addr = self.local_addr()?;
        let app = self.router();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        tracing::info!(
            "Serving {} at http://{}",
            self.config.root.display(),
            addr
        );

        let task = tokio::spawn(async move {
            axum::serve(self.listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        Ok(ServerHandle {
            addr,
            shutdown: Some(shutdown_tx),
            task,
        })
    }

    /// Serve in the foreground until Ctrl-C.
    pub async fn run(self) -> Result<(), ServerError> {
        let addr = self.local_addr()?;
        let app = self.router();

        tracing::info!(
            "Serving {} at http://{}",
            self.config.root.display(),
            addr
        );

        axum::serve(self.listener, app)
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
            })
            .await
            .map_err(|e| ServerError::ServeError(e.to_string()))
    }
}

/// Handle to a running static server.
#[derive(Debug)]
pub struct ServerHandle {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<std::io::Result<()>>,
}

impl ServerHandle {
    /// Address the server is listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Base URL for requests, without a trailing slash.
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Stop accepting connections and wait for the server task to finish.
    pub async fn stop(mut self) -> Result<(), ServerError> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }

        match tokio::time::timeout(DRAIN_TIMEOUT, &mut self.task).await {
            Ok(Ok(result)) => result.map_err(|e| ServerError::ServeError(e.to_string()))?,
            Ok(Err(e)) => return Err(ServerError::ServeError(e.to_string())),
            Err(_) => {
                tracing::warn!("Server on {} did not drain in time, aborting", self.addr);
                self.task.abort();
            }
        }

        tracing::info!("Server on {} stopped", self.addr);
        Ok(())
    }
}
