//! # Server
//!
//! Thin layer over Axum: routes are registered incrementally on a shared
//! [`Router`], then [`Server::start`] binds the listener and serves until
//! Ctrl+C.
//!
//! - JSON routes with [`Server::add_route`]
//! - stateful `GET` handlers (SSE, REST) with [`Server::add_handler_with_state`]
//! - whole sub-routers with [`Server::add_router`]
//! - logging bootstrap and log routes with [`Server::init_logging`]

use crate::logs::{LogState, LoggingOptions, create_logs_router, init_logging, log_dump, log_sse};
use axum::handler::Handler;
use axum::routing::get;
use axum::{Json, Router};
use kodiconfig::get_config;
use serde::Serialize;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::{signal, sync::RwLock, task::JoinHandle};
use tracing::{error, info};

const DEFAULT_NAME: &str = "KodiInfo";

/// HTTP server
pub struct Server {
    name: String,
    http_port: u16,
    router: Arc<RwLock<Router>>,
    join_handle: Option<JoinHandle<()>>,
}

impl Server {
    /// Creates a server listening on `http_port` once started.
    ///
    /// ```rust
    /// # use kodiserver::Server;
    /// let server = Server::new("KodiInfo", 5005);
    /// assert_eq!(server.http_port(), 5005);
    /// ```
    pub fn new(name: impl Into<String>, http_port: u16) -> Self {
        Self {
            name: name.into(),
            http_port,
            router: Arc::new(RwLock::new(Router::new())),
            join_handle: None,
        }
    }

    pub fn new_configured() -> Self {
        Self::new(DEFAULT_NAME, get_config().get_http_port())
    }

    pub fn http_port(&self) -> u16 {
        self.http_port
    }

    /// Adds a `GET` route answering the JSON value produced by `f`.
    ///
    /// ```rust,no_run
    /// # use kodiserver::Server;
    /// # #[tokio::main]
    /// # async fn main() {
    /// # let mut server = Server::new("Test", 5005);
    /// server.add_route("/api/status", || async {
    ///     serde_json::json!({"status": "online"})
    /// }).await;
    /// # }
    /// ```
    pub async fn add_route<F, Fut, T>(&mut self, path: &str, f: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Serialize + Send + 'static,
    {
        let f = Arc::new(f);
        let handler = move || {
            let f = f.clone();
            async move { Json(f().await) }
        };

        self.mount(path, Router::new().route("/", get(handler))).await;
    }

    /// Adds a `GET` handler with state
    pub async fn add_handler_with_state<H, T, S>(&mut self, path: &str, handler: H, state: S)
    where
        H: Handler<T, S> + Clone + 'static,
        T: 'static,
        S: Clone + Send + Sync + 'static,
    {
        let route = Router::new().route("/", get(handler)).with_state(state);
        self.mount(path, route).await;
    }

    /// Adds a sub-router.
    ///
    /// `"/"` merges it at the root, any other path nests it.
    pub async fn add_router(&mut self, path: &str, sub_router: Router) {
        let mut r = self.router.write().await;
        *r = if path == "/" {
            std::mem::take(&mut *r).merge(sub_router)
        } else {
            let normalized = format!("/{}", path.trim_start_matches('/'));
            std::mem::take(&mut *r).nest(&normalized, sub_router)
        };
    }

    async fn mount(&mut self, path: &str, route: Router) {
        let mut r = self.router.write().await;
        *r = if path == "/" {
            std::mem::take(&mut *r).merge(route)
        } else {
            std::mem::take(&mut *r).nest(path, route)
        };
    }

    /// Snapshot of the routes registered so far.
    pub async fn router(&self) -> Router {
        self.router.read().await.clone()
    }

    /// Binds `0.0.0.0:<port>` and serves in the background until Ctrl+C.
    pub async fn start(&mut self) -> std::io::Result<()> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.http_port));
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!(server = %self.name, %addr, "HTTP server listening");

        let router = self.router.read().await.clone();
        let server_task = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router.into_make_service()).await {
                error!(error = %e, "HTTP server stopped");
            }
        });

        let shutdown_task = tokio::spawn(async move {
            match signal::ctrl_c().await {
                Ok(()) => info!("Ctrl+C received, shutting down"),
                Err(e) => error!(error = %e, "Failed to listen for Ctrl+C"),
            }
        });

        self.join_handle = Some(tokio::spawn(async move {
            tokio::select! {
                _ = server_task => {},
                _ = shutdown_task => {},
            }
        }));

        Ok(())
    }

    /// Waits until the server stops.
    pub async fn wait(&mut self) {
        if let Some(h) = self.join_handle.take() {
            let _ = h.await;
        }
    }

    /// Installs logging and registers `/log-sse`, `/log-dump` and `/api/log_setup`.
    ///
    /// ```rust,no_run
    /// # use kodiserver::{Server, logs::LoggingOptions};
    /// # #[tokio::main]
    /// # async fn main() {
    /// let mut server = Server::new_configured();
    /// server.init_logging(LoggingOptions::default()).await;
    /// # }
    /// ```
    pub async fn init_logging(&mut self, options: LoggingOptions) -> LogState {
        let log_state = init_logging(options);
        self.register_log_routes(log_state.clone()).await;
        log_state
    }

    /// Registers the log routes on an existing [`LogState`].
    pub async fn register_log_routes(&mut self, log_state: LogState) {
        self.add_handler_with_state("/log-sse", log_sse, log_state.clone())
            .await;
        self.add_handler_with_state("/log-dump", log_dump, log_state.clone())
            .await;
        self.add_router("/", create_logs_router(log_state)).await;
    }
}

/// Builder
pub struct ServerBuilder {
    name: String,
    http_port: u16,
}

impl ServerBuilder {
    pub fn new(name: impl Into<String>, http_port: u16) -> Self {
        Self {
            name: name.into(),
            http_port,
        }
    }

    pub fn new_configured() -> Self {
        Self::new(DEFAULT_NAME, get_config().get_http_port())
    }

    pub fn build(self) -> Server {
        Server::new(self.name, self.http_port)
    }
}
