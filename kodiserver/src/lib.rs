//! # kodiserver
//!
//! HTTP surface of KodiInfo, built on Axum.
//!
//! - [`server`] : the [`Server`] itself and its builder
//! - [`logs`] : tracing bootstrap, in-memory log buffer and the log routes
//! - [`nowplaying`] : snapshot, diff and SSE routes plus the library pass-through
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use chrono::Utc;
//! use kodinow::{Snapshot, SnapshotStore};
//! use kodirpc::{KodiApi, KodiClient, KodiEndpoint};
//! use kodiserver::{NowPlayingExt, ServerBuilder, logs::LoggingOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = ServerBuilder::new("KodiInfo", 5005).build();
//!     server.init_logging(LoggingOptions::default()).await;
//!
//!     let client: Arc<dyn KodiApi> = Arc::new(KodiClient::new(
//!         KodiEndpoint::parse("kodi.local:8080")?,
//!         None,
//!         std::time::Duration::from_secs(5),
//!     ));
//!     let store = Arc::new(SnapshotStore::new(Snapshot::stopped(Utc::now())));
//!     server.init_nowplaying_api(store, client).await?;
//!
//!     server.start().await?;
//!     server.wait().await;
//!     Ok(())
//! }
//! ```

pub mod logs;
pub mod nowplaying;
pub mod server;

pub use logs::{LogState, LoggingOptions, SseLayer, init_logging, log_dump, log_sse};
pub use nowplaying::{NowPlayingExt, NowPlayingState, create_nowplaying_router};
pub use server::{Server, ServerBuilder};
