//! Now-playing and library routes.
//!
//! - `GET /api/nowplaying` : current snapshot
//! - `GET /api/nowplaying/diff` : changes of the current snapshot against its predecessor
//! - `GET /api/nowplaying/events` : SSE, one `snapshot` event then one `diff` event per change
//! - `POST /api/library/{library}/{operation}` : `video|audio` × `scan|clean`
//! - `POST /update-video-library`, `POST /update-audio-library` : legacy scan triggers
//! - `GET /artwork/{reference}` : device image proxy, limited to the current artwork
//! - `GET /health`

use std::io;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use async_stream::stream;
use axum::{
    Json, Router,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use kodinow::artwork::{ARTWORK_ROUTE, image_url};
use kodinow::{SnapshotStore, SnapshotUpdate};
use kodirpc::{KodiApi, LibraryAction};
use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time;
use tracing::{debug, info, warn};

use crate::Server;

const LIBRARY_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);
const ARTWORK_TIMEOUT: Duration = Duration::from_secs(15);
const ARTWORK_CACHE_CONTROL: &str = "private, max-age=3600";
/// Updates buffered per SSE client before it is resynced with a full snapshot.
const SSE_BUFFER: usize = 64;

/// Shared state of the now-playing routes.
#[derive(Clone)]
pub struct NowPlayingState {
    store: Arc<SnapshotStore>,
    api: Arc<dyn KodiApi>,
    updates: broadcast::Sender<SnapshotUpdate>,
}

impl NowPlayingState {
    /// Subscribes to `store` once and fans its updates out to every SSE
    /// client from a single bridge thread.
    pub fn new(store: Arc<SnapshotStore>, api: Arc<dyn KodiApi>) -> io::Result<Self> {
        let (updates, _) = broadcast::channel(SSE_BUFFER);
        spawn_update_bridge(&store, &updates)?;
        Ok(Self {
            store,
            api,
            updates,
        })
    }

    /// Number of connected SSE clients.
    pub fn live_clients(&self) -> usize {
        self.updates.receiver_count()
    }
}

/// Forwards store notifications into the broadcast channel.
///
/// The thread ends with the store, or on the first update after every
/// [`NowPlayingState`] is gone.
fn spawn_update_bridge(
    store: &SnapshotStore,
    updates: &broadcast::Sender<SnapshotUpdate>,
) -> io::Result<()> {
    let rx = store.subscribe();
    let weak = updates.downgrade();
    thread::Builder::new()
        .name("kodiserver-sse-bridge".to_string())
        .spawn(move || {
            while let Ok(update) = rx.recv() {
                let Some(tx) = weak.upgrade() else {
                    break;
                };
                // No connected client is not an error.
                let _ = tx.send(update);
            }
            debug!("SSE bridge stopped");
        })?;
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
pub struct LibraryActionResponse {
    pub success: bool,
    pub message: String,
}

impl LibraryActionResponse {
    fn failure(status: StatusCode, message: String) -> (StatusCode, Json<Self>) {
        (
            status,
            Json(Self {
                success: false,
                message,
            }),
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
}

/// GET /api/nowplaying
async fn get_nowplaying(State(state): State<NowPlayingState>) -> Response {
    let snapshot = state.store.current();
    Json(&*snapshot).into_response()
}

/// GET /api/nowplaying/diff
async fn get_nowplaying_diff(State(state): State<NowPlayingState>) -> Response {
    let diff = state.store.last_diff();
    Json(&*diff).into_response()
}

/// GET /api/nowplaying/events
///
/// A client that falls more than [`SSE_BUFFER`] updates behind gets a fresh
/// `snapshot` event instead of the diffs it missed.
async fn nowplaying_events(State(state): State<NowPlayingState>) -> impl IntoResponse {
    let mut updates = state.updates.subscribe();
    let initial = state.store.current();
    let store = Arc::clone(&state.store);

    debug!(
        sequence = initial.sequence,
        clients = state.live_clients(),
        "Now-playing SSE client connected"
    );

    let stream = stream! {
        let mut last_sequence = initial.sequence;
        yield Event::default().event("snapshot").json_data(&*initial);

        loop {
            match updates.recv().await {
                Ok(update) => {
                    if update.diff.sequence <= last_sequence {
                        continue;
                    }
                    last_sequence = update.diff.sequence;
                    yield Event::default().event("diff").json_data(&*update.diff);
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "SSE client lagged, resending snapshot");
                    let current = store.current();
                    last_sequence = current.sequence;
                    yield Event::default().event("snapshot").json_data(&*current);
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// GET /artwork/{reference}
///
/// Fetches an `image://` reference from the device with the configured
/// credentials. Only references of the current artwork set are served.
async fn get_artwork(
    State(state): State<NowPlayingState>,
    Path(reference): Path<String>,
) -> Response {
    let url = image_url(ARTWORK_ROUTE, &reference);
    // Remote references are never rewritten under the proxy route.
    let known = url.starts_with(ARTWORK_ROUTE)
        && state
            .store
            .current()
            .artwork
            .as_ref()
            .is_some_and(|set| set.references(&url));
    if !known {
        debug!(reference = %reference, "Artwork not referenced by the current snapshot");
        return (StatusCode::NOT_FOUND, "Unknown artwork").into_response();
    }

    let api = state.api.clone();
    let task = tokio::task::spawn_blocking(move || api.fetch_image(&reference));

    match time::timeout(ARTWORK_TIMEOUT, task).await {
        Ok(Ok(Ok(image))) => (
            [
                (header::CONTENT_TYPE, image.content_type),
                (header::CACHE_CONTROL, ARTWORK_CACHE_CONTROL.to_string()),
            ],
            image.bytes,
        )
            .into_response(),
        Ok(Ok(Err(e))) => {
            warn!(error = %e, "Artwork fetch failed");
            (StatusCode::BAD_GATEWAY, e.to_string()).into_response()
        }
        Ok(Err(e)) => {
            warn!(error = %e, "Task join error during artwork fetch");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
        Err(_) => {
            warn!("Artwork fetch exceeded {:?}", ARTWORK_TIMEOUT);
            StatusCode::GATEWAY_TIMEOUT.into_response()
        }
    }
}

/// POST /api/library/{library}/{operation}
async fn library_action(
    State(state): State<NowPlayingState>,
    Path((library, operation)): Path<(String, String)>,
) -> Result<Json<LibraryActionResponse>, (StatusCode, Json<LibraryActionResponse>)> {
    let action = LibraryAction::from_parts(&library, &operation).ok_or_else(|| {
        LibraryActionResponse::failure(
            StatusCode::NOT_FOUND,
            format!("Unknown library action {}/{}", library, operation),
        )
    })?;
    run_library_action(state, action).await
}

/// POST /update-video-library
async fn update_video_library(
    State(state): State<NowPlayingState>,
) -> Result<Json<LibraryActionResponse>, (StatusCode, Json<LibraryActionResponse>)> {
    run_library_action(state, LibraryAction::VideoScan).await
}

/// POST /update-audio-library
async fn update_audio_library(
    State(state): State<NowPlayingState>,
) -> Result<Json<LibraryActionResponse>, (StatusCode, Json<LibraryActionResponse>)> {
    run_library_action(state, LibraryAction::AudioScan).await
}

/// Forwards `action` on the blocking pool; the snapshot store is never touched.
async fn run_library_action(
    state: NowPlayingState,
    action: LibraryAction,
) -> Result<Json<LibraryActionResponse>, (StatusCode, Json<LibraryActionResponse>)> {
    let api = state.api.clone();
    let task = tokio::task::spawn_blocking(move || api.run_library_action(action));

    time::timeout(LIBRARY_COMMAND_TIMEOUT, task)
        .await
        .map_err(|_| {
            warn!(method = action.method(), "Library action exceeded {:?}", LIBRARY_COMMAND_TIMEOUT);
            LibraryActionResponse::failure(
                StatusCode::GATEWAY_TIMEOUT,
                format!(
                    "{} timed out after {}s",
                    action.method(),
                    LIBRARY_COMMAND_TIMEOUT.as_secs()
                ),
            )
        })?
        .map_err(|e| {
            warn!(error = %e, "Task join error during library action");
            LibraryActionResponse::failure(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Internal task error: {}", e),
            )
        })?
        .map_err(|e| {
            warn!(method = action.method(), error = %e, "Library action failed");
            LibraryActionResponse::failure(StatusCode::BAD_GATEWAY, e.to_string())
        })?;

    info!(method = action.method(), "Library action forwarded");
    Ok(Json(LibraryActionResponse {
        success: true,
        message: format!("{} started", action.method()),
    }))
}

/// Router carrying every now-playing and library route.
pub fn create_nowplaying_router(state: NowPlayingState) -> Router {
    Router::new()
        .route("/api/nowplaying", get(get_nowplaying))
        .route("/api/nowplaying/diff", get(get_nowplaying_diff))
        .route("/api/nowplaying/events", get(nowplaying_events))
        .route("/api/library/{library}/{operation}", post(library_action))
        .route("/update-video-library", post(update_video_library))
        .route("/update-audio-library", post(update_audio_library))
        .route(&format!("{}/{{reference}}", ARTWORK_ROUTE), get(get_artwork))
        .with_state(state)
}

/// Extension trait registering the now-playing API on a [`Server`].
pub trait NowPlayingExt {
    /// Registers the now-playing, library, artwork and health routes.
    ///
    /// ```rust,ignore
    /// use kodiserver::{NowPlayingExt, ServerBuilder};
    ///
    /// let mut server = ServerBuilder::new_configured().build();
    /// server.init_nowplaying_api(store, client).await?;
    /// server.start().await?;
    /// ```
    async fn init_nowplaying_api(
        &mut self,
        store: Arc<SnapshotStore>,
        api: Arc<dyn KodiApi>,
    ) -> io::Result<()>;
}

impl NowPlayingExt for Server {
    async fn init_nowplaying_api(
        &mut self,
        store: Arc<SnapshotStore>,
        api: Arc<dyn KodiApi>,
    ) -> io::Result<()> {
        let state = NowPlayingState::new(store, api)?;
        self.add_router("/", create_nowplaying_router(state)).await;
        self.add_route("/health", || async {
            HealthResponse {
                status: "healthy",
                timestamp: Utc::now(),
            }
        })
        .await;

        info!("Now-playing API registered under /api/nowplaying");
        Ok(())
    }
}
