//! In-memory log buffer, live log stream and runtime level control.
//!
//! Every tracing event goes through a reloadable [`LevelFilter`] and is then
//! copied by [`SseLayer`] into a bounded ring buffer and a broadcast channel.
//! The buffer backs `/log-dump`, the channel backs `/log-sse`, and
//! `/api/log_setup` reads or changes the minimum level without a restart.

mod sselayer;

pub use sselayer::SseLayer;

use std::{
    collections::VecDeque,
    sync::{Arc, PoisonError, RwLock},
};

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::get,
};
use chrono::{DateTime, Utc};
use kodiconfig::Config;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{Level, debug, warn};
use tracing_subscriber::{
    Registry,
    filter::LevelFilter,
    layer::SubscriberExt,
    reload,
    util::SubscriberInitExt,
};

const LIVE_CHANNEL_CAPACITY: usize = 1000;
const AVAILABLE_LEVELS: [&str; 5] = ["ERROR", "WARN", "INFO", "DEBUG", "TRACE"];

/// One captured log line.
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub target: String,
    pub message: String,
}

/// Shared ring buffer, live channel and level filter handle.
#[derive(Clone)]
pub struct LogState {
    buffer: Arc<RwLock<VecDeque<LogEntry>>>,
    capacity: usize,
    tx: broadcast::Sender<LogEntry>,
    max_level: Arc<RwLock<Level>>,
    reload_handle: reload::Handle<LevelFilter, Registry>,
}

impl LogState {
    pub fn new(
        capacity: usize,
        max_level: Level,
        reload_handle: reload::Handle<LevelFilter, Registry>,
    ) -> Self {
        let capacity = capacity.max(1);
        Self {
            buffer: Arc::new(RwLock::new(VecDeque::with_capacity(capacity))),
            capacity,
            tx: broadcast::channel(LIVE_CHANNEL_CAPACITY).0,
            max_level: Arc::new(RwLock::new(max_level)),
            reload_handle,
        }
    }

    pub fn set_max_level(&self, level: Level) {
        *self.max_level.write().unwrap_or_else(PoisonError::into_inner) = level;

        match self.reload_handle.reload(LevelFilter::from_level(level)) {
            Ok(()) => debug!(level = %level, "Log level filter reloaded"),
            Err(e) => warn!(error = %e, "Failed to reload log level filter"),
        }
    }

    pub fn get_max_level(&self) -> Level {
        *self.max_level.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, entry: LogEntry) {
        {
            let mut buf = self.buffer.write().unwrap_or_else(PoisonError::into_inner);
            while buf.len() >= self.capacity {
                buf.pop_front();
            }
            buf.push_back(entry.clone());
        }
        let _ = self.tx.send(entry);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LogEntry> {
        self.tx.subscribe()
    }

    pub fn dump(&self) -> Vec<LogEntry> {
        self.buffer
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }
}

/// Query parameters of `/log-sse`.
///
/// Without any level flag every level is streamed; `search` keeps entries
/// whose message or target contains the given text.
#[derive(Debug, Default, Deserialize)]
pub struct LogQuery {
    #[serde(default)]
    pub error: Option<bool>,
    #[serde(default)]
    pub warn: Option<bool>,
    #[serde(default)]
    pub info: Option<bool>,
    #[serde(default)]
    pub debug: Option<bool>,
    #[serde(default)]
    pub trace: Option<bool>,
    #[serde(default)]
    pub search: Option<String>,
}

/// `GET /log-sse`: buffered history first, then live entries.
pub async fn log_sse(
    State(state): State<LogState>,
    Query(params): Query<LogQuery>,
) -> impl IntoResponse {
    let mut rx = state.subscribe();
    let history = state.dump();

    let stream = async_stream::stream! {
        let current_level = state.get_max_level();
        for entry in history {
            if is_level_allowed(&entry.level, current_level) && filter_entry(&entry, &params) {
                yield Event::default().json_data(&entry);
            }
        }

        loop {
            match rx.recv().await {
                Ok(entry) => {
                    if is_level_allowed(&entry.level, state.get_max_level())
                        && filter_entry(&entry, &params)
                    {
                        yield Event::default().json_data(&entry);
                    }
                }
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// `GET /log-dump`: the whole ring buffer as JSON.
pub async fn log_dump(State(state): State<LogState>) -> impl IntoResponse {
    Json(state.dump())
}

fn is_level_allowed(log_level: &str, max_level: Level) -> bool {
    string_to_level(log_level).is_some_and(|level| level <= max_level)
}

fn filter_entry(entry: &LogEntry, q: &LogQuery) -> bool {
    let flags = [
        (q.error, Level::ERROR),
        (q.warn, Level::WARN),
        (q.info, Level::INFO),
        (q.debug, Level::DEBUG),
        (q.trace, Level::TRACE),
    ];

    let any_flag = flags.iter().any(|(flag, _)| flag.unwrap_or(false));
    let mut allowed = !any_flag
        || flags.iter().any(|(flag, level)| {
            flag.unwrap_or(false) && entry.level.eq_ignore_ascii_case(level.as_str())
        });

    if let Some(search) = &q.search {
        allowed &= entry.message.contains(search) || entry.target.contains(search);
    }

    allowed
}

/// Logging bootstrap parameters, usually read from `host.logger.*`.
#[derive(Debug, Clone)]
pub struct LoggingOptions {
    pub min_level: Level,
    /// Number of entries kept by `/log-dump`.
    pub buffer_capacity: usize,
    /// Also write to the console.
    pub enable_console: bool,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            min_level: Level::INFO,
            buffer_capacity: 1000,
            enable_console: true,
        }
    }
}

impl LoggingOptions {
    pub fn from_config(config: &Config) -> Self {
        let min_level = config.get_log_min_level();
        Self {
            min_level: string_to_level(&min_level).unwrap_or_else(|| {
                eprintln!("Unknown log level '{}', falling back to INFO", min_level);
                Level::INFO
            }),
            buffer_capacity: config.get_log_cache_size(),
            enable_console: config.get_log_enable_console(),
        }
    }
}

/// Installs the global subscriber and returns the state backing the log routes.
///
/// The reloadable filter sits before [`SseLayer`] so that the buffer only
/// sees events at or above the current minimum level. If a global subscriber
/// is already installed the state is still returned, but stays empty.
pub fn init_logging(options: LoggingOptions) -> LogState {
    let (filter, reload_handle) = reload::Layer::new(LevelFilter::from_level(options.min_level));
    let log_state = LogState::new(options.buffer_capacity, options.min_level, reload_handle);

    let subscriber = Registry::default()
        .with(filter)
        .with(SseLayer::new(log_state.clone()));

    let installed = if options.enable_console {
        subscriber
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_level(true)
                    .with_ansi(true),
            )
            .try_init()
    } else {
        subscriber.try_init()
    };

    if let Err(e) = installed {
        eprintln!("Logging already initialised: {}", e);
    }

    log_state
}

#[derive(Debug, Deserialize)]
pub struct LogSetupRequest {
    pub level: String,
}

#[derive(Debug, Serialize)]
pub struct LogSetupResponse {
    pub current_level: String,
    pub available_levels: Vec<String>,
}

impl LogSetupResponse {
    fn new(level: Level) -> Self {
        Self {
            current_level: level.as_str().to_string(),
            available_levels: AVAILABLE_LEVELS.iter().map(|l| l.to_string()).collect(),
        }
    }
}

/// `GET /api/log_setup`
pub async fn log_setup_get(State(state): State<LogState>) -> impl IntoResponse {
    Json(LogSetupResponse::new(state.get_max_level()))
}

/// `POST /api/log_setup`
pub async fn log_setup_post(
    State(state): State<LogState>,
    Json(payload): Json<LogSetupRequest>,
) -> Response {
    let Some(level) = string_to_level(&payload.level) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "error": "Invalid log level. Must be one of: ERROR, WARN, INFO, DEBUG, TRACE"
            })),
        )
            .into_response();
    };

    state.set_max_level(level);
    tracing::info!(level = %level, "Log level changed");

    Json(LogSetupResponse::new(level)).into_response()
}

fn string_to_level(s: &str) -> Option<Level> {
    match s.trim().to_uppercase().as_str() {
        "ERROR" => Some(Level::ERROR),
        "WARN" | "WARNING" => Some(Level::WARN),
        "INFO" => Some(Level::INFO),
        "DEBUG" => Some(Level::DEBUG),
        "TRACE" => Some(Level::TRACE),
        _ => None,
    }
}

/// Router for `/api/log_setup`.
pub fn create_logs_router(log_state: LogState) -> Router {
    Router::new()
        .route("/api/log_setup", get(log_setup_get).post(log_setup_post))
        .with_state(log_state)
}
