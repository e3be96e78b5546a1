use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, trace};
use ureq::Agent;

use crate::api::KodiApi;
use crate::endpoint::KodiEndpoint;
use crate::errors::RpcError;
use crate::model::{
    ActivePlayer, DirectoryEntry, ImageData, KodiVersion, LibraryAction, PlayerStreams,
    PlayerTiming, RawItem,
};

const IMAGE_SCHEME: &str = "image://";
const IMAGE_LABEL: &str = "image";
const MAX_IMAGE_BYTES: u64 = 32 * 1024 * 1024;
const DEFAULT_IMAGE_TYPE: &str = "application/octet-stream";

const TIMING_PROPERTIES: &[&str] = &["time", "totaltime", "speed"];

const STREAM_PROPERTIES: &[&str] = &[
    "currentvideostream",
    "currentaudiostream",
    "audiostreams",
    "currentsubtitle",
    "subtitles",
    "subtitleenabled",
];

const ITEM_PROPERTIES: &[&str] = &[
    "title",
    "showtitle",
    "season",
    "episode",
    "year",
    "genre",
    "rating",
    "cast",
    "studio",
    "tagline",
    "artist",
    "displayartist",
    "album",
    "albumlabel",
    "samplerate",
    "file",
    "art",
    "streamdetails",
];

/// Credentials for HTTP Basic authentication.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// Returns `None` when no username is configured.
    pub fn from_parts(username: &str, password: &str) -> Option<Self> {
        if username.is_empty() {
            None
        } else {
            Some(Self {
                username: username.to_string(),
                password: password.to_string(),
            })
        }
    }

    pub fn header_value(&self) -> String {
        let token = STANDARD.encode(format!("{}:{}", self.username, self.password));
        format!("Basic {}", token)
    }
}

pub fn build_agent(timeout: Duration) -> Agent {
    Agent::config_builder()
        .timeout_global(Some(timeout))
        .build()
        .into()
}

/// Blocking JSON-RPC client bound to one Kodi instance.
pub struct KodiClient {
    endpoint: KodiEndpoint,
    rpc_url: String,
    auth_header: Option<String>,
    agent: Agent,
    next_id: AtomicU64,
}

impl KodiClient {
    pub fn new(endpoint: KodiEndpoint, credentials: Option<Credentials>, timeout: Duration) -> Self {
        let rpc_url = endpoint.rpc_url();
        Self {
            endpoint,
            rpc_url,
            auth_header: credentials.map(|c| c.header_value()),
            agent: build_agent(timeout),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn endpoint(&self) -> &KodiEndpoint {
        &self.endpoint
    }

    /// Sends one request and decodes its `result` member.
    pub fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": id,
        })
        .to_string();

        trace!(method, id, "JSON-RPC request");

        let mut request = self
            .agent
            .post(&self.rpc_url)
            .header("Content-Type", "application/json");
        if let Some(auth) = &self.auth_header {
            request = request.header("Authorization", auth);
        }

        let mut response = request
            .send(body)
            .map_err(|e| classify_transport_error(method, e))?;

        let text = response
            .body_mut()
            .read_to_string()
            .map_err(|e| RpcError::transient(method, format!("failed to read body: {}", e)))?;

        decode_response(method, &text)
    }

    /// URL of the device image handler for an `image://` reference.
    pub fn image_url(&self, reference: &str) -> Result<String, RpcError> {
        if !reference.starts_with(IMAGE_SCHEME) {
            return Err(RpcError::InvalidUrl(reference.to_string()));
        }
        Ok(format!(
            "{}/image/{}",
            self.endpoint.base_url(),
            urlencoding::encode(reference)
        ))
    }

    /// Checks connectivity and credentials.
    pub fn version(&self) -> Result<KodiVersion, RpcError> {
        #[derive(serde::Deserialize)]
        struct VersionResult {
            version: KodiVersion,
        }
        let result: VersionResult =
            self.call("Application.GetProperties", json!({"properties": ["version"]}))?;
        Ok(result.version)
    }
}

fn classify_transport_error(method: &str, err: ureq::Error) -> RpcError {
    match err {
        ureq::Error::StatusCode(status) => classify_status(method, status),
        other => RpcError::transient(method, other.to_string()),
    }
}

/// Maps a non-success HTTP status onto the error taxonomy.
pub fn classify_status(method: &str, status: u16) -> RpcError {
    match status {
        401 | 403 => RpcError::Auth {
            method: method.to_string(),
            status,
        },
        _ => RpcError::transient(method, format!("HTTP status {}", status)),
    }
}

/// Decodes a JSON-RPC response body into the expected result type.
pub fn decode_response<T: DeserializeOwned>(method: &str, body: &str) -> Result<T, RpcError> {
    let mut envelope: Value = serde_json::from_str(body)
        .map_err(|e| RpcError::malformed(method, format!("invalid JSON: {}", e)))?;

    if let Some(error) = envelope.get("error").filter(|e| !e.is_null()) {
        return Err(RpcError::Rpc {
            method: method.to_string(),
            code: error.get("code").and_then(Value::as_i64).unwrap_or_default(),
            message: error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        });
    }

    let result = envelope
        .get_mut("result")
        .map(Value::take)
        .ok_or_else(|| RpcError::malformed(method, "missing result"))?;

    serde_json::from_value(result).map_err(|e| RpcError::malformed(method, e.to_string()))
}

impl KodiApi for KodiClient {
    fn active_players(&self) -> Result<Vec<ActivePlayer>, RpcError> {
        self.call("Player.GetActivePlayers", json!({}))
    }

    fn player_timing(&self, player_id: i64) -> Result<PlayerTiming, RpcError> {
        self.call(
            "Player.GetProperties",
            json!({"playerid": player_id, "properties": TIMING_PROPERTIES}),
        )
    }

    fn player_streams(&self, player_id: i64) -> Result<PlayerStreams, RpcError> {
        self.call(
            "Player.GetProperties",
            json!({"playerid": player_id, "properties": STREAM_PROPERTIES}),
        )
    }

    fn player_item(&self, player_id: i64) -> Result<RawItem, RpcError> {
        #[derive(serde::Deserialize)]
        struct ItemResult {
            item: RawItem,
        }
        let result: ItemResult = self.call(
            "Player.GetItem",
            json!({"playerid": player_id, "properties": ITEM_PROPERTIES}),
        )?;
        Ok(result.item)
    }

    fn list_directory(&self, directory: &str) -> Result<Vec<DirectoryEntry>, RpcError> {
        #[derive(serde::Deserialize)]
        struct DirectoryResult {
            #[serde(default)]
            files: Option<Vec<DirectoryEntry>>,
        }
        let result: DirectoryResult = self.call(
            "Files.GetDirectory",
            json!({"directory": directory, "media": "files"}),
        )?;
        Ok(result.files.unwrap_or_default())
    }

    fn run_library_action(&self, action: LibraryAction) -> Result<(), RpcError> {
        let result: Value = self.call(action.method(), json!({}))?;
        debug!(method = action.method(), result = %result, "Library action answered");
        match result.as_str() {
            Some("OK") => Ok(()),
            _ => Err(RpcError::malformed(
                action.method(),
                format!("unexpected response: {}", result),
            )),
        }
    }

    fn fetch_image(&self, reference: &str) -> Result<ImageData, RpcError> {
        let url = self.image_url(reference)?;
        trace!(%url, "Image request");

        let mut request = self.agent.get(&url);
        if let Some(auth) = &self.auth_header {
            request = request.header("Authorization", auth);
        }
        let mut response = request
            .call()
            .map_err(|e| classify_transport_error(IMAGE_LABEL, e))?;

        let content_type = response
            .headers()
            .get(ureq::http::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or(DEFAULT_IMAGE_TYPE)
            .to_string();
        let bytes = response
            .body_mut()
            .with_config()
            .limit(MAX_IMAGE_BYTES)
            .read_to_vec()
            .map_err(|e| RpcError::transient(IMAGE_LABEL, format!("failed to read image: {}", e)))?;

        debug!(size = bytes.len(), content_type = %content_type, "Image fetched");
        Ok(ImageData {
            content_type,
            bytes,
        })
    }
}
