use thiserror::Error;

/// Failure of one JSON-RPC exchange with the Kodi device.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RpcError {
    /// Network failure, timeout or server-side HTTP error; worth retrying next cycle.
    #[error("{method}: upstream unreachable: {reason}")]
    Transient { method: String, reason: String },
    /// Credentials rejected (HTTP 401/403).
    #[error("{method}: authentication rejected (HTTP status {status})")]
    Auth { method: String, status: u16 },
    /// Body could not be decoded or lacks the expected fields.
    #[error("{method}: malformed response: {reason}")]
    Malformed { method: String, reason: String },
    /// The device answered with a JSON-RPC error object.
    #[error("{method} returned JSON-RPC error {code}: {message}")]
    Rpc {
        method: String,
        code: i64,
        message: String,
    },
    #[error("Invalid Kodi URL: {0}")]
    InvalidUrl(String),
}

impl RpcError {
    pub fn transient(method: &str, reason: impl Into<String>) -> Self {
        RpcError::Transient {
            method: method.to_string(),
            reason: reason.into(),
        }
    }

    pub fn malformed(method: &str, reason: impl Into<String>) -> Self {
        RpcError::Malformed {
            method: method.to_string(),
            reason: reason.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, RpcError::Transient { .. })
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, RpcError::Auth { .. })
    }

    /// Malformed bodies and JSON-RPC error objects only cost the affected facet.
    pub fn is_facet_local(&self) -> bool {
        matches!(self, RpcError::Malformed { .. } | RpcError::Rpc { .. })
    }
}
