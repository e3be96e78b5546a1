use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::artwork::ArtworkSet;
use crate::normalizer::MediaRecord;
use crate::session::PlaybackSession;

/// Link state shown to the presentation layer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    #[default]
    Online,
    /// Unreachable for longer than the grace period.
    Unreachable,
    /// Credentials rejected by the device.
    AuthRejected,
}

/// One immutable, internally consistent picture of a poll cycle.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Snapshot {
    /// Incremented on every published change.
    pub sequence: u64,
    pub session: PlaybackSession,
    pub media: Option<MediaRecord>,
    pub artwork: Option<ArtworkSet>,
    pub connection: ConnectionStatus,
    pub computed_at: DateTime<Utc>,
}

impl Snapshot {
    /// Nothing playing.
    pub fn stopped(computed_at: DateTime<Utc>) -> Self {
        Self {
            sequence: 0,
            session: PlaybackSession::default(),
            media: None,
            artwork: None,
            connection: ConnectionStatus::Online,
            computed_at,
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
