//! Raw wire types returned by the Kodi JSON-RPC API.
//!
//! Item fields are decoded leniently: a field with an unexpected JSON type
//! becomes `None` instead of failing the whole item.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Player family reported by `Player.GetActivePlayers`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlayerKind {
    Video,
    Audio,
    Picture,
    Other,
}

impl PlayerKind {
    pub fn from_kodi(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "video" => PlayerKind::Video,
            "audio" => PlayerKind::Audio,
            "picture" => PlayerKind::Picture,
            _ => PlayerKind::Other,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct ActivePlayer {
    #[serde(rename = "playerid")]
    pub player_id: i64,
    #[serde(rename = "type", default)]
    pub player_type: String,
}

impl ActivePlayer {
    pub fn kind(&self) -> PlayerKind {
        PlayerKind::from_kodi(&self.player_type)
    }
}

/// `Global.Time` object.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct KodiTime {
    pub hours: u64,
    pub minutes: u64,
    pub seconds: u64,
    pub milliseconds: u64,
}

impl KodiTime {
    pub fn from_millis(ms: u64) -> Self {
        Self {
            hours: ms / 3_600_000,
            minutes: (ms % 3_600_000) / 60_000,
            seconds: (ms % 60_000) / 1000,
            milliseconds: ms % 1000,
        }
    }

    pub fn as_millis(&self) -> u64 {
        self.hours * 3_600_000 + self.minutes * 60_000 + self.seconds * 1000 + self.milliseconds
    }
}

/// Timing subset of `Player.GetProperties`.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlayerTiming {
    pub time: KodiTime,
    #[serde(rename = "totaltime")]
    pub total_time: KodiTime,
    pub speed: f64,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct VideoStream {
    pub codec: String,
    pub width: u32,
    pub height: u32,
    #[serde(rename = "hdrtype")]
    pub hdr_type: String,
    pub language: String,
    pub name: String,
}

impl VideoStream {
    /// Kodi sends `{}` or zeroed fields when nothing renders.
    pub fn is_empty(&self) -> bool {
        self.codec.is_empty() && self.width == 0 && self.height == 0
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioStream {
    pub index: i64,
    pub codec: String,
    pub channels: u32,
    pub language: String,
    pub name: String,
    #[serde(rename = "samplerate")]
    pub sample_rate: u32,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct SubtitleStream {
    pub index: i64,
    pub language: String,
    pub name: String,
}

/// Stream subset of `Player.GetProperties`: what is actually rendering.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlayerStreams {
    #[serde(rename = "currentvideostream", deserialize_with = "lenient")]
    pub current_video: Option<VideoStream>,
    #[serde(rename = "currentaudiostream", deserialize_with = "lenient")]
    pub current_audio: Option<AudioStream>,
    #[serde(rename = "audiostreams", deserialize_with = "null_as_default")]
    pub audio_streams: Vec<AudioStream>,
    #[serde(rename = "currentsubtitle", deserialize_with = "lenient")]
    pub current_subtitle: Option<SubtitleStream>,
    #[serde(deserialize_with = "null_as_default")]
    pub subtitles: Vec<SubtitleStream>,
    #[serde(rename = "subtitleenabled", deserialize_with = "null_as_default")]
    pub subtitle_enabled: bool,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct VideoDetail {
    pub codec: String,
    pub aspect: f64,
    pub width: u32,
    pub height: u32,
    #[serde(rename = "hdrtype")]
    pub hdr_type: String,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioDetail {
    pub codec: String,
    pub channels: u32,
    pub language: String,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct SubtitleDetail {
    pub language: String,
}

/// Static `streamdetails` stored in the library for an item.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct StreamDetails {
    #[serde(deserialize_with = "null_as_default")]
    pub video: Vec<VideoDetail>,
    #[serde(deserialize_with = "null_as_default")]
    pub audio: Vec<AudioDetail>,
    #[serde(deserialize_with = "null_as_default")]
    pub subtitle: Vec<SubtitleDetail>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct CastMember {
    pub name: String,
    pub role: String,
}

/// `Player.GetItem` item.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct RawItem {
    #[serde(deserialize_with = "lenient")]
    pub id: Option<i64>,
    #[serde(rename = "type", deserialize_with = "lenient")]
    pub item_type: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub label: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub title: Option<String>,
    #[serde(rename = "showtitle", deserialize_with = "lenient")]
    pub show_title: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub season: Option<i64>,
    #[serde(deserialize_with = "lenient")]
    pub episode: Option<i64>,
    #[serde(deserialize_with = "lenient")]
    pub year: Option<i64>,
    #[serde(deserialize_with = "lenient")]
    pub genre: Option<Vec<String>>,
    #[serde(deserialize_with = "lenient")]
    pub rating: Option<f64>,
    #[serde(deserialize_with = "lenient")]
    pub cast: Option<Vec<CastMember>>,
    #[serde(deserialize_with = "lenient")]
    pub studio: Option<Vec<String>>,
    #[serde(deserialize_with = "lenient")]
    pub tagline: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub artist: Option<Vec<String>>,
    #[serde(rename = "displayartist", deserialize_with = "lenient")]
    pub display_artist: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub album: Option<String>,
    #[serde(rename = "albumlabel", deserialize_with = "lenient")]
    pub album_label: Option<String>,
    #[serde(rename = "samplerate", deserialize_with = "lenient")]
    pub sample_rate: Option<u32>,
    #[serde(deserialize_with = "lenient")]
    pub file: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub art: Option<BTreeMap<String, String>>,
    #[serde(rename = "streamdetails", deserialize_with = "lenient")]
    pub stream_details: Option<StreamDetails>,
}

/// Entry of `Files.GetDirectory`.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct DirectoryEntry {
    pub file: String,
    #[serde(rename = "filetype")]
    pub file_type: String,
    pub label: String,
}

impl DirectoryEntry {
    pub fn is_file(&self) -> bool {
        self.file_type != "directory"
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct KodiVersion {
    pub major: u32,
    pub minor: u32,
}

/// One-shot maintenance calls forwarded to the device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LibraryAction {
    VideoScan,
    AudioScan,
    VideoClean,
    AudioClean,
}

impl LibraryAction {
    pub fn method(&self) -> &'static str {
        match self {
            LibraryAction::VideoScan => "VideoLibrary.Scan",
            LibraryAction::AudioScan => "AudioLibrary.Scan",
            LibraryAction::VideoClean => "VideoLibrary.Clean",
            LibraryAction::AudioClean => "AudioLibrary.Clean",
        }
    }

    /// Parses the `{library}/{operation}` pair of the HTTP surface.
    pub fn from_parts(library: &str, operation: &str) -> Option<Self> {
        match (library, operation) {
            ("video", "scan") => Some(LibraryAction::VideoScan),
            ("audio", "scan") => Some(LibraryAction::AudioScan),
            ("video", "clean") => Some(LibraryAction::VideoClean),
            ("audio", "clean") => Some(LibraryAction::AudioClean),
            _ => None,
        }
    }
}

/// Image bytes served by the device web server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageData {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kodi_time_millis() {
        let t = KodiTime {
            hours: 1,
            minutes: 2,
            seconds: 5,
            milliseconds: 250,
        };
        assert_eq!(t.as_millis(), 3_725_250);
        assert_eq!(KodiTime::from_millis(3_725_250), t);
    }

    #[test]
    fn test_raw_item_tolerates_wrong_field_types() {
        let item: RawItem = serde_json::from_value(json!({
            "id": 12,
            "type": "episode",
            "title": "Episode 6",
            "season": "two",
            "studio": "not a list",
            "art": {"tvshow.poster": "image://poster.jpg/"},
        }))
        .unwrap();

        assert_eq!(item.id, Some(12));
        assert_eq!(item.title.as_deref(), Some("Episode 6"));
        assert_eq!(item.season, None);
        assert_eq!(item.studio, None);
        assert_eq!(item.art.unwrap().len(), 1);
    }

    #[test]
    fn test_player_streams_handle_nulls_and_empty_objects() {
        let streams: PlayerStreams = serde_json::from_value(json!({
            "currentvideostream": {},
            "currentaudiostream": {"codec": "ac3", "channels": 6, "language": "eng"},
            "audiostreams": null,
            "currentsubtitle": null,
            "subtitleenabled": false,
        }))
        .unwrap();

        assert!(streams.current_video.unwrap().is_empty());
        assert_eq!(streams.current_audio.unwrap().channels, 6);
        assert!(streams.audio_streams.is_empty());
        assert!(streams.current_subtitle.is_none());
    }

    #[test]
    fn test_library_action_parts() {
        assert_eq!(
            LibraryAction::from_parts("video", "scan"),
            Some(LibraryAction::VideoScan)
        );
        assert_eq!(LibraryAction::from_parts("music", "scan"), None);
        assert_eq!(LibraryAction::AudioClean.method(), "AudioLibrary.Clean");
    }
}
