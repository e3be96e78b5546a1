//! Metadata normalization: raw Kodi item + live stream descriptors into a
//! canonical [`MediaRecord`].

use kodirpc::{PlayerStreams, RawItem, VideoStream};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

use crate::kind::MediaKind;
use crate::languages::Languages;

const STUDIO_SEPARATOR: &str = " / ";

/// Canonical aspect ratios: (decimal, label).
const ASPECT_TABLE: &[(f64, &str)] = &[
    (1.00, "1:1"),
    (1.33, "4:3"),
    (1.50, "3:2"),
    (1.66, "5:3"),
    (1.78, "16:9"),
    (1.85, "1.85:1"),
    (2.00, "2:1"),
    (2.20, "2.20:1"),
    (2.35, "21:9"),
    (2.39, "21:9"),
    (2.40, "21:9"),
    (2.76, "2.76:1"),
];

const ASPECT_TOLERANCE: f64 = 0.03;

lazy_static! {
    static ref GENERIC_EPISODE_TITLE: Regex =
        Regex::new(r"(?i)^\s*episode\s*#?\s*\d+\s*$").expect("valid episode title pattern");
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct VideoInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub codec: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hdr_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct AudioInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub codec: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channels: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_rate_hz: Option<u32>,
    /// Display form, e.g. `44.1 kHz`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_label: Option<String>,
}

/// Canonical metadata for the item being played.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MediaRecord {
    pub kind: MediaKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub season: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub episode: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<u32>,
    pub genres: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    pub cast: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub studio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tagline: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video: Option<VideoInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio: Option<AudioInfo>,
    pub languages: Languages,
}

impl MediaRecord {
    /// Text shown when no overlay image is available.
    pub fn overlay_text(&self) -> String {
        let text = match self.kind {
            MediaKind::Movie => self.title.as_deref(),
            MediaKind::Episode => self.show_title.as_deref().or(self.title.as_deref()),
            MediaKind::Song => self.artist.as_deref(),
        };
        match (text, self.kind) {
            (Some(text), _) => text.to_string(),
            (None, MediaKind::Song) => "Unknown Artist".to_string(),
            (None, _) => "Unknown Title".to_string(),
        }
    }
}

/// Builds the canonical record for one cycle.
pub fn normalize(kind: MediaKind, item: &RawItem, streams: &PlayerStreams) -> MediaRecord {
    let title = non_empty(item.title.as_deref()).or_else(|| non_empty(item.label.as_deref()));
    let title = match kind {
        MediaKind::Episode => title.filter(|t| !is_generic_episode_title(t)),
        _ => title,
    };

    let (show_title, season, episode) = if kind == MediaKind::Episode {
        (
            non_empty(item.show_title.as_deref()),
            item.season.and_then(non_negative),
            item.episode.and_then(non_negative),
        )
    } else {
        (None, None, None)
    };

    let (artist, album) = if kind == MediaKind::Song {
        let artist = non_empty(item.display_artist.as_deref()).or_else(|| {
            item.artist
                .as_ref()
                .and_then(|artists| join_non_empty(artists, STUDIO_SEPARATOR))
        });
        (artist, non_empty(item.album.as_deref()))
    } else {
        (None, None)
    };

    let file = item.file.as_deref().unwrap_or_default();

    MediaRecord {
        kind,
        title,
        show_title,
        season,
        episode,
        artist,
        album,
        year: item.year.and_then(|y| u32::try_from(y).ok()).filter(|y| *y > 0),
        genres: clean_list(item.genre.as_deref()),
        rating: item.rating.filter(|r| *r > 0.0).map(|r| (r * 10.0).round() / 10.0),
        cast: item
            .cast
            .as_deref()
            .unwrap_or_default()
            .iter()
            .filter_map(|member| non_empty(Some(member.name.as_str())))
            .collect(),
        studio: item
            .studio
            .as_ref()
            .and_then(|studios| join_non_empty(studios, STUDIO_SEPARATOR)),
        tagline: non_empty(item.tagline.as_deref()),
        video: kind.is_video().then(|| video_info(item, streams.current_video.as_ref(), file)),
        audio: Some(audio_info(kind, item, streams, file)),
        languages: Languages::resolve(streams, item.stream_details.as_ref()),
    }
}

/// True for machine-generated titles such as `Episode 6` or `episode #6`.
pub fn is_generic_episode_title(title: &str) -> bool {
    GENERIC_EPISODE_TITLE.is_match(title)
}

/// Maps a decimal ratio onto the canonical table, or renders it raw.
pub fn aspect_ratio_label(ratio: f64) -> Option<String> {
    if !ratio.is_finite() || ratio <= 0.0 {
        return None;
    }
    let nearest = ASPECT_TABLE.iter().min_by(|a, b| {
        (a.0 - ratio)
            .abs()
            .partial_cmp(&(b.0 - ratio).abs())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    match nearest {
        Some((decimal, label)) if (decimal - ratio).abs() <= ASPECT_TOLERANCE => {
            Some(label.to_string())
        }
        _ => Some(format!("{:.2}", ratio)),
    }
}

pub fn resolution_label(width: u32, height: u32) -> Option<String> {
    let label = if width >= 3200 || height >= 2000 {
        "4K"
    } else if width >= 1800 || height >= 1000 {
        "1080p"
    } else if width >= 1200 || height >= 700 {
        "720p"
    } else if width > 0 || height > 0 {
        "SD"
    } else {
        return None;
    };
    Some(label.to_string())
}

/// `hdrtype` as reported by the player; empty means SDR.
pub fn hdr_label(hdr_type: &str) -> String {
    match hdr_type.trim().to_ascii_lowercase().as_str() {
        "" => "SDR".to_string(),
        "hdr10" => "HDR10".to_string(),
        "hdr10plus" | "hdr10+" => "HDR10+".to_string(),
        "dolbyvision" | "dolby vision" | "dv" => "Dolby Vision".to_string(),
        "hlg" => "HLG".to_string(),
        other => other.to_ascii_uppercase(),
    }
}

/// Resolution and HDR guessed from release-name tokens in the file name.
pub fn filename_heuristics(file: &str) -> (Option<String>, Option<String>) {
    let name = file_name(file).to_ascii_lowercase();
    let tokens: Vec<&str> = name
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '+'))
        .filter(|t| !t.is_empty())
        .collect();
    let has = |candidates: &[&str]| tokens.iter().any(|t| candidates.contains(t));

    let resolution = if has(&["2160p", "4k", "uhd"]) {
        Some("4K")
    } else if has(&["1080p", "1080i"]) {
        Some("1080p")
    } else if has(&["720p"]) {
        Some("720p")
    } else if has(&["480p", "576p"]) {
        Some("SD")
    } else {
        None
    };

    let hdr = if has(&["hdr10+", "hdr10plus"]) {
        Some("HDR10+")
    } else if has(&["dv", "dovi", "dolbyvision"]) {
        Some("Dolby Vision")
    } else if has(&["hdr10", "hdr"]) {
        Some("HDR10")
    } else if has(&["hlg"]) {
        Some("HLG")
    } else {
        None
    };

    (resolution.map(String::from), hdr.map(String::from))
}

/// Upper-cased file extension, e.g. `MKV`.
pub fn container_label(file: &str) -> Option<String> {
    let name = file_name(file);
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() || ext.len() > 5 || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_ascii_uppercase())
}

pub fn video_codec_label(codec: &str) -> Option<String> {
    let codec = codec.trim().to_ascii_lowercase();
    let label = match codec.as_str() {
        "" => return None,
        "h264" | "avc1" | "avc" => "H.264",
        "hevc" | "h265" | "hvc1" => "HEVC",
        "av1" => "AV1",
        "vp9" => "VP9",
        "vp8" => "VP8",
        "mpeg2video" | "mpeg2" => "MPEG-2",
        "mpeg4" | "xvid" | "divx" => "MPEG-4",
        "vc1" | "wvc1" => "VC-1",
        other => return Some(other.to_ascii_uppercase()),
    };
    Some(label.to_string())
}

pub fn audio_codec_label(codec: &str) -> Option<String> {
    let codec = codec.trim().to_ascii_lowercase();
    let label = match codec.as_str() {
        "" => return None,
        "ac3" => "AC3",
        "eac3" => "EAC3",
        "dca" | "dts" => "DTS",
        "dtshd_ma" | "dts-hd ma" => "DTS-HD MA",
        "dtshd_hra" => "DTS-HD HRA",
        "truehd" => "TrueHD",
        "aac" => "AAC",
        "flac" => "FLAC",
        "alac" => "ALAC",
        "mp3" | "mp3float" => "MP3",
        "opus" => "Opus",
        "vorbis" => "Vorbis",
        other if other.starts_with("pcm") => "PCM",
        other => return Some(other.to_ascii_uppercase()),
    };
    Some(label.to_string())
}

pub fn channels_label(channels: u32) -> Option<String> {
    let label = match channels {
        0 => return None,
        1 => "Mono".to_string(),
        2 => "Stereo".to_string(),
        3 => "2.1".to_string(),
        6 => "5.1".to_string(),
        7 => "6.1".to_string(),
        8 => "7.1".to_string(),
        n => format!("{}ch", n),
    };
    Some(label)
}

/// Renders Hz as kHz with one decimal, rounding half up: 44100 -> `44.1 kHz`.
pub fn sample_rate_label(hz: u32) -> Option<String> {
    if hz == 0 {
        return None;
    }
    let tenths = (u64::from(hz) + 50) / 100;
    Some(format!("{}.{} kHz", tenths / 10, tenths % 10))
}

fn video_info(item: &RawItem, active: Option<&VideoStream>, file: &str) -> VideoInfo {
    let stored = item
        .stream_details
        .as_ref()
        .and_then(|details| details.video.first());
    let active = active.filter(|stream| !stream.is_empty());

    let (resolution, hdr_type) = match active {
        Some(stream) => (
            resolution_label(stream.width, stream.height),
            Some(hdr_label(&stream.hdr_type)),
        ),
        None => filename_heuristics(file),
    };

    let codec = active
        .and_then(|stream| video_codec_label(&stream.codec))
        .or_else(|| stored.and_then(|detail| video_codec_label(&detail.codec)));

    // Stored aspect is the display aspect; pixel dimensions ignore anamorphic PAR.
    let ratio = match (stored.map(|detail| detail.aspect), active) {
        (Some(aspect), _) if aspect > 0.0 => aspect,
        (_, Some(stream)) if stream.width > 0 && stream.height > 0 => {
            f64::from(stream.width) / f64::from(stream.height)
        }
        _ => 0.0,
    };

    VideoInfo {
        resolution,
        codec,
        hdr_type,
        aspect_ratio: aspect_ratio_label(ratio),
        container: container_label(file),
    }
}

fn audio_info(kind: MediaKind, item: &RawItem, streams: &PlayerStreams, file: &str) -> AudioInfo {
    let active = streams
        .current_audio
        .as_ref()
        .filter(|stream| !stream.codec.is_empty() || stream.channels > 0);
    let stored = item
        .stream_details
        .as_ref()
        .and_then(|details| details.audio.first());

    let codec = active
        .and_then(|stream| audio_codec_label(&stream.codec))
        .or_else(|| stored.and_then(|detail| audio_codec_label(&detail.codec)));
    let channels = active
        .and_then(|stream| channels_label(stream.channels))
        .or_else(|| stored.and_then(|detail| channels_label(detail.channels)));

    let sample_rate_hz = item
        .sample_rate
        .filter(|hz| *hz > 0)
        .or_else(|| active.map(|stream| stream.sample_rate).filter(|hz| *hz > 0));

    AudioInfo {
        codec,
        channels,
        container: container_label(file),
        sample_rate_hz,
        sample_rate: sample_rate_hz.and_then(sample_rate_label),
        record_label: if kind == MediaKind::Song {
            non_empty(item.album_label.as_deref())
        } else {
            None
        },
    }
}

fn file_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn non_negative(value: i64) -> Option<u32> {
    u32::try_from(value).ok()
}

fn clean_list(values: Option<&[String]>) -> Vec<String> {
    values
        .unwrap_or_default()
        .iter()
        .filter_map(|v| non_empty(Some(v.as_str())))
        .collect()
}

fn join_non_empty(values: &[String], separator: &str) -> Option<String> {
    let values = clean_list(Some(values));
    if values.is_empty() {
        None
    } else {
        Some(values.join(separator))
    }
}
