//! Language badges.
//!
//! Merges the player's current audio/subtitle track with the item's full
//! stream listing into canonical `{active, available[]}` badges.

use std::collections::HashMap;

use kodirpc::{PlayerStreams, StreamDetails};
use lazy_static::lazy_static;
use serde::Serialize;

/// (ISO 639-2/T, ISO 639-2/B, ISO 639-1, names...)
const LANGUAGE_TABLE: &[(&str, &str, &str, &[&str])] = &[
    ("ara", "ara", "ar", &["arabic"]),
    ("bul", "bul", "bg", &["bulgarian"]),
    ("cat", "cat", "ca", &["catalan"]),
    ("ces", "cze", "cs", &["czech"]),
    ("dan", "dan", "da", &["danish"]),
    ("deu", "ger", "de", &["german", "deutsch"]),
    ("ell", "gre", "el", &["greek"]),
    ("eng", "eng", "en", &["english"]),
    ("est", "est", "et", &["estonian"]),
    ("fas", "per", "fa", &["persian", "farsi"]),
    ("fin", "fin", "fi", &["finnish"]),
    ("fra", "fre", "fr", &["french", "francais", "français"]),
    ("heb", "heb", "he", &["hebrew"]),
    ("hin", "hin", "hi", &["hindi"]),
    ("hrv", "hrv", "hr", &["croatian"]),
    ("hun", "hun", "hu", &["hungarian"]),
    ("ind", "ind", "id", &["indonesian"]),
    ("isl", "ice", "is", &["icelandic"]),
    ("ita", "ita", "it", &["italian", "italiano"]),
    ("jpn", "jpn", "ja", &["japanese"]),
    ("kor", "kor", "ko", &["korean"]),
    ("lav", "lav", "lv", &["latvian"]),
    ("lit", "lit", "lt", &["lithuanian"]),
    ("msa", "may", "ms", &["malay"]),
    ("nld", "dut", "nl", &["dutch", "flemish"]),
    ("nor", "nor", "no", &["norwegian"]),
    ("pol", "pol", "pl", &["polish"]),
    ("por", "por", "pt", &["portuguese"]),
    ("ron", "rum", "ro", &["romanian"]),
    ("rus", "rus", "ru", &["russian"]),
    ("slk", "slo", "sk", &["slovak"]),
    ("slv", "slv", "sl", &["slovenian"]),
    ("spa", "spa", "es", &["spanish", "castilian", "español"]),
    ("srp", "srp", "sr", &["serbian"]),
    ("swe", "swe", "sv", &["swedish"]),
    ("tha", "tha", "th", &["thai"]),
    ("tur", "tur", "tr", &["turkish"]),
    ("ukr", "ukr", "uk", &["ukrainian"]),
    ("vie", "vie", "vi", &["vietnamese"]),
    ("zho", "chi", "zh", &["chinese", "mandarin"]),
];

lazy_static! {
    static ref ALIASES: HashMap<&'static str, &'static str> = {
        let mut aliases = HashMap::new();
        for (terminology, bibliographic, two_letter, names) in LANGUAGE_TABLE {
            aliases.insert(*terminology, *terminology);
            aliases.insert(*bibliographic, *terminology);
            aliases.insert(*two_letter, *terminology);
            for name in names.iter() {
                aliases.insert(*name, *terminology);
            }
        }
        aliases
    };
}

/// Canonical upper-case language code, or `None` for unknown/undetermined.
///
/// Unrecognised spellings are upper-cased as-is.
pub fn canonical_language(raw: &str) -> Option<String> {
    let key = raw.trim().to_lowercase();
    // Region subtags: "en-US", "pt_BR".
    let key = key.split(['-', '_']).next().unwrap_or_default();
    match key {
        "" | "und" | "unk" | "unknown" | "n/a" | "none" => None,
        _ => Some(
            ALIASES
                .get(key)
                .map(|code| code.to_ascii_uppercase())
                .unwrap_or_else(|| key.to_uppercase()),
        ),
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct LanguageBadge {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active: Option<String>,
    /// The active language is not part of `available`; shown without highlight.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub unmatched: bool,
    pub available: Vec<String>,
    /// More than one language to choose from.
    pub expandable: bool,
}

impl LanguageBadge {
    pub fn build<'a>(
        active: Option<&str>,
        listing: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        let mut available: Vec<String> = Vec::new();
        for code in listing.into_iter().filter_map(canonical_language) {
            if !available.contains(&code) {
                available.push(code);
            }
        }

        let active = active.and_then(canonical_language);
        let unmatched = active
            .as_ref()
            .is_some_and(|code| !available.contains(code));

        Self {
            expandable: available.len() > 1,
            active,
            unmatched,
            available,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Languages {
    pub audio: LanguageBadge,
    pub subtitle: LanguageBadge,
}

impl Languages {
    /// Builds both badges. The item's stored stream listing is preferred;
    /// the player's live listing is used when the item has none.
    pub fn resolve(streams: &PlayerStreams, details: Option<&StreamDetails>) -> Self {
        let audio_listing = pick_listing(
            details
                .map(|d| d.audio.iter().map(|a| a.language.as_str()).collect())
                .unwrap_or_default(),
            streams.audio_streams.iter().map(|a| a.language.as_str()).collect(),
        );
        let subtitle_listing = pick_listing(
            details
                .map(|d| d.subtitle.iter().map(|s| s.language.as_str()).collect())
                .unwrap_or_default(),
            streams.subtitles.iter().map(|s| s.language.as_str()).collect(),
        );

        let active_audio = streams.current_audio.as_ref().map(|a| a.language.as_str());
        let active_subtitle = streams
            .current_subtitle
            .as_ref()
            .filter(|_| streams.subtitle_enabled)
            .map(|s| s.language.as_str());

        Self {
            audio: LanguageBadge::build(active_audio, audio_listing),
            subtitle: LanguageBadge::build(active_subtitle, subtitle_listing),
        }
    }
}

fn pick_listing<'a>(item: Vec<&'a str>, player: Vec<&'a str>) -> Vec<&'a str> {
    if item.iter().any(|raw| canonical_language(raw).is_some()) {
        item
    } else {
        player
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kodirpc::{AudioDetail, AudioStream, SubtitleDetail, SubtitleStream};

    #[test]
    fn test_canonical_language_collapses_aliases() {
        for raw in ["eng", "en", "English", "ENG", " en-US "] {
            assert_eq!(canonical_language(raw).as_deref(), Some("ENG"), "{}", raw);
        }
        for raw in ["fre", "fra", "fr", "French"] {
            assert_eq!(canonical_language(raw).as_deref(), Some("FRA"), "{}", raw);
        }
        assert_eq!(canonical_language("ger").as_deref(), Some("DEU"));
        assert_eq!(canonical_language("klingon").as_deref(), Some("KLINGON"));
        assert_eq!(canonical_language("und"), None);
        assert_eq!(canonical_language(""), None);
    }

    #[test]
    fn test_available_has_no_duplicate_codes() {
        let badge = LanguageBadge::build(Some("en"), ["eng", "English", "fre", "fra", "en", ""]);
        assert_eq!(badge.available, vec!["ENG", "FRA"]);
        assert_eq!(badge.active.as_deref(), Some("ENG"));
        assert!(!badge.unmatched);
        assert!(badge.expandable);
    }

    #[test]
    fn test_unmatched_active_is_still_shown() {
        let badge = LanguageBadge::build(Some("jpn"), ["eng"]);
        assert_eq!(badge.active.as_deref(), Some("JPN"));
        assert!(badge.unmatched);
        assert!(!badge.expandable);
    }

    #[test]
    fn test_resolve_prefers_item_listing_and_respects_subtitle_toggle() {
        let streams = PlayerStreams {
            current_audio: Some(AudioStream {
                language: "fre".into(),
                ..Default::default()
            }),
            audio_streams: vec![AudioStream {
                language: "fre".into(),
                ..Default::default()
            }],
            current_subtitle: Some(SubtitleStream {
                language: "eng".into(),
                ..Default::default()
            }),
            subtitles: vec![
                SubtitleStream {
                    language: "eng".into(),
                    ..Default::default()
                },
                SubtitleStream {
                    language: "spa".into(),
                    ..Default::default()
                },
            ],
            subtitle_enabled: false,
            ..Default::default()
        };
        let details = StreamDetails {
            audio: vec![
                AudioDetail {
                    language: "eng".into(),
                    ..Default::default()
                },
                AudioDetail {
                    language: "fra".into(),
                    ..Default::default()
                },
            ],
            subtitle: vec![SubtitleDetail::default()],
            ..Default::default()
        };

        let languages = Languages::resolve(&streams, Some(&details));
        assert_eq!(languages.audio.available, vec!["ENG", "FRA"]);
        assert_eq!(languages.audio.active.as_deref(), Some("FRA"));

        // The item only lists an undetermined subtitle: the player's listing is used.
        assert_eq!(languages.subtitle.available, vec!["ENG", "SPA"]);
        assert_eq!(languages.subtitle.active, None);
        assert!(languages.subtitle.expandable);
    }
}
