use std::fmt;

use kodirpc::PlayerKind;
use serde::{Deserialize, Serialize};

/// Media family driving per-kind dispatch in the normalizer and the
/// artwork resolver.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Movie,
    Episode,
    Song,
}

impl MediaKind {
    /// Maps Kodi's item `type`; unknown types follow the player family.
    pub fn from_item(item_type: Option<&str>, player: PlayerKind) -> Self {
        match item_type.map(|t| t.trim().to_ascii_lowercase()).as_deref() {
            Some("movie") | Some("musicvideo") => MediaKind::Movie,
            Some("episode") => MediaKind::Episode,
            Some("song") => MediaKind::Song,
            _ => match player {
                PlayerKind::Audio => MediaKind::Song,
                _ => MediaKind::Movie,
            },
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Movie => "movie",
            MediaKind::Episode => "episode",
            MediaKind::Song => "song",
        }
    }

    pub fn is_video(&self) -> bool {
        !matches!(self, MediaKind::Song)
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of the item being played. A change starts a new session.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ItemIdentity {
    pub kind: MediaKind,
    pub id: String,
}

impl ItemIdentity {
    /// `<kind>:<library id>` for library items, else the file path, else the label.
    pub fn new(kind: MediaKind, library_id: Option<i64>, file: Option<&str>, label: Option<&str>) -> Self {
        let id = match library_id.filter(|id| *id > 0) {
            Some(id) => format!("{}:{}", kind, id),
            None => non_blank(file)
                .or_else(|| non_blank(label))
                .unwrap_or("unknown")
                .to_string(),
        };
        Self { kind, id }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_item_type() {
        assert_eq!(MediaKind::from_item(Some("episode"), PlayerKind::Video), MediaKind::Episode);
        assert_eq!(MediaKind::from_item(Some("Song"), PlayerKind::Audio), MediaKind::Song);
        assert_eq!(MediaKind::from_item(Some("unknown"), PlayerKind::Audio), MediaKind::Song);
        assert_eq!(MediaKind::from_item(None, PlayerKind::Video), MediaKind::Movie);
    }

    #[test]
    fn test_identity_prefers_library_id() {
        let id = ItemIdentity::new(MediaKind::Episode, Some(42), Some("/tv/a.mkv"), Some("A"));
        assert_eq!(id.id, "episode:42");

        let id = ItemIdentity::new(MediaKind::Movie, Some(-1), Some("/films/b.mkv"), Some("B"));
        assert_eq!(id.id, "/films/b.mkv");

        let id = ItemIdentity::new(MediaKind::Song, None, Some("  "), Some("Track 1"));
        assert_eq!(id.id, "Track 1");
    }

    #[test]
    fn test_blank_file_falls_back_to_label() {
        let a = ItemIdentity::new(MediaKind::Song, None, Some(""), Some("Radio A"));
        let b = ItemIdentity::new(MediaKind::Song, None, Some(""), Some("Radio B"));
        assert_eq!(a.id, "Radio A");
        assert_ne!(a, b);

        let none = ItemIdentity::new(MediaKind::Song, None, Some(" "), None);
        assert_eq!(none.id, "unknown");
    }
}
