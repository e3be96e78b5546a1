//! Artwork resolution.
//!
//! [`resolve_artwork`] is a pure function of the media kind, the item's
//! `art` map and the extra-fanart scan results. Each role walks a fixed
//! per-kind chain of Kodi art keys and the first present key wins. The
//! overlay and the primary image always resolve to something, falling
//! back to text or a placeholder.
//!
//! Device images are referenced through the server's artwork proxy
//! ([`ARTWORK_ROUTE`]) so browsers never need the device credentials.

use std::collections::{BTreeMap, HashSet};

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

use crate::kind::MediaKind;

const IMAGE_SCHEME: &str = "image://";

/// Route the HTTP server proxies device images under.
pub const ARTWORK_ROUTE: &str = "/artwork";

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif", "bmp", "tbn"];

/// Recognised aliases for the back cover of an album.
const ALBUM_BACK_KEYS: &[&str] = &["album.back", "back", "album.backcover", "backcover"];

lazy_static! {
    static ref SEASON_FOLDER: Regex =
        Regex::new(r"(?i)^(season\s*\d+|specials)$").expect("valid season folder pattern");
}

/// Art key chains for one media kind, tried top to bottom.
struct ArtChains {
    primary: &'static [&'static str],
    clearart: &'static [&'static str],
    banner: &'static [&'static str],
    discart: &'static [&'static str],
    fanart: &'static [&'static str],
}

const MOVIE_CHAINS: ArtChains = ArtChains {
    primary: &["poster", "thumb"],
    clearart: &["clearart"],
    banner: &["banner"],
    discart: &["discart"],
    fanart: &["fanart"],
};

const EPISODE_CHAINS: ArtChains = ArtChains {
    primary: &["season.poster", "tvshow.poster"],
    clearart: &["tvshow.clearart", "clearart"],
    banner: &["tvshow.banner", "banner"],
    discart: &[],
    fanart: &["tvshow.fanart", "fanart"],
};

// The album cover has no fallback beyond its own key aliases.
const SONG_CHAINS: ArtChains = ArtChains {
    primary: &["album.thumb", "thumb"],
    clearart: &["artist.clearart", "clearart"],
    banner: &["artist.banner", "banner"],
    discart: &["album.discart", "discart"],
    fanart: &["fanart", "artist.fanart"],
};

fn chains(kind: MediaKind) -> &'static ArtChains {
    match kind {
        MediaKind::Movie => &MOVIE_CHAINS,
        MediaKind::Episode => &EPISODE_CHAINS,
        MediaKind::Song => &SONG_CHAINS,
    }
}

/// A resolved image slot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ArtRef {
    Image { url: String },
    Text { text: String },
    Placeholder,
}

impl ArtRef {
    pub fn url(&self) -> Option<&str> {
        match self {
            ArtRef::Image { url } => Some(url),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ArtworkSet {
    /// Poster, season/show poster or album cover.
    pub poster: ArtRef,
    /// Clear art, then banner, then a text title.
    pub overlay: ArtRef,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clearart: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub banner: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discart: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album_front: Option<String>,
    /// Present only when a back cover alias exists; enables the flip.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album_back: Option<String>,
    pub fanart: Vec<String>,
}

impl ArtworkSet {
    /// True when `url` is one of the image URLs of this set.
    pub fn references(&self, url: &str) -> bool {
        let slots = [
            self.poster.url(),
            self.overlay.url(),
            self.clearart.as_deref(),
            self.banner.as_deref(),
            self.discart.as_deref(),
            self.album_front.as_deref(),
            self.album_back.as_deref(),
        ];
        slots.into_iter().flatten().any(|slot| slot == url)
            || self.fanart.iter().any(|slot| slot == url)
    }
}

pub struct ArtworkInput<'a> {
    pub kind: MediaKind,
    pub art: &'a BTreeMap<String, String>,
    /// Text used when no overlay image exists.
    pub overlay_text: &'a str,
    /// Image files found in the extra-fanart directory, in discovery order.
    pub extra_fanart: &'a [String],
    /// Prefix device images are proxied under, normally [`ARTWORK_ROUTE`].
    pub proxy_base: &'a str,
}

pub fn resolve_artwork(input: &ArtworkInput<'_>) -> ArtworkSet {
    let chains = chains(input.kind);
    let pick = |keys: &[&str]| first_present(input.art, keys).map(|raw| image_url(input.proxy_base, raw));

    let primary = pick(chains.primary);
    let clearart = pick(chains.clearart);
    let banner = pick(chains.banner);

    let overlay = match clearart.as_ref().or(banner.as_ref()) {
        Some(url) => ArtRef::Image { url: url.clone() },
        None => ArtRef::Text {
            text: input.overlay_text.to_string(),
        },
    };

    let (album_front, album_back) = if input.kind == MediaKind::Song {
        (primary.clone(), pick(ALBUM_BACK_KEYS))
    } else {
        (None, None)
    };

    let mut seen = HashSet::new();
    let mut fanart = Vec::new();
    let primary_fanart = first_present(input.art, chains.fanart);
    for raw in primary_fanart.into_iter().chain(input.extra_fanart.iter().map(String::as_str)) {
        if seen.insert(canonical_key(raw)) {
            fanart.push(image_url(input.proxy_base, raw));
        }
    }

    ArtworkSet {
        poster: primary.map_or(ArtRef::Placeholder, |url| ArtRef::Image { url }),
        overlay,
        clearart,
        banner,
        discart: pick(chains.discart),
        album_front,
        album_back,
        fanart,
    }
}

fn first_present<'a>(art: &'a BTreeMap<String, String>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|key| art.get(*key))
        .map(|value| value.trim())
        .find(|value| !value.is_empty())
}

/// Identity of an asset: the decoded inner path of an `image://` reference.
pub fn canonical_key(raw: &str) -> String {
    let raw = raw.trim();
    match raw.strip_prefix(IMAGE_SCHEME) {
        Some(inner) => {
            let inner = inner.strip_suffix('/').unwrap_or(inner);
            urlencoding::decode(inner)
                .map(|decoded| decoded.into_owned())
                .unwrap_or_else(|_| inner.to_string())
        }
        None => raw.to_string(),
    }
}

/// Device image reference (`image://...`) for an art value or a plain file
/// path; `None` for remote URLs, which browsers can load directly.
pub fn image_reference(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.starts_with("http://") || raw.starts_with("https://") {
        None
    } else if raw.starts_with(IMAGE_SCHEME) {
        Some(raw.to_string())
    } else {
        Some(format!("{}{}/", IMAGE_SCHEME, urlencoding::encode(raw)))
    }
}

/// URL an art reference or a plain file path is served under by the proxy
/// mounted at `proxy_base`. Remote URLs pass through.
pub fn image_url(proxy_base: &str, raw: &str) -> String {
    match image_reference(raw) {
        Some(reference) => format!(
            "{}/{}",
            proxy_base.trim_end_matches('/'),
            urlencoding::encode(&reference)
        ),
        None => raw.trim().to_string(),
    }
}

pub fn is_image_file(path: &str) -> bool {
    path.rsplit_once('.')
        .map(|(_, ext)| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Directory holding extra fanart for the item, if its path allows one.
///
/// Movies keep it next to the file, episodes at the show root and songs in
/// the artist folder.
pub fn extra_fanart_dir(kind: MediaKind, file: &str, dir_name: &str) -> Option<String> {
    let file = file.trim();
    if file.is_empty()
        || dir_name.is_empty()
        || ["plugin://", "pvr://", "http://", "https://", "stack://", "upnp://"]
            .iter()
            .any(|scheme| file.starts_with(scheme))
    {
        return None;
    }

    let sep = if file.contains('/') { '/' } else { '\\' };
    let mut parts: Vec<&str> = file.split(sep).collect();
    // Drop the file name.
    parts.pop();

    match kind {
        MediaKind::Movie => {}
        MediaKind::Episode => {
            if parts.last().is_some_and(|folder| SEASON_FOLDER.is_match(folder.trim())) {
                parts.pop();
            }
        }
        MediaKind::Song => {
            parts.pop();
        }
    }

    if parts.iter().all(|part| part.is_empty() || part.ends_with(':')) {
        return None;
    }

    let separator = sep.to_string();
    let mut dir = parts.join(separator.as_str());
    dir.push(sep);
    dir.push_str(dir_name);
    dir.push(sep);
    Some(dir)
}
