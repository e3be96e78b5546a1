//! # kodinow
//!
//! Live "now playing" engine for a Kodi device.
//!
//! Each poll cycle queries the active player, its timing and streams and the
//! playing item, then:
//!
//! 1. feeds the [`SessionTracker`] (Stopped / Playing / Paused, elapsed time);
//! 2. normalizes the item into a [`MediaRecord`] with language badges;
//! 3. resolves an [`ArtworkSet`] through fixed per-kind fallback chains;
//! 4. assembles a [`Snapshot`] and publishes it with its [`SnapshotDiff`].
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use chrono::Utc;
//! use kodinow::{Poller, PollerSettings, Snapshot, SnapshotStore};
//! use kodirpc::{KodiClient, KodiEndpoint};
//!
//! let client = KodiClient::new(
//!     KodiEndpoint::parse("192.168.1.20:8080")?,
//!     None,
//!     Duration::from_secs(5),
//! );
//! let store = Arc::new(SnapshotStore::new(Snapshot::stopped(Utc::now())));
//! let poller = Poller::spawn(client, PollerSettings::default(), store.clone())?;
//! println!("{:?}", store.current().session.state);
//! poller.shutdown()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod artwork;
pub mod diff;
pub mod errors;
pub mod kind;
pub mod languages;
pub mod normalizer;
pub mod poller;
pub mod session;
pub mod snapshot;
pub mod store;

pub use artwork::{ArtRef, ArtworkSet};
pub use diff::{FieldChange, SnapshotDiff};
pub use errors::NowPlayingError;
pub use kind::{ItemIdentity, MediaKind};
pub use languages::{LanguageBadge, Languages, canonical_language};
pub use normalizer::{AudioInfo, MediaRecord, VideoInfo};
pub use poller::{NowPlayingEngine, Poller, PollerSettings};
pub use session::{PlaybackSession, PlaybackState, SessionTracker};
pub use snapshot::{ConnectionStatus, Snapshot};
pub use store::{SnapshotStore, SnapshotUpdate};
