//! # kodirpc
//!
//! Blocking JSON-RPC 2.0 client for the Kodi media center.
//!
//! The client speaks HTTP(S) with optional Basic authentication and sorts
//! every failure into the [`RpcError`] taxonomy the polling engine relies on:
//! transient (retry next cycle), auth (surface to the user), malformed
//! (degrade one facet).
//!
//! ```no_run
//! use std::time::Duration;
//! use kodirpc::{Credentials, KodiApi, KodiClient, KodiEndpoint};
//!
//! let endpoint = KodiEndpoint::parse("http://192.168.1.20:8080")?;
//! let client = KodiClient::new(
//!     endpoint,
//!     Credentials::from_parts("kodi", "secret"),
//!     Duration::from_secs(5),
//! );
//! for player in client.active_players()? {
//!     println!("player {} ({})", player.player_id, player.player_type);
//! }
//! # Ok::<(), kodirpc::RpcError>(())
//! ```

pub mod api;
pub mod client;
pub mod endpoint;
pub mod errors;
pub mod model;

pub use api::KodiApi;
pub use client::{Credentials, KodiClient};
pub use endpoint::KodiEndpoint;
pub use errors::RpcError;
pub use model::{
    ActivePlayer, AudioDetail, AudioStream, CastMember, DirectoryEntry, ImageData, KodiTime,
    KodiVersion, LibraryAction, PlayerKind, PlayerStreams, PlayerTiming, RawItem, StreamDetails,
    SubtitleDetail, SubtitleStream, VideoDetail, VideoStream,
};
