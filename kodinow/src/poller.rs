//! Poll loop.
//!
//! [`NowPlayingEngine::cycle`] runs one synchronous poll cycle and returns the
//! resulting [`Snapshot`]. [`Poller`] drives the engine from a dedicated
//! thread and publishes into a [`SnapshotStore`]; cycle N+1 never starts
//! before cycle N has been published.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle, ScopedJoinHandle};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use kodirpc::{ActivePlayer, KodiApi, PlayerKind, PlayerStreams, RawItem, RpcError};
use tracing::{debug, info, warn};

use crate::artwork::{
    ARTWORK_ROUTE, ArtworkInput, ArtworkSet, extra_fanart_dir, is_image_file, resolve_artwork,
};
use crate::errors::NowPlayingError;
use crate::kind::{ItemIdentity, MediaKind};
use crate::normalizer::{MediaRecord, normalize};
use crate::session::{Observation, PlaybackState, SessionTracker, Timing};
use crate::snapshot::{ConnectionStatus, Snapshot};
use crate::store::SnapshotStore;

const STOP_CHECK_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Clone, Debug)]
pub struct PollerSettings {
    pub interval: Duration,
    /// How long the last state is held while the device is unreachable.
    pub grace_period: Duration,
    /// Backward corrections below this are absorbed while playing.
    pub seek_threshold: Duration,
    /// Name of the extra fanart folder, e.g. `extrafanart`.
    pub extra_fanart_dir: String,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            grace_period: Duration::from_secs(10),
            seek_threshold: Duration::from_secs(3),
            extra_fanart_dir: "extrafanart".to_string(),
        }
    }
}

/// Last-known-good facets of the current session.
#[derive(Default)]
struct FacetCache {
    player_id: Option<i64>,
    identity: Option<ItemIdentity>,
    item: Option<RawItem>,
    streams: Option<PlayerStreams>,
    extra_fanart: Vec<String>,
    media: Option<MediaRecord>,
    artwork: Option<ArtworkSet>,
}

pub struct NowPlayingEngine<A: KodiApi> {
    api: A,
    settings: PollerSettings,
    tracker: SessionTracker,
    cache: FacetCache,
    connection: ConnectionStatus,
}

impl<A: KodiApi> NowPlayingEngine<A> {
    pub fn new(api: A, settings: PollerSettings) -> Self {
        let tracker = SessionTracker::new(settings.grace_period, settings.seek_threshold);
        Self {
            api,
            settings,
            tracker,
            cache: FacetCache::default(),
            connection: ConnectionStatus::Online,
        }
    }

    /// Runs one poll cycle. Every upstream call has completed or failed
    /// when this returns.
    pub fn cycle(&mut self, now: DateTime<Utc>) -> Snapshot {
        match self.api.active_players() {
            Ok(players) => match select_player(&players) {
                Some(player) => self.observe_player(player, now),
                None => {
                    self.tracker.observe(Observation::Idle, now);
                    self.cache = FacetCache::default();
                    self.set_connection(ConnectionStatus::Online);
                }
            },
            Err(err) => self.observe_failure(err, now),
        }
        self.snapshot(now)
    }

    fn observe_failure(&mut self, err: RpcError, now: DateTime<Utc>) {
        if err.is_auth() {
            self.set_connection(ConnectionStatus::AuthRejected);
        } else {
            debug!(error = %err, "Active player query failed");
            // The device no longer answers, so the rejection is stale.
            if self.connection == ConnectionStatus::AuthRejected {
                self.set_connection(ConnectionStatus::Unreachable);
            }
        }

        let update = self.tracker.observe(Observation::Unreachable, now);
        if update.grace_expired {
            if !err.is_auth() {
                self.set_connection(ConnectionStatus::Unreachable);
            }
            self.cache = FacetCache::default();
        }
    }

    fn observe_player(&mut self, player: &ActivePlayer, now: DateTime<Utc>) {
        let player_id = player.player_id;
        let api = &self.api;
        let (timing, streams, item) = thread::scope(|scope| {
            let timing = scope.spawn(|| api.player_timing(player_id));
            let streams = scope.spawn(|| api.player_streams(player_id));
            let item = api.player_item(player_id);
            (
                joined(timing, "Player.GetProperties"),
                joined(streams, "Player.GetProperties"),
                item,
            )
        });

        let auth_rejected = [
            timing.as_ref().err(),
            streams.as_ref().err(),
            item.as_ref().err(),
        ]
        .into_iter()
        .flatten()
        .any(RpcError::is_auth);

        let same_player = self.cache.player_id == Some(player_id);
        let item = match item {
            Ok(item) => item,
            Err(err) => {
                debug!(player_id, error = %err, "Item query failed, using last known item");
                self.cache
                    .item
                    .clone()
                    .filter(|_| same_player)
                    .unwrap_or_default()
            }
        };

        let kind = MediaKind::from_item(item.item_type.as_deref(), player.kind());
        let identity = ItemIdentity::new(kind, item.id, item.file.as_deref(), item.label.as_deref());
        let same_item = self.cache.identity.as_ref() == Some(&identity);

        let streams = match streams {
            Ok(streams) => streams,
            Err(err) => {
                debug!(player_id, error = %err, "Stream query failed, using last known streams");
                self.cache
                    .streams
                    .clone()
                    .filter(|_| same_item)
                    .unwrap_or_default()
            }
        };

        let timing = match timing {
            Ok(timing) => Some(Timing::from(&timing)),
            Err(err) => {
                debug!(player_id, error = %err, "Timing query failed, extrapolating");
                None
            }
        };

        let update = self.tracker.observe(
            Observation::Active {
                identity: identity.clone(),
                timing,
            },
            now,
        );

        if update.new_session || !same_item {
            info!(item = %identity.id, kind = %kind, "Now playing");
            self.cache.extra_fanart = self.scan_extra_fanart(kind, &item);
        }

        let media = normalize(kind, &item, &streams);
        let art = item.art.clone().unwrap_or_default();
        let overlay_text = media.overlay_text();
        let artwork = resolve_artwork(&ArtworkInput {
            kind,
            art: &art,
            overlay_text: &overlay_text,
            extra_fanart: &self.cache.extra_fanart,
            proxy_base: ARTWORK_ROUTE,
        });

        self.cache.player_id = Some(player_id);
        self.cache.identity = Some(identity);
        self.cache.item = Some(item);
        self.cache.streams = Some(streams);
        self.cache.media = Some(media);
        self.cache.artwork = Some(artwork);

        self.set_connection(if auth_rejected {
            ConnectionStatus::AuthRejected
        } else {
            ConnectionStatus::Online
        });
    }

    fn scan_extra_fanart(&self, kind: MediaKind, item: &RawItem) -> Vec<String> {
        let Some(dir) = extra_fanart_dir(
            kind,
            item.file.as_deref().unwrap_or_default(),
            &self.settings.extra_fanart_dir,
        ) else {
            return Vec::new();
        };

        match self.api.list_directory(&dir) {
            Ok(entries) => {
                let files: Vec<String> = entries
                    .into_iter()
                    .filter(|entry| entry.is_file() && is_image_file(&entry.file))
                    .map(|entry| entry.file)
                    .collect();
                debug!(dir = %dir, count = files.len(), "Extra fanart scanned");
                files
            }
            Err(err) => {
                debug!(dir = %dir, error = %err, "No extra fanart");
                Vec::new()
            }
        }
    }

    fn snapshot(&self, now: DateTime<Utc>) -> Snapshot {
        let session = self.tracker.session();
        let active = session.state != PlaybackState::Stopped;
        Snapshot {
            sequence: 0,
            media: self.cache.media.clone().filter(|_| active),
            artwork: self.cache.artwork.clone().filter(|_| active),
            session,
            connection: self.connection,
            computed_at: now,
        }
    }

    fn set_connection(&mut self, status: ConnectionStatus) {
        if self.connection != status {
            match status {
                ConnectionStatus::Online => info!("Kodi connection restored"),
                ConnectionStatus::Unreachable => {
                    warn!(grace_ms = self.settings.grace_period.as_millis() as u64, "Kodi unreachable")
                }
                ConnectionStatus::AuthRejected => warn!("Kodi rejected the configured credentials"),
            }
            self.connection = status;
        }
    }
}

/// First video or audio player; picture slideshows are ignored.
fn select_player(players: &[ActivePlayer]) -> Option<&ActivePlayer> {
    players
        .iter()
        .find(|p| matches!(p.kind(), PlayerKind::Video | PlayerKind::Audio))
}

fn joined<T>(
    handle: ScopedJoinHandle<'_, Result<T, RpcError>>,
    method: &str,
) -> Result<T, RpcError> {
    handle
        .join()
        .unwrap_or_else(|_| Err(RpcError::transient(method, "worker thread panicked")))
}

/// Background thread running the poll loop.
pub struct Poller {
    stop_flag: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Poller {
    pub fn spawn<A: KodiApi + 'static>(
        api: A,
        settings: PollerSettings,
        store: Arc<SnapshotStore>,
    ) -> Result<Self, NowPlayingError> {
        let stop_flag = Arc::new(AtomicBool::new(false));
        let interval = settings.interval;
        let mut engine = NowPlayingEngine::new(api, settings);

        let thread_stop = Arc::clone(&stop_flag);
        let handle = thread::Builder::new()
            .name("kodinow-poller".to_string())
            .spawn(move || poll_loop(&mut engine, &store, interval, &thread_stop))?;

        Ok(Self {
            stop_flag,
            handle: Mutex::new(Some(handle)),
        })
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Lets the in-flight cycle finish and publish, then stops the thread.
    pub fn shutdown(&self) -> Result<(), NowPlayingError> {
        self.stop_flag.store(true, Ordering::SeqCst);
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match handle {
            Some(handle) => handle.join().map_err(|_| NowPlayingError::Panicked),
            None => Ok(()),
        }
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

fn poll_loop<A: KodiApi>(
    engine: &mut NowPlayingEngine<A>,
    store: &SnapshotStore,
    interval: Duration,
    stop_flag: &AtomicBool,
) {
    info!(interval_ms = interval.as_millis() as u64, "Poller started");

    while !stop_flag.load(Ordering::SeqCst) {
        let started = Instant::now();
        let snapshot = engine.cycle(Utc::now());
        store.publish(snapshot);

        let deadline = started + interval;
        while !stop_flag.load(Ordering::SeqCst) {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep((deadline - now).min(STOP_CHECK_INTERVAL));
        }
    }

    debug!("Poller thread exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use kodirpc::{
        AudioStream, DirectoryEntry, ImageData, KodiTime, LibraryAction, PlayerTiming,
        StreamDetails,
    };
    use std::collections::BTreeMap;
    use std::sync::atomic::AtomicUsize;

    struct Script {
        players: Result<Vec<ActivePlayer>, RpcError>,
        timing: Result<PlayerTiming, RpcError>,
        streams: Result<PlayerStreams, RpcError>,
        item: Result<RawItem, RpcError>,
        directory: Result<Vec<DirectoryEntry>, RpcError>,
    }

    struct FakeKodi {
        script: Mutex<Script>,
        directory_calls: AtomicUsize,
    }

    impl FakeKodi {
        fn new(script: Script) -> Self {
            Self {
                script: Mutex::new(script),
                directory_calls: AtomicUsize::new(0),
            }
        }

        fn edit(&self, f: impl FnOnce(&mut Script)) {
            f(&mut self.script.lock().unwrap());
        }
    }

    impl KodiApi for FakeKodi {
        fn active_players(&self) -> Result<Vec<ActivePlayer>, RpcError> {
            self.script.lock().unwrap().players.clone()
        }
        fn player_timing(&self, _: i64) -> Result<PlayerTiming, RpcError> {
            self.script.lock().unwrap().timing.clone()
        }
        fn player_streams(&self, _: i64) -> Result<PlayerStreams, RpcError> {
            self.script.lock().unwrap().streams.clone()
        }
        fn player_item(&self, _: i64) -> Result<RawItem, RpcError> {
            self.script.lock().unwrap().item.clone()
        }
        fn list_directory(&self, _: &str) -> Result<Vec<DirectoryEntry>, RpcError> {
            self.directory_calls.fetch_add(1, Ordering::SeqCst);
            self.script.lock().unwrap().directory.clone()
        }
        fn run_library_action(&self, _: LibraryAction) -> Result<(), RpcError> {
            Ok(())
        }
        fn fetch_image(&self, reference: &str) -> Result<ImageData, RpcError> {
            Err(RpcError::InvalidUrl(reference.to_string()))
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 20, 0, 0).unwrap() + chrono::Duration::seconds(secs)
    }

    fn video_player() -> Vec<ActivePlayer> {
        vec![ActivePlayer {
            player_id: 1,
            player_type: "video".into(),
        }]
    }

    fn timing(position_s: u64, speed: f64) -> PlayerTiming {
        PlayerTiming {
            time: KodiTime::from_millis(position_s * 1000),
            total_time: KodiTime::from_millis(7_200_000),
            speed,
        }
    }

    fn movie() -> RawItem {
        let mut art = BTreeMap::new();
        art.insert("poster".to_string(), "image://poster.jpg/".to_string());
        art.insert("fanart".to_string(), "image://fanart.jpg/".to_string());
        RawItem {
            id: Some(3),
            item_type: Some("movie".into()),
            title: Some("Arrival".into()),
            file: Some("/films/Arrival/Arrival.mkv".into()),
            art: Some(art),
            stream_details: Some(StreamDetails::default()),
            ..Default::default()
        }
    }

    fn english_streams() -> PlayerStreams {
        PlayerStreams {
            current_audio: Some(AudioStream {
                language: "eng".into(),
                codec: "ac3".into(),
                channels: 6,
                ..Default::default()
            }),
            audio_streams: vec![AudioStream {
                language: "eng".into(),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    fn playing_script() -> Script {
        Script {
            players: Ok(video_player()),
            timing: Ok(timing(60, 1.0)),
            streams: Ok(english_streams()),
            item: Ok(movie()),
            directory: Ok(vec![
                DirectoryEntry {
                    file: "/films/Arrival/extrafanart/1.jpg".into(),
                    file_type: "file".into(),
                    label: "1.jpg".into(),
                },
                DirectoryEntry {
                    file: "/films/Arrival/extrafanart/notes.txt".into(),
                    file_type: "file".into(),
                    label: "notes.txt".into(),
                },
            ]),
        }
    }

    fn transient() -> RpcError {
        RpcError::transient("Player.GetActivePlayers", "connection refused")
    }

    #[test]
    fn test_idle_device_yields_stopped_snapshot() {
        let fake = FakeKodi::new(Script {
            players: Ok(vec![]),
            ..playing_script()
        });
        let mut engine = NowPlayingEngine::new(&fake, PollerSettings::default());
        let snapshot = engine.cycle(at(0));

        assert_eq!(snapshot.session.state, PlaybackState::Stopped);
        assert!(snapshot.media.is_none());
        assert!(snapshot.artwork.is_none());
        assert_eq!(snapshot.connection, ConnectionStatus::Online);
    }

    #[test]
    fn test_picture_player_is_ignored() {
        let fake = FakeKodi::new(Script {
            players: Ok(vec![ActivePlayer {
                player_id: 2,
                player_type: "picture".into(),
            }]),
            ..playing_script()
        });
        let mut engine = NowPlayingEngine::new(&fake, PollerSettings::default());
        assert_eq!(engine.cycle(at(0)).session.state, PlaybackState::Stopped);
    }

    #[test]
    fn test_playing_movie_and_single_fanart_scan() {
        let fake = FakeKodi::new(playing_script());
        let mut engine = NowPlayingEngine::new(&fake, PollerSettings::default());

        let snapshot = engine.cycle(at(0));
        assert_eq!(snapshot.session.state, PlaybackState::Playing);
        assert_eq!(snapshot.session.item_id.as_deref(), Some("movie:3"));
        let media = snapshot.media.unwrap();
        assert_eq!(media.title.as_deref(), Some("Arrival"));
        assert_eq!(media.languages.audio.active.as_deref(), Some("ENG"));
        let artwork = snapshot.artwork.unwrap();
        assert_eq!(artwork.fanart.len(), 2);
        assert!(artwork.fanart.iter().all(|url| url.starts_with("/artwork/image%3A%2F%2F")));

        fake.edit(|s| s.timing = Ok(timing(62, 1.0)));
        engine.cycle(at(2));
        engine.cycle(at(4));
        assert_eq!(fake.directory_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_sub_calls_keep_last_known_good() {
        let fake = FakeKodi::new(playing_script());
        let mut engine = NowPlayingEngine::new(&fake, PollerSettings::default());
        engine.cycle(at(0));

        fake.edit(|s| {
            s.timing = Err(RpcError::transient("Player.GetProperties", "timed out"));
            s.streams = Err(RpcError::malformed("Player.GetProperties", "bad body"));
            s.item = Err(RpcError::transient("Player.GetItem", "timed out"));
        });
        let snapshot = engine.cycle(at(4));

        assert_eq!(snapshot.session.state, PlaybackState::Playing);
        assert_eq!(snapshot.session.elapsed_seconds, 64);
        assert_eq!(snapshot.session.item_id.as_deref(), Some("movie:3"));
        let media = snapshot.media.unwrap();
        assert_eq!(media.title.as_deref(), Some("Arrival"));
        assert_eq!(media.languages.audio.available, vec!["ENG"]);
        assert_eq!(snapshot.connection, ConnectionStatus::Online);
    }

    #[test]
    fn test_auth_rejection_is_surfaced_and_clears() {
        let fake = FakeKodi::new(playing_script());
        let mut engine = NowPlayingEngine::new(&fake, PollerSettings::default());
        engine.cycle(at(0));

        fake.edit(|s| {
            s.players = Err(RpcError::Auth {
                method: "Player.GetActivePlayers".into(),
                status: 401,
            })
        });
        let snapshot = engine.cycle(at(2));
        assert_eq!(snapshot.connection, ConnectionStatus::AuthRejected);

        // Beyond the grace window the state stops but the auth status stays.
        let snapshot = engine.cycle(at(30));
        assert_eq!(snapshot.connection, ConnectionStatus::AuthRejected);
        assert_eq!(snapshot.session.state, PlaybackState::Stopped);

        fake.edit(|s| s.players = Ok(video_player()));
        let snapshot = engine.cycle(at(32));
        assert_eq!(snapshot.connection, ConnectionStatus::Online);
        assert_eq!(snapshot.session.state, PlaybackState::Playing);
    }

    #[test]
    fn test_transient_failure_after_auth_rejection_reports_unreachable() {
        let fake = FakeKodi::new(playing_script());
        let mut engine = NowPlayingEngine::new(&fake, PollerSettings::default());
        engine.cycle(at(0));

        fake.edit(|s| {
            s.players = Err(RpcError::Auth {
                method: "Player.GetActivePlayers".into(),
                status: 403,
            })
        });
        assert_eq!(engine.cycle(at(2)).connection, ConnectionStatus::AuthRejected);

        fake.edit(|s| s.players = Err(transient()));
        assert_eq!(engine.cycle(at(4)).connection, ConnectionStatus::Unreachable);

        fake.edit(|s| s.players = Ok(video_player()));
        assert_eq!(engine.cycle(at(6)).connection, ConnectionStatus::Online);
    }

    #[test]
    fn test_grace_window_then_unreachable() {
        let fake = FakeKodi::new(playing_script());
        let mut engine = NowPlayingEngine::new(&fake, PollerSettings::default());
        engine.cycle(at(0));

        fake.edit(|s| s.players = Err(transient()));
        let snapshot = engine.cycle(at(2));
        assert_eq!(snapshot.session.state, PlaybackState::Playing);
        assert_eq!(snapshot.connection, ConnectionStatus::Online);
        assert!(snapshot.media.is_some());

        engine.cycle(at(8));
        let snapshot = engine.cycle(at(14));
        assert_eq!(snapshot.session.state, PlaybackState::Stopped);
        assert_eq!(snapshot.connection, ConnectionStatus::Unreachable);
        assert!(snapshot.media.is_none());

        fake.edit(|s| s.players = Ok(vec![]));
        assert_eq!(engine.cycle(at(16)).connection, ConnectionStatus::Online);
    }

    #[test]
    fn test_poller_publishes_and_drains_on_shutdown() {
        let fake = Arc::new(FakeKodi::new(playing_script()));
        let store = Arc::new(SnapshotStore::new(Snapshot::stopped(Utc::now())));
        let rx = store.subscribe();

        let settings = PollerSettings {
            interval: Duration::from_millis(20),
            ..PollerSettings::default()
        };
        let poller = Poller::spawn(Arc::clone(&fake), settings, Arc::clone(&store)).unwrap();

        let update = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(update.snapshot.session.state, PlaybackState::Playing);
        assert!(poller.is_running());

        poller.shutdown().unwrap();
        assert!(!poller.is_running());
        assert!(store.current().sequence >= 1);
    }
}
