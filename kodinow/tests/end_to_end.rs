use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::{TimeZone, Utc};
use kodinow::{
    ArtRef, ConnectionStatus, FieldChange, MediaKind, NowPlayingEngine, PlaybackState,
    PollerSettings, Snapshot, SnapshotStore,
};
use kodirpc::{
    ActivePlayer, AudioDetail, AudioStream, DirectoryEntry, ImageData, KodiApi, KodiTime,
    LibraryAction, PlayerStreams, PlayerTiming, RawItem, RpcError, StreamDetails,
};
use serde_json::json;

/// Device answering from a mutable script.
struct ScriptedKodi {
    players: Mutex<Vec<ActivePlayer>>,
    timing: Mutex<PlayerTiming>,
    streams: Mutex<PlayerStreams>,
    item: Mutex<RawItem>,
}

impl KodiApi for ScriptedKodi {
    fn active_players(&self) -> Result<Vec<ActivePlayer>, RpcError> {
        Ok(self.players.lock().unwrap().clone())
    }

    fn player_timing(&self, _player_id: i64) -> Result<PlayerTiming, RpcError> {
        Ok(self.timing.lock().unwrap().clone())
    }

    fn player_streams(&self, _player_id: i64) -> Result<PlayerStreams, RpcError> {
        Ok(self.streams.lock().unwrap().clone())
    }

    fn player_item(&self, _player_id: i64) -> Result<RawItem, RpcError> {
        Ok(self.item.lock().unwrap().clone())
    }

    fn list_directory(&self, directory: &str) -> Result<Vec<DirectoryEntry>, RpcError> {
        Err(RpcError::Rpc {
            method: "Files.GetDirectory".into(),
            code: -32602,
            message: format!("Invalid params: {}", directory),
        })
    }

    fn run_library_action(&self, _action: LibraryAction) -> Result<(), RpcError> {
        Ok(())
    }

    fn fetch_image(&self, reference: &str) -> Result<ImageData, RpcError> {
        Err(RpcError::InvalidUrl(reference.to_string()))
    }
}

fn audio(language: &str) -> AudioStream {
    AudioStream {
        language: language.into(),
        codec: "eac3".into(),
        channels: 6,
        ..Default::default()
    }
}

/// Video player at 125 s of 3600 s, playing "Episode 6" with English and
/// French audio tracks, English active.
fn episode_six() -> ScriptedKodi {
    let mut art = BTreeMap::new();
    art.insert("tvshow.poster".to_string(), "image://show-poster.jpg/".to_string());
    art.insert("tvshow.fanart".to_string(), "image://show-fanart.jpg/".to_string());

    ScriptedKodi {
        players: Mutex::new(vec![ActivePlayer {
            player_id: 1,
            player_type: "video".into(),
        }]),
        timing: Mutex::new(PlayerTiming {
            time: KodiTime::from_millis(125_000),
            total_time: KodiTime::from_millis(3_600_000),
            speed: 1.0,
        }),
        streams: Mutex::new(PlayerStreams {
            current_audio: Some(audio("eng")),
            audio_streams: vec![audio("eng"), audio("fra")],
            ..Default::default()
        }),
        item: Mutex::new(RawItem {
            id: Some(812),
            item_type: Some("episode".into()),
            label: Some("Episode 6".into()),
            title: Some("Episode 6".into()),
            show_title: Some("The Long Coast".into()),
            season: Some(1),
            episode: Some(6),
            file: Some("nfs://nas/tv/The Long Coast/Season 1/S01E06.mkv".into()),
            art: Some(art),
            stream_details: Some(StreamDetails {
                audio: vec![
                    AudioDetail {
                        language: "eng".into(),
                        ..Default::default()
                    },
                    AudioDetail {
                        language: "fre".into(),
                        ..Default::default()
                    },
                ],
                ..Default::default()
            }),
            ..Default::default()
        }),
    }
}

#[test]
fn episode_with_generic_title_end_to_end() {
    let kodi = episode_six();
    let mut engine = NowPlayingEngine::new(&kodi, PollerSettings::default());
    let snapshot = engine.cycle(Utc.with_ymd_and_hms(2024, 5, 1, 21, 0, 0).unwrap());

    assert_eq!(snapshot.session.state, PlaybackState::Playing);
    assert_eq!(snapshot.session.elapsed_seconds, 125);
    assert_eq!(snapshot.session.total_seconds, 3600);
    assert_eq!(snapshot.session.media_kind, Some(MediaKind::Episode));
    assert_eq!(snapshot.connection, ConnectionStatus::Online);

    let media = snapshot.media.as_ref().expect("media present while playing");
    assert_eq!(media.title, None);
    assert_eq!(media.show_title.as_deref(), Some("The Long Coast"));
    assert_eq!(media.episode, Some(6));
    assert_eq!(media.languages.audio.active.as_deref(), Some("ENG"));
    assert_eq!(media.languages.audio.available, vec!["ENG", "FRA"]);
    assert!(media.languages.audio.expandable);
    assert!(!media.languages.audio.unmatched);

    let artwork = snapshot.artwork.as_ref().expect("artwork present while playing");
    assert!(matches!(artwork.poster, ArtRef::Image { .. }));
    // Browsers load device art through the server, never from Kodi directly.
    assert!(artwork.poster.url().unwrap().starts_with("/artwork/"));
    assert!(!artwork.poster.url().unwrap().contains("kodi.local"));
    assert_eq!(
        artwork.overlay,
        ArtRef::Text {
            text: "The Long Coast".into()
        }
    );
    assert_eq!(artwork.fanart.len(), 1);

    let json = serde_json::to_value(&snapshot).unwrap();
    assert!(json["media"].get("title").is_none());
    assert_eq!(
        json["media"]["languages"]["audio"],
        json!({"active": "ENG", "available": ["ENG", "FRA"], "expandable": true})
    );
}

#[test]
fn live_track_switch_publishes_minimal_diff() {
    let kodi = episode_six();
    let mut engine = NowPlayingEngine::new(&kodi, PollerSettings::default());
    let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 21, 0, 0).unwrap();
    let store = SnapshotStore::new(Snapshot::stopped(t0));

    store.publish(engine.cycle(t0)).expect("first cycle changes everything");

    // Paused, same position, then the viewer switches to French.
    *kodi.timing.lock().unwrap() = PlayerTiming {
        time: KodiTime::from_millis(125_000),
        total_time: KodiTime::from_millis(3_600_000),
        speed: 0.0,
    };
    store.publish(engine.cycle(t0 + chrono::Duration::seconds(2)));
    let paused_at = store.current().session.elapsed_seconds;

    kodi.streams.lock().unwrap().current_audio = Some(audio("fre"));
    let update = store
        .publish(engine.cycle(t0 + chrono::Duration::seconds(4)))
        .expect("language switch is a change");

    assert_eq!(update.snapshot.session.state, PlaybackState::Paused);
    assert_eq!(update.snapshot.session.elapsed_seconds, paused_at);
    assert_eq!(
        update.diff.get("media.languages.audio.active"),
        Some(&FieldChange::Changed(json!("FRA")))
    );
    assert!(update.diff.get("media.languages.audio.available").is_none());
    assert!(update.diff.get("artwork.poster.url").is_none());

    // Nothing changes upstream: nothing is republished.
    assert!(
        store
            .publish(engine.cycle(t0 + chrono::Duration::seconds(6)))
            .is_none()
    );
}

#[test]
fn stopping_clears_media_and_artwork() {
    let kodi = episode_six();
    let mut engine = NowPlayingEngine::new(&kodi, PollerSettings::default());
    let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 21, 0, 0).unwrap();
    engine.cycle(t0);

    kodi.players.lock().unwrap().clear();
    let snapshot = engine.cycle(t0 + chrono::Duration::seconds(2));

    assert_eq!(snapshot.session.state, PlaybackState::Stopped);
    assert!(snapshot.media.is_none());
    assert!(snapshot.artwork.is_none());
}
