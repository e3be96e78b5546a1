//! Field-by-field comparison of two snapshots.
//!
//! Snapshots are flattened to dotted JSON paths (`media.languages.audio.active`).
//! Objects are walked, arrays and scalars are leaves, `null` counts as absent.
//! Bookkeeping fields (`sequence`, `computed_at`) never take part.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::snapshot::Snapshot;

const IGNORED_FIELDS: &[&str] = &["sequence", "computed_at"];

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum FieldChange {
    Unchanged,
    Changed(Value),
    Removed,
}

impl FieldChange {
    pub fn is_unchanged(&self) -> bool {
        matches!(self, FieldChange::Unchanged)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SnapshotDiff {
    /// Sequence of the newer snapshot.
    pub sequence: u64,
    pub computed_at: DateTime<Utc>,
    pub fields: BTreeMap<String, FieldChange>,
}

impl SnapshotDiff {
    pub fn between(previous: &Snapshot, next: &Snapshot) -> Self {
        let before = flatten(&previous.to_value());
        let after = flatten(&next.to_value());

        let mut fields = BTreeMap::new();
        for (path, value) in &after {
            let change = match before.get(path) {
                Some(old) if old == value => FieldChange::Unchanged,
                _ => FieldChange::Changed(value.clone()),
            };
            fields.insert(path.clone(), change);
        }
        for path in before.keys() {
            if !after.contains_key(path) {
                fields.insert(path.clone(), FieldChange::Removed);
            }
        }

        Self {
            sequence: next.sequence,
            computed_at: next.computed_at,
            fields,
        }
    }

    /// Diff of a snapshot against nothing: every field is new.
    pub fn initial(snapshot: &Snapshot) -> Self {
        Self {
            sequence: snapshot.sequence,
            computed_at: snapshot.computed_at,
            fields: flatten(&snapshot.to_value())
                .into_iter()
                .map(|(path, value)| (path, FieldChange::Changed(value)))
                .collect(),
        }
    }

    pub fn is_unchanged(&self) -> bool {
        self.fields.values().all(FieldChange::is_unchanged)
    }

    /// Same diff with unchanged fields dropped: the payload sent downstream.
    pub fn changes_only(&self) -> Self {
        Self {
            sequence: self.sequence,
            computed_at: self.computed_at,
            fields: self
                .fields
                .iter()
                .filter(|(_, change)| !change.is_unchanged())
                .map(|(path, change)| (path.clone(), change.clone()))
                .collect(),
        }
    }

    pub fn get(&self, path: &str) -> Option<&FieldChange> {
        self.fields.get(path)
    }
}

/// Flattens a JSON value into `path -> leaf` pairs.
pub fn flatten(value: &Value) -> BTreeMap<String, Value> {
    let mut out = BTreeMap::new();
    if let Value::Object(map) = value {
        for (key, child) in map {
            if IGNORED_FIELDS.contains(&key.as_str()) {
                continue;
            }
            flatten_into(key.clone(), child, &mut out);
        }
    }
    out
}

fn flatten_into(path: String, value: &Value, out: &mut BTreeMap<String, Value>) {
    match value {
        Value::Null => {}
        Value::Object(map) => {
            for (key, child) in map {
                flatten_into(format!("{}.{}", path, key), child, out);
            }
        }
        leaf => {
            out.insert(path, leaf.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artwork::{ArtRef, ArtworkSet};
    use crate::kind::MediaKind;
    use crate::languages::{LanguageBadge, Languages};
    use crate::normalizer::MediaRecord;
    use crate::session::{PlaybackSession, PlaybackState};
    use crate::snapshot::ConnectionStatus;
    use chrono::TimeZone;
    use serde_json::json;

    fn playing_snapshot() -> Snapshot {
        Snapshot {
            sequence: 4,
            session: PlaybackSession {
                state: PlaybackState::Playing,
                media_kind: Some(MediaKind::Movie),
                item_id: Some("movie:1".into()),
                elapsed_seconds: 60,
                total_seconds: 7200,
                last_synced_at: Some(Utc.with_ymd_and_hms(2024, 5, 1, 20, 0, 0).unwrap()),
            },
            media: Some(MediaRecord {
                kind: MediaKind::Movie,
                title: Some("Arrival".into()),
                show_title: None,
                season: None,
                episode: None,
                artist: None,
                album: None,
                year: Some(2016),
                genres: vec!["Drama".into()],
                rating: None,
                cast: vec![],
                studio: None,
                tagline: None,
                video: None,
                audio: None,
                languages: Languages {
                    audio: LanguageBadge::build(Some("eng"), ["eng", "fra"]),
                    subtitle: LanguageBadge::default(),
                },
            }),
            artwork: Some(ArtworkSet {
                poster: ArtRef::Placeholder,
                overlay: ArtRef::Text {
                    text: "Arrival".into(),
                },
                clearart: None,
                banner: None,
                discart: None,
                album_front: None,
                album_back: None,
                fanart: vec![],
            }),
            connection: ConnectionStatus::Online,
            computed_at: Utc.with_ymd_and_hms(2024, 5, 1, 20, 0, 2).unwrap(),
        }
    }

    #[test]
    fn test_self_diff_is_unchanged() {
        let snapshot = playing_snapshot();
        let diff = SnapshotDiff::between(&snapshot, &snapshot);
        assert!(!diff.fields.is_empty());
        assert!(diff.is_unchanged());
        assert!(diff.changes_only().fields.is_empty());
    }

    #[test]
    fn test_computed_at_and_sequence_are_ignored() {
        let a = playing_snapshot();
        let mut b = a.clone();
        b.sequence += 1;
        b.computed_at = b.computed_at + chrono::Duration::seconds(2);
        assert!(SnapshotDiff::between(&a, &b).is_unchanged());
    }

    #[test]
    fn test_language_switch_only_touches_its_field() {
        let a = playing_snapshot();
        let mut b = a.clone();
        if let Some(media) = b.media.as_mut() {
            media.languages.audio = LanguageBadge::build(Some("fra"), ["eng", "fra"]);
        }

        let diff = SnapshotDiff::between(&a, &b).changes_only();
        assert_eq!(diff.fields.len(), 1);
        assert_eq!(
            diff.get("media.languages.audio.active"),
            Some(&FieldChange::Changed(json!("FRA")))
        );
    }

    #[test]
    fn test_removed_fields() {
        let a = playing_snapshot();
        let mut b = a.clone();
        b.media = None;
        b.session.state = PlaybackState::Stopped;

        let diff = SnapshotDiff::between(&a, &b);
        assert_eq!(diff.get("media.title"), Some(&FieldChange::Removed));
        assert_eq!(
            diff.get("session.state"),
            Some(&FieldChange::Changed(json!("stopped")))
        );
        assert_eq!(diff.get("connection"), Some(&FieldChange::Unchanged));
    }

    #[test]
    fn test_change_serialization() {
        let value = serde_json::to_value(FieldChange::Changed(json!(12))).unwrap();
        assert_eq!(value, json!({"status": "changed", "value": 12}));
        let value = serde_json::to_value(FieldChange::Removed).unwrap();
        assert_eq!(value, json!({"status": "removed"}));
    }
}
