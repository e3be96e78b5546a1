//! Playback state machine and elapsed-time reconciliation.
//!
//! The tracker is fed one [`Observation`] per poll cycle and keeps the
//! displayed elapsed time consistent across pause, resume, seeks and
//! short upstream outages:
//!
//! - while `Playing`, elapsed never goes backwards unless the device jumps
//!   back by more than the seek threshold;
//! - while `Paused`, elapsed is frozen at the last observed position;
//! - on resume, elapsed is resynchronised to the position reported by the
//!   device, never to a locally extrapolated value.

use std::time::Duration;

use chrono::{DateTime, Utc};
use kodirpc::PlayerTiming;
use serde::Serialize;
use tracing::debug;

use crate::kind::{ItemIdentity, MediaKind};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

/// Published view of the current session.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct PlaybackSession {
    pub state: PlaybackState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_kind: Option<MediaKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
    pub elapsed_seconds: u64,
    pub total_seconds: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_synced_at: Option<DateTime<Utc>>,
}

/// Timing reported by the device for the active player.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Timing {
    pub position_ms: u64,
    pub total_ms: u64,
    pub speed: f64,
}

impl From<&PlayerTiming> for Timing {
    fn from(timing: &PlayerTiming) -> Self {
        Self {
            position_ms: timing.time.as_millis(),
            total_ms: timing.total_time.as_millis(),
            speed: timing.speed,
        }
    }
}

/// What one poll cycle learned about the device.
#[derive(Clone, Debug, PartialEq)]
pub enum Observation {
    /// No active video or audio player.
    Idle,
    /// A player is active. `timing` is `None` when the timing call failed.
    Active {
        identity: ItemIdentity,
        timing: Option<Timing>,
    },
    /// The device could not be queried this cycle.
    Unreachable,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transition {
    pub from: PlaybackState,
    pub to: PlaybackState,
}

/// Result of feeding one observation to the tracker.
#[derive(Clone, Debug, PartialEq)]
pub struct TrackerUpdate {
    pub session: PlaybackSession,
    /// A new session started: metadata and artwork must be re-resolved.
    pub new_session: bool,
    pub transitions: Vec<Transition>,
    /// The device has been unreachable for longer than the grace period.
    pub grace_expired: bool,
}

pub struct SessionTracker {
    grace_period: Duration,
    seek_threshold_ms: u64,
    state: PlaybackState,
    identity: Option<ItemIdentity>,
    elapsed_ms: u64,
    anchor_ms: u64,
    total_ms: u64,
    speed: f64,
    last_synced_at: Option<DateTime<Utc>>,
    unreachable_since: Option<DateTime<Utc>>,
}

impl SessionTracker {
    pub fn new(grace_period: Duration, seek_threshold: Duration) -> Self {
        Self {
            grace_period,
            seek_threshold_ms: seek_threshold.as_millis() as u64,
            state: PlaybackState::Stopped,
            identity: None,
            elapsed_ms: 0,
            anchor_ms: 0,
            total_ms: 0,
            speed: 0.0,
            last_synced_at: None,
            unreachable_since: None,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn identity(&self) -> Option<&ItemIdentity> {
        self.identity.as_ref()
    }

    pub fn session(&self) -> PlaybackSession {
        PlaybackSession {
            state: self.state,
            media_kind: self.identity.as_ref().map(|i| i.kind),
            item_id: self.identity.as_ref().map(|i| i.id.clone()),
            elapsed_seconds: self.elapsed_ms / 1000,
            total_seconds: self.total_ms / 1000,
            last_synced_at: self.last_synced_at,
        }
    }

    pub fn observe(&mut self, observation: Observation, now: DateTime<Utc>) -> TrackerUpdate {
        let mut transitions = Vec::new();
        let mut new_session = false;
        let mut grace_expired = false;

        match observation {
            Observation::Idle => {
                self.unreachable_since = None;
                self.stop(&mut transitions);
            }
            Observation::Unreachable => {
                let since = *self.unreachable_since.get_or_insert(now);
                let outage = (now - since).to_std().unwrap_or_default();
                if outage > self.grace_period {
                    grace_expired = true;
                    self.stop(&mut transitions);
                } else {
                    self.extrapolate(now);
                }
            }
            Observation::Active { identity, timing } => {
                self.unreachable_since = None;
                if self.state == PlaybackState::Stopped
                    || self.identity.as_ref() != Some(&identity)
                {
                    new_session = true;
                    self.begin(identity, &mut transitions);
                }
                match timing {
                    Some(timing) => self.apply_timing(timing, new_session, now, &mut transitions),
                    None => self.extrapolate(now),
                }
            }
        }

        TrackerUpdate {
            session: self.session(),
            new_session,
            transitions,
            grace_expired,
        }
    }

    fn begin(&mut self, identity: ItemIdentity, transitions: &mut Vec<Transition>) {
        if self.state == PlaybackState::Stopped {
            self.transition(PlaybackState::Playing, transitions);
        }
        debug!(item = %identity.id, kind = %identity.kind, "New playback session");
        self.identity = Some(identity);
        self.elapsed_ms = 0;
        self.anchor_ms = 0;
        self.total_ms = 0;
        self.speed = 1.0;
        self.last_synced_at = None;
    }

    fn apply_timing(
        &mut self,
        timing: Timing,
        fresh: bool,
        now: DateTime<Utc>,
        transitions: &mut Vec<Transition>,
    ) {
        self.total_ms = timing.total_ms;
        let reported = self.clamp(timing.position_ms);

        if timing.speed == 0.0 {
            let was_paused = self.state == PlaybackState::Paused;
            if !was_paused {
                self.transition(PlaybackState::Paused, transitions);
            }
            // A seek while paused moves the frozen position.
            if !was_paused || reported != self.elapsed_ms {
                self.sync(reported, now);
            }
        } else {
            let resumed = self.state == PlaybackState::Paused;
            if resumed {
                self.transition(PlaybackState::Playing, transitions);
            }

            if fresh || resumed || reported >= self.elapsed_ms {
                self.sync(reported, now);
            } else if self.elapsed_ms - reported > self.seek_threshold_ms {
                debug!(
                    from_ms = self.elapsed_ms,
                    to_ms = reported,
                    "Backward seek detected"
                );
                self.sync(reported, now);
            } else {
                // Small backward correction: elapsed holds.
                self.anchor_ms = reported;
                self.last_synced_at = Some(now);
            }
        }

        self.speed = timing.speed;
    }

    fn sync(&mut self, position_ms: u64, now: DateTime<Utc>) {
        self.anchor_ms = position_ms;
        self.elapsed_ms = position_ms;
        self.last_synced_at = Some(now);
    }

    fn extrapolate(&mut self, now: DateTime<Utc>) {
        if self.state != PlaybackState::Playing {
            return;
        }
        let Some(synced) = self.last_synced_at else {
            return;
        };
        let dt_ms = (now - synced).num_milliseconds().max(0) as f64;
        let advanced = self.anchor_ms + (dt_ms * self.speed.max(0.0)) as u64;
        self.elapsed_ms = self.clamp(advanced).max(self.elapsed_ms);
    }

    fn clamp(&self, position_ms: u64) -> u64 {
        if self.total_ms > 0 {
            position_ms.min(self.total_ms)
        } else {
            position_ms
        }
    }

    fn stop(&mut self, transitions: &mut Vec<Transition>) {
        if self.state != PlaybackState::Stopped {
            self.transition(PlaybackState::Stopped, transitions);
        }
        self.identity = None;
        self.elapsed_ms = 0;
        self.anchor_ms = 0;
        self.total_ms = 0;
        self.speed = 0.0;
        self.last_synced_at = None;
    }

    fn transition(&mut self, to: PlaybackState, transitions: &mut Vec<Transition>) {
        debug!(from = ?self.state, to = ?to, "Playback state transition");
        transitions.push(Transition {
            from: self.state,
            to,
        });
        self.state = to;
    }
}
