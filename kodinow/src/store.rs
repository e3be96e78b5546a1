use std::sync::{Arc, Mutex, PoisonError, RwLock};

use crossbeam_channel::{Receiver, Sender, unbounded};
use tracing::trace;

use crate::diff::SnapshotDiff;
use crate::snapshot::Snapshot;

/// Notification sent to subscribers for every published change.
#[derive(Clone, Debug)]
pub struct SnapshotUpdate {
    pub snapshot: Arc<Snapshot>,
    /// Changed and removed fields only.
    pub diff: Arc<SnapshotDiff>,
}

struct Published {
    current: Arc<Snapshot>,
    last_diff: Arc<SnapshotDiff>,
}

/// Last published snapshot.
///
/// Written by the poll loop only; readers get a cheap `Arc` clone and never
/// observe a partially built snapshot.
pub struct SnapshotStore {
    published: RwLock<Published>,
    subscribers: Mutex<Vec<Sender<SnapshotUpdate>>>,
}

impl SnapshotStore {
    pub fn new(initial: Snapshot) -> Self {
        let last_diff = Arc::new(SnapshotDiff::initial(&initial));
        Self {
            published: RwLock::new(Published {
                current: Arc::new(initial),
                last_diff,
            }),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn current(&self) -> Arc<Snapshot> {
        let published = self.published.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&published.current)
    }

    /// Changes between the current snapshot and its predecessor.
    pub fn last_diff(&self) -> Arc<SnapshotDiff> {
        let published = self.published.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&published.last_diff)
    }

    pub fn subscribe(&self) -> Receiver<SnapshotUpdate> {
        let (tx, rx) = unbounded::<SnapshotUpdate>();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    /// Replaces the current snapshot if anything but bookkeeping changed.
    ///
    /// Returns `None` when `next` is identical to the current snapshot; the
    /// current one is kept and nobody is notified.
    pub fn publish(&self, mut next: Snapshot) -> Option<SnapshotUpdate> {
        let update = {
            let mut published = self.published.write().unwrap_or_else(PoisonError::into_inner);
            let diff = SnapshotDiff::between(&published.current, &next);
            if diff.is_unchanged() {
                return None;
            }
            next.sequence = published.current.sequence + 1;

            let mut diff = diff.changes_only();
            diff.sequence = next.sequence;

            let update = SnapshotUpdate {
                snapshot: Arc::new(next),
                diff: Arc::new(diff),
            };
            published.current = Arc::clone(&update.snapshot);
            published.last_diff = Arc::clone(&update.diff);
            update
        };

        trace!(
            sequence = update.snapshot.sequence,
            changed = update.diff.fields.len(),
            "Snapshot published"
        );

        let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|tx| tx.send(update.clone()).is_ok());
        Some(update)
    }
}
