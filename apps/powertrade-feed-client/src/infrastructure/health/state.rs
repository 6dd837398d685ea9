//! Feed State Tracking
//!
//! Per-feed connection state as reported by the supervisors' `FeedEvent`s,
//! plus the dispatch counters of each feed. Read by the health endpoint.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::mpsc;

use crate::application::services::dispatcher::{DispatchStats, DispatchStatsSnapshot};
use crate::application::services::supervisor::{FeedEvent, SupervisorState};
use crate::domain::streaming::FeedKind;

/// Connection state for one feed.
#[derive(Debug)]
pub struct FeedState {
    kind: FeedKind,
    state: RwLock<SupervisorState>,
    last_connected_at: RwLock<Option<DateTime<Utc>>>,
    last_error: RwLock<Option<String>>,
    reconnect_attempts: AtomicU32,
    dispatch: Arc<DispatchStats>,
}

impl FeedState {
    /// Create state for a feed whose dispatcher reports into `dispatch`.
    #[must_use]
    pub fn new(kind: FeedKind, dispatch: Arc<DispatchStats>) -> Self {
        Self {
            kind,
            state: RwLock::new(SupervisorState::Disconnected),
            last_connected_at: RwLock::new(None),
            last_error: RwLock::new(None),
            reconnect_attempts: AtomicU32::new(0),
            dispatch,
        }
    }

    /// Apply a state transition.
    pub fn apply(&self, state: &SupervisorState) {
        match state {
            SupervisorState::Connected => {
                *self.last_connected_at.write() = Some(Utc::now());
                self.reconnect_attempts.store(0, Ordering::Relaxed);
                *self.last_error.write() = None;
            }
            SupervisorState::Backoff {
                attempt, reason, ..
            } => {
                self.reconnect_attempts.store(*attempt, Ordering::Relaxed);
                *self.last_error.write() = Some(reason.clone());
            }
            SupervisorState::Exhausted { attempts } => {
                self.reconnect_attempts.store(*attempts, Ordering::Relaxed);
            }
            _ => {}
        }
        *self.state.write() = state.clone();
    }

    /// Feed kind.
    #[must_use]
    pub const fn kind(&self) -> FeedKind {
        self.kind
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> SupervisorState {
        self.state.read().clone()
    }

    /// Whether the feed is connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        matches!(*self.state.read(), SupervisorState::Connected)
    }

    /// Consecutive failed connections (0 once connected).
    #[must_use]
    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts.load(Ordering::Relaxed)
    }

    /// When the feed last connected.
    #[must_use]
    pub fn last_connected_at(&self) -> Option<DateTime<Utc>> {
        *self.last_connected_at.read()
    }

    /// Most recent connection failure since the last successful connect.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    /// Dispatch counters.
    #[must_use]
    pub fn dispatch(&self) -> DispatchStatsSnapshot {
        self.dispatch.snapshot()
    }
}

/// All tracked feeds.
#[derive(Debug, Default)]
pub struct FeedRegistry {
    feeds: BTreeMap<FeedKind, Arc<FeedState>>,
}

impl FeedRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a feed.
    #[must_use]
    pub fn with_feed(mut self, kind: FeedKind, dispatch: Arc<DispatchStats>) -> Self {
        self.feeds
            .insert(kind, Arc::new(FeedState::new(kind, dispatch)));
        self
    }

    /// State for one feed.
    #[must_use]
    pub fn get(&self, kind: FeedKind) -> Option<&Arc<FeedState>> {
        self.feeds.get(&kind)
    }

    /// Every tracked feed in feed order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<FeedState>> {
        self.feeds.values()
    }

    /// Apply one event. Events for untracked feeds are ignored.
    pub fn apply(&self, event: &FeedEvent) {
        if let Some(feed) = self.feeds.get(&event.feed) {
            feed.apply(&event.state);
        }
    }

    /// Apply events until every sender is dropped.
    pub async fn track(self: Arc<Self>, mut events: mpsc::Receiver<FeedEvent>) {
        while let Some(event) = events.recv().await {
            self.apply(&event);
        }
        tracing::debug!("Feed event channel closed");
    }
}
