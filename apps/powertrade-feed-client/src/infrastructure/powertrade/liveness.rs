//! Liveness Probe
//!
//! Keeps a feed connection honest with periodic WebSocket pings. A ping that
//! is not answered by a pong within the timeout (measured from when the ping
//! was requested) is reported as [`ProbeEvent::Timeout`]; the connection then
//! fails the same way as an abnormal close.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Configuration for probe timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeConfig {
    /// Interval between pings.
    pub ping_interval: Duration,
    /// How long to wait for the matching pong.
    pub pong_timeout: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(10),
            pong_timeout: Duration::from_secs(20),
        }
    }
}

impl ProbeConfig {
    /// Create a new configuration with custom values.
    #[must_use]
    pub const fn new(ping_interval: Duration, pong_timeout: Duration) -> Self {
        Self {
            ping_interval,
            pong_timeout,
        }
    }

    /// Create configuration from `FeedSettings`.
    #[must_use]
    pub const fn from_feed_settings(settings: &crate::FeedSettings) -> Self {
        Self {
            ping_interval: settings.heartbeat_interval,
            pong_timeout: settings.heartbeat_timeout,
        }
    }
}

/// Events emitted by the probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeEvent {
    /// Send a ping now.
    SendPing,
    /// The outstanding ping went unanswered.
    Timeout,
}

/// Probe state shared with the connection that answers pongs.
#[derive(Debug)]
pub struct ProbeState {
    ping_sent_at: RwLock<Instant>,
    awaiting_pong: AtomicBool,
}

impl Default for ProbeState {
    fn default() -> Self {
        Self::new()
    }
}

impl ProbeState {
    /// Create state with no ping outstanding.
    #[must_use]
    pub fn new() -> Self {
        Self {
            ping_sent_at: RwLock::new(Instant::now()),
            awaiting_pong: AtomicBool::new(false),
        }
    }

    /// Record that a pong arrived.
    pub fn record_pong(&self) {
        self.awaiting_pong.store(false, Ordering::SeqCst);
    }

    /// Record that a ping was sent.
    pub fn mark_ping_sent(&self) {
        *self.ping_sent_at.write() = Instant::now();
        self.awaiting_pong.store(true, Ordering::SeqCst);
    }

    /// Whether a ping is outstanding.
    #[must_use]
    pub fn is_awaiting_pong(&self) -> bool {
        self.awaiting_pong.load(Ordering::SeqCst)
    }

    /// Instant at which the outstanding ping times out, if any.
    #[must_use]
    pub fn pong_deadline(&self, timeout: Duration) -> Option<Instant> {
        self.is_awaiting_pong()
            .then(|| *self.ping_sent_at.read() + timeout)
    }
}

/// Drives pings for one connection.
pub struct LivenessProbe {
    config: ProbeConfig,
    state: Arc<ProbeState>,
    event_tx: mpsc::Sender<ProbeEvent>,
    cancel: CancellationToken,
}

impl LivenessProbe {
    /// Create a new probe.
    #[must_use]
    pub const fn new(
        config: ProbeConfig,
        state: Arc<ProbeState>,
        event_tx: mpsc::Sender<ProbeEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            state,
            event_tx,
            cancel,
        }
    }

    /// Run until cancelled, the event channel closes, or a timeout fires.
    pub async fn run(self) {
        let start = tokio::time::Instant::now() + self.config.ping_interval;
        let mut interval = tokio::time::interval_at(start, self.config.ping_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            let deadline = self.state.pong_deadline(self.config.pong_timeout);
            let sleep_target = deadline.map_or(start, tokio::time::Instant::from_std);

            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::debug!("Liveness probe cancelled");
                    break;
                }
                () = tokio::time::sleep_until(sleep_target), if deadline.is_some() => {
                    if self.state.is_awaiting_pong() {
                        tracing::warn!(
                            timeout_secs = self.config.pong_timeout.as_secs_f64(),
                            "Pong not received in time"
                        );
                        let _ = self.event_tx.send(ProbeEvent::Timeout).await;
                        break;
                    }
                }
                _ = interval.tick() => {
                    if self.state.is_awaiting_pong() {
                        continue;
                    }
                    self.state.mark_ping_sent();
                    if self.event_tx.send(ProbeEvent::SendPing).await.is_err() {
                        tracing::debug!("Probe channel closed, stopping");
                        break;
                    }
                }
            }
        }
    }
}
