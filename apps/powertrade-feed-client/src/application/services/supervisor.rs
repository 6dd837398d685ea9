//! Connection Supervisor
//!
//! Owns the lifecycle of one feed endpoint: connect, stream frames to the
//! dispatcher in arrival order, and on failure back off and reconnect until
//! the retry budget is spent.
//!
//! ```text
//! Disconnected ──► Connecting ──► Connected ──► ClosedGracefully
//!                      ▲   │          │
//!                      │   ▼          ▼
//!                      └─ Backoff ◄───┘
//!                           │
//!                           ▼
//!                       Exhausted
//! ```
//!
//! Cancellation moves any state to `Stopped`. `ClosedGracefully`, `Exhausted`
//! and `Stopped` are terminal for this endpoint only.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{FeedConnection, FeedTransport, TransportError};
use crate::application::services::dispatcher::Dispatcher;
use crate::application::services::reconnect::{ReconnectConfig, ReconnectDecision, ReconnectPolicy};
use crate::domain::streaming::{FeedEndpoint, FeedKind, RawFrame};
use crate::infrastructure::metrics;

/// Supervisor lifecycle states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorState {
    /// Not yet started.
    Disconnected,
    /// Opening connection attempt `attempt` (1-based since the last success).
    Connecting {
        /// Attempt number.
        attempt: u32,
    },
    /// Streaming frames.
    Connected,
    /// Waiting before the next attempt.
    Backoff {
        /// Consecutive failures so far.
        attempt: u32,
        /// Delay before reconnecting.
        delay: Duration,
        /// Failure that caused the backoff.
        reason: String,
    },
    /// Peer closed cleanly; no reconnection.
    ClosedGracefully,
    /// Retry budget spent; no reconnection.
    Exhausted {
        /// Consecutive failed connections.
        attempts: u32,
    },
    /// Cancelled by shutdown.
    Stopped,
}

impl SupervisorState {
    /// Short label for logs and health output.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting { .. } => "connecting",
            Self::Connected => "connected",
            Self::Backoff { .. } => "backoff",
            Self::ClosedGracefully => "closed",
            Self::Exhausted { .. } => "exhausted",
            Self::Stopped => "stopped",
        }
    }

    /// Whether the supervisor has finished.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::ClosedGracefully | Self::Exhausted { .. } | Self::Stopped
        )
    }
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State transition notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedEvent {
    /// Feed that changed state.
    pub feed: FeedKind,
    /// New state.
    pub state: SupervisorState,
}

/// How a supervisor finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorOutcome {
    /// Peer closed cleanly.
    ClosedGracefully,
    /// Retry budget spent.
    Exhausted {
        /// Consecutive failed connections.
        attempts: u32,
    },
    /// Cancelled by shutdown.
    Stopped,
}

enum StreamEnd {
    Graceful,
    Cancelled,
    Failed(TransportError),
}

/// Supervises one feed endpoint.
pub struct ConnectionSupervisor {
    endpoint: Arc<FeedEndpoint>,
    transport: Arc<dyn FeedTransport>,
    dispatcher: Arc<Dispatcher>,
    reconnect: ReconnectConfig,
    cancel: CancellationToken,
    event_tx: Option<mpsc::Sender<FeedEvent>>,
}

impl fmt::Debug for ConnectionSupervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionSupervisor")
            .field("endpoint", &self.endpoint)
            .field("reconnect", &self.reconnect)
            .finish_non_exhaustive()
    }
}

impl ConnectionSupervisor {
    /// Create a supervisor for `endpoint`.
    #[must_use]
    pub fn new(
        endpoint: Arc<FeedEndpoint>,
        transport: Arc<dyn FeedTransport>,
        dispatcher: Arc<Dispatcher>,
        reconnect: ReconnectConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            endpoint,
            transport,
            dispatcher,
            reconnect,
            cancel,
            event_tx: None,
        }
    }

    /// Publish every state transition on `event_tx`.
    #[must_use]
    pub fn with_events(mut self, event_tx: mpsc::Sender<FeedEvent>) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    /// Endpoint this supervisor owns.
    #[must_use]
    pub fn endpoint(&self) -> &FeedEndpoint {
        &self.endpoint
    }

    /// Run until the endpoint closes gracefully, the retry budget is spent,
    /// or shutdown is requested.
    pub async fn run(self) -> SupervisorOutcome {
        let mut policy = ReconnectPolicy::new(self.reconnect.clone());
        self.transition(SupervisorState::Disconnected).await;

        loop {
            if self.cancel.is_cancelled() {
                return self.stop().await;
            }

            let attempt = policy.attempt_count() + 1;
            self.transition(SupervisorState::Connecting { attempt }).await;

            let connected = tokio::select! {
                () = self.cancel.cancelled() => return self.stop().await,
                result = self.transport.connect(&self.endpoint) => result,
            };

            let failure = match connected {
                Ok(mut connection) => {
                    policy.reset();
                    metrics::set_feed_connected(self.endpoint.kind, true);
                    self.transition(SupervisorState::Connected).await;

                    let end = self.stream(connection.as_mut()).await;
                    metrics::set_feed_connected(self.endpoint.kind, false);

                    match end {
                        StreamEnd::Graceful => {
                            tracing::info!(
                                feed = %self.endpoint.kind,
                                "Feed closed by server, not reconnecting"
                            );
                            self.transition(SupervisorState::ClosedGracefully).await;
                            return SupervisorOutcome::ClosedGracefully;
                        }
                        StreamEnd::Cancelled => {
                            connection.close().await;
                            return self.stop().await;
                        }
                        StreamEnd::Failed(e) => e,
                    }
                }
                Err(e) => e,
            };

            match policy.record_failure() {
                ReconnectDecision::Retry { attempt, delay } => {
                    tracing::warn!(
                        feed = %self.endpoint.kind,
                        attempt,
                        max_attempts = policy.max_attempts(),
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %failure,
                        "Feed connection lost, reconnecting"
                    );
                    metrics::record_reconnect(self.endpoint.kind);
                    self.transition(SupervisorState::Backoff {
                        attempt,
                        delay,
                        reason: failure.to_string(),
                    })
                    .await;

                    tokio::select! {
                        () = self.cancel.cancelled() => return self.stop().await,
                        () = tokio::time::sleep(delay) => {}
                    }
                }
                ReconnectDecision::Exhausted { attempts } => {
                    tracing::error!(
                        feed = %self.endpoint.kind,
                        attempts,
                        error = %failure,
                        "Max retries reached, giving up on feed"
                    );
                    self.transition(SupervisorState::Exhausted { attempts }).await;
                    return SupervisorOutcome::Exhausted { attempts };
                }
            }
        }
    }

    async fn stream(&self, connection: &mut dyn FeedConnection) -> StreamEnd {
        loop {
            let next = tokio::select! {
                () = self.cancel.cancelled() => return StreamEnd::Cancelled,
                next = connection.next_frame() => next,
            };

            match next {
                Ok(Some(payload)) => {
                    let frame = RawFrame::new(Arc::clone(&self.endpoint), payload);
                    self.dispatcher.dispatch(&frame).await;
                }
                Ok(None) => return StreamEnd::Graceful,
                Err(e) => return StreamEnd::Failed(e),
            }
        }
    }

    async fn stop(&self) -> SupervisorOutcome {
        tracing::info!(feed = %self.endpoint.kind, "Feed supervisor stopped");
        self.transition(SupervisorState::Stopped).await;
        SupervisorOutcome::Stopped
    }

    async fn transition(&self, state: SupervisorState) {
        tracing::debug!(feed = %self.endpoint.kind, state = %state, "Feed state changed");
        if let Some(tx) = &self.event_tx {
            let _ = tx
                .send(FeedEvent {
                    feed: self.endpoint.kind,
                    state,
                })
                .await;
        }
    }
}
