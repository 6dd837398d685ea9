//! Health Check and Metrics Endpoint
//!
//! HTTP endpoint for health checks, feed status reporting, and Prometheus metrics.
//!
//! # Endpoints
//!
//! - `GET /health` - Returns JSON health status
//! - `GET /healthz` - Liveness probe (simple OK)
//! - `GET /readyz` - Readiness probe (at least one feed connected)
//! - `GET /metrics` - Prometheus metrics in text format

mod state;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

pub use state::{FeedRegistry, FeedState};

use crate::application::services::conversion_resolver::ConversionResolver;
use crate::application::services::dispatcher::DispatchStatsSnapshot;
use crate::application::services::entity_resolver::EntityResolver;
use crate::domain::streaming::FeedKind;
use crate::infrastructure::broadcast::SharedRecordHub;
use crate::infrastructure::metrics::get_metrics_handle;

// =============================================================================
// Health Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status: "healthy", "degraded", or "unhealthy".
    pub status: HealthStatus,
    /// Client version.
    pub version: String,
    /// Uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Per-feed status.
    pub feeds: Vec<FeedInfo>,
    /// Reference data status.
    pub reference_data: ReferenceDataStatus,
    /// Total record subscribers.
    pub record_subscribers: usize,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Every feed connected.
    Healthy,
    /// Some feeds connected.
    Degraded,
    /// No feed connected.
    Unhealthy,
}

/// Individual feed status.
#[derive(Debug, Clone, Serialize)]
pub struct FeedInfo {
    /// Feed kind.
    pub feed: FeedKind,
    /// Supervisor state.
    pub state: String,
    /// Whether this feed is connected.
    pub connected: bool,
    /// Consecutive failed connections (0 if connected).
    pub reconnect_attempts: u32,
    /// When the feed last connected.
    pub last_connected_at: Option<DateTime<Utc>>,
    /// Most recent connection failure.
    pub last_error: Option<String>,
    /// Dispatch counters.
    pub dispatch: DispatchStatsSnapshot,
}

/// Reference data status.
#[derive(Debug, Clone, Serialize)]
pub struct ReferenceDataStatus {
    /// Entries in the reference dataset (0 if unavailable).
    pub reference_entries: usize,
    /// Whether the conversion table is cached.
    pub conversion_table_loaded: bool,
}

// =============================================================================
// Health Server State
// =============================================================================

/// Shared state for the health server.
pub struct HealthServerState {
    version: String,
    started_at: Instant,
    feeds: Arc<FeedRegistry>,
    records: SharedRecordHub,
    entities: Arc<EntityResolver>,
    conversions: Arc<ConversionResolver>,
}

impl HealthServerState {
    /// Create new health server state.
    #[must_use]
    pub fn new(
        version: String,
        feeds: Arc<FeedRegistry>,
        records: SharedRecordHub,
        entities: Arc<EntityResolver>,
        conversions: Arc<ConversionResolver>,
    ) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            feeds,
            records,
            entities,
            conversions,
        }
    }
}

// =============================================================================
// Health Server
// =============================================================================

/// Health check HTTP server.
pub struct HealthServer {
    port: u16,
    state: Arc<HealthServerState>,
    cancel: CancellationToken,
}

impl HealthServer {
    /// Create a new health server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<HealthServerState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Run the health server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HealthServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), HealthServerError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HealthServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "Health server listening");

        axum::serve(listener, router(self.state))
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HealthServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Health server stopped");
        Ok(())
    }
}

/// Build the health router.
pub fn router(state: Arc<HealthServerState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/healthz", get(liveness_handler))
        .route("/readyz", get(readiness_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn health_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    let response = build_health_response(&state);
    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    if state.feeds.iter().any(|feed| feed.is_connected()) {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            let body = handle.render();
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                body,
            )
        },
    )
}

fn build_health_response(state: &HealthServerState) -> HealthResponse {
    let feeds: Vec<FeedInfo> = state.feeds.iter().map(|feed| feed_info(feed)).collect();

    HealthResponse {
        status: determine_health_status(&feeds),
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        feeds,
        reference_data: ReferenceDataStatus {
            reference_entries: state.entities.len(),
            conversion_table_loaded: state.conversions.is_loaded(),
        },
        record_subscribers: state.records.stats().total_receivers(),
    }
}

fn feed_info(feed: &FeedState) -> FeedInfo {
    let state = feed.state();
    FeedInfo {
        feed: feed.kind(),
        state: state.to_string(),
        connected: feed.is_connected(),
        reconnect_attempts: feed.reconnect_attempts(),
        last_connected_at: feed.last_connected_at(),
        last_error: feed.last_error(),
        dispatch: feed.dispatch(),
    }
}

fn determine_health_status(feeds: &[FeedInfo]) -> HealthStatus {
    let connected = feeds.iter().filter(|f| f.connected).count();

    match connected {
        0 => HealthStatus::Unhealthy,
        n if n == feeds.len() => HealthStatus::Healthy,
        _ => HealthStatus::Degraded,
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Health server errors.
#[derive(Debug, thiserror::Error)]
pub enum HealthServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{ConversionTableSource, SourceError};
    use crate::application::services::dispatcher::DispatchStats;
    use crate::application::services::supervisor::SupervisorState;
    use crate::domain::reference::{ConversionTableFormat, ReferenceEntry};
    use crate::infrastructure::broadcast::RecordHub;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    struct EmptyTable;

    #[async_trait]
    impl ConversionTableSource for EmptyTable {
        async fn read_table(&self) -> Result<String, SourceError> {
            Ok(String::new())
        }
    }

    fn feed(connected: bool) -> FeedInfo {
        FeedInfo {
            feed: FeedKind::TopOfBook,
            state: if connected { "connected" } else { "backoff" }.to_string(),
            connected,
            reconnect_attempts: u32::from(!connected),
            last_connected_at: None,
            last_error: None,
            dispatch: DispatchStatsSnapshot::default(),
        }
    }

    fn server_state() -> (Arc<FeedRegistry>, Arc<HealthServerState>) {
        let feeds = Arc::new(
            FeedRegistry::new()
                .with_feed(FeedKind::TopOfBook, Arc::new(DispatchStats::default()))
                .with_feed(FeedKind::ReferencePrice, Arc::new(DispatchStats::default())),
        );
        let state = Arc::new(HealthServerState::new(
            "test".to_string(),
            Arc::clone(&feeds),
            Arc::new(RecordHub::new(4)),
            Arc::new(EntityResolver::new(vec![ReferenceEntry::new("1", "BTC")])),
            Arc::new(ConversionResolver::new(
                Arc::new(EmptyTable),
                ConversionTableFormat::default(),
            )),
        ));
        (feeds, state)
    }

    async fn get(state: Arc<HealthServerState>, uri: &str) -> (StatusCode, String) {
        let response = router(state)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[test]
    fn health_status_serialization() {
        assert_eq!(
            serde_json::to_string(&HealthStatus::Healthy).unwrap(),
            "\"healthy\""
        );
        assert_eq!(
            serde_json::to_string(&HealthStatus::Unhealthy).unwrap(),
            "\"unhealthy\""
        );
    }

    #[test]
    fn determine_status() {
        assert_eq!(
            determine_health_status(&[feed(true), feed(true)]),
            HealthStatus::Healthy
        );
        assert_eq!(
            determine_health_status(&[feed(true), feed(false)]),
            HealthStatus::Degraded
        );
        assert_eq!(
            determine_health_status(&[feed(false), feed(false)]),
            HealthStatus::Unhealthy
        );
        assert_eq!(determine_health_status(&[]), HealthStatus::Unhealthy);
    }

    #[tokio::test]
    async fn liveness_always_ok() {
        let (_, state) = server_state();
        let (status, body) = get(state, "/healthz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "OK");
    }

    #[tokio::test]
    async fn readiness_follows_feed_state() {
        let (feeds, state) = server_state();
        let (status, _) = get(Arc::clone(&state), "/readyz").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        feeds
            .get(FeedKind::ReferencePrice)
            .unwrap()
            .apply(&SupervisorState::Connected);
        let (status, body) = get(state, "/readyz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "READY");
    }

    #[tokio::test]
    async fn health_reports_feeds() {
        let (feeds, state) = server_state();
        feeds
            .get(FeedKind::TopOfBook)
            .unwrap()
            .apply(&SupervisorState::Connected);

        let (status, body) = get(state, "/health").await;
        assert_eq!(status, StatusCode::OK);

        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["status"], "degraded");
        assert_eq!(json["feeds"][0]["feed"], "top_of_book");
        assert_eq!(json["feeds"][0]["state"], "connected");
        assert_eq!(json["feeds"][1]["state"], "disconnected");
        assert_eq!(json["feeds"][0]["dispatch"]["frames_received"], 0);
        assert_eq!(json["reference_data"]["reference_entries"], 1);
        assert_eq!(json["reference_data"]["conversion_table_loaded"], false);
    }
}
