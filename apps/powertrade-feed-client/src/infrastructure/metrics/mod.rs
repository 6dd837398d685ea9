//! Prometheus Metrics Module
//!
//! Exposes feed client metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Frames**: Frames received and dropped per feed, by drop reason
//! - **Records**: Normalized records emitted per feed
//! - **Connections**: Feed connection state and reconnection attempts
//! - **Reference data**: Conversion table loads
//! - **Latency**: Frame dispatch latency
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port. Recording
//! functions are no-ops until [`init_metrics`] installs the recorder.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::domain::streaming::FeedKind;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Subsequent calls return the handle installed by the first.
///
/// # Errors
///
/// Returns an error if the recorder cannot be installed (for example when
/// another global recorder is already registered).
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "powertrade_feed_frames_received_total",
        "Total text frames received from PowerTrade feeds"
    );
    describe_counter!(
        "powertrade_feed_records_emitted_total",
        "Total normalized records handed to the record sink"
    );
    describe_counter!(
        "powertrade_feed_frames_dropped_total",
        "Total frames dropped, by reason"
    );

    describe_gauge!(
        "powertrade_feed_connected",
        "1 while the feed connection is established, 0 otherwise"
    );
    describe_counter!(
        "powertrade_feed_reconnects_total",
        "Total failed connections that scheduled a reconnection"
    );

    describe_counter!(
        "powertrade_feed_conversion_table_loads_total",
        "Total successful conversion table loads"
    );
    describe_gauge!(
        "powertrade_feed_conversion_table_entries",
        "Entries in the cached conversion table"
    );

    describe_histogram!(
        "powertrade_feed_dispatch_seconds",
        "Time to decode, normalize and sink one frame"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Metric labels for dropped frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Frame was not valid JSON.
    Parse,
    /// Frame had no recognizable feed kind.
    Unknown,
    /// Payload failed to decode or normalize.
    Decode,
    /// Sink refused the record.
    Sink,
}

impl DropReason {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Parse => "parse",
            Self::Unknown => "unknown",
            Self::Decode => "decode",
            Self::Sink => "sink",
        }
    }
}

/// Record a frame received on a feed.
pub fn record_frame_received(feed: FeedKind) {
    counter!(
        "powertrade_feed_frames_received_total",
        "feed" => feed.as_str()
    )
    .increment(1);
}

/// Record a normalized record handed to the sink.
pub fn record_record_emitted(kind: FeedKind) {
    counter!(
        "powertrade_feed_records_emitted_total",
        "kind" => kind.as_str()
    )
    .increment(1);
}

/// Record a dropped frame.
pub fn record_frame_dropped(feed: FeedKind, reason: DropReason) {
    counter!(
        "powertrade_feed_frames_dropped_total",
        "feed" => feed.as_str(),
        "reason" => reason.as_str()
    )
    .increment(1);
}

/// Update the connection gauge for a feed.
pub fn set_feed_connected(feed: FeedKind, connected: bool) {
    gauge!(
        "powertrade_feed_connected",
        "feed" => feed.as_str()
    )
    .set(if connected { 1.0 } else { 0.0 });
}

/// Record a reconnection attempt.
pub fn record_reconnect(feed: FeedKind) {
    counter!(
        "powertrade_feed_reconnects_total",
        "feed" => feed.as_str()
    )
    .increment(1);
}

/// Record a successful conversion table load.
pub fn record_conversion_table_load(entries: usize) {
    counter!("powertrade_feed_conversion_table_loads_total").increment(1);
    #[allow(clippy::cast_precision_loss)]
    let entries = entries as f64;
    gauge!("powertrade_feed_conversion_table_entries").set(entries);
}

/// Record frame dispatch duration.
pub fn record_dispatch_duration(feed: FeedKind, duration: Duration) {
    histogram!(
        "powertrade_feed_dispatch_seconds",
        "feed" => feed.as_str()
    )
    .record(duration.as_secs_f64());
}

// =============================================================================
// Tests
// =============================================================================
