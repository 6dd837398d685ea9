//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - `FeedTransport` / `FeedConnection`: streaming connection to a feed endpoint
//! - `RecordSink`: downstream consumer of normalized records
//! - `ReferenceDataSource`: loader for the reference dataset
//! - `ConversionTableSource`: loader for the conversion table

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::reference::ReferenceEntry;
use crate::domain::streaming::{FeedEndpoint, MarketRecord};

// =============================================================================
// Feed Transport
// =============================================================================

/// Transport failures. Every variant is treated as an abnormal close.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Could not establish the connection.
    #[error("connection failed: {0}")]
    ConnectFailed(String),

    /// Peer closed with a non-normal close code.
    #[error("connection closed abnormally (code {code}): {reason}")]
    AbnormalClose {
        /// WebSocket close code.
        code: u16,
        /// Close reason.
        reason: String,
    },

    /// Stream ended without a close handshake.
    #[error("stream ended without close frame")]
    StreamEnded,

    /// Liveness probe was not answered in time.
    #[error("liveness probe timed out after {0:?}")]
    ProbeTimeout(Duration),

    /// Any other transport failure.
    #[error("transport error: {0}")]
    Io(String),
}

/// An open connection to one feed endpoint.
#[async_trait]
pub trait FeedConnection: Send {
    /// Wait for the next text frame.
    ///
    /// Returns `Ok(Some(frame))` for a frame, `Ok(None)` once the peer has
    /// closed cleanly, and `Err` for any abnormal termination.
    async fn next_frame(&mut self) -> Result<Option<String>, TransportError>;

    /// Close the connection. Errors are ignored.
    async fn close(&mut self);
}

/// Factory for feed connections.
#[async_trait]
pub trait FeedTransport: Send + Sync {
    /// Open a connection to `endpoint`.
    async fn connect(
        &self,
        endpoint: &FeedEndpoint,
    ) -> Result<Box<dyn FeedConnection>, TransportError>;
}

// =============================================================================
// Record Sink
// =============================================================================

/// Sink errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    /// Sink is no longer accepting records.
    #[error("record sink closed")]
    Closed,

    /// Sink refused the record.
    #[error("record rejected: {0}")]
    Rejected(String),
}

/// Downstream consumer of normalized records (storage, telemetry, fan-out).
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Accept one record.
    async fn accept(&self, record: MarketRecord) -> Result<(), SinkError>;
}

// =============================================================================
// Data Sources
// =============================================================================

/// Data source errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    /// Backing store could not be read.
    #[error("failed to read {location}: {message}")]
    Unavailable {
        /// Path or URL.
        location: String,
        /// Underlying error.
        message: String,
    },

    /// Content could not be decoded.
    #[error("failed to decode {location}: {message}")]
    Decode {
        /// Path or URL.
        location: String,
        /// Underlying error.
        message: String,
    },

    /// Dataset decoded but has no rows.
    #[error("{location} contains no records")]
    Empty {
        /// Path or URL.
        location: String,
    },
}

/// Loader for the reference dataset.
#[async_trait]
pub trait ReferenceDataSource: Send + Sync {
    /// Load every entry.
    async fn load(&self) -> Result<Vec<ReferenceEntry>, SourceError>;
}

/// Loader for the raw conversion table text.
#[async_trait]
pub trait ConversionTableSource: Send + Sync {
    /// Read the full table.
    async fn read_table(&self) -> Result<String, SourceError>;
}
