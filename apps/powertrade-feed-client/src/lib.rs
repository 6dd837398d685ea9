#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! PowerTrade Feed Client - Market Data Ingestion
//!
//! Keeps one WebSocket connection per PowerTrade feed (top of book,
//! reference price, last trade price), decodes every frame, resolves the
//! instrument to its product symbol, rescales fixed-point values and hands
//! the normalized record to a sink.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Core market data types
//!   - `streaming`: Feed kinds, payloads and normalized records
//!   - `scaling`: Power-of-ten conversion
//!   - `reference`: Reference dataset entries and the conversion table
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Transport, sink and reference data interfaces
//!   - `services`: Resolvers, normalizer, dispatcher, supervisor, orchestrator
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `powertrade`: WebSocket transport, liveness probe and frame codec
//!   - `reference`: File-backed reference data sources
//!   - `broadcast`: Channel-based record distribution
//!   - `config`: Environment configuration
//!   - `health`: Health check HTTP endpoint
//!
//! # Data Flow
//!
//! ```text
//! top_of_book WS ──────┐
//!                      │    ┌────────────┐    ┌────────────┐    ┌────────┐
//! reference_price WS ──┼───►│ Dispatcher │───►│ Normalizer │───►│  Sink  │
//!                      │    └────────────┘    └────────────┘    └────────┘
//! last_trade_price WS ─┘          one per feed, frames in arrival order
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core market data types with no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::reference::{ConversionTable, ConversionTableFormat, ReferenceEntry};
pub use domain::scaling::{ScaleError, ScaleFactors};
pub use domain::streaming::{
    FeedEndpoint, FeedKind, FeedMessage, MarketRecord, PriceRecord, RawFrame, TopOfBookRecord,
};

// Application services
pub use application::services::{
    ConnectionSupervisor, ConversionResolver, DispatchOutcome, Dispatcher, EntityResolver,
    FeedEvent, FeedOrchestrator, FeedReport, Normalizer, ReconnectConfig, SupervisorOutcome,
    SupervisorState,
};

// Infrastructure config
pub use infrastructure::config::{
    ClientConfig, ConfigError, EndpointSettings, FeedSettings, ReferenceDataSettings,
    ServerSettings, SinkSettings,
};

// Health server
pub use infrastructure::health::{
    FeedRegistry, HealthServer, HealthServerError, HealthServerState,
};

// Record hub
pub use infrastructure::broadcast::{RecordHub, RecordHubStats, SharedRecordHub};

// Transport
pub use infrastructure::powertrade::{FrameCodec, ProbeConfig, WebSocketTransport};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
