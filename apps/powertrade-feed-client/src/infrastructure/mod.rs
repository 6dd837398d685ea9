//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer.

/// PowerTrade WebSocket transport and frame codec.
pub mod powertrade;

/// File-backed reference data and conversion table sources.
pub mod reference;

/// Broadcast channel sink for normalized records.
pub mod broadcast;

/// Environment configuration.
pub mod config;

/// Health check HTTP endpoint.
pub mod health;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Logging and OpenTelemetry tracing integration.
pub mod telemetry;
