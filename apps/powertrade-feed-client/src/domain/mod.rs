//! Domain Layer - Core market data types and business rules.
//!
//! This layer contains the feed payloads, normalized records, scaling rules
//! and reference data types. Nothing here performs I/O.

/// Feed payloads, classified messages and normalized records.
pub mod streaming;

/// Power-of-ten scale factors and fixed-point conversion.
pub mod scaling;

/// Reference dataset entries and the conversion table.
pub mod reference;
