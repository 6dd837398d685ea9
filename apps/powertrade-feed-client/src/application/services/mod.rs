//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `EntityResolver` / `ConversionResolver`: reference data lookups
//! - `Normalizer`: payload to record conversion
//! - `Dispatcher`: per-frame decode, normalize and sink
//! - `ConnectionSupervisor`: per-endpoint connection state machine
//! - `FeedOrchestrator`: runs every supervisor concurrently

pub mod conversion_resolver;
pub mod dispatcher;
pub mod entity_resolver;
pub mod normalizer;
pub mod orchestrator;
pub mod reconnect;
pub mod supervisor;

pub use conversion_resolver::{ConversionLoadError, ConversionResolver};
pub use dispatcher::{DispatchOutcome, DispatchStats, DispatchStatsSnapshot, Dispatcher};
pub use entity_resolver::{EntityResolver, UNKNOWN_PRODUCT, UNRESOLVED_PRODUCT};
pub use normalizer::{NormalizeError, Normalizer};
pub use orchestrator::{FeedOrchestrator, FeedReport};
pub use reconnect::{ReconnectConfig, ReconnectDecision, ReconnectPolicy};
pub use supervisor::{ConnectionSupervisor, FeedEvent, SupervisorOutcome, SupervisorState};
