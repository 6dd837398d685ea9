//! PowerTrade Feed Adapters
//!
//! WebSocket transport and frame codec for the PowerTrade market data feeds.
//!
//! # Stream URL
//!
//! - Production: `wss://api.wss.prod.power.trade/v1/feeds?type[]={feed_kind}`
//!
//! # Protocol
//!
//! One connection per feed kind. The server pushes JSON text frames, each an
//! object keyed by its feed kind. Clients send nothing but pings.

pub mod codec;
pub mod liveness;
pub mod websocket;

pub use codec::{CodecError, FrameCodec};
pub use liveness::{LivenessProbe, ProbeConfig, ProbeEvent, ProbeState};
pub use websocket::{WebSocketConnection, WebSocketTransport};

/// Default feed base URL.
pub const DEFAULT_BASE_URL: &str = "wss://api.wss.prod.power.trade/v1/feeds";
