//! Market Data Streaming Types
//!
//! Core domain types for the three power.trade feeds: wire payloads as they
//! arrive on a feed, and the normalized records handed to downstream sinks.
//!
//! # Wire Format (JSON)
//!
//! ```json
//! {"top_of_book": {"timestamp": "...", "tradeable_entity_id": "1", "market_id": "0",
//!                  "buy_price": "10", "buy_quantity": "1",
//!                  "sell_price": "none", "sell_quantity": "none"}}
//! {"reference_price": {"timestamp": "...", "tradeable_entity_id": "1",
//!                      "market_id": "0", "price": "10", "price_type": "mark"}}
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

/// Literal marking a missing bid or offer side in a quote.
pub const ABSENT_VALUE: &str = "none";

// =============================================================================
// Feed Kinds and Endpoints
// =============================================================================

/// Kind of power.trade feed.
///
/// The snake-case name is both the `type[]` query parameter of the feed
/// endpoint and the top-level discriminant key of every frame on that feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedKind {
    /// Best bid/offer per tradeable entity.
    TopOfBook,
    /// Venue reference (mark/index) prices.
    ReferencePrice,
    /// Last traded price.
    LastTradePrice,
}

impl FeedKind {
    /// All feed kinds, in subscription order.
    pub const ALL: [Self; 3] = [Self::TopOfBook, Self::ReferencePrice, Self::LastTradePrice];

    /// Wire name of this feed kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TopOfBook => "top_of_book",
            Self::ReferencePrice => "reference_price",
            Self::LastTradePrice => "last_trade_price",
        }
    }
}

impl fmt::Display for FeedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string does not name a feed kind.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown feed kind: {0}")]
pub struct UnknownFeedKind(pub String);

impl FromStr for FeedKind {
    type Err = UnknownFeedKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| UnknownFeedKind(s.to_string()))
    }
}

/// One externally addressed streaming subscription delivering a single feed kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedEndpoint {
    /// Feed kind delivered on this endpoint.
    pub kind: FeedKind,
    /// WebSocket URL.
    pub url: String,
}

impl FeedEndpoint {
    /// Create an endpoint with an explicit URL.
    #[must_use]
    pub fn new(kind: FeedKind, url: impl Into<String>) -> Self {
        Self {
            kind,
            url: url.into(),
        }
    }

    /// Build the venue endpoint for a feed kind: `{base_url}?type[]={kind}`.
    #[must_use]
    pub fn for_kind(base_url: &str, kind: FeedKind) -> Self {
        Self::new(kind, format!("{base_url}?type[]={}", kind.as_str()))
    }
}

impl fmt::Display for FeedEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

/// An inbound text payload plus the endpoint it arrived on.
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// Endpoint the frame was received on.
    pub endpoint: Arc<FeedEndpoint>,
    /// Raw frame text.
    pub payload: String,
}

impl RawFrame {
    /// Create a new frame.
    #[must_use]
    pub fn new(endpoint: Arc<FeedEndpoint>, payload: impl Into<String>) -> Self {
        Self {
            endpoint,
            payload: payload.into(),
        }
    }
}

// =============================================================================
// Wire Payloads
// =============================================================================

/// `top_of_book` sub-payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TopOfBookPayload {
    /// Venue timestamp.
    #[serde(deserialize_with = "string_or_number")]
    pub timestamp: String,
    /// Instrument id.
    #[serde(deserialize_with = "string_or_number")]
    pub tradeable_entity_id: String,
    /// Market id.
    #[serde(deserialize_with = "string_or_number")]
    pub market_id: String,
    /// Raw fixed-point best bid price, or `"none"`.
    #[serde(deserialize_with = "string_or_number")]
    pub buy_price: String,
    /// Raw fixed-point best bid quantity, or `"none"`.
    #[serde(deserialize_with = "string_or_number")]
    pub buy_quantity: String,
    /// Raw fixed-point best offer price, or `"none"`.
    #[serde(deserialize_with = "string_or_number")]
    pub sell_price: String,
    /// Raw fixed-point best offer quantity, or `"none"`.
    #[serde(deserialize_with = "string_or_number")]
    pub sell_quantity: String,
}

/// `reference_price` / `last_trade_price` sub-payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PricePayload {
    /// Venue timestamp.
    #[serde(deserialize_with = "string_or_number")]
    pub timestamp: String,
    /// Instrument id.
    #[serde(deserialize_with = "string_or_number")]
    pub tradeable_entity_id: String,
    /// Market id.
    #[serde(deserialize_with = "string_or_number")]
    pub market_id: String,
    /// Raw fixed-point price, or `"none"`.
    #[serde(deserialize_with = "string_or_number")]
    pub price: String,
    /// Venue price type label.
    #[serde(deserialize_with = "string_or_number")]
    pub price_type: String,
}

/// A classified inbound frame: exactly one of the three feed payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedMessage {
    /// Top of book quote.
    TopOfBook(TopOfBookPayload),
    /// Reference price.
    ReferencePrice(PricePayload),
    /// Last trade price.
    LastTradePrice(PricePayload),
}

impl FeedMessage {
    /// Feed kind of this message.
    #[must_use]
    pub const fn kind(&self) -> FeedKind {
        match self {
            Self::TopOfBook(_) => FeedKind::TopOfBook,
            Self::ReferencePrice(_) => FeedKind::ReferencePrice,
            Self::LastTradePrice(_) => FeedKind::LastTradePrice,
        }
    }

    /// Instrument id carried by the payload.
    #[must_use]
    pub fn tradeable_entity_id(&self) -> &str {
        match self {
            Self::TopOfBook(p) => &p.tradeable_entity_id,
            Self::ReferencePrice(p) | Self::LastTradePrice(p) => &p.tradeable_entity_id,
        }
    }
}

/// Accept a JSON string or number and keep its string form.
///
/// Instrument ids appear as numbers in the reference dataset and as strings on
/// the wire; both compare by their string form.
pub(crate) fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(D::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

// =============================================================================
// Normalized Records
// =============================================================================

/// Normalized top of book record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopOfBookRecord {
    /// Venue timestamp.
    pub timestamp: String,
    /// Instrument id.
    pub tradeable_entity_id: String,
    /// Market id.
    pub market_id: String,
    /// Raw best bid price.
    pub buy_price: String,
    /// Raw best bid quantity.
    pub buy_quantity: String,
    /// Raw best offer price.
    pub sell_price: String,
    /// Raw best offer quantity.
    pub sell_quantity: String,
    /// Resolved product symbol.
    pub product: String,
    /// Bid price divided by the price scale.
    #[serde(with = "rust_decimal::serde::float")]
    pub buy_price_conv: Decimal,
    /// Bid quantity divided by the quantity scale.
    #[serde(with = "rust_decimal::serde::float")]
    pub buy_quantity_conv: Decimal,
    /// Offer price divided by the price scale.
    #[serde(with = "rust_decimal::serde::float")]
    pub sell_price_conv: Decimal,
    /// Offer quantity divided by the quantity scale.
    #[serde(with = "rust_decimal::serde::float")]
    pub sell_quantity_conv: Decimal,
}

/// Normalized single-price record (reference price or last trade price).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceRecord {
    /// Venue timestamp.
    pub timestamp: String,
    /// Instrument id.
    pub tradeable_entity_id: String,
    /// Market id.
    pub market_id: String,
    /// Raw price.
    pub price: String,
    /// Venue price type label.
    pub price_type: String,
    /// Resolved product symbol.
    pub product: String,
    /// Price divided by the price scale.
    #[serde(with = "rust_decimal::serde::float")]
    pub price_conv: Decimal,
}

/// Normalized reference price record.
pub type ReferencePriceRecord = PriceRecord;

/// Normalized last trade price record.
pub type LastTradePriceRecord = PriceRecord;

/// A normalized record of any feed kind.
///
/// Serializes externally tagged by feed kind, matching the inbound frame shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketRecord {
    /// Top of book record.
    TopOfBook(TopOfBookRecord),
    /// Reference price record.
    ReferencePrice(ReferencePriceRecord),
    /// Last trade price record.
    LastTradePrice(LastTradePriceRecord),
}

impl MarketRecord {
    /// Feed kind of this record.
    #[must_use]
    pub const fn kind(&self) -> FeedKind {
        match self {
            Self::TopOfBook(_) => FeedKind::TopOfBook,
            Self::ReferencePrice(_) => FeedKind::ReferencePrice,
            Self::LastTradePrice(_) => FeedKind::LastTradePrice,
        }
    }

    /// Resolved product symbol.
    #[must_use]
    pub fn product(&self) -> &str {
        match self {
            Self::TopOfBook(r) => &r.product,
            Self::ReferencePrice(r) | Self::LastTradePrice(r) => &r.product,
        }
    }

    /// Instrument id.
    #[must_use]
    pub fn tradeable_entity_id(&self) -> &str {
        match self {
            Self::TopOfBook(r) => &r.tradeable_entity_id,
            Self::ReferencePrice(r) | Self::LastTradePrice(r) => &r.tradeable_entity_id,
        }
    }
}
