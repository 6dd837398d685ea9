//! Record Broadcast Hub
//!
//! Fans normalized records out to in-process consumers using tokio broadcast
//! channels.
//!
//! # Architecture
//!
//! The `RecordHub` keeps one channel per feed kind plus a combined channel
//! carrying every record. Consumers subscribe to whichever they need; slow
//! consumers lag and lose the oldest records rather than stalling the feeds.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::SinkSettings;
use crate::application::ports::{RecordSink, SinkError};
use crate::domain::streaming::{FeedKind, MarketRecord};

/// Central hub for record channels.
///
/// # Example
///
/// ```rust
/// use powertrade_feed_client::infrastructure::broadcast::RecordHub;
/// use powertrade_feed_client::domain::streaming::FeedKind;
///
/// let hub = RecordHub::new(1_000);
///
/// // Only top of book records
/// let mut quotes = hub.subscribe(FeedKind::TopOfBook);
///
/// // Every record
/// let mut all = hub.subscribe_all();
/// ```
#[derive(Debug)]
pub struct RecordHub {
    top_of_book_tx: broadcast::Sender<MarketRecord>,
    reference_price_tx: broadcast::Sender<MarketRecord>,
    last_trade_price_tx: broadcast::Sender<MarketRecord>,
    all_tx: broadcast::Sender<MarketRecord>,
}

impl RecordHub {
    /// Create a hub whose channels each hold `capacity` records.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            top_of_book_tx: broadcast::channel(capacity).0,
            reference_price_tx: broadcast::channel(capacity).0,
            last_trade_price_tx: broadcast::channel(capacity).0,
            all_tx: broadcast::channel(capacity).0,
        }
    }

    /// Create a hub from `SinkSettings`.
    #[must_use]
    pub fn from_settings(settings: SinkSettings) -> Self {
        Self::new(settings.record_channel_capacity)
    }

    const fn sender(&self, kind: FeedKind) -> &broadcast::Sender<MarketRecord> {
        match kind {
            FeedKind::TopOfBook => &self.top_of_book_tx,
            FeedKind::ReferencePrice => &self.reference_price_tx,
            FeedKind::LastTradePrice => &self.last_trade_price_tx,
        }
    }

    /// Publish a record to its kind's channel and the combined channel.
    ///
    /// Returns the number of receivers reached, or `None` if nobody is
    /// subscribed.
    pub fn publish(&self, record: MarketRecord) -> Option<usize> {
        let by_kind = self.sender(record.kind()).send(record.clone()).unwrap_or(0);
        let all = self.all_tx.send(record).unwrap_or(0);
        let reached = by_kind + all;
        (reached > 0).then_some(reached)
    }

    /// Get a receiver for one record kind.
    #[must_use]
    pub fn subscribe(&self, kind: FeedKind) -> broadcast::Receiver<MarketRecord> {
        self.sender(kind).subscribe()
    }

    /// Get a receiver for every record.
    #[must_use]
    pub fn subscribe_all(&self) -> broadcast::Receiver<MarketRecord> {
        self.all_tx.subscribe()
    }

    /// Get statistics about all channels.
    #[must_use]
    pub fn stats(&self) -> RecordHubStats {
        RecordHubStats {
            top_of_book_receivers: self.top_of_book_tx.receiver_count(),
            reference_price_receivers: self.reference_price_tx.receiver_count(),
            last_trade_price_receivers: self.last_trade_price_tx.receiver_count(),
            all_receivers: self.all_tx.receiver_count(),
        }
    }
}

#[async_trait]
impl RecordSink for RecordHub {
    async fn accept(&self, record: MarketRecord) -> Result<(), SinkError> {
        let kind = record.kind();
        if self.publish(record).is_none() {
            tracing::trace!(kind = %kind, "No record subscribers");
        }
        Ok(())
    }
}

/// Shared record hub reference.
pub type SharedRecordHub = Arc<RecordHub>;

/// Receiver counts per channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordHubStats {
    /// Top of book receivers.
    pub top_of_book_receivers: usize,
    /// Reference price receivers.
    pub reference_price_receivers: usize,
    /// Last trade price receivers.
    pub last_trade_price_receivers: usize,
    /// Combined channel receivers.
    pub all_receivers: usize,
}

impl RecordHubStats {
    /// Get total number of receivers across all channels.
    #[must_use]
    pub const fn total_receivers(&self) -> usize {
        self.top_of_book_receivers
            + self.reference_price_receivers
            + self.last_trade_price_receivers
            + self.all_receivers
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::streaming::PriceRecord;
    use rust_decimal::Decimal;
    use tokio::sync::broadcast::error::TryRecvError;

    fn last_trade(price: &str) -> MarketRecord {
        MarketRecord::LastTradePrice(PriceRecord {
            timestamp: "t".to_string(),
            tradeable_entity_id: "1".to_string(),
            market_id: "0".to_string(),
            price: price.to_string(),
            price_type: "last".to_string(),
            product: "BTC".to_string(),
            price_conv: Decimal::new(1, 0),
        })
    }

    #[test]
    fn hub_starts_without_receivers() {
        let hub = RecordHub::new(16);
        assert_eq!(hub.stats(), RecordHubStats::default());
        assert_eq!(hub.publish(last_trade("10")), None);
    }

    #[test]
    fn records_route_by_kind_and_to_all() {
        let hub = RecordHub::new(16);
        let mut last = hub.subscribe(FeedKind::LastTradePrice);
        let mut quotes = hub.subscribe(FeedKind::TopOfBook);
        let mut all = hub.subscribe_all();
        assert_eq!(hub.stats().total_receivers(), 3);

        assert_eq!(hub.publish(last_trade("10")), Some(2));

        assert_eq!(last.try_recv().unwrap(), last_trade("10"));
        assert_eq!(all.try_recv().unwrap(), last_trade("10"));
        assert!(matches!(quotes.try_recv(), Err(TryRecvError::Empty)));
    }

    #[test]
    fn slow_receiver_lags() {
        let hub = RecordHub::new(2);
        let mut all = hub.subscribe_all();

        for price in ["1", "2", "3"] {
            let _ = hub.publish(last_trade(price));
        }

        assert!(matches!(all.try_recv(), Err(TryRecvError::Lagged(1))));
        assert_eq!(all.try_recv().unwrap(), last_trade("2"));
    }

    #[tokio::test]
    async fn sink_accepts_without_subscribers() {
        let hub = RecordHub::new(4);
        tokio_test::assert_ok!(hub.accept(last_trade("10")).await);
    }
}
