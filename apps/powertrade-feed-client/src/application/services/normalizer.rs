//! Record Normalizer
//!
//! Builds normalized records from classified feed payloads: resolves the
//! product symbol and scale factors for the payload's entity, then rescales
//! every raw price and quantity. A record is produced whole or not at all.

use std::sync::Arc;

use crate::application::services::conversion_resolver::{
    ConversionLoadError, ConversionResolver,
};
use crate::application::services::entity_resolver::EntityResolver;
use crate::domain::scaling::{ScaleError, ScaleFactors};
use crate::domain::streaming::{
    FeedMessage, MarketRecord, PricePayload, PriceRecord, TopOfBookPayload, TopOfBookRecord,
};

/// Per-record normalization failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NormalizeError {
    /// A raw field could not be converted.
    #[error("field {field}: {source}")]
    Field {
        /// Field name.
        field: &'static str,
        /// Conversion failure.
        source: ScaleError,
    },

    /// Scale factors unavailable.
    #[error(transparent)]
    Conversion(#[from] ConversionLoadError),
}

/// Converts feed payloads into normalized records.
#[derive(Debug, Clone)]
pub struct Normalizer {
    entities: Arc<EntityResolver>,
    conversions: Arc<ConversionResolver>,
}

impl Normalizer {
    /// Create a normalizer over the two resolvers.
    #[must_use]
    pub const fn new(entities: Arc<EntityResolver>, conversions: Arc<ConversionResolver>) -> Self {
        Self {
            entities,
            conversions,
        }
    }

    /// Normalize one classified message.
    ///
    /// # Errors
    ///
    /// Returns [`NormalizeError`] if any raw value is neither numeric nor the
    /// absent-value sentinel, or if the conversion table cannot be loaded.
    pub async fn normalize(&self, message: FeedMessage) -> Result<MarketRecord, NormalizeError> {
        let product = self
            .entities
            .resolve(message.tradeable_entity_id())
            .to_string();
        let factors = self
            .conversions
            .resolve(message.tradeable_entity_id())
            .await?;

        Ok(match message {
            FeedMessage::TopOfBook(payload) => {
                MarketRecord::TopOfBook(top_of_book(payload, product, factors)?)
            }
            FeedMessage::ReferencePrice(payload) => {
                MarketRecord::ReferencePrice(price(payload, product, factors)?)
            }
            FeedMessage::LastTradePrice(payload) => {
                MarketRecord::LastTradePrice(price(payload, product, factors)?)
            }
        })
    }
}

fn top_of_book(
    payload: TopOfBookPayload,
    product: String,
    factors: ScaleFactors,
) -> Result<TopOfBookRecord, NormalizeError> {
    let buy_price_conv = field("buy_price", factors.convert_price(&payload.buy_price))?;
    let buy_quantity_conv =
        field("buy_quantity", factors.convert_quantity(&payload.buy_quantity))?;
    let sell_price_conv = field("sell_price", factors.convert_price(&payload.sell_price))?;
    let sell_quantity_conv = field(
        "sell_quantity",
        factors.convert_quantity(&payload.sell_quantity),
    )?;

    Ok(TopOfBookRecord {
        timestamp: payload.timestamp,
        tradeable_entity_id: payload.tradeable_entity_id,
        market_id: payload.market_id,
        buy_price: payload.buy_price,
        buy_quantity: payload.buy_quantity,
        sell_price: payload.sell_price,
        sell_quantity: payload.sell_quantity,
        product,
        buy_price_conv,
        buy_quantity_conv,
        sell_price_conv,
        sell_quantity_conv,
    })
}

fn price(
    payload: PricePayload,
    product: String,
    factors: ScaleFactors,
) -> Result<PriceRecord, NormalizeError> {
    let price_conv = field("price", factors.convert_price(&payload.price))?;

    Ok(PriceRecord {
        timestamp: payload.timestamp,
        tradeable_entity_id: payload.tradeable_entity_id,
        market_id: payload.market_id,
        price: payload.price,
        price_type: payload.price_type,
        product,
        price_conv,
    })
}

fn field<T>(name: &'static str, result: Result<T, ScaleError>) -> Result<T, NormalizeError> {
    result.map_err(|source| NormalizeError::Field {
        field: name,
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{ConversionTableSource, SourceError};
    use crate::application::services::entity_resolver::{UNKNOWN_PRODUCT, UNRESOLVED_PRODUCT};
    use crate::domain::reference::{ConversionTableFormat, ReferenceEntry};
    use async_trait::async_trait;
    use rust_decimal::Decimal;

    struct InlineTable(&'static str);

    #[async_trait]
    impl ConversionTableSource for InlineTable {
        async fn read_table(&self) -> Result<String, SourceError> {
            Ok(self.0.to_string())
        }
    }

    fn normalizer(entities: EntityResolver) -> Normalizer {
        Normalizer::new(
            Arc::new(entities),
            Arc::new(ConversionResolver::new(
                Arc::new(InlineTable("1,,1,2\n")),
                ConversionTableFormat::default(),
            )),
        )
    }

    fn btc() -> EntityResolver {
        EntityResolver::new(vec![ReferenceEntry::new("1", "BTC")])
    }

    fn tob(
        id: &str,
        buy_price: &str,
        buy_quantity: &str,
        sell_price: &str,
        sell_quantity: &str,
    ) -> FeedMessage {
        FeedMessage::TopOfBook(TopOfBookPayload {
            timestamp: "ts".to_string(),
            tradeable_entity_id: id.to_string(),
            market_id: "m".to_string(),
            buy_price: buy_price.to_string(),
            buy_quantity: buy_quantity.to_string(),
            sell_price: sell_price.to_string(),
            sell_quantity: sell_quantity.to_string(),
        })
    }

    fn price_payload(id: &str, price: &str) -> PricePayload {
        PricePayload {
            timestamp: "ts".to_string(),
            tradeable_entity_id: id.to_string(),
            market_id: "m".to_string(),
            price: price.to_string(),
            price_type: "mark".to_string(),
        }
    }

    #[tokio::test]
    async fn top_of_book_is_rescaled() {
        let record = normalizer(btc())
            .normalize(tob("1", "10", "1", "20", "250"))
            .await
            .unwrap();

        let MarketRecord::TopOfBook(record) = record else {
            panic!("expected top of book record");
        };
        assert_eq!(record.product, "BTC");
        assert_eq!(record.buy_price_conv, Decimal::new(1, 0));
        assert_eq!(record.buy_quantity_conv, Decimal::new(1, 2));
        assert_eq!(record.sell_price_conv, Decimal::new(2, 0));
        assert_eq!(record.sell_quantity_conv, Decimal::new(25, 1));
        assert_eq!(record.buy_price, "10");
        assert_eq!(record.market_id, "m");
    }

    #[tokio::test]
    async fn absent_sides_convert_to_zero() {
        let record = normalizer(btc())
            .normalize(tob("1", "none", "none", "30", "none"))
            .await
            .unwrap();

        let MarketRecord::TopOfBook(record) = record else {
            panic!("expected top of book record");
        };
        assert_eq!(record.buy_price_conv, Decimal::ZERO);
        assert_eq!(record.buy_quantity_conv, Decimal::ZERO);
        assert_eq!(record.sell_price_conv, Decimal::new(3, 0));
        assert_eq!(record.sell_quantity_conv, Decimal::ZERO);
        assert_eq!(record.sell_quantity, "none");
    }

    #[tokio::test]
    async fn reference_and_last_trade_use_price_scale() {
        let normalizer = normalizer(btc());

        let reference = normalizer
            .normalize(FeedMessage::ReferencePrice(price_payload("1", "12345")))
            .await
            .unwrap();
        let MarketRecord::ReferencePrice(reference) = reference else {
            panic!("expected reference price record");
        };
        assert_eq!(reference.price_conv, Decimal::new(12345, 1));
        assert_eq!(reference.product, "BTC");
        assert_eq!(reference.price_type, "mark");

        let last = normalizer
            .normalize(FeedMessage::LastTradePrice(price_payload("1", "none")))
            .await
            .unwrap();
        let MarketRecord::LastTradePrice(last) = last else {
            panic!("expected last trade price record");
        };
        assert_eq!(last.price_conv, Decimal::ZERO);
    }

    #[tokio::test]
    async fn unknown_entity_is_unscaled() {
        let record = normalizer(btc())
            .normalize(FeedMessage::ReferencePrice(price_payload("77", "500")))
            .await
            .unwrap();
        assert_eq!(record.product(), UNKNOWN_PRODUCT);
        let MarketRecord::ReferencePrice(record) = record else {
            panic!("expected reference price record");
        };
        assert_eq!(record.price_conv, Decimal::new(500, 0));
    }

    #[tokio::test]
    async fn missing_dataset_yields_error_symbol() {
        let record = normalizer(EntityResolver::unloaded())
            .normalize(tob("1", "10", "1", "none", "none"))
            .await
            .unwrap();
        assert_eq!(record.product(), UNRESOLVED_PRODUCT);
    }

    #[tokio::test]
    async fn non_numeric_field_drops_record() {
        let err = normalizer(btc())
            .normalize(tob("1", "10", "1", "ten", "none"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            NormalizeError::Field {
                field: "sell_price",
                source: ScaleError::NotNumeric("ten".to_string()),
            }
        );
    }
}
