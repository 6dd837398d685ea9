//! Frame Pipeline Integration Tests
//!
//! Drives raw feed frames through the dispatcher with file-backed reference
//! data and a `RecordHub` sink, checking the records that come out.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::io::Write;
use std::sync::Arc;

use rust_decimal::Decimal;
use tempfile::NamedTempFile;
use tokio::sync::broadcast::error::TryRecvError;

use powertrade_feed_client::application::ports::RecordSink;
use powertrade_feed_client::infrastructure::reference::{
    CsvFileConversionSource, JsonFileReferenceSource,
};
use powertrade_feed_client::{
    ConversionResolver, ConversionTableFormat, DispatchOutcome, Dispatcher, EntityResolver,
    FeedEndpoint, FeedKind, MarketRecord, Normalizer, RawFrame, RecordHub,
};

struct Pipeline {
    dispatcher: Dispatcher,
    hub: Arc<RecordHub>,
    conversions: Arc<ConversionResolver>,
    _files: (NamedTempFile, NamedTempFile),
}

fn file_with(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

async fn pipeline(dataset: &str, table: &str) -> Pipeline {
    let dataset_file = file_with(dataset);
    let table_file = file_with(table);

    let entities = Arc::new(
        EntityResolver::load(&JsonFileReferenceSource::new(dataset_file.path())).await,
    );
    let conversions = Arc::new(ConversionResolver::new(
        Arc::new(CsvFileConversionSource::new(table_file.path())),
        ConversionTableFormat::default(),
    ));
    let normalizer = Arc::new(Normalizer::new(entities, Arc::clone(&conversions)));

    let hub = Arc::new(RecordHub::new(64));
    let sink: Arc<dyn RecordSink> = hub.clone();

    Pipeline {
        dispatcher: Dispatcher::new(normalizer, sink),
        hub,
        conversions,
        _files: (dataset_file, table_file),
    }
}

fn frame(kind: FeedKind, payload: &str) -> RawFrame {
    let endpoint = Arc::new(FeedEndpoint::for_kind("wss://feeds.test/v1/feeds", kind));
    RawFrame::new(endpoint, payload)
}

fn dec(value: &str) -> Decimal {
    value.parse().unwrap()
}

const DATASET: &str = r#"[{"id": 1, "symbol": "BTC"}, {"id": 3, "symbol": "ETH"}]"#;
const TABLE: &str = "1,,1,2\n3,BTC-USD,2,4\n";

#[tokio::test]
async fn conversion_scenario() {
    let p = pipeline(DATASET, TABLE).await;

    assert_eq!(p.conversions.resolve("1").await.unwrap().as_pair(), (10, 100));
    assert_eq!(p.conversions.resolve("999").await.unwrap().as_pair(), (1, 1));
}

#[tokio::test]
async fn top_of_book_yields_one_record() {
    let p = pipeline(DATASET, TABLE).await;
    let mut records = p.hub.subscribe_all();

    let outcome = p
        .dispatcher
        .dispatch(&frame(
            FeedKind::TopOfBook,
            r#"{"top_of_book": {"timestamp": "1700000000000000", "tradeable_entity_id": "1",
                "market_id": "0", "buy_price": "10", "buy_quantity": "1",
                "sell_price": "none", "sell_quantity": "none"}}"#,
        ))
        .await;
    assert_eq!(outcome, DispatchOutcome::Emitted(FeedKind::TopOfBook));

    let MarketRecord::TopOfBook(record) = records.try_recv().unwrap() else {
        panic!("expected top of book record");
    };
    assert_eq!(record.product, "BTC");
    assert_eq!(record.buy_price_conv, dec("1.0"));
    assert_eq!(record.buy_quantity_conv, dec("0.01"));
    assert_eq!(record.sell_price_conv, Decimal::ZERO);
    assert_eq!(record.sell_quantity_conv, Decimal::ZERO);
    assert_eq!(record.buy_price, "10");
    assert!(matches!(records.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn price_feeds_yield_one_record_each() {
    let p = pipeline(DATASET, TABLE).await;
    let mut records = p.hub.subscribe_all();

    let outcome = p
        .dispatcher
        .dispatch(&frame(
            FeedKind::ReferencePrice,
            r#"{"reference_price": {"timestamp": "1", "tradeable_entity_id": "3",
                "market_id": "0", "price": "123450", "price_type": "index"}}"#,
        ))
        .await;
    assert_eq!(outcome, DispatchOutcome::Emitted(FeedKind::ReferencePrice));

    let outcome = p
        .dispatcher
        .dispatch(&frame(
            FeedKind::LastTradePrice,
            r#"{"last_trade_price": {"timestamp": 2, "tradeable_entity_id": 42,
                "market_id": 0, "price": 2500, "price_type": "last"}}"#,
        ))
        .await;
    assert_eq!(outcome, DispatchOutcome::Emitted(FeedKind::LastTradePrice));

    let MarketRecord::ReferencePrice(reference) = records.try_recv().unwrap() else {
        panic!("expected reference price record");
    };
    assert_eq!(reference.product, "ETH");
    assert_eq!(reference.price_conv, dec("1234.5"));

    let MarketRecord::LastTradePrice(last) = records.try_recv().unwrap() else {
        panic!("expected last trade price record");
    };
    assert_eq!(last.product, "Unknown");
    assert_eq!(last.tradeable_entity_id, "42");
    assert_eq!(last.price, "2500");
    assert_eq!(last.price_conv, dec("2500"));
}

#[tokio::test]
async fn invalid_json_is_dropped_and_stream_continues() {
    let p = pipeline(DATASET, TABLE).await;
    let mut records = p.hub.subscribe_all();

    assert_eq!(
        p.dispatcher.dispatch(&frame(FeedKind::TopOfBook, "{invalid}")).await,
        DispatchOutcome::ParseError
    );
    assert!(matches!(records.try_recv(), Err(TryRecvError::Empty)));

    let outcome = p
        .dispatcher
        .dispatch(&frame(
            FeedKind::LastTradePrice,
            r#"{"last_trade_price": {"timestamp": "1", "tradeable_entity_id": "1",
                "market_id": "0", "price": "50", "price_type": "last"}}"#,
        ))
        .await;
    assert_eq!(outcome, DispatchOutcome::Emitted(FeedKind::LastTradePrice));

    let stats = p.dispatcher.stats().snapshot();
    assert_eq!(stats.frames_received, 2);
    assert_eq!(stats.parse_errors, 1);
    assert_eq!(stats.records_emitted, 1);
}

#[tokio::test]
async fn unknown_message_is_dropped() {
    let p = pipeline(DATASET, TABLE).await;
    let mut records = p.hub.subscribe_all();

    assert_eq!(
        p.dispatcher.dispatch(&frame(FeedKind::TopOfBook, r#"{"foo": 1}"#)).await,
        DispatchOutcome::UnknownMessage
    );
    assert!(matches!(records.try_recv(), Err(TryRecvError::Empty)));

    let stats = p.dispatcher.stats().snapshot();
    assert_eq!(stats.unknown_messages, 1);
    assert_eq!(stats.parse_errors, 0);
    assert_eq!(stats.records_emitted, 0);
}

#[tokio::test]
async fn non_numeric_value_drops_whole_record() {
    let p = pipeline(DATASET, TABLE).await;
    let mut records = p.hub.subscribe_all();

    let outcome = p
        .dispatcher
        .dispatch(&frame(
            FeedKind::TopOfBook,
            r#"{"top_of_book": {"timestamp": "1", "tradeable_entity_id": "1",
                "market_id": "0", "buy_price": "10", "buy_quantity": "abc",
                "sell_price": "11", "sell_quantity": "1"}}"#,
        ))
        .await;
    assert_eq!(outcome, DispatchOutcome::DecodeError);
    assert!(matches!(records.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn missing_reference_data_degrades_product() {
    let dataset_dir = tempfile::tempdir().unwrap();
    let table_file = file_with(TABLE);

    let entities = Arc::new(
        EntityResolver::load(&JsonFileReferenceSource::new(
            dataset_dir.path().join("ref_data.json"),
        ))
        .await,
    );
    assert!(!entities.is_loaded());

    let conversions = Arc::new(ConversionResolver::new(
        Arc::new(CsvFileConversionSource::new(table_file.path())),
        ConversionTableFormat::default(),
    ));
    let hub = Arc::new(RecordHub::new(8));
    let mut records = hub.subscribe_all();
    let dispatcher = Dispatcher::new(Arc::new(Normalizer::new(entities, conversions)), hub);

    let outcome = dispatcher
        .dispatch(&frame(
            FeedKind::ReferencePrice,
            r#"{"reference_price": {"timestamp": "1", "tradeable_entity_id": "1",
                "market_id": "0", "price": "100", "price_type": "index"}}"#,
        ))
        .await;
    assert_eq!(outcome, DispatchOutcome::Emitted(FeedKind::ReferencePrice));
    assert_eq!(records.try_recv().unwrap().product(), "Error");
}

#[tokio::test]
async fn malformed_table_fails_preload() {
    let table_file = file_with("1,,1,2\n2,,x,2\n");
    let conversions = ConversionResolver::new(
        Arc::new(CsvFileConversionSource::new(table_file.path())),
        ConversionTableFormat::default(),
    );

    assert!(conversions.preload().await.is_err());
    assert!(!conversions.is_loaded());
}
