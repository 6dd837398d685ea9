//! PowerTrade Feed Client Binary
//!
//! Connects to the configured PowerTrade feeds and logs every normalized
//! record.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin powertrade-feed-client
//! ```
//!
//! # Environment Variables
//!
//! - `POWERTRADE_WS_BASE_URL`: Feed base URL (default: <wss://api.wss.prod.power.trade/v1/feeds>)
//! - `POWERTRADE_FEEDS`: Comma-separated feed kinds (default: all three)
//! - `POWERTRADE_REFERENCE_DATA_PATH`: Reference dataset (default: data/ref_data.json)
//! - `POWERTRADE_CONVERSION_TABLE_PATH`: Conversion table (default: data/product.csv)
//! - `FEED_HEALTH_PORT`: Health check HTTP port, 0 disables (default: 8083)
//! - `FEED_MAX_RECONNECT_ATTEMPTS`: Retry budget per feed, 0 = unlimited (default: 10)
//! - `OTEL_ENABLED`: Export spans over OTLP (default: false)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;

use anyhow::{Context, anyhow};
use powertrade_feed_client::application::ports::RecordSink;
use powertrade_feed_client::infrastructure::health::{
    FeedRegistry, HealthServer, HealthServerState,
};
use powertrade_feed_client::infrastructure::reference::{
    CsvFileConversionSource, JsonFileReferenceSource,
};
use powertrade_feed_client::infrastructure::telemetry;
use powertrade_feed_client::{
    ClientConfig, ConnectionSupervisor, ConversionResolver, Dispatcher, EntityResolver,
    FeedOrchestrator, MarketRecord, Normalizer, ProbeConfig, ReconnectConfig, RecordHub,
    WebSocketTransport, init_metrics,
};
use tokio::signal;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

/// Capacity of the feed state event channel.
const FEED_EVENT_CAPACITY: usize = 256;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("failed to install rustls crypto provider"))?;

    load_dotenv();

    let _telemetry_guard = telemetry::init().context("failed to initialize telemetry")?;

    tracing::info!("Starting PowerTrade feed client");

    let _metrics_handle = init_metrics().context("failed to install metrics recorder")?;

    let config = ClientConfig::from_env().context("invalid configuration")?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    // Conversion table: a malformed table aborts startup
    let conversions = Arc::new(ConversionResolver::new(
        Arc::new(CsvFileConversionSource::new(
            &config.reference.conversion_table_path,
        )),
        config.reference.conversion_table_format(),
    ));
    let rows = conversions.preload().await.with_context(|| {
        format!(
            "failed to load conversion table {}",
            config.reference.conversion_table_path.display()
        )
    })?;
    tracing::info!(rows, "Conversion table loaded");

    // Reference dataset: failure degrades product resolution
    let entities = Arc::new(
        EntityResolver::load(&JsonFileReferenceSource::new(
            &config.reference.reference_data_path,
        ))
        .await,
    );

    let normalizer = Arc::new(Normalizer::new(
        Arc::clone(&entities),
        Arc::clone(&conversions),
    ));

    let record_hub = Arc::new(RecordHub::from_settings(config.sink));
    tokio::spawn(log_records(record_hub.subscribe_all()));
    let sink: Arc<dyn RecordSink> = record_hub.clone();

    let transport = Arc::new(WebSocketTransport::new(ProbeConfig::from_feed_settings(
        &config.feed,
    )));
    let reconnect = ReconnectConfig::from_feed_settings(&config.feed);
    let (event_tx, event_rx) = mpsc::channel(FEED_EVENT_CAPACITY);

    let mut registry = FeedRegistry::new();
    let mut orchestrator = FeedOrchestrator::new();
    for endpoint in config.endpoints.endpoints() {
        let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&normalizer), Arc::clone(&sink)));
        registry = registry.with_feed(endpoint.kind, dispatcher.stats());

        let supervisor = ConnectionSupervisor::new(
            Arc::new(endpoint),
            transport.clone(),
            dispatcher,
            reconnect.clone(),
            shutdown_token.child_token(),
        )
        .with_events(event_tx.clone());
        orchestrator = orchestrator.with_supervisor(supervisor);
    }
    drop(event_tx);

    let registry = Arc::new(registry);
    tokio::spawn(Arc::clone(&registry).track(event_rx));

    if config.server.health_port == 0 {
        tracing::info!("Health server disabled");
    } else {
        let health_state = Arc::new(HealthServerState::new(
            env!("CARGO_PKG_VERSION").to_string(),
            Arc::clone(&registry),
            Arc::clone(&record_hub),
            Arc::clone(&entities),
            Arc::clone(&conversions),
        ));
        let health_server = HealthServer::new(
            config.server.health_port,
            health_state,
            shutdown_token.clone(),
        );
        tokio::spawn(async move {
            if let Err(e) = health_server.run().await {
                tracing::error!(error = %e, "Health server error");
            }
        });
    }

    tracing::info!(feeds = orchestrator.len(), "Feed client ready");

    let run = orchestrator.run();
    tokio::pin!(run);

    tokio::select! {
        reports = &mut run => {
            tracing::warn!(finished = reports.len(), "All feed supervisors finished");
            shutdown_token.cancel();
        }
        () = await_shutdown() => {
            shutdown_token.cancel();
            let reports = run.await;
            tracing::info!(stopped = reports.len(), "Feed supervisors stopped");
        }
    }

    tracing::info!("Feed client stopped");
    Ok(())
}

/// Log every normalized record.
async fn log_records(mut rx: broadcast::Receiver<MarketRecord>) {
    loop {
        match rx.recv().await {
            Ok(MarketRecord::TopOfBook(record)) => {
                tracing::info!(
                    product = %record.product,
                    tradeable_entity_id = %record.tradeable_entity_id,
                    timestamp = %record.timestamp,
                    buy_price = %record.buy_price_conv,
                    buy_quantity = %record.buy_quantity_conv,
                    sell_price = %record.sell_price_conv,
                    sell_quantity = %record.sell_quantity_conv,
                    "Received top of book"
                );
            }
            Ok(MarketRecord::ReferencePrice(record)) => {
                tracing::info!(
                    product = %record.product,
                    tradeable_entity_id = %record.tradeable_entity_id,
                    timestamp = %record.timestamp,
                    price = %record.price_conv,
                    price_type = %record.price_type,
                    "Received reference price"
                );
            }
            Ok(MarketRecord::LastTradePrice(record)) => {
                tracing::info!(
                    product = %record.product,
                    tradeable_entity_id = %record.tradeable_entity_id,
                    timestamp = %record.timestamp,
                    price = %record.price_conv,
                    "Received last trade price"
                );
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Record logger lagging");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &ClientConfig) {
    let feeds: Vec<&str> = config.endpoints.feeds.iter().map(|f| f.as_str()).collect();
    tracing::info!(
        feeds = ?feeds,
        health_port = config.server.health_port,
        max_reconnect_attempts = config.feed.max_reconnect_attempts,
        "Configuration loaded"
    );
    tracing::debug!(
        base_url = %config.endpoints.base_url,
        reference_data = %config.reference.reference_data_path.display(),
        conversion_table = %config.reference.conversion_table_path.display(),
        "Feed endpoints and reference data"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
async fn await_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Ctrl+C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
