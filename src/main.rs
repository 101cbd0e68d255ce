use std::sync::Arc;
use std::time::Duration;
use anyhow::Context;
use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;
use pricefeed::config::loader::AppConfig;
use pricefeed::error::Result;
use pricefeed::interfaces::price_sink::LoggingSink;
use pricefeed::observability::metrics::register_metrics;
use pricefeed::observability::tracing::init_tracing;
use pricefeed::price_infra::connectors::PriceConnector;
use pricefeed::price_infra::connectors::simulated::SimulatedConnector;
use pricefeed::price_infra::service::PriceIngestionService;
use pricefeed::types::ids::SourceId;
use pricefeed::types::price::Price;

const SIMULATED_TICK_PERIOD: Duration = Duration::from_millis(25);

// Starting points for the random walk.
const REFERENCE_PRICES: [(&str, Decimal); 3] = [
    ("EURUSD", Decimal::from_parts(10850, 0, 0, false, 4)),
    ("USDJPY", Decimal::from_parts(15120, 0, 0, false, 2)),
    ("BTCUSD", Decimal::from_parts(64000, 0, 0, false, 0)),
];

fn simulated_connector(source_id: &SourceId) -> Result<Box<dyn PriceConnector>> {
    let seed = source_id.as_str().bytes().fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));
    let mut connector = SimulatedConnector::new(source_id.clone(), SIMULATED_TICK_PERIOD, seed);
    for (symbol, price) in REFERENCE_PRICES {
        connector = connector.with_reference_price(symbol, Price::new(price));
    }
    Ok(Box::new(connector))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = std::env::var("PRICEFEED_ENV").unwrap_or_else(|_| "development".to_string());
    let app = AppConfig::load(&env).context("failed to load configuration")?;

    init_tracing(&app.logging)?;
    register_metrics()?;
    tracing::info!(%env, sources = app.sources.len(), "starting pricefeed");

    let service = PriceIngestionService::new(
        app.pricing.clone(),
        &app.catalog(),
        Arc::new(LoggingSink),
        &simulated_connector,
    )
    .context("failed to build price ingestion service")?;

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown requested");
        }
        shutdown.cancel();
    });

    service.start(&cancel).await;
    cancel.cancelled().await;
    service.stop().await;

    for instrument in service.instruments() {
        match service.statistics(&instrument) {
            Some(stats) => tracing::info!(
                %instrument,
                min = %stats.min_price,
                max = %stats.max_price,
                max_fluctuation = %stats.max_fluctuation,
                samples = stats.sample_count,
                "final statistics"
            ),
            None => tracing::info!(%instrument, "no price published"),
        }
    }

    Ok(())
}
