use lazy_static::lazy_static;
use prometheus::{IntCounter, Registry};
use std::sync::OnceLock;
use crate::error::{Error, Result};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // Tick metrics
    pub static ref TICKS_RECEIVED: IntCounter = IntCounter::new(
        "ticks_received_total",
        "Total number of ticks raised by stream listeners"
    ).unwrap();

    pub static ref TICKS_FORWARDED: IntCounter = IntCounter::new(
        "ticks_forwarded_total",
        "Total number of ticks forwarded by the source router"
    ).unwrap();

    pub static ref TICKS_DROPPED: IntCounter = IntCounter::new(
        "ticks_dropped_total",
        "Total number of ticks dropped by the source router"
    ).unwrap();

    pub static ref SOURCE_FAILOVERS: IntCounter = IntCounter::new(
        "source_failovers_total",
        "Total number of in-turn source advances"
    ).unwrap();

    // Publish metrics
    pub static ref PRICES_PUBLISHED: IntCounter = IntCounter::new(
        "prices_published_total",
        "Total number of prices accepted by the publish gate"
    ).unwrap();

    pub static ref PRICES_SUPPRESSED: IntCounter = IntCounter::new(
        "prices_suppressed_total",
        "Total number of prices suppressed by the publish gate"
    ).unwrap();

    pub static ref SINK_ERRORS: IntCounter = IntCounter::new(
        "sink_errors_total",
        "Total number of failed sink deliveries"
    ).unwrap();

    pub static ref OBSERVER_ERRORS: IntCounter = IntCounter::new(
        "observer_errors_total",
        "Total number of failed publish observer notifications"
    ).unwrap();
}

static REGISTERED: OnceLock<std::result::Result<(), String>> = OnceLock::new();

/// Register all collectors with [`REGISTRY`]. Safe to call more than once; a
/// failed first registration keeps failing.
pub fn register_metrics() -> Result<()> {
    register_once(&REGISTERED, &REGISTRY)
}

fn register_once(cell: &OnceLock<std::result::Result<(), String>>, registry: &Registry) -> Result<()> {
    cell.get_or_init(|| register_all(registry))
        .clone()
        .map_err(Error::ConfigError)
}

fn register_all(registry: &Registry) -> std::result::Result<(), String> {
    let collectors = [
        &*TICKS_RECEIVED,
        &*TICKS_FORWARDED,
        &*TICKS_DROPPED,
        &*SOURCE_FAILOVERS,
        &*PRICES_PUBLISHED,
        &*PRICES_SUPPRESSED,
        &*SINK_ERRORS,
        &*OBSERVER_ERRORS,
    ];
    for collector in collectors {
        registry
            .register(Box::new(collector.clone()))
            .map_err(|e| format!("metric registration failed: {}", e))?;
    }
    Ok(())
}
