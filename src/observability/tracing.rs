use tracing::Span;
use tracing_subscriber::EnvFilter;
use crate::config::LoggingConfig;
use crate::error::{Error, Result};
use crate::types::ids::{InstrumentId, SourceId};

/// Install the global subscriber. `RUST_LOG` overrides the configured filter.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .map_err(|e| Error::ConfigError(format!("invalid log filter: {}", e)))?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    installed.map_err(|e| Error::ConfigError(format!("tracing init failed: {}", e)))
}

pub fn trace_tick_processing(source_id: &SourceId, instrument: &InstrumentId) -> Span {
    tracing::info_span!(
        "tick_processing",
        source = %source_id,
        instrument = %instrument,
    )
}
