use crate::error::Result;
use crate::types::ids::InstrumentId;
use crate::types::price::Price;

/// Downstream delivery of accepted prices.
///
/// Called from inside the publish critical section, so implementations must be
/// safe to call concurrently and return promptly.
#[cfg_attr(test, mockall::automock)]
pub trait PriceSink: Send + Sync {
    fn publish(&self, instrument: &InstrumentId, price: Price) -> Result<()>;
}

/// Sink that only records publications in the log.
#[derive(Clone, Copy, Debug, Default)]
pub struct LoggingSink;

impl PriceSink for LoggingSink {
    fn publish(&self, instrument: &InstrumentId, price: Price) -> Result<()> {
        tracing::info!(%instrument, %price, "price published");
        Ok(())
    }
}
