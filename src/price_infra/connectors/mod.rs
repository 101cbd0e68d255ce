pub mod channel;
pub mod simulated;

use async_trait::async_trait;
use crate::price_infra::RawPriceUpdate;
use crate::error::Result;
use crate::types::ids::{InstrumentId, SourceId};

/// Transport for one physical price source.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceConnector: Send + Sync {
    async fn connect(&mut self, symbols: &[InstrumentId]) -> Result<()>;
    /// Next price from the feed; `Ok(None)` once the feed has closed.
    async fn next_price(&mut self) -> Result<Option<RawPriceUpdate>>;
    async fn disconnect(&mut self) -> Result<()>;
    fn is_healthy(&self) -> bool;
    fn source_id(&self) -> &SourceId;
}
