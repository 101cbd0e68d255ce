use crate::error::Result;
use crate::price_infra::connectors::PriceConnector;
use crate::types::ids::SourceId;

/// Creates the transport connector behind a physical source.
pub trait ConnectorFactory: Send + Sync {
    fn create(&self, source_id: &SourceId) -> Result<Box<dyn PriceConnector>>;
}

impl<F> ConnectorFactory for F
where
    F: Fn(&SourceId) -> Result<Box<dyn PriceConnector>> + Send + Sync,
{
    fn create(&self, source_id: &SourceId) -> Result<Box<dyn PriceConnector>> {
        self(source_id)
    }
}
