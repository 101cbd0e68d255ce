use std::collections::HashSet;
use async_trait::async_trait;
use tokio::sync::mpsc;
use crate::error::{Error, Result};
use crate::price_infra::connectors::PriceConnector;
use crate::price_infra::RawPriceUpdate;
use crate::types::ids::{InstrumentId, SourceId};
use crate::types::price::Price;
use crate::types::timestamp::Timestamp;

/// Producer half of an in-process feed. Pushing never blocks, so it can be
/// driven from any thread.
#[derive(Clone, Debug)]
pub struct ChannelFeed {
    tx: mpsc::UnboundedSender<RawPriceUpdate>,
}

impl ChannelFeed {
    pub fn push(&self, symbol: impl Into<InstrumentId>, price: Price, timestamp: Timestamp) -> Result<()> {
        self.tx
            .send(RawPriceUpdate {
                symbol: symbol.into(),
                price,
                timestamp,
            })
            .map_err(|_| Error::ConnectionClosed)
    }
}

/// Connector fed by a [`ChannelFeed`].
pub struct ChannelConnector {
    source_id: SourceId,
    rx: mpsc::UnboundedReceiver<RawPriceUpdate>,
    symbols: HashSet<InstrumentId>,
    connected: bool,
}

/// Create a connected feed/connector pair for `source_id`.
pub fn channel(source_id: impl Into<SourceId>) -> (ChannelFeed, ChannelConnector) {
    let source_id = source_id.into();
    let (tx, rx) = mpsc::unbounded_channel();
    let feed = ChannelFeed { tx };
    let connector = ChannelConnector {
        source_id,
        rx,
        symbols: HashSet::new(),
        connected: false,
    };
    (feed, connector)
}

#[async_trait]
impl PriceConnector for ChannelConnector {
    async fn connect(&mut self, symbols: &[InstrumentId]) -> Result<()> {
        self.symbols = symbols.iter().cloned().collect();
        self.connected = true;
        tracing::debug!(source = %self.source_id, symbols = symbols.len(), "channel feed connected");
        Ok(())
    }

    async fn next_price(&mut self) -> Result<Option<RawPriceUpdate>> {
        if !self.connected {
            return Err(Error::NotConnected);
        }

        while let Some(update) = self.rx.recv().await {
            if self.symbols.contains(&update.symbol) {
                return Ok(Some(update));
            }
            tracing::trace!(source = %self.source_id, symbol = %update.symbol, "ignoring unsubscribed symbol");
        }
        Ok(None)
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.connected = false;
        self.symbols.clear();
        Ok(())
    }

    fn is_healthy(&self) -> bool {
        self.connected
    }

    fn source_id(&self) -> &SourceId {
        &self.source_id
    }
}
