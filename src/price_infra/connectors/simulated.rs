use std::collections::HashMap;
use std::time::Duration;
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use tokio::time::{interval, Interval, MissedTickBehavior};
use crate::error::{Error, Result};
use crate::price_infra::connectors::PriceConnector;
use crate::price_infra::RawPriceUpdate;
use crate::types::ids::{InstrumentId, SourceId};
use crate::types::price::Price;
use crate::types::timestamp::Timestamp;

/// Random-walk feed for demos and soak runs.
///
/// Each subscribed symbol starts from its reference price and moves by at most
/// `max_step_bps` basis points per tick. Symbols are emitted round-robin.
pub struct SimulatedConnector {
    source_id: SourceId,
    period: Duration,
    max_step_bps: u32,
    reference_prices: HashMap<InstrumentId, Price>,
    current: Vec<(InstrumentId, Price)>,
    cursor: usize,
    ticker: Option<Interval>,
    rng: StdRng,
}

impl SimulatedConnector {
    pub fn new(source_id: SourceId, period: Duration, seed: u64) -> Self {
        SimulatedConnector {
            source_id,
            period,
            max_step_bps: 5,
            reference_prices: HashMap::new(),
            current: Vec::new(),
            cursor: 0,
            ticker: None,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn with_reference_price(mut self, symbol: impl Into<InstrumentId>, price: Price) -> Self {
        self.reference_prices.insert(symbol.into(), price);
        self
    }

    pub fn with_max_step_bps(mut self, bps: u32) -> Self {
        self.max_step_bps = bps;
        self
    }

    fn step(&mut self, price: Price) -> Price {
        let bps = self.max_step_bps as i64;
        let moved = self.rng.gen_range(-bps..=bps);
        let factor = Decimal::ONE + Decimal::new(moved, 4);
        Price::new((price.value() * factor).round_dp(6))
    }
}

#[async_trait]
impl PriceConnector for SimulatedConnector {
    async fn connect(&mut self, symbols: &[InstrumentId]) -> Result<()> {
        if symbols.is_empty() {
            return Err(Error::ConnectorFailed {
                source_id: self.source_id.clone(),
                reason: "no symbols to simulate".to_string(),
            });
        }

        self.current = symbols
            .iter()
            .map(|symbol| {
                let start = self
                    .reference_prices
                    .get(symbol)
                    .copied()
                    .unwrap_or_else(|| Price::from_i64(100));
                (symbol.clone(), start)
            })
            .collect();
        self.cursor = 0;

        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.ticker = Some(ticker);

        tracing::info!(source = %self.source_id, symbols = symbols.len(), "simulated feed connected");
        Ok(())
    }

    async fn next_price(&mut self) -> Result<Option<RawPriceUpdate>> {
        let ticker = self.ticker.as_mut().ok_or(Error::NotConnected)?;
        ticker.tick().await;

        let index = self.cursor % self.current.len();
        self.cursor = self.cursor.wrapping_add(1);

        let (symbol, last) = self.current[index].clone();
        let next = self.step(last);
        self.current[index].1 = next;

        Ok(Some(RawPriceUpdate {
            symbol,
            price: next,
            timestamp: Timestamp::now(),
        }))
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.ticker = None;
        tracing::info!(source = %self.source_id, "simulated feed disconnected");
        Ok(())
    }

    fn is_healthy(&self) -> bool {
        self.ticker.is_some()
    }

    fn source_id(&self) -> &SourceId {
        &self.source_id
    }
}
