use dashmap::DashMap;
use serde::Serialize;
use crate::types::ids::InstrumentId;
use crate::types::price::Price;

/// Running aggregate of accepted prices for one instrument.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct StatisticsRecord {
    pub max_price: Price,
    pub min_price: Price,
    /// Largest distance of any accepted price above the running minimum at the
    /// time it was accepted. Not the global max-min spread.
    pub max_fluctuation: Price,
    pub last_price: Price,
    pub sample_count: u64,
}

impl StatisticsRecord {
    pub fn new() -> Self {
        StatisticsRecord {
            max_price: Price::MIN,
            min_price: Price::MAX,
            max_fluctuation: Price::zero(),
            last_price: Price::zero(),
            sample_count: 0,
        }
    }

    pub fn update(&mut self, price: Price) {
        self.max_price = self.max_price.max(price);
        self.min_price = self.min_price.min(price);
        // Order matters: measured against the minimum that already includes `price`.
        self.max_fluctuation = self.max_fluctuation.max((price - self.min_price).abs());
        self.last_price = price;
        self.sample_count += 1;
    }
}

impl Default for StatisticsRecord {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-instrument statistics, created on the first accepted price.
#[derive(Debug, Default)]
pub struct StatisticsTracker {
    records: DashMap<InstrumentId, StatisticsRecord>,
}

impl StatisticsTracker {
    pub fn new() -> Self {
        StatisticsTracker {
            records: DashMap::new(),
        }
    }

    pub fn update(&self, instrument: &InstrumentId, price: Price) {
        self.records
            .entry(instrument.clone())
            .or_default()
            .update(price);
    }

    pub fn query(&self, instrument: &InstrumentId) -> Option<StatisticsRecord> {
        self.records.get(instrument).map(|record| *record)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
