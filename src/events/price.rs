use serde::{Deserialize, Serialize};
use crate::types::ids::{InstrumentId, SourceId};
use crate::types::price::Price;
use crate::types::timestamp::Timestamp;

/// A single price observation raised by a stream listener.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceTick {
    pub source_id: SourceId,
    pub instrument: InstrumentId,
    pub price: Price,
    pub observed_at: Timestamp,
}

impl PriceTick {
    pub fn new(
        source_id: SourceId,
        instrument: InstrumentId,
        price: Price,
        observed_at: Timestamp,
    ) -> Self {
        PriceTick { source_id, instrument, price, observed_at }
    }
}

/// Emitted once the publish gate accepts a price.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricePublished {
    pub instrument: InstrumentId,
    pub price: Price,
    pub published_at: Timestamp,
}
