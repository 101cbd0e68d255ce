pub mod connectors;
pub mod router;
pub mod gate;
pub mod statistics;
pub mod listener;
pub mod registry;
pub mod service;

use serde::{Deserialize, Serialize};
use crate::types::ids::{InstrumentId, SourceId};
use crate::types::price::Price;
use crate::types::timestamp::Timestamp;

/// One catalog row: a redundant feed for an instrument and its preference rank
/// (0 is the most preferred).
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct SourceEntry {
    pub source_id: SourceId,
    pub instrument: InstrumentId,
    pub rank: u32,
}

impl SourceEntry {
    pub fn new(source_id: impl Into<SourceId>, instrument: impl Into<InstrumentId>, rank: u32) -> Self {
        SourceEntry {
            source_id: source_id.into(),
            instrument: instrument.into(),
            rank,
        }
    }
}

/// A price as delivered by a connector, before it is attributed to a listener.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawPriceUpdate {
    pub symbol: InstrumentId,
    pub price: Price,
    pub timestamp: Timestamp,
}
