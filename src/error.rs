use thiserror::Error;
use crate::types::ids::{InstrumentId, SourceId};

#[derive(Error, Debug)]
pub enum Error {
    // Configuration Errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Source catalog is empty")]
    EmptyCatalog,

    #[error("Source {0} is listed more than once in the catalog")]
    DuplicateSource(SourceId),

    #[error("No source of instrument {0} could be connected")]
    NoLiveSources(InstrumentId),

    #[error("Duplicate rank {rank} for instrument {instrument}")]
    DuplicateRank {
        instrument: InstrumentId,
        rank: u32,
    },

    // Delivery Errors
    #[error("Price sink failed: {0}")]
    SinkFailed(String),

    #[error("Publish observer failed: {0}")]
    ObserverFailed(String),

    // Price Connector Errors
    #[error("Price connector not connected")]
    NotConnected,

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Price connector failed for {source_id}: {reason}")]
    ConnectorFailed {
        source_id: SourceId,
        reason: String,
    },

    #[error("Invalid price: {0}")]
    InvalidPrice(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::ConfigError(err.to_string())
    }
}
