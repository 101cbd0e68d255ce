pub mod clock;
pub mod connector_factory;
pub mod price_sink;
pub mod source_catalog;
