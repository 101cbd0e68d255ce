pub mod events;
pub mod utils;
pub mod types;
pub mod price_infra;
pub mod error;
pub mod config;
pub mod observability;
pub mod interfaces;
