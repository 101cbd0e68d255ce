use std::time::Duration;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use crate::error::{Error, Result};

pub mod loader;

/// Timing and threshold knobs for routing and publishing.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct PricingConfig {
    pub publish_heartbeat_interval_ms: u64,
    pub max_unchanged_period_ms: u64,
    pub source_switch_delay_threshold_ms: u64,
    pub price_change_threshold_percent: Decimal,
}

impl PricingConfig {
    pub fn publish_heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.publish_heartbeat_interval_ms)
    }

    pub fn max_unchanged_period(&self) -> Duration {
        Duration::from_millis(self.max_unchanged_period_ms)
    }

    pub fn source_switch_delay_threshold(&self) -> Duration {
        Duration::from_millis(self.source_switch_delay_threshold_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.publish_heartbeat_interval_ms == 0 {
            return Err(Error::ConfigError("publish_heartbeat_interval_ms must be positive".into()));
        }
        if self.max_unchanged_period_ms == 0 {
            return Err(Error::ConfigError("max_unchanged_period_ms must be positive".into()));
        }
        if self.source_switch_delay_threshold_ms == 0 {
            return Err(Error::ConfigError("source_switch_delay_threshold_ms must be positive".into()));
        }
        if self.price_change_threshold_percent.is_sign_negative() {
            return Err(Error::ConfigError(format!(
                "price_change_threshold_percent must not be negative, got {}",
                self.price_change_threshold_percent
            )));
        }
        Ok(())
    }
}

impl Default for PricingConfig {
    fn default() -> Self {
        PricingConfig {
            publish_heartbeat_interval_ms: 50,
            max_unchanged_period_ms: 150,
            source_switch_delay_threshold_ms: 60_000,  // 1 minute
            price_change_threshold_percent: Decimal::from(20),  // 20%
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub filter: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            filter: "info".to_string(),
            json: false,
        }
    }
}
