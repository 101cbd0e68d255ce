use crate::config::{LoggingConfig, PricingConfig};
use crate::error::{Error, Result};
use crate::interfaces::source_catalog::StaticCatalog;
use crate::price_infra::SourceEntry;
use config::{Config, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub pricing: PricingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub sources: Vec<SourceEntry>,
}

impl AppConfig {
    pub fn load(env: &str) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::with_name("config/default"))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(Environment::with_prefix("PRICEFEED").separator("__"))
            .build()?;

        let app: AppConfig = config.try_deserialize()?;
        app.pricing.validate()?;
        Ok(app)
    }

    /// Parse a TOML document directly, without file or environment layering.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let app: AppConfig = toml::from_str(raw)
            .map_err(|e| Error::ConfigError(e.to_string()))?;
        app.pricing.validate()?;
        Ok(app)
    }

    pub fn catalog(&self) -> StaticCatalog {
        StaticCatalog::new(self.sources.clone())
    }
}
