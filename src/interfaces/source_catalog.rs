use crate::error::Result;
use crate::price_infra::SourceEntry;

/// Lookup of every known price source and its rank.
pub trait SourceCatalog: Send + Sync {
    fn sources(&self) -> Result<Vec<SourceEntry>>;
}

/// Catalog backed by a fixed list, typically the `sources` table of the config file.
#[derive(Clone, Debug, Default)]
pub struct StaticCatalog {
    entries: Vec<SourceEntry>,
}

impl StaticCatalog {
    pub fn new(entries: Vec<SourceEntry>) -> Self {
        StaticCatalog { entries }
    }
}

impl SourceCatalog for StaticCatalog {
    fn sources(&self) -> Result<Vec<SourceEntry>> {
        Ok(self.entries.clone())
    }
}
