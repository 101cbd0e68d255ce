use std::sync::Arc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use crate::error::Result;
use crate::interfaces::connector_factory::ConnectorFactory;
use crate::price_infra::listener::StreamListener;
use crate::types::ids::SourceId;

/// One listener per physical source, so a source is never subscribed twice.
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: DashMap<SourceId, Arc<StreamListener>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        ListenerRegistry {
            listeners: DashMap::new(),
        }
    }

    /// Return the listener for `source_id`, creating its connector on first use.
    pub fn get_or_create(
        &self,
        source_id: &SourceId,
        factory: &dyn ConnectorFactory,
    ) -> Result<Arc<StreamListener>> {
        match self.listeners.entry(source_id.clone()) {
            Entry::Occupied(existing) => Ok(existing.get().clone()),
            Entry::Vacant(slot) => {
                let connector = factory.create(source_id)?;
                if connector.source_id() != source_id {
                    tracing::warn!(source = %source_id, connector = %connector.source_id(), "connector built for a different source id");
                }
                let listener = Arc::new(StreamListener::new(source_id.clone(), connector));
                tracing::debug!(source = %source_id, "listener registered");
                Ok(slot.insert(listener).clone())
            }
        }
    }

    pub fn get(&self, source_id: &SourceId) -> Option<Arc<StreamListener>> {
        self.listeners.get(source_id).map(|entry| entry.value().clone())
    }

    /// All listeners ordered by source id.
    pub fn all(&self) -> Vec<Arc<StreamListener>> {
        let mut listeners: Vec<_> = self.listeners.iter().map(|entry| entry.value().clone()).collect();
        listeners.sort_by(|a, b| a.source_id().cmp(b.source_id()));
        listeners
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}
