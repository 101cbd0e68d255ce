use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::Mutex;
use crate::config::PricingConfig;
use crate::error::{Error, Result};
use crate::events::price::PricePublished;
use crate::interfaces::price_sink::PriceSink;
use crate::observability::metrics::{OBSERVER_ERRORS, PRICES_PUBLISHED, PRICES_SUPPRESSED, SINK_ERRORS};
use crate::price_infra::statistics::StatisticsTracker;
use crate::types::ids::{InstrumentId, SubscriptionId};
use crate::types::price::Price;
use crate::types::timestamp::Timestamp;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateDecision {
    Accepted,
    Suppressed,
}

/// Last price the gate let through for an instrument.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct PublishRecord {
    pub price: Price,
    pub accepted_at: Timestamp,
}

/// Notified synchronously, in registration order, on every accepted price.
pub trait PublishObserver: Send + Sync {
    fn on_price_published(&self, event: &PricePublished) -> Result<()>;
}

impl<F> PublishObserver for F
where
    F: Fn(&PricePublished) -> Result<()> + Send + Sync,
{
    fn on_price_published(&self, event: &PricePublished) -> Result<()> {
        self(event)
    }
}

/// Change-threshold and timing rules for publishing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublishPolicy {
    pub heartbeat_interval: Duration,
    pub max_unchanged_period: Duration,
    pub change_threshold_percent: Decimal,
}

impl PublishPolicy {
    pub fn from_config(config: &PricingConfig) -> Self {
        PublishPolicy {
            heartbeat_interval: config.publish_heartbeat_interval(),
            max_unchanged_period: config.max_unchanged_period(),
            change_threshold_percent: config.price_change_threshold_percent,
        }
    }

    /// A price that moved by at least the threshold is always published. An
    /// unchanged price is only republished as a heartbeat once the unchanged
    /// window has been exceeded.
    pub fn should_publish(&self, previous: Option<&PublishRecord>, price: Price, now: Timestamp) -> bool {
        let Some(previous) = previous else {
            return true;
        };

        let price_changed = match price.change_percent_from(previous.price) {
            Some(percent) => percent >= self.change_threshold_percent,
            None => true,
        };
        let since_last = now - previous.accepted_at;
        let heartbeat_due = since_last >= self.heartbeat_interval;
        let within_unchanged_window = since_last <= self.max_unchanged_period;

        (price_changed || heartbeat_due) && !(!price_changed && within_unchanged_window)
    }
}

/// Accept-or-suppress decision plus the resulting side effects.
///
/// Every decision runs under one gate-wide lock, across all instruments, so the
/// read-modify-write of a publish record can never interleave.
pub struct PublishGate {
    policy: PublishPolicy,
    records: Mutex<HashMap<InstrumentId, PublishRecord>>,
    statistics: Arc<StatisticsTracker>,
    sink: Arc<dyn PriceSink>,
    observers: RwLock<Vec<(SubscriptionId, Arc<dyn PublishObserver>)>>,
}

impl PublishGate {
    pub fn new(policy: PublishPolicy, statistics: Arc<StatisticsTracker>, sink: Arc<dyn PriceSink>) -> Self {
        PublishGate {
            policy,
            records: Mutex::new(HashMap::new()),
            statistics,
            sink,
            observers: RwLock::new(Vec::new()),
        }
    }

    pub async fn decide(&self, instrument: &InstrumentId, price: Price, now: Timestamp) -> GateDecision {
        let mut records = self.records.lock().await;

        if !self.policy.should_publish(records.get(instrument), price, now) {
            PRICES_SUPPRESSED.inc();
            tracing::debug!(%instrument, %price, "price suppressed");
            return GateDecision::Suppressed;
        }

        records.insert(instrument.clone(), PublishRecord { price, accepted_at: now });
        self.statistics.update(instrument, price);

        self.deliver_to_sink(instrument, price);
        self.notify(&PricePublished {
            instrument: instrument.clone(),
            price,
            published_at: now,
        });

        PRICES_PUBLISHED.inc();
        tracing::info!(%instrument, %price, "price accepted for publishing");
        GateDecision::Accepted
    }

    pub async fn last_accepted(&self, instrument: &InstrumentId) -> Option<PublishRecord> {
        self.records.lock().await.get(instrument).copied()
    }

    pub fn subscribe(&self, observer: Arc<dyn PublishObserver>) -> SubscriptionId {
        let id = SubscriptionId::new();
        self.observers.write().push((id, observer));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut observers = self.observers.write();
        let before = observers.len();
        observers.retain(|(existing, _)| *existing != id);
        observers.len() != before
    }

    pub fn observer_count(&self) -> usize {
        self.observers.read().len()
    }

    fn deliver_to_sink(&self, instrument: &InstrumentId, price: Price) {
        let outcome = catch_unwind(AssertUnwindSafe(|| self.sink.publish(instrument, price)))
            .unwrap_or_else(|_| Err(Error::SinkFailed("sink panicked".to_string())));

        if let Err(e) = outcome {
            SINK_ERRORS.inc();
            tracing::error!(%instrument, %price, error = %e, "price sink delivery failed");
        }
    }

    fn notify(&self, event: &PricePublished) {
        // Snapshot so observers may (un)subscribe from inside the callback.
        let observers: Vec<_> = self.observers.read().clone();

        for (id, observer) in observers {
            let outcome = catch_unwind(AssertUnwindSafe(|| observer.on_price_published(event)))
                .unwrap_or_else(|_| Err(Error::ObserverFailed("observer panicked".to_string())));

            if let Err(e) = outcome {
                OBSERVER_ERRORS.inc();
                tracing::error!(subscription = %id, instrument = %event.instrument, error = %e, "publish observer failed");
            }
        }
    }
}
