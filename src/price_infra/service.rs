use std::collections::HashMap;
use std::sync::Arc;
use futures::future::join_all;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use crate::config::PricingConfig;
use crate::error::{Error, Result};
use crate::events::price::PriceTick;
use crate::interfaces::clock::{Clock, SystemClock};
use crate::interfaces::connector_factory::ConnectorFactory;
use crate::interfaces::price_sink::PriceSink;
use crate::interfaces::source_catalog::SourceCatalog;
use crate::observability::metrics::{TICKS_DROPPED, TICKS_FORWARDED};
use crate::observability::tracing::trace_tick_processing;
use crate::price_infra::gate::{GateDecision, PublishGate, PublishObserver, PublishPolicy, PublishRecord};
use crate::price_infra::listener::{StreamListener, TickObserver};
use crate::price_infra::registry::ListenerRegistry;
use crate::price_infra::router::{group_catalog, DropReason, RouteDecision, RouterSnapshot, SourceRouter};
use crate::price_infra::statistics::{StatisticsRecord, StatisticsTracker};
use crate::types::ids::{InstrumentId, SourceId, SubscriptionId};
use crate::types::price::Price;
use crate::types::timestamp::Timestamp;
use crate::utils::helper::alert_operations_team_warning;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IngestOutcome {
    Published,
    Suppressed,
    Dropped(DropReason),
}

/// Router followed by gate; shared by every dispatched tick.
struct Pipeline {
    router: SourceRouter,
    gate: PublishGate,
}

impl Pipeline {
    async fn process(&self, tick: PriceTick) -> IngestOutcome {
        let span = trace_tick_processing(&tick.source_id, &tick.instrument);

        async move {
            let decision = self.router.evaluate(&tick.instrument, &tick.source_id, tick.price, tick.observed_at);
            match decision {
                RouteDecision::Drop(reason) => {
                    TICKS_DROPPED.inc();
                    tracing::debug!(?reason, price = %tick.price, "tick dropped by router");
                    IngestOutcome::Dropped(reason)
                }
                RouteDecision::Forward(price) => {
                    TICKS_FORWARDED.inc();
                    match self.gate.decide(&tick.instrument, price, tick.observed_at).await {
                        GateDecision::Accepted => IngestOutcome::Published,
                        GateDecision::Suppressed => IngestOutcome::Suppressed,
                    }
                }
            }
        }
        .instrument(span)
        .await
    }
}

/// Listener observer that moves each tick onto its own task so the feed's
/// delivery context never waits on routing or publishing.
struct TickDispatcher {
    pipeline: Arc<Pipeline>,
    runtime: Handle,
}

impl TickObserver for TickDispatcher {
    fn on_tick(&self, tick: PriceTick) {
        let pipeline = Arc::clone(&self.pipeline);
        self.runtime.spawn(async move {
            pipeline.process(tick).await;
        });
    }
}

/// Wires listeners to the router, the router to the gate, and the gate to
/// statistics, the sink and publish observers.
pub struct PriceIngestionService {
    settings: PricingConfig,
    pipeline: Arc<Pipeline>,
    statistics: Arc<StatisticsTracker>,
    registry: ListenerRegistry,
    subscriptions: HashMap<SourceId, Vec<InstrumentId>>,
    clock: Arc<dyn Clock>,
}

impl PriceIngestionService {
    /// Build the service from settings and the source catalog. Configuration
    /// problems are fatal; a connector that cannot be created only loses its
    /// own source, unless that leaves an instrument with none.
    ///
    /// Must be called from within a tokio runtime; dispatched ticks run on it.
    pub fn new(
        settings: PricingConfig,
        catalog: &dyn SourceCatalog,
        sink: Arc<dyn PriceSink>,
        connectors: &dyn ConnectorFactory,
    ) -> Result<Self> {
        settings.validate()?;
        let runtime = Handle::try_current()
            .map_err(|e| Error::ConfigError(format!("no tokio runtime for tick dispatch: {}", e)))?;

        let entries = catalog.sources()?;
        let catalog_by_instrument = group_catalog(&entries)?;

        // Sources without a listener are left out of routing as well.
        let registry = ListenerRegistry::new();
        let mut live_entries = Vec::with_capacity(entries.len());
        let mut subscriptions: HashMap<SourceId, Vec<InstrumentId>> = HashMap::new();
        for entry in &entries {
            match registry.get_or_create(&entry.source_id, connectors) {
                Ok(_) => {
                    subscriptions
                        .entry(entry.source_id.clone())
                        .or_default()
                        .push(entry.instrument.clone());
                    live_entries.push(entry.clone());
                }
                Err(e) => {
                    tracing::error!(source = %entry.source_id, error = %e, "failed to create listener");
                    alert_operations_team_warning(format!("source {} unavailable: {}", entry.source_id, e));
                }
            }
        }

        let mut instruments: Vec<_> = catalog_by_instrument.keys().collect();
        instruments.sort();
        for instrument in instruments {
            if !live_entries.iter().any(|entry| &entry.instrument == instrument) {
                return Err(Error::NoLiveSources(instrument.clone()));
            }
        }

        let router = SourceRouter::new(&live_entries, settings.source_switch_delay_threshold())?;
        let statistics = Arc::new(StatisticsTracker::new());
        let gate = PublishGate::new(PublishPolicy::from_config(&settings), statistics.clone(), sink);
        let pipeline = Arc::new(Pipeline { router, gate });
        let dispatcher: Arc<dyn TickObserver> = Arc::new(TickDispatcher {
            pipeline: pipeline.clone(),
            runtime,
        });
        for listener in registry.all() {
            listener.subscribe(dispatcher.clone());
        }

        tracing::info!(
            instruments = pipeline.router.instruments().count(),
            listeners = registry.len(),
            "price ingestion service initialised"
        );

        Ok(PriceIngestionService {
            settings,
            pipeline,
            statistics,
            registry,
            subscriptions,
            clock: Arc::new(SystemClock),
        })
    }

    /// Replace the clock used to stamp directly ingested ticks.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Start every listener and return how many are running. A listener that
    /// fails to start is logged and skipped.
    pub async fn start(&self, cancel: &CancellationToken) -> usize {
        let mut started = 0;
        for listener in self.registry.all() {
            if cancel.is_cancelled() {
                tracing::warn!("start-up cancelled");
                break;
            }

            let symbols = self
                .subscriptions
                .get(listener.source_id())
                .cloned()
                .unwrap_or_default();
            match listener.start(&symbols).await {
                Ok(()) => started += 1,
                Err(e) => {
                    tracing::error!(source = %listener.source_id(), error = %e, "listener failed to start");
                    alert_operations_team_warning(format!("listener {} failed to start: {}", listener.source_id(), e));
                }
            }
        }

        tracing::info!(started, total = self.registry.len(), "price ingestion started");
        started
    }

    /// Stop every listener. Each stop is attempted regardless of the others.
    pub async fn stop(&self) {
        let listeners = self.registry.all();
        let outcomes = join_all(listeners.iter().map(|listener| listener.stop())).await;

        for (listener, outcome) in listeners.iter().zip(outcomes) {
            if let Err(e) = outcome {
                tracing::error!(source = %listener.source_id(), error = %e, "listener failed to stop");
            }
        }
        tracing::info!("price ingestion stopped");
    }

    /// Route and gate a tick stamped with the service clock.
    pub async fn ingest_tick(&self, source_id: &SourceId, instrument: &InstrumentId, price: Price) -> IngestOutcome {
        let now = self.clock.now();
        self.ingest_tick_at(source_id, instrument, price, now).await
    }

    pub async fn ingest_tick_at(
        &self,
        source_id: &SourceId,
        instrument: &InstrumentId,
        price: Price,
        observed_at: Timestamp,
    ) -> IngestOutcome {
        let tick = PriceTick::new(source_id.clone(), instrument.clone(), price, observed_at);
        self.pipeline.process(tick).await
    }

    pub fn statistics(&self, instrument: &InstrumentId) -> Option<StatisticsRecord> {
        self.statistics.query(instrument)
    }

    pub fn router_state(&self, instrument: &InstrumentId) -> Option<RouterSnapshot> {
        self.pipeline.router.snapshot(instrument)
    }

    pub async fn last_published(&self, instrument: &InstrumentId) -> Option<PublishRecord> {
        self.pipeline.gate.last_accepted(instrument).await
    }

    pub fn subscribe(&self, observer: Arc<dyn PublishObserver>) -> SubscriptionId {
        self.pipeline.gate.subscribe(observer)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.pipeline.gate.unsubscribe(id)
    }

    pub fn listeners(&self) -> Vec<Arc<StreamListener>> {
        self.registry.all()
    }

    pub fn listener(&self, source_id: &SourceId) -> Option<Arc<StreamListener>> {
        self.registry.get(source_id)
    }

    pub fn instruments(&self) -> Vec<InstrumentId> {
        let mut instruments: Vec<_> = self.pipeline.router.instruments().cloned().collect();
        instruments.sort();
        instruments
    }

    pub fn settings(&self) -> &PricingConfig {
        &self.settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::price::PricePublished;
    use crate::interfaces::price_sink::{LoggingSink, MockPriceSink};
    use crate::interfaces::source_catalog::StaticCatalog;
    use crate::price_infra::connectors::channel::channel;
    use crate::price_infra::connectors::PriceConnector;
    use crate::price_infra::SourceEntry;
    use crate::utils::clock::ManualClock;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn settings() -> PricingConfig {
        PricingConfig {
            publish_heartbeat_interval_ms: 50,
            max_unchanged_period_ms: 150,
            source_switch_delay_threshold_ms: 60_000,
            price_change_threshold_percent: dec!(20),
        }
    }

    fn channel_factory(source_id: &SourceId) -> Result<Box<dyn PriceConnector>> {
        Ok(Box::new(channel(source_id.clone()).1))
    }

    fn catalog() -> StaticCatalog {
        let mut entries = Vec::new();
        for symbol in ["AAPL", "EURUSD"] {
            for (rank, name) in ["PrimarySource", "SecondarySource", "ThirdSource"].iter().enumerate() {
                entries.push(SourceEntry::new(format!("{}-{}", symbol, name), symbol, rank as u32));
            }
        }
        StaticCatalog::new(entries)
    }

    fn p(value: Decimal) -> Price {
        Price::new(value)
    }

    fn service() -> PriceIngestionService {
        PriceIngestionService::new(settings(), &catalog(), Arc::new(LoggingSink), &channel_factory).unwrap()
    }

    /// Move AAPL's turn to the secondary source so its ticks are forwarded.
    async fn arm(service: &PriceIngestionService, at: u64) -> SourceId {
        let aapl = InstrumentId::from("AAPL");
        service
            .ingest_tick_at(&SourceId::from("AAPL-PrimarySource"), &aapl, p(dec!(1)), Timestamp::from_millis(at))
            .await;
        SourceId::from("AAPL-SecondarySource")
    }

    #[tokio::test]
    async fn creates_one_listener_per_source() {
        let service = service();

        assert_eq!(service.listeners().len(), 6);
        assert!(service.listener(&SourceId::from("AAPL-PrimarySource")).is_some());
        for listener in service.listeners() {
            assert_eq!(listener.observer_count(), 1);
        }
        assert_eq!(service.instruments(), vec![InstrumentId::from("AAPL"), InstrumentId::from("EURUSD")]);
    }

    #[tokio::test]
    async fn unchanged_price_is_published_once() {
        let service = service();
        let source = arm(&service, 1_000).await;
        let aapl = InstrumentId::from("AAPL");

        assert_eq!(
            service.ingest_tick_at(&source, &aapl, p(dec!(150)), Timestamp::from_millis(1_010)).await,
            IngestOutcome::Published
        );
        assert_eq!(
            service.ingest_tick_at(&source, &aapl, p(dec!(150)), Timestamp::from_millis(1_020)).await,
            IngestOutcome::Suppressed
        );
    }

    #[tokio::test]
    async fn statistics_follow_published_prices() {
        let service = service();
        let source = arm(&service, 1_000).await;
        let aapl = InstrumentId::from("AAPL");

        assert!(service.statistics(&aapl).is_none());
        service.ingest_tick_at(&source, &aapl, p(dec!(150)), Timestamp::from_millis(1_010)).await;
        service.ingest_tick_at(&source, &aapl, p(dec!(190)), Timestamp::from_millis(1_020)).await;

        let stats = service.statistics(&aapl).unwrap();
        assert_eq!(stats.min_price, p(dec!(150)));
        assert_eq!(stats.max_price, p(dec!(190)));
        assert_eq!(stats.max_fluctuation, p(dec!(40)));
    }

    #[tokio::test]
    async fn observers_see_published_prices() {
        let service = service();
        let source = arm(&service, 1_000).await;
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let captured = seen.clone();
        service.subscribe(Arc::new(move |event: &PricePublished| -> Result<()> {
            captured.lock().push((event.instrument.clone(), event.price));
            Ok(())
        }));

        service
            .ingest_tick_at(&source, &InstrumentId::from("AAPL"), p(dec!(105)), Timestamp::from_millis(1_001))
            .await;

        assert_eq!(*seen.lock(), vec![(InstrumentId::from("AAPL"), p(dec!(105)))]);
    }

    #[tokio::test]
    async fn ingest_tick_uses_service_clock() {
        let clock = Arc::new(ManualClock::new(Timestamp::from_millis(5_000)));
        let service = service().with_clock(clock.clone());
        let source = arm(&service, 5_000).await;
        let aapl = InstrumentId::from("AAPL");

        clock.advance(Duration::from_millis(10));
        assert_eq!(service.ingest_tick(&source, &aapl, p(dec!(10))).await, IngestOutcome::Published);
        assert_eq!(service.last_published(&aapl).await.unwrap().accepted_at, Timestamp::from_millis(5_010));
    }

    #[tokio::test]
    async fn sink_failure_is_contained() {
        let mut sink = MockPriceSink::new();
        sink.expect_publish()
            .times(2)
            .returning(|_, _| Err(Error::SinkFailed("offline".into())));
        let service = PriceIngestionService::new(settings(), &catalog(), Arc::new(sink), &channel_factory).unwrap();
        let source = arm(&service, 1_000).await;
        let aapl = InstrumentId::from("AAPL");

        service.ingest_tick_at(&source, &aapl, p(dec!(100)), Timestamp::from_millis(1_001)).await;
        let second = service.ingest_tick_at(&source, &aapl, p(dec!(200)), Timestamp::from_millis(1_002)).await;

        assert_eq!(second, IngestOutcome::Published);
        assert_eq!(service.statistics(&aapl).unwrap().sample_count, 2);
    }

    #[tokio::test]
    async fn rejects_bad_configuration() {
        let empty = StaticCatalog::new(Vec::new());
        let outcome = PriceIngestionService::new(settings(), &empty, Arc::new(LoggingSink), &channel_factory);
        assert!(matches!(outcome, Err(Error::EmptyCatalog)));

        let invalid = PricingConfig {
            source_switch_delay_threshold_ms: 0,
            ..settings()
        };
        let outcome = PriceIngestionService::new(invalid, &catalog(), Arc::new(LoggingSink), &channel_factory);
        assert!(matches!(outcome, Err(Error::ConfigError(_))));
    }

    #[test]
    fn requires_a_runtime() {
        let outcome = PriceIngestionService::new(settings(), &catalog(), Arc::new(LoggingSink), &channel_factory);
        assert!(matches!(outcome, Err(Error::ConfigError(_))));
    }

    #[tokio::test]
    async fn failing_connector_only_loses_its_source() {
        let factory = failing_for(&["AAPL-ThirdSource"]);
        let service = PriceIngestionService::new(settings(), &catalog(), Arc::new(LoggingSink), &factory).unwrap();

        assert_eq!(service.listeners().len(), 5);
        assert_eq!(service.start(&CancellationToken::new()).await, 5);
        service.stop().await;
    }

    fn failing_for(dead: &'static [&'static str]) -> impl Fn(&SourceId) -> Result<Box<dyn PriceConnector>> + Send + Sync {
        move |source_id: &SourceId| {
            if dead.contains(&source_id.as_str()) {
                return Err(Error::ConnectorFailed {
                    source_id: source_id.clone(),
                    reason: "no route".into(),
                });
            }
            channel_factory(source_id)
        }
    }

    #[tokio::test]
    async fn failover_skips_source_without_listener() {
        let entries = StaticCatalog::new(vec![
            SourceEntry::new("a", "EURUSD", 0),
            SourceEntry::new("b", "EURUSD", 1),
            SourceEntry::new("c", "EURUSD", 2),
        ]);
        let factory = failing_for(&["c"]);
        let service = PriceIngestionService::new(settings(), &entries, Arc::new(LoggingSink), &factory).unwrap();
        let eurusd = InstrumentId::from("EURUSD");
        let (a, b) = (SourceId::from("a"), SourceId::from("b"));

        assert!(service.listener(&SourceId::from("c")).is_none());
        service.ingest_tick_at(&a, &eurusd, p(dec!(1)), Timestamp::from_millis(1_000)).await;
        assert_eq!(
            service.ingest_tick_at(&b, &eurusd, p(dec!(1)), Timestamp::from_millis(2_000)).await,
            IngestOutcome::Published
        );

        // "b" goes stale; the turn must come back to "a", not to the dead "c".
        assert_eq!(
            service.ingest_tick_at(&b, &eurusd, p(dec!(1)), Timestamp::from_millis(62_000)).await,
            IngestOutcome::Dropped(DropReason::Failover { from_rank: 1, to_rank: 0 })
        );
        assert_eq!(service.router_state(&eurusd).unwrap().in_turn_source, a);
        assert_eq!(
            service.ingest_tick_at(&a, &eurusd, p(dec!(2)), Timestamp::from_millis(62_001)).await,
            IngestOutcome::Published
        );
    }

    #[tokio::test]
    async fn instrument_without_any_listener_is_fatal() {
        let entries = StaticCatalog::new(vec![
            SourceEntry::new("eur-a", "EURUSD", 0),
            SourceEntry::new("jpy-a", "USDJPY", 0),
            SourceEntry::new("jpy-b", "USDJPY", 1),
        ]);
        let factory = failing_for(&["jpy-a", "jpy-b"]);

        let outcome = PriceIngestionService::new(settings(), &entries, Arc::new(LoggingSink), &factory);
        assert!(matches!(outcome, Err(Error::NoLiveSources(instrument)) if instrument.as_str() == "USDJPY"));
    }

    #[tokio::test]
    async fn first_tick_fails_over_whatever_the_clock_origin() {
        let service = service();
        let aapl = InstrumentId::from("AAPL");
        assert_eq!(service.router_state(&aapl).unwrap().last_update, None);

        assert_eq!(
            service
                .ingest_tick_at(&SourceId::from("AAPL-PrimarySource"), &aapl, p(dec!(1)), Timestamp::from_millis(1))
                .await,
            IngestOutcome::Dropped(DropReason::Failover { from_rank: 0, to_rank: 1 })
        );
    }

    #[tokio::test]
    async fn cancelled_start_starts_nothing() {
        let service = service();
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert_eq!(service.start(&cancel).await, 0);
        assert!(service.listeners().iter().all(|l| !l.is_running()));
    }
}
