use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use crate::error::{Error, Result};
use crate::events::price::PriceTick;
use crate::observability::metrics::TICKS_RECEIVED;
use crate::price_infra::connectors::PriceConnector;
use crate::types::ids::{InstrumentId, SourceId};
use crate::types::price::Price;
use crate::types::timestamp::Timestamp;
use crate::utils::helper::alert_operations_team_warning;

/// Receives every tick a listener raises. Runs on the feed's delivery
/// context, so implementations must hand work off instead of blocking.
pub trait TickObserver: Send + Sync {
    fn on_tick(&self, tick: PriceTick);
}

impl<F> TickObserver for F
where
    F: Fn(PriceTick) + Send + Sync,
{
    fn on_tick(&self, tick: PriceTick) {
        self(tick)
    }
}

struct Pump {
    cancel: CancellationToken,
    handle: JoinHandle<Box<dyn PriceConnector>>,
}

struct ListenerInner {
    // Taken by the pump task while running, handed back on stop.
    connector: Option<Box<dyn PriceConnector>>,
    pump: Option<Pump>,
}

/// Subscription to one physical price source.
pub struct StreamListener {
    source_id: SourceId,
    observers: RwLock<Vec<Arc<dyn TickObserver>>>,
    accepting: AtomicBool,
    inner: Mutex<ListenerInner>,
}

impl StreamListener {
    pub fn new(source_id: SourceId, connector: Box<dyn PriceConnector>) -> Self {
        StreamListener {
            source_id,
            observers: RwLock::new(Vec::new()),
            accepting: AtomicBool::new(false),
            inner: Mutex::new(ListenerInner {
                connector: Some(connector),
                pump: None,
            }),
        }
    }

    pub fn source_id(&self) -> &SourceId {
        &self.source_id
    }

    pub fn subscribe(&self, observer: Arc<dyn TickObserver>) {
        self.observers.write().push(observer);
    }

    pub fn observer_count(&self) -> usize {
        self.observers.read().len()
    }

    pub fn is_running(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    /// Connect the feed for `symbols` and start raising ticks. Calling it on a
    /// running listener is a no-op.
    pub async fn start(self: &Arc<Self>, symbols: &[InstrumentId]) -> Result<()> {
        let mut inner = self.inner.lock().await;

        if let Some(pump) = inner.pump.take() {
            if !pump.handle.is_finished() {
                inner.pump = Some(pump);
                tracing::debug!(source = %self.source_id, "listener already started");
                return Ok(());
            }
            // The feed ended on its own; reclaim the connector and reconnect.
            inner.connector = Self::reclaim(&self.source_id, pump).await;
        }

        let mut connector = inner.connector.take().ok_or_else(|| Error::ConnectorFailed {
            source_id: self.source_id.clone(),
            reason: "connector lost after a failed pump".to_string(),
        })?;

        if let Err(e) = connector.connect(symbols).await {
            inner.connector = Some(connector);
            return Err(e);
        }

        if !connector.is_healthy() {
            tracing::warn!(source = %self.source_id, "connector reports unhealthy right after connect");
        }

        // Accept before spawning: a feed that closes at once must leave us stopped.
        self.accepting.store(true, Ordering::SeqCst);
        let cancel = CancellationToken::new();
        let listener = Arc::clone(self);
        let handle = tokio::spawn(listener.pump(connector, cancel.clone()));
        inner.pump = Some(Pump { cancel, handle });

        tracing::info!(source = %self.source_id, ?symbols, "listener started");
        Ok(())
    }

    /// Tear down the feed subscription. Safe to call when never started or
    /// already stopped.
    pub async fn stop(&self) -> Result<()> {
        self.accepting.store(false, Ordering::SeqCst);

        let mut inner = self.inner.lock().await;
        let Some(pump) = inner.pump.take() else {
            return Ok(());
        };

        pump.cancel.cancel();
        inner.connector = Self::reclaim(&self.source_id, pump).await;
        if inner.connector.is_none() {
            return Err(Error::ConnectorFailed {
                source_id: self.source_id.clone(),
                reason: "pump task failed".to_string(),
            });
        }

        tracing::info!(source = %self.source_id, "listener stopped");
        Ok(())
    }

    /// Hand a price to every observer. Callable from any thread; dropped once
    /// the listener is stopped.
    pub fn raise_tick(&self, instrument: InstrumentId, price: Price, observed_at: Timestamp) {
        if !self.accepting.load(Ordering::SeqCst) {
            tracing::trace!(source = %self.source_id, %instrument, "listener stopped, tick ignored");
            return;
        }
        TICKS_RECEIVED.inc();

        let tick = PriceTick::new(self.source_id.clone(), instrument, price, observed_at);
        let observers: Vec<_> = self.observers.read().clone();
        for observer in observers {
            observer.on_tick(tick.clone());
        }
    }

    async fn pump(
        self: Arc<Self>,
        mut connector: Box<dyn PriceConnector>,
        cancel: CancellationToken,
    ) -> Box<dyn PriceConnector> {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                next = connector.next_price() => match next {
                    Ok(Some(update)) => self.raise_tick(update.symbol, update.price, update.timestamp),
                    Ok(None) => {
                        alert_operations_team_warning(format!("price feed {} closed", self.source_id));
                        break;
                    }
                    Err(Error::InvalidPrice(reason)) => {
                        tracing::warn!(source = %self.source_id, %reason, "skipping malformed price");
                    }
                    Err(e) => {
                        alert_operations_team_warning(format!("price feed {} failed: {}", self.source_id, e));
                        break;
                    }
                },
            }
        }

        self.accepting.store(false, Ordering::SeqCst);
        if let Err(e) = connector.disconnect().await {
            tracing::warn!(source = %self.source_id, error = %e, "disconnect failed");
        }
        connector
    }

    async fn reclaim(source_id: &SourceId, pump: Pump) -> Option<Box<dyn PriceConnector>> {
        match pump.handle.await {
            Ok(connector) => Some(connector),
            Err(e) => {
                tracing::error!(source = %source_id, error = %e, "listener pump task failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::price_infra::connectors::channel::channel;
    use crate::price_infra::connectors::MockPriceConnector;
    use rust_decimal_macros::dec;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn collecting(listener: &StreamListener) -> mpsc::UnboundedReceiver<PriceTick> {
        let (tx, rx) = mpsc::unbounded_channel();
        listener.subscribe(Arc::new(move |tick: PriceTick| {
            let _ = tx.send(tick);
        }));
        rx
    }

    #[test]
    fn raise_tick_notifies_observers_only_while_running() {
        let (_feed, connector) = channel("stream1");
        let listener = StreamListener::new(SourceId::from("stream1"), Box::new(connector));
        let mut rx = collecting(&listener);

        listener.raise_tick(InstrumentId::from("StockA"), Price::new(dec!(105)), Timestamp::from_millis(1));
        assert!(rx.try_recv().is_err());

        listener.accepting.store(true, Ordering::SeqCst);
        listener.raise_tick(InstrumentId::from("StockA"), Price::new(dec!(105)), Timestamp::from_millis(1));

        let tick = rx.try_recv().unwrap();
        assert_eq!(tick.source_id, SourceId::from("stream1"));
        assert_eq!(tick.price, Price::new(dec!(105)));
    }

    #[tokio::test]
    async fn pumps_feed_ticks_to_observers() {
        let (feed, connector) = channel("stream1");
        let listener = Arc::new(StreamListener::new(SourceId::from("stream1"), Box::new(connector)));
        let mut rx = collecting(&listener);

        listener.start(&[InstrumentId::from("EURUSD")]).await.unwrap();
        feed.push("EURUSD", Price::new(dec!(1.085)), Timestamp::from_millis(5)).unwrap();

        let tick = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
        assert_eq!(tick.instrument, InstrumentId::from("EURUSD"));
        assert_eq!(tick.observed_at, Timestamp::from_millis(5));

        listener.stop().await.unwrap();
    }

    #[tokio::test]
    async fn start_is_idempotent() {
        let (feed, connector) = channel("s");
        let listener = Arc::new(StreamListener::new(SourceId::from("s"), Box::new(connector)));
        let mut rx = collecting(&listener);
        let eurusd = [InstrumentId::from("EURUSD")];

        listener.start(&eurusd).await.unwrap();
        listener.start(&eurusd).await.unwrap();
        assert!(listener.is_running());

        feed.push("EURUSD", Price::new(dec!(1.1)), Timestamp::from_millis(1)).unwrap();
        tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(rx.try_recv().is_err());

        listener.stop().await.unwrap();
    }

    #[tokio::test]
    async fn stop_without_start_is_a_no_op() {
        let (_feed, connector) = channel("s");
        let listener = StreamListener::new(SourceId::from("s"), Box::new(connector));

        listener.stop().await.unwrap();
        listener.stop().await.unwrap();
        assert!(!listener.is_running());
    }

    #[tokio::test]
    async fn stopped_listener_ignores_feed_and_can_restart() {
        let (feed, connector) = channel("s");
        let listener = Arc::new(StreamListener::new(SourceId::from("s"), Box::new(connector)));
        let mut rx = collecting(&listener);
        let eurusd = [InstrumentId::from("EURUSD")];

        listener.start(&eurusd).await.unwrap();
        listener.stop().await.unwrap();
        listener.stop().await.unwrap();

        listener.raise_tick(InstrumentId::from("EURUSD"), Price::new(dec!(1)), Timestamp::from_millis(1));
        assert!(rx.try_recv().is_err());

        listener.start(&eurusd).await.unwrap();
        feed.push("EURUSD", Price::new(dec!(2)), Timestamp::from_millis(2)).unwrap();
        let tick = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
        assert_eq!(tick.price, Price::new(dec!(2)));
        listener.stop().await.unwrap();
    }

    #[tokio::test]
    async fn closed_feed_marks_listener_stopped() {
        let (feed, connector) = channel("s");
        let listener = Arc::new(StreamListener::new(SourceId::from("s"), Box::new(connector)));
        let mut rx = collecting(&listener);
        let eurusd = [InstrumentId::from("EURUSD")];

        listener.start(&eurusd).await.unwrap();
        drop(feed);
        tokio::time::timeout(Duration::from_secs(1), async {
            while listener.is_running() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        listener.raise_tick(InstrumentId::from("EURUSD"), Price::new(dec!(1)), Timestamp::from_millis(1));
        assert!(rx.try_recv().is_err());
        listener.stop().await.unwrap();
    }

    #[tokio::test]
    async fn failed_connect_keeps_connector_for_retry() {
        let mut connector = MockPriceConnector::new();
        let mut attempts = 0;
        connector.expect_connect().times(2).returning(move |_| {
            attempts += 1;
            if attempts == 1 {
                Err(Error::NotConnected)
            } else {
                Ok(())
            }
        });
        connector.expect_next_price().returning(|| Ok(None));
        connector.expect_disconnect().returning(|| Ok(()));
        connector.expect_is_healthy().return_const(true);
        let listener = Arc::new(StreamListener::new(SourceId::from("s"), Box::new(connector)));

        assert!(listener.start(&[InstrumentId::from("EURUSD")]).await.is_err());
        assert!(!listener.is_running());
        assert!(listener.start(&[InstrumentId::from("EURUSD")]).await.is_ok());
        listener.stop().await.unwrap();
    }
}
