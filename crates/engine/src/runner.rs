use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use bus::{EventBus, MessageHandler};
use common::{token_channel, Observation, Result};
use strategy::{Strategy, StrategyRegistry};

use crate::executor::{Outcome, TradeExecutor};

/// Bus handler that feeds one strategy and forwards its signals to the
/// executor.
pub struct StrategyHandler {
    name: String,
    strategy: Arc<dyn Strategy>,
    executor: Arc<TradeExecutor>,
    observers: Vec<Arc<dyn MessageHandler>>,
}

impl StrategyHandler {
    pub fn new(strategy: Arc<dyn Strategy>, executor: Arc<TradeExecutor>) -> Self {
        Self {
            name: format!("strategy:{}", strategy.name()),
            strategy,
            executor,
            observers: Vec::new(),
        }
    }

    /// Run `observers` on each message, in order, before the strategy sees it.
    pub fn with_observers(mut self, observers: Vec<Arc<dyn MessageHandler>>) -> Self {
        self.observers = observers;
        self
    }
}

#[async_trait]
impl MessageHandler for StrategyHandler {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, channel: &str, message: Arc<Value>) -> Result<()> {
        for observer in &self.observers {
            if let Err(e) = observer.handle(channel, message.clone()).await {
                warn!(channel, observer = observer.name(), error = %e, "Observer failed");
            }
        }

        let observation = Observation::new((*message).clone());
        let Some(signal) = self.strategy.evaluate(&observation) else {
            return Ok(());
        };

        info!(
            strategy = %self.strategy.name(),
            action = %signal.action,
            token = %signal.token,
            amount = %signal.amount,
            "Signal emitted"
        );
        match self.executor.handle_signal(&signal).await {
            Outcome::Executed(tx) => debug!(tx = %tx, "Signal executed"),
            other => debug!(outcome = ?other, "Signal not executed"),
        }
        Ok(())
    }
}

/// Wires every registered strategy onto its `token_data:<pair>` channel and
/// tears the wiring down again on shutdown.
pub struct Runner {
    bus: Arc<EventBus>,
    registry: StrategyRegistry,
    executor: Arc<TradeExecutor>,
    observers: Vec<Arc<dyn MessageHandler>>,
    subscriptions: Mutex<Vec<(String, Arc<dyn MessageHandler>)>>,
}

impl Runner {
    pub fn new(bus: Arc<EventBus>, registry: StrategyRegistry, executor: Arc<TradeExecutor>) -> Self {
        Self {
            bus,
            registry,
            executor,
            observers: Vec::new(),
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    /// Handler that sees every observation before the strategy on that
    /// channel does (e.g. the paper backend's price tracker).
    pub fn with_observer(mut self, observer: Arc<dyn MessageHandler>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn registry(&self) -> &StrategyRegistry {
        &self.registry
    }

    /// Subscribe one handler per strategy. Returns the number of channels.
    ///
    /// Calling again while started is a no-op. If any subscription fails the
    /// ones already made are released and the error is returned.
    pub async fn start(&self) -> Result<usize> {
        let mut subscriptions = self.subscriptions.lock().await;
        if !subscriptions.is_empty() {
            debug!("Runner already started");
            return Ok(subscriptions.len());
        }

        for (pair, strategy) in self.registry.iter() {
            let channel = token_channel(pair);
            let handler: Arc<dyn MessageHandler> = Arc::new(
                StrategyHandler::new(strategy.clone(), self.executor.clone())
                    .with_observers(self.observers.clone()),
            );

            if let Err(e) = self.bus.subscribe(&channel, handler.clone()).await {
                warn!(channel = %channel, error = %e, "Subscription failed, rolling back");
                for (channel, handler) in subscriptions.drain(..) {
                    self.bus.unsubscribe(&channel, &handler).await;
                }
                return Err(e);
            }
            info!(channel = %channel, strategy = %strategy.name(), "Strategy subscribed");
            subscriptions.push((channel, handler));
        }

        info!(channels = subscriptions.len(), "Runner started");
        Ok(subscriptions.len())
    }

    /// `start` with exponential backoff until it succeeds.
    pub async fn start_with_retry(&self) -> usize {
        let mut backoff = Duration::from_secs(1);
        const MAX_BACKOFF: Duration = Duration::from_secs(60);

        loop {
            match self.start().await {
                Ok(channels) => return channels,
                Err(e) => {
                    warn!(error = %e, backoff = ?backoff, "Runner start failed, retrying");
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
            }
        }
    }

    /// Drop every subscription and close the bus.
    pub async fn stop(&self) {
        let subscriptions: Vec<_> = self.subscriptions.lock().await.drain(..).collect();
        for (channel, handler) in &subscriptions {
            self.bus.unsubscribe(channel, handler).await;
        }
        self.bus.close().await;
        info!(channels = subscriptions.len(), "Runner stopped");
    }
}
