use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use futures_util::StreamExt;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::Value;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use common::{Error, Result};

use crate::transport::{Connection, MessageStream, Transport};

/// Async callback registered on a channel.
///
/// Every delivered message runs `handle` in its own task. An `Err` or a panic
/// is logged by the bus and never reaches other handlers.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    async fn handle(&self, channel: &str, message: Arc<Value>) -> Result<()>;
}

type Handlers = Arc<RwLock<Vec<Arc<dyn MessageHandler>>>>;
type ConnectFuture = Shared<BoxFuture<'static, std::result::Result<Arc<dyn Connection>, String>>>;

enum ConnState {
    Idle,
    /// In-flight connect shared by every caller that arrives meanwhile.
    Connecting { attempt: u64, future: ConnectFuture },
    Ready(Arc<dyn Connection>),
}

struct ChannelEntry {
    handlers: Handlers,
    listener: JoinHandle<()>,
    /// Connection that opened the transport subscription. Released through
    /// it even if the bus has since reconnected.
    conn: Arc<dyn Connection>,
}

/// Publish/subscribe router keyed by channel name.
///
/// One listener task runs per channel with at least one handler. The
/// transport connection is opened lazily, health-checked before reuse and
/// reopened by the next operation after a failure.
pub struct EventBus {
    transport: Arc<dyn Transport>,
    conn: Mutex<ConnState>,
    next_attempt: AtomicU64,
    /// Held across transport calls so subscribe/unsubscribe never interleave.
    channels: tokio::sync::Mutex<HashMap<String, ChannelEntry>>,
}

impl EventBus {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            conn: Mutex::new(ConnState::Idle),
            next_attempt: AtomicU64::new(0),
            channels: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Register `handler` on `channel`. Registering the same `Arc` twice is a
    /// no-op.
    ///
    /// The first handler on a channel opens the transport subscription and
    /// starts its listener. A listener whose stream has ended is restarted
    /// here. If the transport cannot be reached the error is returned and
    /// nothing is registered.
    pub async fn subscribe(&self, channel: &str, handler: Arc<dyn MessageHandler>) -> Result<()> {
        let conn = self.connection().await?;
        let mut channels = self.channels.lock().await;

        if let Some(entry) = channels.get(channel).filter(|e| !e.listener.is_finished()) {
            let mut handlers = entry.handlers.write();
            if handlers.iter().any(|h| same_handler(h, &handler)) {
                debug!(channel, handler = handler.name(), "Handler already subscribed");
            } else {
                handlers.push(handler.clone());
                info!(channel, handler = handler.name(), "Handler subscribed");
            }
            return Ok(());
        }

        let stream = conn.subscribe(channel).await.map_err(|e| {
            error!(channel, error = %e, "Transport subscription failed");
            e
        })?;
        let handlers: Handlers = match channels.remove(channel) {
            Some(ended) => {
                warn!(channel, "Listener had exited, restarting it");
                {
                    let mut handlers = ended.handlers.write();
                    if !handlers.iter().any(|h| same_handler(h, &handler)) {
                        handlers.push(handler.clone());
                    }
                }
                ended.handlers
            }
            None => Arc::new(RwLock::new(vec![handler.clone()])),
        };
        let listener = tokio::spawn(listen(channel.to_string(), stream, handlers.clone()));
        channels.insert(
            channel.to_string(),
            ChannelEntry {
                handlers,
                listener,
                conn,
            },
        );

        info!(channel, handler = handler.name(), "Handler subscribed, listener started");
        Ok(())
    }

    /// Remove `handler` from `channel`. Unknown handlers are ignored.
    ///
    /// Removing the last handler stops the listener and releases the
    /// transport subscription.
    pub async fn unsubscribe(&self, channel: &str, handler: &Arc<dyn MessageHandler>) {
        let mut channels = self.channels.lock().await;
        let Some(entry) = channels.get(channel) else {
            debug!(channel, handler = handler.name(), "Unsubscribe on unknown channel");
            return;
        };

        let remaining = {
            let mut handlers = entry.handlers.write();
            let before = handlers.len();
            handlers.retain(|h| !same_handler(h, handler));
            if handlers.len() == before {
                debug!(channel, handler = handler.name(), "Handler was not subscribed");
                return;
            }
            handlers.len()
        };
        info!(channel, handler = handler.name(), remaining, "Handler unsubscribed");

        if remaining > 0 {
            return;
        }
        if let Some(entry) = channels.remove(channel) {
            entry.listener.abort();
            let _ = entry.listener.await;
            info!(channel, "Listener stopped");
            release(channel, &entry.conn).await;
        }
    }

    /// Serialize and publish `message`. Failures are logged, never returned,
    /// so publishers can call this from a hot loop.
    pub async fn publish<T: Serialize + ?Sized>(&self, channel: &str, message: &T) {
        match self.try_publish(channel, message).await {
            Ok(_) => {}
            Err(e @ Error::Serialization(_)) => {
                error!(channel, error = %e, "Publish failed, message not serializable");
            }
            Err(e) => error!(channel, error = %e, "Publish failed"),
        }
    }

    /// Like [`publish`](Self::publish) but reports the outcome. Returns the
    /// number of transport receivers reached.
    pub async fn try_publish<T: Serialize + ?Sized>(&self, channel: &str, message: &T) -> Result<usize> {
        let payload = serde_json::to_string(message)?;
        let conn = self.connection().await?;
        let receivers = conn.publish(channel, payload).await?;
        debug!(channel, receivers, "Published");
        Ok(receivers)
    }

    /// Stop every listener, wait for them to finish and drop the connection.
    pub async fn close(&self) {
        info!("Closing event bus");
        let entries: Vec<(String, ChannelEntry)> = self.channels.lock().await.drain().collect();
        for (_, entry) in &entries {
            entry.listener.abort();
        }

        for (channel, entry) in entries {
            let _ = entry.listener.await;
            release(&channel, &entry.conn).await;
        }
        *self.conn.lock() = ConnState::Idle;
        info!("Event bus closed");
    }

    /// Channels that currently have a listener.
    pub async fn channels(&self) -> Vec<String> {
        self.channels.lock().await.keys().cloned().collect()
    }

    pub async fn handler_count(&self, channel: &str) -> usize {
        self.channels
            .lock()
            .await
            .get(channel)
            .map_or(0, |entry| entry.handlers.read().len())
    }

    pub async fn has_listener(&self, channel: &str) -> bool {
        self.channels
            .lock()
            .await
            .get(channel)
            .is_some_and(|entry| !entry.listener.is_finished())
    }

    // ─── Connection management ───────────────────────────────────────────────

    fn ready_connection(&self) -> Option<Arc<dyn Connection>> {
        match &*self.conn.lock() {
            ConnState::Ready(conn) => Some(conn.clone()),
            _ => None,
        }
    }

    /// Return a healthy connection, connecting if needed.
    ///
    /// Concurrent callers share one in-flight attempt. A failed attempt is
    /// reported to all of them and the next call starts a fresh one.
    async fn connection(&self) -> Result<Arc<dyn Connection>> {
        if let Some(conn) = self.ready_connection() {
            match conn.ping().await {
                Ok(()) => return Ok(conn),
                Err(e) => {
                    warn!(error = %e, "Bus connection failed health check, reconnecting");
                    let mut state = self.conn.lock();
                    if matches!(&*state, ConnState::Ready(current) if same_connection(current, &conn)) {
                        *state = ConnState::Idle;
                    }
                }
            }
        }

        let (attempt, future) = {
            let mut state = self.conn.lock();
            match &*state {
                ConnState::Ready(conn) => return Ok(conn.clone()),
                ConnState::Connecting { attempt, future } => (*attempt, future.clone()),
                ConnState::Idle => {
                    let attempt = self.next_attempt.fetch_add(1, Ordering::Relaxed);
                    let transport = self.transport.clone();
                    let future = async move {
                        info!(attempt, "Connecting event bus transport");
                        transport.connect().await.map_err(|e| e.to_string())
                    }
                    .boxed()
                    .shared();
                    *state = ConnState::Connecting {
                        attempt,
                        future: future.clone(),
                    };
                    (attempt, future)
                }
            }
        };

        let result = future.await;
        {
            let mut state = self.conn.lock();
            if matches!(&*state, ConnState::Connecting { attempt: current, .. } if *current == attempt) {
                *state = match &result {
                    Ok(conn) => ConnState::Ready(conn.clone()),
                    Err(_) => ConnState::Idle,
                };
            }
        }

        result.map_err(|e| {
            error!(attempt, error = %e, "Event bus connection failed");
            Error::Connection(e)
        })
    }
}

impl Drop for EventBus {
    fn drop(&mut self) {
        for entry in self.channels.get_mut().values() {
            entry.listener.abort();
        }
    }
}

// ─── Delivery ────────────────────────────────────────────────────────────────

async fn listen(channel: String, mut stream: MessageStream, handlers: Handlers) {
    debug!(channel = %channel, "Listener running");
    while let Some(raw) = stream.next().await {
        let message: Value = match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => {
                error!(
                    channel = %channel,
                    error = %e,
                    payload = %preview(&raw),
                    "Dropping undecodable message"
                );
                continue;
            }
        };

        let targets: Vec<Arc<dyn MessageHandler>> = handlers.read().clone();
        if targets.is_empty() {
            continue;
        }
        tokio::spawn(deliver(channel.clone(), Arc::new(message), targets));
    }
    warn!(channel = %channel, "Transport stream ended, listener exiting");
}

/// Run every handler for one message as an independent task.
async fn deliver(channel: String, message: Arc<Value>, targets: Vec<Arc<dyn MessageHandler>>) {
    let mut tasks = JoinSet::new();
    for handler in targets {
        let channel = channel.clone();
        let message = message.clone();
        tasks.spawn(async move {
            if let Err(e) = handler.handle(&channel, message).await {
                error!(channel = %channel, handler = handler.name(), error = %e, "Handler failed");
            }
        });
    }

    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            if e.is_panic() {
                error!(channel = %channel, "Handler panicked");
            }
        }
    }
}

async fn release(channel: &str, conn: &Arc<dyn Connection>) {
    if let Err(e) = conn.unsubscribe(channel).await {
        warn!(channel, error = %e, "Failed to release transport subscription");
    }
}

fn preview(raw: &str) -> &str {
    match raw.char_indices().nth(100) {
        Some((idx, _)) => &raw[..idx],
        None => raw,
    }
}

fn same_handler(a: &Arc<dyn MessageHandler>, b: &Arc<dyn MessageHandler>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

fn same_connection(a: &Arc<dyn Connection>, b: &Arc<dyn Connection>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
    use std::time::Duration;

    use futures_util::stream;
    use serde_json::json;
    use tokio::sync::mpsc;

    use crate::LocalBroker;

    const CHANNEL: &str = "token_data:PAIR1";

    struct Recorder {
        name: String,
        tx: mpsc::UnboundedSender<Value>,
    }

    impl Recorder {
        fn new(name: &str) -> (Arc<dyn MessageHandler>, mpsc::UnboundedReceiver<Value>) {
            let (tx, rx) = mpsc::unbounded_channel();
            let handler: Arc<dyn MessageHandler> = Arc::new(Recorder {
                name: name.to_string(),
                tx,
            });
            (handler, rx)
        }
    }

    #[async_trait]
    impl MessageHandler for Recorder {
        fn name(&self) -> &str {
            &self.name
        }

        async fn handle(&self, _channel: &str, message: Arc<Value>) -> Result<()> {
            let _ = self.tx.send((*message).clone());
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl MessageHandler for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        async fn handle(&self, _channel: &str, _message: Arc<Value>) -> Result<()> {
            Err(Error::Other("boom".into()))
        }
    }

    struct Panicking;

    #[async_trait]
    impl MessageHandler for Panicking {
        fn name(&self) -> &str {
            "panicking"
        }

        async fn handle(&self, _channel: &str, _message: Arc<Value>) -> Result<()> {
            panic!("handler blew up");
        }
    }

    fn make_bus() -> (EventBus, LocalBroker) {
        let broker = LocalBroker::new(64);
        (EventBus::new(Arc::new(broker.clone())), broker)
    }

    async fn recv(rx: &mut mpsc::UnboundedReceiver<Value>) -> Value {
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timeout")
            .expect("channel closed")
    }

    async fn assert_silent(rx: &mut mpsc::UnboundedReceiver<Value>) {
        let got = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
        assert!(got.is_err(), "unexpected delivery: {got:?}");
    }

    #[tokio::test]
    async fn published_message_reaches_subscriber() {
        let (bus, _broker) = make_bus();
        let (handler, mut rx) = Recorder::new("recorder");
        bus.subscribe(CHANNEL, handler).await.unwrap();

        bus.publish(CHANNEL, &json!({ "priceUsd": "0.40" })).await;

        assert_eq!(recv(&mut rx).await, json!({ "priceUsd": "0.40" }));
    }

    #[tokio::test]
    async fn double_subscribe_delivers_once() {
        let (bus, _broker) = make_bus();
        let (handler, mut rx) = Recorder::new("recorder");
        bus.subscribe(CHANNEL, handler.clone()).await.unwrap();
        bus.subscribe(CHANNEL, handler).await.unwrap();
        assert_eq!(bus.handler_count(CHANNEL).await, 1);

        bus.publish(CHANNEL, &json!({ "n": 1 })).await;

        assert_eq!(recv(&mut rx).await, json!({ "n": 1 }));
        assert_silent(&mut rx).await;
    }

    #[tokio::test]
    async fn every_handler_on_a_channel_gets_the_message() {
        let (bus, _broker) = make_bus();
        let (first, mut first_rx) = Recorder::new("first");
        let (second, mut second_rx) = Recorder::new("second");
        bus.subscribe(CHANNEL, first).await.unwrap();
        bus.subscribe(CHANNEL, second).await.unwrap();

        bus.publish(CHANNEL, &json!({ "n": 7 })).await;

        assert_eq!(recv(&mut first_rx).await, json!({ "n": 7 }));
        assert_eq!(recv(&mut second_rx).await, json!({ "n": 7 }));
    }

    #[tokio::test]
    async fn channels_are_isolated() {
        let (bus, _broker) = make_bus();
        let (handler, mut rx) = Recorder::new("recorder");
        bus.subscribe(CHANNEL, handler).await.unwrap();

        bus.publish("token_data:PAIR2", &json!({ "n": 1 })).await;

        assert_silent(&mut rx).await;
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery_and_tears_down_listener() {
        let (bus, broker) = make_bus();
        let (handler, mut rx) = Recorder::new("recorder");
        bus.subscribe(CHANNEL, handler.clone()).await.unwrap();
        assert!(bus.has_listener(CHANNEL).await);
        assert_eq!(broker.channel_count(), 1);

        bus.unsubscribe(CHANNEL, &handler).await;

        assert!(!bus.has_listener(CHANNEL).await);
        assert!(bus.channels().await.is_empty());
        assert_eq!(broker.channel_count(), 0);

        bus.publish(CHANNEL, &json!({ "n": 1 })).await;
        assert_silent(&mut rx).await;

        // Idempotent.
        bus.unsubscribe(CHANNEL, &handler).await;
    }

    #[tokio::test]
    async fn listener_survives_while_other_handlers_remain() {
        let (bus, _broker) = make_bus();
        let (leaving, mut leaving_rx) = Recorder::new("leaving");
        let (staying, mut staying_rx) = Recorder::new("staying");
        bus.subscribe(CHANNEL, leaving.clone()).await.unwrap();
        bus.subscribe(CHANNEL, staying).await.unwrap();

        bus.unsubscribe(CHANNEL, &leaving).await;
        assert!(bus.has_listener(CHANNEL).await);

        bus.publish(CHANNEL, &json!({ "n": 2 })).await;
        assert_eq!(recv(&mut staying_rx).await, json!({ "n": 2 }));
        assert_silent(&mut leaving_rx).await;
    }

    #[tokio::test]
    async fn malformed_message_is_skipped_and_listener_keeps_going() {
        let (bus, broker) = make_bus();
        let (handler, mut rx) = Recorder::new("recorder");
        bus.subscribe(CHANNEL, handler).await.unwrap();

        let raw = broker.connect().await.unwrap();
        raw.publish(CHANNEL, "{not json".into()).await.unwrap();
        bus.publish(CHANNEL, &json!({ "n": 3 })).await;

        assert_eq!(recv(&mut rx).await, json!({ "n": 3 }));
        assert!(bus.has_listener(CHANNEL).await);
    }

    #[tokio::test]
    async fn failing_and_panicking_handlers_do_not_affect_others() {
        let (bus, _broker) = make_bus();
        let (handler, mut rx) = Recorder::new("recorder");
        bus.subscribe(CHANNEL, Arc::new(Failing)).await.unwrap();
        bus.subscribe(CHANNEL, Arc::new(Panicking)).await.unwrap();
        bus.subscribe(CHANNEL, handler).await.unwrap();

        bus.publish(CHANNEL, &json!({ "n": 1 })).await;
        bus.publish(CHANNEL, &json!({ "n": 2 })).await;

        let mut got = vec![recv(&mut rx).await, recv(&mut rx).await];
        got.sort_by_key(|v| v["n"].as_i64());
        assert_eq!(got, vec![json!({ "n": 1 }), json!({ "n": 2 })]);
        assert!(bus.has_listener(CHANNEL).await);
    }

    #[tokio::test]
    async fn slow_handler_does_not_block_next_message() {
        struct Slow {
            tx: mpsc::UnboundedSender<i64>,
        }

        #[async_trait]
        impl MessageHandler for Slow {
            fn name(&self) -> &str {
                "slow"
            }

            async fn handle(&self, _channel: &str, message: Arc<Value>) -> Result<()> {
                let n = message["n"].as_i64().unwrap_or_default();
                if n == 1 {
                    tokio::time::sleep(Duration::from_millis(500)).await;
                }
                let _ = self.tx.send(n);
                Ok(())
            }
        }

        let (bus, _broker) = make_bus();
        let (tx, mut rx) = mpsc::unbounded_channel();
        bus.subscribe(CHANNEL, Arc::new(Slow { tx })).await.unwrap();

        bus.publish(CHANNEL, &json!({ "n": 1 })).await;
        bus.publish(CHANNEL, &json!({ "n": 2 })).await;

        let first = tokio::time::timeout(Duration::from_millis(300), rx.recv())
            .await
            .expect("second message was blocked by the first");
        assert_eq!(first, Some(2));
    }

    #[tokio::test]
    async fn subscribe_fails_cleanly_when_transport_unreachable() {
        let (bus, broker) = make_bus();
        broker.set_online(false);
        let (handler, mut rx) = Recorder::new("recorder");

        let err = bus.subscribe(CHANNEL, handler.clone()).await.unwrap_err();
        assert!(matches!(err, Error::Connection(_)));
        assert_eq!(bus.handler_count(CHANNEL).await, 0);
        assert!(!bus.has_listener(CHANNEL).await);

        // Next operation retries.
        broker.set_online(true);
        bus.subscribe(CHANNEL, handler).await.unwrap();
        assert_eq!(broker.connect_attempts(), 2);

        bus.publish(CHANNEL, &json!({ "n": 1 })).await;
        assert_eq!(recv(&mut rx).await, json!({ "n": 1 }));
    }

    #[tokio::test]
    async fn lost_connection_is_replaced_after_failed_health_check() {
        let (bus, broker) = make_bus();
        bus.try_publish(CHANNEL, &json!({})).await.unwrap();
        assert_eq!(broker.connect_attempts(), 1);

        broker.set_online(false);
        assert!(matches!(
            bus.try_publish(CHANNEL, &json!({})).await,
            Err(Error::Connection(_))
        ));

        broker.set_online(true);
        bus.try_publish(CHANNEL, &json!({})).await.unwrap();
        assert_eq!(broker.connect_attempts(), 3);
    }

    #[tokio::test]
    async fn concurrent_operations_share_one_connect_attempt() {
        let broker = LocalBroker::with_connect_delay(64, Duration::from_millis(100));
        let bus = Arc::new(EventBus::new(Arc::new(broker.clone())));

        let mut tasks = JoinSet::new();
        for i in 0..8 {
            let bus = bus.clone();
            tasks.spawn(async move { bus.try_publish(CHANNEL, &json!({ "n": i })).await });
        }
        while let Some(result) = tasks.join_next().await {
            assert!(result.unwrap().is_ok());
        }

        assert_eq!(broker.connect_attempts(), 1);
    }

    #[tokio::test]
    async fn unserializable_message_reports_serialization_error() {
        let (bus, _broker) = make_bus();
        let mut bad = BTreeMap::new();
        bad.insert((1u8, 2u8), "tuple keys are not valid JSON object keys");

        assert!(matches!(
            bus.try_publish(CHANNEL, &bad).await,
            Err(Error::Serialization(_))
        ));
        // The logging variant swallows it.
        bus.publish(CHANNEL, &bad).await;
    }

    #[tokio::test]
    async fn close_stops_every_listener() {
        let (bus, broker) = make_bus();
        let (a, _a_rx) = Recorder::new("a");
        let (b, _b_rx) = Recorder::new("b");
        bus.subscribe("token_data:A", a).await.unwrap();
        bus.subscribe("token_data:B", b).await.unwrap();
        assert_eq!(broker.channel_count(), 2);

        bus.close().await;

        assert!(bus.channels().await.is_empty());
        assert_eq!(broker.channel_count(), 0);
    }
    #[tokio::test]
    async fn unsubscribe_after_reconnect_releases_transport_subscription() {
        let (bus, broker) = make_bus();
        let (handler, _rx) = Recorder::new("a");
        bus.subscribe(CHANNEL, handler.clone()).await.unwrap();
        assert_eq!(broker.channel_count(), 1);

        // Failed health check drops the cached connection.
        broker.set_online(false);
        assert!(bus.try_publish(CHANNEL, &json!({})).await.is_err());
        broker.set_online(true);

        bus.unsubscribe(CHANNEL, &handler).await;
        assert!(bus.channels().await.is_empty());
        assert_eq!(broker.channel_count(), 0);
    }

    #[tokio::test]
    async fn handler_sees_messages_in_publish_order() {
        let (bus, _broker) = make_bus();
        let (handler, mut rx) = Recorder::new("ordered");
        bus.subscribe(CHANNEL, handler).await.unwrap();

        for n in 0..20 {
            bus.publish(CHANNEL, &json!({ "n": n })).await;
        }
        for n in 0..20 {
            assert_eq!(recv(&mut rx).await, json!({ "n": n }));
        }
    }

    /// Each subscription yields `{"n": <subscription index>}`. The first one
    /// then ends; later ones stay open.
    struct FiniteTransport {
        subscriptions: Arc<AtomicUsize>,
    }

    struct FiniteConnection {
        subscriptions: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Transport for FiniteTransport {
        async fn connect(&self) -> Result<Arc<dyn Connection>> {
            Ok(Arc::new(FiniteConnection {
                subscriptions: self.subscriptions.clone(),
            }))
        }
    }

    #[async_trait]
    impl Connection for FiniteConnection {
        async fn ping(&self) -> Result<()> {
            Ok(())
        }

        async fn publish(&self, _channel: &str, _payload: String) -> Result<usize> {
            Ok(0)
        }

        async fn subscribe(&self, _channel: &str) -> Result<MessageStream> {
            let n = self.subscriptions.fetch_add(1, AtomicOrdering::SeqCst);
            let once = stream::iter(vec![json!({ "n": n }).to_string()]);
            if n == 0 {
                Ok(once.boxed())
            } else {
                Ok(once.chain(stream::pending()).boxed())
            }
        }

        async fn unsubscribe(&self, _channel: &str) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn ended_listener_is_restarted_by_next_subscribe() {
        let subscriptions = Arc::new(AtomicUsize::new(0));
        let bus = EventBus::new(Arc::new(FiniteTransport {
            subscriptions: subscriptions.clone(),
        }));

        let (first, mut first_rx) = Recorder::new("first");
        bus.subscribe(CHANNEL, first).await.unwrap();
        assert_eq!(recv(&mut first_rx).await, json!({ "n": 0 }));

        tokio::time::timeout(Duration::from_secs(1), async {
            while bus.has_listener(CHANNEL).await {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("listener exits once its stream ends");

        let (second, mut second_rx) = Recorder::new("second");
        bus.subscribe(CHANNEL, second).await.unwrap();

        assert!(bus.has_listener(CHANNEL).await);
        assert_eq!(bus.handler_count(CHANNEL).await, 2);
        assert_eq!(subscriptions.load(AtomicOrdering::SeqCst), 2);
        assert_eq!(recv(&mut first_rx).await, json!({ "n": 1 }));
        assert_eq!(recv(&mut second_rx).await, json!({ "n": 1 }));
    }
}
