use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{stream, StreamExt};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use common::{Error, Result};

use crate::transport::{Connection, MessageStream, Transport};

/// In-process pub/sub transport.
///
/// One `broadcast` channel per named channel, so every subscriber sees every
/// payload in publish order. Cloning shares the same broker, which lets a
/// publisher and several buses talk to each other inside one process.
///
/// The broker can be switched offline to simulate an unreachable store.
#[derive(Clone)]
pub struct LocalBroker {
    inner: Arc<BrokerInner>,
}

struct BrokerInner {
    capacity: usize,
    online: AtomicBool,
    connect_attempts: AtomicUsize,
    connect_delay: Duration,
    channels: Mutex<HashMap<String, broadcast::Sender<String>>>,
}

impl LocalBroker {
    /// `capacity` is the per-channel backlog before slow receivers lag.
    pub fn new(capacity: usize) -> Self {
        Self::build(capacity, Duration::ZERO)
    }

    /// Broker whose `connect` takes `delay` to complete.
    pub fn with_connect_delay(capacity: usize, delay: Duration) -> Self {
        Self::build(capacity, delay)
    }

    fn build(capacity: usize, connect_delay: Duration) -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                capacity: capacity.max(1),
                online: AtomicBool::new(true),
                connect_attempts: AtomicUsize::new(0),
                connect_delay,
                channels: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.inner.online.store(online, Ordering::SeqCst);
    }

    pub fn is_online(&self) -> bool {
        self.inner.online.load(Ordering::SeqCst)
    }

    /// Number of `connect` calls seen so far.
    pub fn connect_attempts(&self) -> usize {
        self.inner.connect_attempts.load(Ordering::SeqCst)
    }

    /// Channels that currently have a transport-side subscription.
    pub fn channel_count(&self) -> usize {
        self.inner.channels.lock().len()
    }

    fn check_online(&self) -> Result<()> {
        if self.is_online() {
            Ok(())
        } else {
            Err(Error::Connection("local broker is offline".into()))
        }
    }
}

#[async_trait]
impl Transport for LocalBroker {
    async fn connect(&self) -> Result<Arc<dyn Connection>> {
        self.inner.connect_attempts.fetch_add(1, Ordering::SeqCst);
        if !self.inner.connect_delay.is_zero() {
            tokio::time::sleep(self.inner.connect_delay).await;
        }
        self.check_online()?;
        Ok(Arc::new(LocalConnection {
            broker: self.clone(),
        }))
    }
}

struct LocalConnection {
    broker: LocalBroker,
}

#[async_trait]
impl Connection for LocalConnection {
    async fn ping(&self) -> Result<()> {
        self.broker.check_online()
    }

    async fn publish(&self, channel: &str, payload: String) -> Result<usize> {
        self.broker.check_online()?;
        let sender = self.broker.inner.channels.lock().get(channel).cloned();
        match sender {
            // A send error only means nobody is listening right now.
            Some(tx) => Ok(tx.send(payload).unwrap_or(0)),
            None => Ok(0),
        }
    }

    async fn subscribe(&self, channel: &str) -> Result<MessageStream> {
        self.broker.check_online()?;
        let rx = self
            .broker
            .inner
            .channels
            .lock()
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(self.broker.inner.capacity).0)
            .subscribe();
        debug!(channel, "Local broker subscription opened");
        Ok(receiver_stream(channel.to_string(), rx))
    }

    async fn unsubscribe(&self, channel: &str) -> Result<()> {
        let mut channels = self.broker.inner.channels.lock();
        if channels
            .get(channel)
            .is_some_and(|tx| tx.receiver_count() == 0)
        {
            channels.remove(channel);
            debug!(channel, "Local broker subscription released");
        }
        Ok(())
    }
}

fn receiver_stream(channel: String, rx: broadcast::Receiver<String>) -> MessageStream {
    stream::unfold((channel, rx), |(channel, mut rx)| async move {
        loop {
            match rx.recv().await {
                Ok(payload) => return Some((payload, (channel, rx))),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(channel = %channel, dropped = n, "Subscriber lagged, dropped messages");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
    .boxed()
}
