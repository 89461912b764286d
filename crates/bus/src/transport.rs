use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use common::Result;

/// Raw payloads received on one channel, in publish order.
pub type MessageStream = BoxStream<'static, String>;

/// Something the event bus can open a connection to.
///
/// `LocalBroker` is the in-process implementation. An external pub/sub store
/// plugs in by implementing this pair of traits.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a new connection. Errors are `Error::Connection`.
    async fn connect(&self) -> Result<Arc<dyn Connection>>;
}

#[async_trait]
pub trait Connection: Send + Sync {
    /// Health check run before the bus reuses a cached connection.
    async fn ping(&self) -> Result<()>;

    /// Publish one serialized payload. Returns the number of receivers reached.
    async fn publish(&self, channel: &str, payload: String) -> Result<usize>;

    /// Start receiving payloads for `channel`.
    async fn subscribe(&self, channel: &str) -> Result<MessageStream>;

    /// Release the transport-side subscription once its stream is dropped.
    async fn unsubscribe(&self, channel: &str) -> Result<()>;
}
