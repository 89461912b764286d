//! Channel-keyed publish/subscribe between feed publishers and the trading
//! pipeline.

pub mod event_bus;
pub mod local;
pub mod transport;

pub use event_bus::{EventBus, MessageHandler};
pub use local::LocalBroker;
pub use transport::{Connection, MessageStream, Transport};
