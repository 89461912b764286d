pub mod channel;
pub mod config;
pub mod error;
pub mod trading;
pub mod types;

pub use channel::{pair_from_channel, token_channel, CHANNEL_PREFIX};
pub use config::Config;
pub use error::{Error, Result};
pub use trading::TradingModule;
pub use types::*;
