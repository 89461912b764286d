pub mod executor;
pub mod jupiter;
pub mod replay;
pub mod runner;

pub use executor::{Outcome, TradeExecutor};
pub use jupiter::{JupiterConfig, JupiterTradingModule};
pub use replay::ReplayFeed;
pub use runner::{Runner, StrategyHandler};
