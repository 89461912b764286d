pub mod book;
pub mod config;
pub mod momentum;
pub mod registry;
pub mod threshold;

pub use book::{Decision, PositionBook};
pub use config::{StrategyConfig, StrategyFileConfig};
pub use momentum::{MomentumParams, MomentumStrategy};
pub use registry::StrategyRegistry;
pub use threshold::{ThresholdParams, ThresholdStrategy};

use common::{Observation, Position, Signal};

/// All strategy implementations must satisfy this trait.
///
/// One instance tracks one instrument and owns that instrument's position
/// state. `evaluate` may be called concurrently for the same instance.
pub trait Strategy: Send + Sync {
    /// Human-readable name of this strategy instance.
    fn name(&self) -> &str;

    /// The liquidity pair this strategy watches. Its channel is
    /// `token_data:<pair_address>`.
    fn pair_address(&self) -> &str;

    /// Evaluate one observation and optionally emit a signal.
    ///
    /// Observations without the fields the strategy needs yield `None`.
    fn evaluate(&self, observation: &Observation) -> Option<Signal>;

    /// Positions currently open, for logs and tests.
    fn open_positions(&self) -> Vec<Position>;
}
