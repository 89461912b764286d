use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{debug, warn};

use common::{Observation, Position, Result, Signal};

use crate::book::{Decision, PositionBook};
use crate::Strategy;

/// Tunables for [`MomentumStrategy`].
#[derive(Debug, Clone, PartialEq)]
pub struct MomentumParams {
    /// Rolling window read from `priceChange`.
    pub window: String,
    /// Buy when flat and the window's percent change is strictly above this.
    pub min_change_pct: Decimal,
    /// Fraction above entry that closes the position.
    pub take_profit: Decimal,
    /// Fraction below entry that closes the position.
    pub stop_loss: Decimal,
    pub buy_amount: Decimal,
    pub confidence: f64,
}

impl Default for MomentumParams {
    fn default() -> Self {
        Self {
            window: "m5".to_string(),
            min_change_pct: dec!(10),
            take_profit: dec!(0.2),
            stop_loss: dec!(0.1),
            buy_amount: dec!(0.001),
            confidence: 0.95,
        }
    }
}

/// Buys into a short-term price spike and exits on a take-profit or
/// stop-loss band around the entry price.
pub struct MomentumStrategy {
    name: String,
    pair_address: String,
    params: MomentumParams,
    book: PositionBook,
}

impl MomentumStrategy {
    pub fn new(name: impl Into<String>, pair_address: impl Into<String>, params: MomentumParams) -> Self {
        Self {
            name: name.into(),
            pair_address: pair_address.into(),
            params,
            book: PositionBook::new(),
        }
    }

    pub fn params(&self) -> &MomentumParams {
        &self.params
    }

    pub fn try_evaluate(&self, observation: &Observation) -> Result<Option<Signal>> {
        let Some(token) = observation.base_token_address() else {
            debug!(strategy = %self.name, "Observation has no base token address, skipping");
            return Ok(None);
        };
        let Some(price) = observation.price_usd().transpose()? else {
            debug!(strategy = %self.name, token, "Observation has no priceUsd, skipping");
            return Ok(None);
        };
        // Only needed while flat. A missing change field never blocks an exit.
        let change = observation.price_change(&self.params.window).transpose()?;

        let p = &self.params;
        Ok(self.book.apply(token, observation, |current| match current {
            None => match change {
                Some(change) if change > p.min_change_pct => Decision::Open {
                    entry_price: price,
                    signal: Signal::buy(token, p.buy_amount, p.confidence, &self.pair_address),
                },
                _ => Decision::Hold,
            },
            Some(position) => {
                let take_profit = position.entry_price * (Decimal::ONE + p.take_profit);
                let stop_loss = position.entry_price * (Decimal::ONE - p.stop_loss);
                if price >= take_profit || price <= stop_loss {
                    Decision::Close(Signal::close(token, p.confidence, &self.pair_address))
                } else {
                    Decision::Hold
                }
            }
        }))
    }
}

impl Strategy for MomentumStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn pair_address(&self) -> &str {
        &self.pair_address
    }

    fn evaluate(&self, observation: &Observation) -> Option<Signal> {
        self.try_evaluate(observation).unwrap_or_else(|e| {
            warn!(
                strategy = %self.name,
                token = observation.base_token_address().unwrap_or("?"),
                error = %e,
                "Evaluation failed"
            );
            None
        })
    }

    fn open_positions(&self) -> Vec<Position> {
        self.book.snapshot()
    }
}
