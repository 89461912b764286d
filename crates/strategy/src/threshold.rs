use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{debug, warn};

use common::{Observation, Position, Result, Signal};

use crate::book::{Decision, PositionBook};
use crate::Strategy;

/// Tunables for [`ThresholdStrategy`].
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdParams {
    /// Buy when flat and `priceUsd` is strictly below this.
    pub buy_threshold: Decimal,
    /// Sell when long and `priceUsd` is strictly above this.
    pub sell_threshold: Decimal,
    /// Buy size in the quote asset.
    pub buy_amount: Decimal,
    pub confidence: f64,
}

impl Default for ThresholdParams {
    fn default() -> Self {
        Self {
            buy_threshold: dec!(0.5),
            sell_threshold: dec!(0.6),
            buy_amount: dec!(0.001),
            confidence: 0.95,
        }
    }
}

/// Buy below one USD price, sell the whole holding above another.
///
/// ```text
/// Flat --(price < buy_threshold / Buy)--> Long
/// Long --(price > sell_threshold / Sell all)--> Flat
/// ```
pub struct ThresholdStrategy {
    name: String,
    pair_address: String,
    params: ThresholdParams,
    book: PositionBook,
}

impl ThresholdStrategy {
    pub fn new(name: impl Into<String>, pair_address: impl Into<String>, params: ThresholdParams) -> Self {
        Self {
            name: name.into(),
            pair_address: pair_address.into(),
            params,
            book: PositionBook::new(),
        }
    }

    pub fn params(&self) -> &ThresholdParams {
        &self.params
    }

    /// Like `evaluate` but reports malformed observations.
    pub fn try_evaluate(&self, observation: &Observation) -> Result<Option<Signal>> {
        let Some(token) = observation.base_token_address() else {
            debug!(strategy = %self.name, "Observation has no base token address, skipping");
            return Ok(None);
        };
        let price = match observation.price_usd() {
            Some(price) => price?,
            None => {
                debug!(strategy = %self.name, token, "Observation has no priceUsd, skipping");
                return Ok(None);
            }
        };

        let p = &self.params;
        Ok(self.book.apply(token, observation, |current| match current {
            None if price < p.buy_threshold => Decision::Open {
                entry_price: price,
                signal: Signal::buy(token, p.buy_amount, p.confidence, &self.pair_address),
            },
            Some(_) if price > p.sell_threshold => {
                Decision::Close(Signal::close(token, p.confidence, &self.pair_address))
            }
            _ => Decision::Hold,
        }))
    }
}

impl Strategy for ThresholdStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn pair_address(&self) -> &str {
        &self.pair_address
    }

    fn evaluate(&self, observation: &Observation) -> Option<Signal> {
        match self.try_evaluate(observation) {
            Ok(signal) => signal,
            Err(e) => {
                warn!(
                    strategy = %self.name,
                    token = observation.base_token_address().unwrap_or("?"),
                    error = %e,
                    "Evaluation failed"
                );
                None
            }
        }
    }

    fn open_positions(&self) -> Vec<Position> {
        self.book.snapshot()
    }
}
