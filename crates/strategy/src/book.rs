use std::collections::HashMap;

use chrono::Utc;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tracing::{info, warn};

use common::{Observation, Position, Signal};

/// What a strategy wants to do with the position it was shown.
#[derive(Debug)]
pub enum Decision {
    Hold,
    /// Open a position at `entry_price` and emit the buy.
    Open { entry_price: Decimal, signal: Signal },
    /// Drop the position and emit the sell.
    Close(Signal),
}

/// Open positions of one strategy instance, keyed by base-asset address.
///
/// `apply` runs the read, the decision and the write under one lock, so two
/// overlapping evaluations for the same token cannot both open a position.
#[derive(Debug, Default)]
pub struct PositionBook {
    positions: Mutex<HashMap<String, Position>>,
}

impl PositionBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide on `token` given its current position and commit the result.
    ///
    /// The position is created or removed when the signal is emitted, not when
    /// it executes. A decision carrying an invalid signal commits nothing.
    pub fn apply<F>(&self, token: &str, observation: &Observation, decide: F) -> Option<Signal>
    where
        F: FnOnce(Option<&Position>) -> Decision,
    {
        let mut positions = self.positions.lock();
        let decision = decide(positions.get(token));
        if let Decision::Open { signal, .. } | Decision::Close(signal) = &decision {
            if let Err(e) = signal.validate() {
                warn!(token, error = %e, "Strategy produced an invalid signal, position unchanged");
                return None;
            }
        }
        match decision {
            Decision::Hold => None,
            Decision::Open { entry_price, signal } => {
                if positions.contains_key(token) {
                    return None;
                }
                positions.insert(
                    token.to_string(),
                    Position {
                        token: token.to_string(),
                        entry_price,
                        opened_at: Utc::now(),
                        observation: observation.clone(),
                    },
                );
                info!(token, entry_price = %entry_price, "Position opened");
                Some(signal)
            }
            Decision::Close(signal) => {
                let closed = positions.remove(token)?;
                info!(token, entry_price = %closed.entry_price, "Position closed");
                Some(signal)
            }
        }
    }

    pub fn get(&self, token: &str) -> Option<Position> {
        self.positions.lock().get(token).cloned()
    }

    pub fn snapshot(&self) -> Vec<Position> {
        self.positions.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.positions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
