use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{error, info, warn};

use common::{Action, Amount, Signal, TradingModule, TxId, WalletRef};
use risk::{RejectionReason, RiskGate};

/// What happened to one signal.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Rejected(RejectionReason),
    Executed(TxId),
    /// The backend refused or errored. Not retried.
    Failed(String),
}

impl Outcome {
    pub fn is_executed(&self) -> bool {
        matches!(self, Outcome::Executed(_))
    }
}

/// Receives signals, runs them through the risk gate and dispatches approved
/// ones to the trading backend.
///
/// This is the ONLY component that calls `TradingModule::buy` / `sell`.
/// It keeps no per-signal state, so one executor is shared by every strategy
/// handler.
pub struct TradeExecutor {
    gate: RiskGate,
    module: Arc<dyn TradingModule>,
    wallet: WalletRef,
}

impl TradeExecutor {
    pub fn new(gate: RiskGate, module: Arc<dyn TradingModule>, wallet: WalletRef) -> Self {
        info!(backend = module.name(), wallet = %wallet, "TradeExecutor initialized");
        Self { gate, module, wallet }
    }

    pub fn wallet(&self) -> &WalletRef {
        &self.wallet
    }

    pub async fn handle_signal(&self, signal: &Signal) -> Outcome {
        if let Err(reason) = self.gate.check(signal) {
            return Outcome::Rejected(reason);
        }

        info!(
            action = %signal.action,
            token = %signal.token,
            amount = %signal.amount,
            confidence = signal.confidence,
            pair = %signal.pair_address,
            "Executing trade"
        );

        let result = match (signal.action, signal.amount) {
            (Action::Buy, Amount::Exact(quote_amount)) => {
                self.module.buy(&signal.token, quote_amount, &self.wallet).await
            }
            (Action::Sell, Amount::Exact(base_units)) => {
                self.module.sell(&signal.token, base_units, &self.wallet).await
            }
            (Action::Sell, Amount::ClosePosition) => match self.resolve_holding(&signal.token).await {
                Ok(base_units) => self.module.sell(&signal.token, base_units, &self.wallet).await,
                Err(outcome) => return outcome,
            },
            // The gate rejects this combination.
            (Action::Buy, Amount::ClosePosition) => {
                return Outcome::Rejected(RejectionReason::Invalid(
                    "close-position amount on a buy".into(),
                ))
            }
        };

        match result {
            Ok(tx_id) => {
                info!(
                    action = %signal.action,
                    token = %signal.token,
                    tx = %tx_id,
                    "Trade executed"
                );
                Outcome::Executed(tx_id)
            }
            Err(e) => {
                error!(
                    action = %signal.action,
                    token = %signal.token,
                    backend = self.module.name(),
                    error = %e,
                    "Trade failed"
                );
                Outcome::Failed(e.to_string())
            }
        }
    }

    /// Current holding of `token`, or the outcome to report when there is
    /// nothing to sell.
    async fn resolve_holding(&self, token: &str) -> Result<Decimal, Outcome> {
        match self.module.balance(token, &self.wallet).await {
            Ok(units) if units > Decimal::ZERO => Ok(units),
            Ok(units) => {
                warn!(token, balance = %units, "Close requested but wallet holds nothing");
                Err(Outcome::Failed(format!("no holding of '{token}' to close")))
            }
            Err(e) => {
                error!(token, error = %e, "Balance lookup failed, close skipped");
                Err(Outcome::Failed(e.to_string()))
            }
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
