use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use common::{Action, Amount, Signal};

/// Signals below this confidence never reach a trading backend.
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.9;

/// User-configurable risk parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Inclusive lower bound on signal confidence.
    pub min_confidence: f64,
    /// Largest quote-asset amount a single buy may spend. `None` disables the check.
    pub max_buy_amount: Option<Decimal>,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            max_buy_amount: None,
        }
    }
}

impl From<&common::Config> for RiskConfig {
    fn from(cfg: &common::Config) -> Self {
        Self {
            min_confidence: cfg.min_confidence,
            max_buy_amount: cfg.max_buy_amount,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RejectionReason {
    #[error("invalid signal: {0}")]
    Invalid(String),

    #[error("confidence {confidence} below minimum {min}")]
    LowConfidence { confidence: f64, min: f64 },

    #[error("buy amount {amount} exceeds per-trade limit {limit}")]
    ExposureLimitExceeded { amount: Decimal, limit: Decimal },
}

/// The gatekeeper between strategies and the trading backend.
///
/// Stateless: every check looks at the signal alone, so one gate can be shared
/// by any number of concurrent callers.
#[derive(Debug, Clone, Default)]
pub struct RiskGate {
    config: RiskConfig,
}

impl RiskGate {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// Approve or reject one signal.
    pub fn check(&self, signal: &Signal) -> Result<(), RejectionReason> {
        let verdict = self.evaluate(signal);
        match &verdict {
            Ok(()) => debug!(
                token = %signal.token,
                action = %signal.action,
                confidence = signal.confidence,
                "Signal approved by risk gate"
            ),
            Err(reason) => warn!(
                token = %signal.token,
                action = %signal.action,
                reason = %reason,
                "Signal rejected by risk gate"
            ),
        }
        verdict
    }

    fn evaluate(&self, signal: &Signal) -> Result<(), RejectionReason> {
        signal
            .validate()
            .map_err(|e| RejectionReason::Invalid(e.to_string()))?;

        if signal.confidence < self.config.min_confidence {
            return Err(RejectionReason::LowConfidence {
                confidence: signal.confidence,
                min: self.config.min_confidence,
            });
        }

        if let (Action::Buy, Amount::Exact(amount), Some(limit)) =
            (signal.action, signal.amount, self.config.max_buy_amount)
        {
            if amount > limit {
                return Err(RejectionReason::ExposureLimitExceeded { amount, limit });
            }
        }

        Ok(())
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
