use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::info;

use common::{Error, Result};

use crate::config::{StrategyConfig, StrategyFileConfig};
use crate::momentum::{MomentumParams, MomentumStrategy};
use crate::threshold::{ThresholdParams, ThresholdStrategy};
use crate::Strategy;

/// Pair address → the strategy instance that owns it.
///
/// At most one strategy per pair, since each strategy owns the position
/// state of its instrument.
#[derive(Default)]
pub struct StrategyRegistry {
    strategies: HashMap<String, Arc<dyn Strategy>>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the registry from config. Unknown strategy types and duplicate
    /// pair addresses are configuration errors.
    pub fn from_config(file_cfg: &StrategyFileConfig) -> Result<Self> {
        let mut registry = Self::new();
        for cfg in &file_cfg.strategies {
            let strategy = build_strategy(cfg)?;
            info!(
                name = %strategy.name(),
                pair = %strategy.pair_address(),
                symbol = cfg.token_symbol.as_deref().unwrap_or("-"),
                kind = %cfg.strategy_type,
                "Registered strategy"
            );
            registry.register(strategy)?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, strategy: Arc<dyn Strategy>) -> Result<()> {
        let pair = strategy.pair_address().to_string();
        if let Some(existing) = self.strategies.get(&pair) {
            return Err(Error::Config(format!(
                "pair '{pair}' is already tracked by strategy '{}'",
                existing.name()
            )));
        }
        self.strategies.insert(pair, strategy);
        Ok(())
    }

    pub fn get(&self, pair_address: &str) -> Option<&Arc<dyn Strategy>> {
        self.strategies.get(pair_address)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn Strategy>)> {
        self.strategies.iter().map(|(pair, s)| (pair.as_str(), s))
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

// ─── Strategy builders ────────────────────────────────────────────────────────

fn build_strategy(cfg: &StrategyConfig) -> Result<Arc<dyn Strategy>> {
    match cfg.strategy_type.as_str() {
        "threshold" => {
            let defaults = ThresholdParams::default();
            let params = ThresholdParams {
                buy_threshold: param_decimal(cfg, "buy_threshold", defaults.buy_threshold)?,
                sell_threshold: param_decimal(cfg, "sell_threshold", defaults.sell_threshold)?,
                buy_amount: cfg.amount.unwrap_or(defaults.buy_amount),
                confidence: param_f64(cfg, "confidence", defaults.confidence)?,
            };
            check_sizing(cfg, params.buy_amount, params.confidence)?;
            if params.sell_threshold <= params.buy_threshold {
                return Err(Error::Config(format!(
                    "strategy '{}': sell_threshold must exceed buy_threshold",
                    cfg.name
                )));
            }
            Ok(Arc::new(ThresholdStrategy::new(&cfg.name, &cfg.pair_address, params)))
        }
        "momentum" => {
            let defaults = MomentumParams::default();
            let params = MomentumParams {
                window: param_str(cfg, "window", &defaults.window)?,
                min_change_pct: param_decimal(cfg, "min_change_pct", defaults.min_change_pct)?,
                take_profit: param_decimal(cfg, "take_profit", defaults.take_profit)?,
                stop_loss: param_decimal(cfg, "stop_loss", defaults.stop_loss)?,
                buy_amount: cfg.amount.unwrap_or(defaults.buy_amount),
                confidence: param_f64(cfg, "confidence", defaults.confidence)?,
            };
            check_sizing(cfg, params.buy_amount, params.confidence)?;
            if params.stop_loss <= Decimal::ZERO || params.stop_loss >= Decimal::ONE {
                return Err(Error::Config(format!(
                    "strategy '{}': stop_loss must be within (0, 1)",
                    cfg.name
                )));
            }
            Ok(Arc::new(MomentumStrategy::new(&cfg.name, &cfg.pair_address, params)))
        }
        other => Err(Error::Config(format!(
            "strategy '{}' has unknown type '{other}'",
            cfg.name
        ))),
    }
}

/// Every signal a strategy emits carries these two values, so a bad one
/// would fail validation on every trade.
fn check_sizing(cfg: &StrategyConfig, amount: Decimal, confidence: f64) -> Result<()> {
    if amount <= Decimal::ZERO {
        return Err(Error::Config(format!(
            "strategy '{}': amount must be positive, got {amount}",
            cfg.name
        )));
    }
    if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
        return Err(Error::Config(format!(
            "strategy '{}': confidence {confidence} outside [0, 1]",
            cfg.name
        )));
    }
    Ok(())
}

fn invalid_param(cfg: &StrategyConfig, key: &str, value: &toml::Value) -> Error {
    Error::Config(format!(
        "strategy '{}': param '{key}' has invalid value {value}",
        cfg.name
    ))
}

fn param_decimal(cfg: &StrategyConfig, key: &str, default: Decimal) -> Result<Decimal> {
    let Some(value) = cfg.params.get(key) else {
        return Ok(default);
    };
    let parsed = match value {
        toml::Value::Integer(i) => Some(Decimal::from(*i)),
        toml::Value::Float(f) => Decimal::from_str(&f.to_string()).ok(),
        toml::Value::String(s) => Decimal::from_str(s.trim()).ok(),
        _ => None,
    };
    parsed.ok_or_else(|| invalid_param(cfg, key, value))
}

fn param_f64(cfg: &StrategyConfig, key: &str, default: f64) -> Result<f64> {
    let Some(value) = cfg.params.get(key) else {
        return Ok(default);
    };
    match value {
        toml::Value::Float(f) => Ok(*f),
        toml::Value::Integer(i) => Ok(*i as f64),
        _ => Err(invalid_param(cfg, key, value)),
    }
}

fn param_str(cfg: &StrategyConfig, key: &str, default: &str) -> Result<String> {
    match cfg.params.get(key) {
        None => Ok(default.to_string()),
        Some(toml::Value::String(s)) => Ok(s.clone()),
        Some(value) => Err(invalid_param(cfg, key, value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    use common::Observation;

    fn registry(toml: &str) -> Result<StrategyRegistry> {
        StrategyRegistry::from_config(&StrategyFileConfig::parse(toml)?)
    }

    #[test]
    fn builds_each_strategy_type() {
        let reg = registry(
            r#"
            [[strategy]]
            type = "threshold"
            name = "a"
            pair_address = "PAIR1"

            [[strategy]]
            type = "momentum"
            name = "b"
            pair_address = "PAIR2"
            "#,
        )
        .unwrap();
        assert_eq!(reg.len(), 2);
        assert_eq!(reg.get("PAIR1").unwrap().name(), "a");
        assert_eq!(reg.get("PAIR2").unwrap().name(), "b");
        assert!(reg.get("PAIR3").is_none());
    }

    #[test]
    fn params_override_defaults() {
        let reg = registry(
            r#"
            [[strategy]]
            type = "threshold"
            name = "tuned"
            pair_address = "PAIR1"
            amount = 0.25

            [strategy.params]
            buy_threshold = 2
            sell_threshold = "3.5"
            "#,
        )
        .unwrap();
        let strategy = reg.get("PAIR1").unwrap();

        let obs = Observation::new(json!({
            "priceUsd": "1.9",
            "baseToken": { "address": "MINT" }
        }));
        let signal = strategy.evaluate(&obs).expect("buy below tuned threshold");
        assert_eq!(signal.amount, common::Amount::Exact(dec!(0.25)));
    }

    #[test]
    fn shipped_config_builds() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../../config/strategies.toml");
        let reg = StrategyRegistry::from_config(&StrategyFileConfig::load(path).unwrap()).unwrap();
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn unknown_type_is_rejected() {
        let err = registry(
            r#"
            [[strategy]]
            type = "martingale"
            name = "nope"
            pair_address = "PAIR1"
            "#,
        );
        assert!(matches!(err, Err(Error::Config(_))));
    }

    #[test]
    fn duplicate_pair_is_rejected() {
        let err = registry(
            r#"
            [[strategy]]
            type = "threshold"
            name = "a"
            pair_address = "PAIR1"

            [[strategy]]
            type = "momentum"
            name = "b"
            pair_address = "PAIR1"
            "#,
        );
        assert!(matches!(err, Err(Error::Config(_))));
    }

    #[test]
    fn bad_params_are_rejected() {
        let wrong_type = registry(
            r#"
            [[strategy]]
            type = "threshold"
            name = "a"
            pair_address = "PAIR1"

            [strategy.params]
            buy_threshold = true
            "#,
        );
        assert!(matches!(wrong_type, Err(Error::Config(_))));

        let inverted = registry(
            r#"
            [[strategy]]
            type = "threshold"
            name = "a"
            pair_address = "PAIR1"

            [strategy.params]
            buy_threshold = 0.7
            sell_threshold = 0.6
            "#,
        );
        assert!(matches!(inverted, Err(Error::Config(_))));
    }

    #[test]
    fn non_positive_amount_or_out_of_range_confidence_is_rejected() {
        let negative_amount = registry(
            r#"
            [[strategy]]
            type = "threshold"
            name = "a"
            pair_address = "PAIR1"
            amount = -0.001
            "#,
        );
        assert!(matches!(negative_amount, Err(Error::Config(_))));

        let zero_amount = registry(
            r#"
            [[strategy]]
            type = "momentum"
            name = "b"
            pair_address = "PAIR2"
            amount = 0
            "#,
        );
        assert!(matches!(zero_amount, Err(Error::Config(_))));

        let overconfident = registry(
            r#"
            [[strategy]]
            type = "threshold"
            name = "a"
            pair_address = "PAIR1"

            [strategy.params]
            confidence = 1.5
            "#,
        );
        assert!(matches!(overconfident, Err(Error::Config(_))));

        let negative_confidence = registry(
            r#"
            [[strategy]]
            type = "momentum"
            name = "b"
            pair_address = "PAIR2"

            [strategy.params]
            confidence = -0.1
            "#,
        );
        assert!(matches!(negative_confidence, Err(Error::Config(_))));
    }
}
