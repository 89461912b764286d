use std::collections::HashMap;
use std::path::Path;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use common::{Error, Result};

/// Top-level strategy config file (TOML).
///
/// Example `config/strategies.toml`:
/// ```toml
/// [[strategy]]
/// type = "threshold"
/// name = "BONK threshold"
/// token_symbol = "BONK"
/// pair_address = "8sLbNZoA1cfnvMJLPfp98ZLAnFSYCFApfJKMbiXNLwxj"
/// amount = 0.001
///
/// [strategy.params]
/// buy_threshold = 0.5
/// sell_threshold = 0.6
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StrategyFileConfig {
    #[serde(rename = "strategy", default)]
    pub strategies: Vec<StrategyConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StrategyConfig {
    /// Strategy type identifier: "threshold" or "momentum".
    #[serde(rename = "type")]
    pub strategy_type: String,
    /// Human-readable name shown in logs.
    pub name: String,
    /// Display symbol, logs only.
    #[serde(default)]
    pub token_symbol: Option<String>,
    /// Liquidity pair the strategy subscribes to.
    pub pair_address: String,
    /// Buy size in the quote asset. Falls back to the strategy default.
    #[serde(default)]
    pub amount: Option<Decimal>,
    /// Strategy-specific parameters.
    #[serde(default)]
    pub params: HashMap<String, toml::Value>,
}

impl StrategyFileConfig {
    /// Load from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "failed to read strategy config at '{}': {e}",
                path.display()
            ))
        })?;
        Self::parse(&content).map_err(|e| {
            Error::Config(format!("strategy config at '{}': {e}", path.display()))
        })
    }

    pub fn parse(content: &str) -> Result<Self> {
        let cfg: Self = toml::from_str(content)
            .map_err(|e| Error::Config(format!("failed to parse strategy config: {e}")))?;
        for entry in &cfg.strategies {
            if entry.pair_address.trim().is_empty() {
                return Err(Error::Config(format!(
                    "strategy '{}' has an empty pair_address",
                    entry.name
                )));
            }
        }
        Ok(cfg)
    }
}
