use std::str::FromStr;

use rust_decimal::Decimal;

use crate::{Error, Result, TradingMode, WalletRef};

const DEFAULT_RPC_URL: &str = "https://api.mainnet-beta.solana.com";
const DEFAULT_JUPITER_API_URL: &str = "https://quote-api.jup.ag/v6";
const PAPER_WALLET: &str = "paper-wallet";

/// All configuration loaded from environment variables at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // Trading
    pub trading_mode: TradingMode,
    /// Wallet every trade is executed from.
    pub wallet: WalletRef,

    // Live backend
    pub rpc_url: String,
    pub jupiter_api_url: String,
    /// HTTP signing service. Required in live mode.
    pub signer_url: Option<String>,
    pub swap_slippage_bps: u16,

    // Paper backend
    pub paper_slippage_bps: Decimal,
    /// Starting quote-asset balance of the simulated wallet.
    pub paper_balance: Decimal,

    // Risk gate
    pub min_confidence: f64,
    pub max_buy_amount: Option<Decimal>,

    // Pipeline
    pub strategy_config_path: String,
    /// Newline-delimited observations to publish at startup.
    pub replay_path: Option<String>,
    pub replay_interval_ms: u64,
    pub bus_capacity: usize,
}

impl Config {
    /// Load configuration from the process environment.
    /// Loads `.env` if present.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv(); // ignore error if .env not present
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let trading_mode = match get("TRADING_MODE")
            .unwrap_or_else(|| "paper".to_string())
            .to_lowercase()
            .as_str()
        {
            "paper" => TradingMode::Paper,
            "live" => TradingMode::Live,
            other => {
                return Err(Error::Config(format!(
                    "TRADING_MODE must be 'paper' or 'live', got: '{other}'"
                )))
            }
        };

        let wallet = match (trading_mode, get("WALLET_ADDRESS")) {
            (_, Some(address)) => WalletRef::new(address),
            (TradingMode::Paper, None) => WalletRef::new(PAPER_WALLET),
            (TradingMode::Live, None) => {
                return Err(Error::Config(
                    "WALLET_ADDRESS is required when TRADING_MODE=live".into(),
                ))
            }
        };

        let signer_url = get("SIGNER_URL").map(|u| validate_url("SIGNER_URL", u)).transpose()?;
        if trading_mode == TradingMode::Live && signer_url.is_none() {
            return Err(Error::Config(
                "SIGNER_URL is required when TRADING_MODE=live".into(),
            ));
        }

        let min_confidence: f64 = parse_or("MIN_CONFIDENCE", get("MIN_CONFIDENCE"), 0.9)?;
        if !(0.0..=1.0).contains(&min_confidence) {
            return Err(Error::Config(format!(
                "MIN_CONFIDENCE must be within [0, 1], got {min_confidence}"
            )));
        }

        Ok(Config {
            trading_mode,
            wallet,
            rpc_url: validate_url(
                "RPC_URL",
                get("RPC_URL").unwrap_or_else(|| DEFAULT_RPC_URL.to_string()),
            )?,
            jupiter_api_url: validate_url(
                "JUPITER_API_URL",
                get("JUPITER_API_URL").unwrap_or_else(|| DEFAULT_JUPITER_API_URL.to_string()),
            )?,
            signer_url,
            swap_slippage_bps: parse_or("SWAP_SLIPPAGE_BPS", get("SWAP_SLIPPAGE_BPS"), 50)?,
            paper_slippage_bps: parse_or(
                "PAPER_SLIPPAGE_BPS",
                get("PAPER_SLIPPAGE_BPS"),
                Decimal::TEN,
            )?,
            paper_balance: parse_or("PAPER_BALANCE", get("PAPER_BALANCE"), Decimal::TEN)?,
            min_confidence,
            max_buy_amount: get("MAX_BUY_AMOUNT")
                .map(|v| parse("MAX_BUY_AMOUNT", &v))
                .transpose()?,
            strategy_config_path: get("STRATEGY_CONFIG_PATH")
                .unwrap_or_else(|| "config/strategies.toml".to_string()),
            replay_path: get("REPLAY_PATH"),
            replay_interval_ms: parse_or("REPLAY_INTERVAL_MS", get("REPLAY_INTERVAL_MS"), 1000)?,
            bus_capacity: parse_or("BUS_CAPACITY", get("BUS_CAPACITY"), 1024)?,
        })
    }
}

fn parse<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| Error::Config(format!("{key} has invalid value '{raw}': {e}")))
}

fn parse_or<T>(key: &str, raw: Option<String>, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.map_or(Ok(default), |v| parse(key, &v))
}

fn validate_url(key: &str, raw: String) -> Result<String> {
    url::Url::parse(&raw).map_err(|e| Error::Config(format!("{key} is not a valid URL: {e}")))?;
    Ok(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn empty_environment_defaults_to_paper() {
        let cfg = config_from(&[]).unwrap();
        assert_eq!(cfg.trading_mode, TradingMode::Paper);
        assert_eq!(cfg.wallet.as_str(), PAPER_WALLET);
        assert_eq!(cfg.min_confidence, 0.9);
        assert_eq!(cfg.swap_slippage_bps, 50);
        assert_eq!(cfg.bus_capacity, 1024);
        assert!(cfg.max_buy_amount.is_none());
        assert!(cfg.replay_path.is_none());
    }

    #[test]
    fn live_mode_requires_wallet_and_signer() {
        assert!(matches!(
            config_from(&[("TRADING_MODE", "live")]),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            config_from(&[("TRADING_MODE", "live"), ("WALLET_ADDRESS", "Owner111")]),
            Err(Error::Config(_))
        ));

        let cfg = config_from(&[
            ("TRADING_MODE", "LIVE"),
            ("WALLET_ADDRESS", "Owner111"),
            ("SIGNER_URL", "http://127.0.0.1:9000/sign"),
        ])
        .unwrap();
        assert_eq!(cfg.trading_mode, TradingMode::Live);
        assert_eq!(cfg.wallet.as_str(), "Owner111");
    }

    #[test]
    fn unknown_trading_mode_is_rejected() {
        assert!(matches!(
            config_from(&[("TRADING_MODE", "yolo")]),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn malformed_numbers_and_urls_are_rejected() {
        assert!(config_from(&[("MIN_CONFIDENCE", "high")]).is_err());
        assert!(config_from(&[("MIN_CONFIDENCE", "1.5")]).is_err());
        assert!(config_from(&[("RPC_URL", "not a url")]).is_err());
        assert!(config_from(&[("MAX_BUY_AMOUNT", "lots")]).is_err());
    }

    #[test]
    fn optional_values_are_parsed() {
        let cfg = config_from(&[
            ("MAX_BUY_AMOUNT", "0.5"),
            ("REPLAY_PATH", "demos/observations.ndjson"),
            ("REPLAY_INTERVAL_MS", "250"),
        ])
        .unwrap();
        assert_eq!(cfg.max_buy_amount, Some(Decimal::new(5, 1)));
        assert_eq!(cfg.replay_path.as_deref(), Some("demos/observations.ndjson"));
        assert_eq!(cfg.replay_interval_ms, 250);
    }
}
