use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Error, Result};

// ─── Observation ─────────────────────────────────────────────────────────────

/// One normalized market snapshot for an instrument, as published on its
/// `token_data:<pairAddress>` channel.
///
/// The payload is kept as an opaque JSON mapping. Only the fields strategies
/// need get typed accessors; volume, liquidity and the rest pass through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Observation(Value);

impl Observation {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn pair_address(&self) -> Option<&str> {
        self.str_field("pairAddress")
    }

    /// Base-asset mint address. Reads `baseToken.address` and falls back to
    /// the flat `tokenAddress` key some normalizers emit.
    pub fn base_token_address(&self) -> Option<&str> {
        self.0
            .get("baseToken")
            .and_then(|base| base.get("address"))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .or_else(|| self.str_field("tokenAddress"))
    }

    /// `None` when absent or empty; `Some(Err)` when present but not a
    /// positive number. A zero price means the feed had no quote.
    pub fn price_usd(&self) -> Option<Result<Decimal>> {
        self.price_field("priceUsd")
    }

    /// Price quoted in the pair's quote asset. Same rules as `price_usd`.
    pub fn price_native(&self) -> Option<Result<Decimal>> {
        self.price_field("priceNative")
    }

    /// Percent price change over a rolling window (`m5`, `h1`, `h6`, `h24`).
    pub fn price_change(&self, window: &str) -> Option<Result<Decimal>> {
        let flat_key = format!("priceChange_{window}");
        let value = self
            .0
            .get("priceChange")
            .and_then(|changes| changes.get(window))
            .or_else(|| self.0.get(flat_key.as_str()))?;
        parse_decimal(value, &flat_key)
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    fn price_field(&self, key: &str) -> Option<Result<Decimal>> {
        let price = parse_decimal(self.0.get(key)?, key)?;
        Some(price.and_then(|p| {
            if p > Decimal::ZERO {
                Ok(p)
            } else {
                Err(Error::Validation(format!("{key} must be positive, got {p}")))
            }
        }))
    }
}

impl From<Value> for Observation {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

fn parse_decimal(value: &Value, field: &str) -> Option<Result<Decimal>> {
    let text = match value {
        Value::Null => return None,
        Value::String(s) if s.trim().is_empty() => return None,
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        other => {
            return Some(Err(Error::Validation(format!(
                "{field} is not numeric: {other}"
            ))))
        }
    };
    Some(
        Decimal::from_str(&text)
            .or_else(|_| Decimal::from_scientific(&text))
            .map_err(|e| Error::Validation(format!("{field} '{text}' is not a decimal: {e}"))),
    )
}

// ─── Signal ──────────────────────────────────────────────────────────────────

/// Side of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Buy,
    Sell,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Buy => write!(f, "buy"),
            Action::Sell => write!(f, "sell"),
        }
    }
}

/// Quantity carried by a signal.
///
/// Buys are sized in the quote asset. A strategy only knows its entry price,
/// not how many base units the buy filled, so it closes with `ClosePosition`
/// and the executor resolves the actual holding from the backend.
///
/// On the wire `Exact` is a JSON number and `ClosePosition` is the string
/// `"close_position"`. Numeric strings are accepted when reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Amount {
    Exact(Decimal),
    ClosePosition,
}

const CLOSE_POSITION: &str = "close_position";

impl Serialize for Amount {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Amount::Exact(amount) => {
                let text = amount.to_string();
                match text.parse::<f64>() {
                    Ok(number) if number.is_finite() => serializer.serialize_f64(number),
                    _ => serializer.serialize_str(&text),
                }
            }
            Amount::ClosePosition => serializer.serialize_str(CLOSE_POSITION),
        }
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(rename_all = "snake_case")]
        enum Sentinel {
            ClosePosition,
        }

        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Sentinel(Sentinel),
            Exact(Decimal),
        }

        match Repr::deserialize(deserializer).map_err(|_| {
            serde::de::Error::custom(format!(
                "amount must be a number or \"{CLOSE_POSITION}\""
            ))
        })? {
            Repr::Sentinel(Sentinel::ClosePosition) => Ok(Amount::ClosePosition),
            Repr::Exact(amount) => Ok(Amount::Exact(amount)),
        }
    }
}

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Amount::Exact(amount) => write!(f, "{amount}"),
            Amount::ClosePosition => write!(f, "all"),
        }
    }
}

/// Signal emitted by a strategy, passed to the trade executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub action: Action,
    /// Base-asset mint address. Not the pair address.
    pub token: String,
    pub amount: Amount,
    /// In `[0, 1]`.
    pub confidence: f64,
    pub pair_address: String,
}

impl Signal {
    /// Validated constructor for signals built from untrusted input.
    pub fn new(
        action: Action,
        token: impl Into<String>,
        amount: Amount,
        confidence: f64,
        pair_address: impl Into<String>,
    ) -> Result<Self> {
        let signal = Self {
            action,
            token: token.into(),
            amount,
            confidence,
            pair_address: pair_address.into(),
        };
        signal.validate()?;
        Ok(signal)
    }

    pub fn buy(
        token: impl Into<String>,
        quote_amount: Decimal,
        confidence: f64,
        pair_address: impl Into<String>,
    ) -> Self {
        Self {
            action: Action::Buy,
            token: token.into(),
            amount: Amount::Exact(quote_amount),
            confidence,
            pair_address: pair_address.into(),
        }
    }

    pub fn sell(
        token: impl Into<String>,
        base_units: Decimal,
        confidence: f64,
        pair_address: impl Into<String>,
    ) -> Self {
        Self {
            action: Action::Sell,
            token: token.into(),
            amount: Amount::Exact(base_units),
            confidence,
            pair_address: pair_address.into(),
        }
    }

    /// Sell whatever the wallet holds of `token`.
    pub fn close(token: impl Into<String>, confidence: f64, pair_address: impl Into<String>) -> Self {
        Self {
            action: Action::Sell,
            token: token.into(),
            amount: Amount::ClosePosition,
            confidence,
            pair_address: pair_address.into(),
        }
    }

    /// Check every field. The executor runs this before anything else.
    pub fn validate(&self) -> Result<()> {
        if self.token.trim().is_empty() {
            return Err(Error::Validation("signal is missing token".into()));
        }
        if self.pair_address.trim().is_empty() {
            return Err(Error::Validation("signal is missing pair_address".into()));
        }
        if !self.confidence.is_finite() || !(0.0..=1.0).contains(&self.confidence) {
            return Err(Error::Validation(format!(
                "signal confidence {} outside [0, 1]",
                self.confidence
            )));
        }
        match (self.action, self.amount) {
            (_, Amount::Exact(amount)) if amount <= Decimal::ZERO => Err(Error::Validation(
                format!("signal amount must be positive, got {amount}"),
            )),
            (Action::Buy, Amount::ClosePosition) => Err(Error::Validation(
                "close-position amount is only valid on sell signals".into(),
            )),
            _ => Ok(()),
        }
    }
}

// ─── Position ────────────────────────────────────────────────────────────────

/// An open holding tracked by a strategy instance, keyed by `token`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub token: String,
    pub entry_price: Decimal,
    pub opened_at: DateTime<Utc>,
    /// Snapshot that triggered the buy.
    pub observation: Observation,
}

// ─── Identifiers ─────────────────────────────────────────────────────────────

/// Transaction identifier returned by a trading backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxId(String);

impl TxId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TxId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Wallet the executor trades from. For the live backend this is the owner
/// public key; the paper backend treats it as an opaque account name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WalletRef(String);

impl WalletRef {
    pub fn new(wallet: impl Into<String>) -> Self {
        Self(wallet.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for WalletRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether the bot is running against the real backend or simulating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradingMode {
    Live,
    Paper,
}

impl std::fmt::Display for TradingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradingMode::Live => write!(f, "live"),
            TradingMode::Paper => write!(f, "paper"),
        }
    }
}
