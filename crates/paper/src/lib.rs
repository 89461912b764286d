pub mod tracker;

pub use tracker::PriceTracker;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use common::{Action, Error, Result, TradingModule, TxId, WalletRef};

const BPS: Decimal = Decimal::from_parts(10_000, 0, 0, false, 0);

/// One simulated swap.
#[derive(Debug, Clone, PartialEq)]
pub struct PaperFill {
    pub tx_id: TxId,
    pub wallet: WalletRef,
    pub token: String,
    pub action: Action,
    /// Quote asset per base unit, slippage included.
    pub fill_price: Decimal,
    pub base_units: Decimal,
    pub quote_amount: Decimal,
    pub timestamp: DateTime<Utc>,
}

#[derive(Default)]
struct Ledger {
    /// Latest native price per base-asset address.
    prices: HashMap<String, Decimal>,
    /// Base units held per (wallet, token).
    holdings: HashMap<(String, String), Decimal>,
    /// Quote asset per wallet. Seeded on first use.
    quote: HashMap<String, Decimal>,
    fills: Vec<PaperFill>,
}

/// Simulated trading backend.
///
/// Fills are simulated at the latest known native price with configurable
/// slippage. Holdings and quote balances live in memory; nothing leaves the
/// process.
pub struct PaperTradingModule {
    ledger: Arc<RwLock<Ledger>>,
    initial_quote_balance: Decimal,
    /// Slippage in basis points applied to all fills.
    slippage_bps: Decimal,
    latency: Duration,
}

impl PaperTradingModule {
    pub fn new(initial_quote_balance: Decimal, slippage_bps: Decimal) -> Self {
        info!(
            balance = %initial_quote_balance,
            slippage_bps = %slippage_bps,
            "PaperTradingModule initialized"
        );
        Self {
            ledger: Arc::new(RwLock::new(Ledger::default())),
            initial_quote_balance,
            slippage_bps,
            latency: Duration::ZERO,
        }
    }

    /// Delay every fill by `latency` to mimic network round trips.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Update the latest native price for a token (called by `PriceTracker`).
    pub async fn update_price(&self, token: &str, price: Decimal) {
        self.ledger.write().await.prices.insert(token.to_string(), price);
    }

    pub async fn price(&self, token: &str) -> Option<Decimal> {
        self.ledger.read().await.prices.get(token).copied()
    }

    pub async fn quote_balance(&self, wallet: &WalletRef) -> Decimal {
        self.ledger
            .read()
            .await
            .quote
            .get(wallet.as_str())
            .copied()
            .unwrap_or(self.initial_quote_balance)
    }

    /// Every simulated fill so far, oldest first.
    pub async fn fills(&self) -> Vec<PaperFill> {
        self.ledger.read().await.fills.clone()
    }

    async fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    fn mid_price(ledger: &Ledger, token: &str) -> Result<Decimal> {
        match ledger.prices.get(token).copied() {
            Some(price) if price > Decimal::ZERO => Ok(price),
            Some(price) => Err(Error::Execution(format!(
                "paper price for '{token}' is not positive: {price}"
            ))),
            None => Err(Error::Execution(format!(
                "no paper price for token '{token}'. Ensure observations are flowing."
            ))),
        }
    }

    fn slippage(&self) -> Decimal {
        self.slippage_bps / BPS
    }
}

#[async_trait]
impl TradingModule for PaperTradingModule {
    fn name(&self) -> &str {
        "paper"
    }

    async fn buy(&self, token: &str, quote_amount: Decimal, wallet: &WalletRef) -> Result<TxId> {
        self.simulate_latency().await;
        let mut ledger = self.ledger.write().await;

        let mid = Self::mid_price(&ledger, token)?;
        // Buys pay more
        let fill_price = mid * (Decimal::ONE + self.slippage());

        let available = *ledger
            .quote
            .entry(wallet.to_string())
            .or_insert(self.initial_quote_balance);
        if quote_amount > available {
            return Err(Error::Execution(format!(
                "insufficient paper balance: need {quote_amount}, have {available}"
            )));
        }

        let base_units = quote_amount / fill_price;
        ledger.quote.insert(wallet.to_string(), available - quote_amount);
        *ledger
            .holdings
            .entry((wallet.to_string(), token.to_string()))
            .or_default() += base_units;

        let tx_id = TxId::new(format!("paper-{}", Uuid::new_v4()));
        debug!(
            token,
            mid = %mid,
            fill = %fill_price,
            base_units = %base_units,
            tx = %tx_id,
            "Paper buy simulated"
        );
        ledger.fills.push(PaperFill {
            tx_id: tx_id.clone(),
            wallet: wallet.clone(),
            token: token.to_string(),
            action: Action::Buy,
            fill_price,
            base_units,
            quote_amount,
            timestamp: Utc::now(),
        });
        Ok(tx_id)
    }

    async fn sell(&self, token: &str, base_units: Decimal, wallet: &WalletRef) -> Result<TxId> {
        self.simulate_latency().await;
        let mut ledger = self.ledger.write().await;

        let key = (wallet.to_string(), token.to_string());
        let held = ledger.holdings.get(&key).copied().unwrap_or_default();
        if base_units > held {
            return Err(Error::Execution(format!(
                "cannot sell {base_units} of '{token}', wallet holds {held}"
            )));
        }

        let mid = Self::mid_price(&ledger, token)?;
        // Sells receive less
        let fill_price = mid * (Decimal::ONE - self.slippage());
        let proceeds = base_units * fill_price;

        let remaining = held - base_units;
        if remaining.is_zero() {
            ledger.holdings.remove(&key);
        } else {
            ledger.holdings.insert(key, remaining);
        }
        *ledger
            .quote
            .entry(wallet.to_string())
            .or_insert(self.initial_quote_balance) += proceeds;

        let tx_id = TxId::new(format!("paper-{}", Uuid::new_v4()));
        debug!(
            token,
            mid = %mid,
            fill = %fill_price,
            proceeds = %proceeds,
            tx = %tx_id,
            "Paper sell simulated"
        );
        ledger.fills.push(PaperFill {
            tx_id: tx_id.clone(),
            wallet: wallet.clone(),
            token: token.to_string(),
            action: Action::Sell,
            fill_price,
            base_units,
            quote_amount: proceeds,
            timestamp: Utc::now(),
        });
        Ok(tx_id)
    }

    async fn balance(&self, token: &str, wallet: &WalletRef) -> Result<Decimal> {
        Ok(self
            .ledger
            .read()
            .await
            .holdings
            .get(&(wallet.to_string(), token.to_string()))
            .copied()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn wallet() -> WalletRef {
        WalletRef::new("paper-wallet")
    }

    #[tokio::test]
    async fn paper_buy_fill_applies_positive_slippage() {
        let module = PaperTradingModule::new(dec!(10), dec!(10)); // 10 bps
        module.update_price("MINT", dec!(0.002)).await;

        let tx = module.buy("MINT", dec!(1), &wallet()).await.unwrap();
        assert!(tx.as_str().starts_with("paper-"));

        let fill = &module.fills().await[0];
        assert_eq!(fill.fill_price, dec!(0.002002));
        assert_eq!(fill.base_units, dec!(1) / dec!(0.002002));
        assert_eq!(module.quote_balance(&wallet()).await, dec!(9));
    }

    #[tokio::test]
    async fn paper_sell_fill_applies_negative_slippage() {
        let module = PaperTradingModule::new(dec!(10), dec!(10));
        module.update_price("MINT", dec!(0.002)).await;
        module.buy("MINT", dec!(1), &wallet()).await.unwrap();

        let held = module.balance("MINT", &wallet()).await.unwrap();
        module.sell("MINT", held, &wallet()).await.unwrap();

        let fill = &module.fills().await[1];
        assert_eq!(fill.action, Action::Sell);
        assert_eq!(fill.fill_price, dec!(0.001998));
    }

    #[tokio::test]
    async fn paper_holding_recorded_after_buy() {
        let module = PaperTradingModule::new(dec!(10), Decimal::ZERO);
        module.update_price("MINT", dec!(0.5)).await;

        module.buy("MINT", dec!(1), &wallet()).await.unwrap();

        assert_eq!(module.balance("MINT", &wallet()).await.unwrap(), dec!(2));
        assert_eq!(
            module.balance("MINT", &WalletRef::new("other")).await.unwrap(),
            Decimal::ZERO
        );
    }

    #[tokio::test]
    async fn paper_holding_removed_after_full_sell() {
        let module = PaperTradingModule::new(dec!(10), Decimal::ZERO);
        module.update_price("MINT", dec!(0.5)).await;
        module.buy("MINT", dec!(1), &wallet()).await.unwrap();

        module.update_price("MINT", dec!(1)).await;
        module.sell("MINT", dec!(2), &wallet()).await.unwrap();

        assert_eq!(module.balance("MINT", &wallet()).await.unwrap(), Decimal::ZERO);
        assert_eq!(module.quote_balance(&wallet()).await, dec!(11));
    }

    #[tokio::test]
    async fn buy_without_price_fails() {
        let module = PaperTradingModule::new(dec!(10), Decimal::ZERO);
        assert!(matches!(
            module.buy("MINT", dec!(1), &wallet()).await,
            Err(Error::Execution(_))
        ));
        assert!(module.fills().await.is_empty());
    }

    #[tokio::test]
    async fn buy_beyond_balance_fails() {
        let module = PaperTradingModule::new(dec!(1), Decimal::ZERO);
        module.update_price("MINT", dec!(0.5)).await;
        assert!(module.buy("MINT", dec!(2), &wallet()).await.is_err());
        assert_eq!(module.quote_balance(&wallet()).await, dec!(1));
    }

    #[tokio::test]
    async fn sell_more_than_held_fails() {
        let module = PaperTradingModule::new(dec!(10), Decimal::ZERO);
        module.update_price("MINT", dec!(0.5)).await;
        module.buy("MINT", dec!(1), &wallet()).await.unwrap();

        assert!(matches!(
            module.sell("MINT", dec!(3), &wallet()).await,
            Err(Error::Execution(_))
        ));
        assert_eq!(module.balance("MINT", &wallet()).await.unwrap(), dec!(2));
    }
}
