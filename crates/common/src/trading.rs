use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::{Result, TxId, WalletRef};

/// Abstraction over the swap execution backend.
///
/// `JupiterTradingModule` implements this for live trading.
/// `PaperTradingModule` implements this for simulation.
///
/// Only `TradeExecutor` in `crates/engine` should hold a reference to a
/// `dyn TradingModule`. All signals must pass the risk gate before reaching it.
///
/// Calls for different tokens may run concurrently. Ordering of concurrent
/// calls for the same token and wallet is the backend's problem.
#[async_trait]
pub trait TradingModule: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &str;

    /// Spend `quote_amount` of the quote asset to buy `token`.
    async fn buy(&self, token: &str, quote_amount: Decimal, wallet: &WalletRef) -> Result<TxId>;

    /// Sell `base_units` of `token` back into the quote asset.
    async fn sell(&self, token: &str, base_units: Decimal, wallet: &WalletRef) -> Result<TxId>;

    /// Current holding of `token` in base units. Used to size close-position sells.
    async fn balance(&self, token: &str, wallet: &WalletRef) -> Result<Decimal>;
}
