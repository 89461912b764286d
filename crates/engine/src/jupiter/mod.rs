//! Live trading backend: Jupiter swap routing plus Solana JSON-RPC.

pub mod client;
pub mod rpc;
pub mod signer;

pub use client::{JupiterClient, Quote};
pub use rpc::{Confirmation, SolanaRpc};
pub use signer::{RemoteSigner, TransactionSigner};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::info;

use common::{Config, Error, Result, TradingModule, TxId, WalletRef};

/// Wrapped SOL, the quote asset of every swap.
pub const SOL_MINT: &str = "So11111111111111111111111111111111111111112";
pub const SOL_DECIMALS: u32 = 9;

#[derive(Debug, Clone)]
pub struct JupiterConfig {
    pub api_url: String,
    pub rpc_url: String,
    pub slippage_bps: u16,
    /// Status polls before a submitted swap counts as failed.
    pub confirm_polls: u32,
    pub confirm_interval: Duration,
}

impl JupiterConfig {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            api_url: cfg.jupiter_api_url.clone(),
            rpc_url: cfg.rpc_url.clone(),
            slippage_bps: cfg.swap_slippage_bps,
            confirm_polls: 20,
            confirm_interval: Duration::from_secs(5),
        }
    }
}

/// Trading backend that swaps through Jupiter and settles on Solana.
///
/// Buys spend SOL, sells return to SOL. Each swap is quote → unsigned
/// transaction → external signature → submit → confirmation polling.
pub struct JupiterTradingModule {
    config: JupiterConfig,
    jupiter: JupiterClient,
    rpc: SolanaRpc,
    signer: Arc<dyn TransactionSigner>,
}

impl JupiterTradingModule {
    pub fn new(config: JupiterConfig, signer: Arc<dyn TransactionSigner>) -> Result<Self> {
        let http = build_http_client()?;
        info!(
            api = %config.api_url,
            rpc = %config.rpc_url,
            slippage_bps = config.slippage_bps,
            "JupiterTradingModule initialized"
        );
        Ok(Self {
            jupiter: JupiterClient::new(http.clone(), config.api_url.clone()),
            rpc: SolanaRpc::new(http, config.rpc_url.clone()),
            config,
            signer,
        })
    }

    async fn swap(&self, input_mint: &str, output_mint: &str, amount: u64, wallet: &WalletRef) -> Result<TxId> {
        info!(input_mint, output_mint, amount, "Starting swap");

        let quote = self
            .jupiter
            .quote(input_mint, output_mint, amount, self.config.slippage_bps)
            .await?;
        info!(out_amount = quote.out_amount(), "Quote received");

        let unsigned = self.jupiter.swap_transaction(&quote, wallet.as_str()).await?;
        let signed = self.signer.sign(wallet, &unsigned).await?;
        let signature = self.rpc.send_transaction(&signed).await?;
        info!(signature = %signature, "Swap transaction sent");

        self.rpc
            .wait_for_confirmation(&signature, self.config.confirm_polls, self.config.confirm_interval)
            .await?;
        Ok(TxId::new(signature))
    }
}

#[async_trait]
impl TradingModule for JupiterTradingModule {
    fn name(&self) -> &str {
        "jupiter"
    }

    async fn buy(&self, token: &str, quote_amount: Decimal, wallet: &WalletRef) -> Result<TxId> {
        let lamports = to_base_units(quote_amount, SOL_DECIMALS)?;
        self.swap(SOL_MINT, token, lamports, wallet).await
    }

    async fn sell(&self, token: &str, base_units: Decimal, wallet: &WalletRef) -> Result<TxId> {
        let units = to_base_units(base_units, 0)?;
        self.swap(token, SOL_MINT, units, wallet).await
    }

    async fn balance(&self, token: &str, wallet: &WalletRef) -> Result<Decimal> {
        self.rpc.token_balance(wallet.as_str(), token).await
    }
}

fn build_http_client() -> Result<Client> {
    Client::builder()
        .use_rustls_tls()
        .timeout(Duration::from_secs(30))
        .build()
        .map_err(|e| Error::Http(format!("failed to build HTTP client: {e}")))
}

/// Build a `RemoteSigner` sharing the backend's HTTP settings.
pub fn remote_signer(url: impl Into<String>) -> Result<Arc<dyn TransactionSigner>> {
    Ok(Arc::new(RemoteSigner::new(build_http_client()?, url)))
}

/// Scale `amount` by `10^decimals` and truncate to whole raw units.
pub fn to_base_units(amount: Decimal, decimals: u32) -> Result<u64> {
    let scale = 10u64
        .checked_pow(decimals)
        .ok_or_else(|| Error::Validation(format!("unsupported token decimals {decimals}")))?;
    let units = amount
        .checked_mul(Decimal::from(scale))
        .map(|scaled| scaled.trunc())
        .and_then(|scaled| scaled.to_u64())
        .ok_or_else(|| Error::Validation(format!("amount {amount} does not fit in raw units")))?;
    if units == 0 {
        return Err(Error::Validation(format!(
            "amount {amount} rounds to zero raw units"
        )));
    }
    Ok(units)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn sol_amounts_convert_to_lamports() {
        assert_eq!(to_base_units(dec!(0.001), SOL_DECIMALS).unwrap(), 1_000_000);
        assert_eq!(to_base_units(dec!(1.5), SOL_DECIMALS).unwrap(), 1_500_000_000);
    }

    #[test]
    fn fractional_raw_units_are_truncated() {
        assert_eq!(to_base_units(dec!(1234.9), 0).unwrap(), 1234);
    }

    #[test]
    fn dust_and_negative_amounts_are_rejected() {
        assert!(to_base_units(dec!(0.0000000001), SOL_DECIMALS).is_err());
        assert!(to_base_units(dec!(-1), 0).is_err());
    }

    #[test]
    fn config_uses_confirmation_defaults() {
        let cfg = Config::from_lookup(|key| match key {
            "SWAP_SLIPPAGE_BPS" => Some("75".to_string()),
            _ => None,
        })
        .unwrap();
        let jupiter = JupiterConfig::from_config(&cfg);
        assert_eq!(jupiter.slippage_bps, 75);
        assert_eq!(jupiter.confirm_polls, 20);
        assert_eq!(jupiter.confirm_interval, Duration::from_secs(5));
    }
}
