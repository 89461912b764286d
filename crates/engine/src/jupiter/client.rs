use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use common::{Error, Result};

/// REST client for the Jupiter v6 swap API. Used for quotes and unsigned
/// swap transactions.
pub struct JupiterClient {
    http: Client,
    base_url: String,
}

/// Route returned by `/quote`. Kept verbatim since `/swap` wants it back
/// unchanged.
#[derive(Debug, Clone)]
pub struct Quote {
    raw: Value,
}

impl Quote {
    pub fn from_value(raw: Value) -> Result<Self> {
        if raw.get("outAmount").and_then(Value::as_str).is_none() {
            return Err(Error::Execution(format!("quote response has no outAmount: {raw}")));
        }
        Ok(Self { raw })
    }

    pub fn out_amount(&self) -> &str {
        self.raw.get("outAmount").and_then(Value::as_str).unwrap_or_default()
    }

    pub fn as_value(&self) -> &Value {
        &self.raw
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SwapResponse {
    swap_transaction: String,
}

impl JupiterClient {
    pub fn new(http: Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Best route for swapping `amount` raw units of `input_mint`.
    pub async fn quote(&self, input_mint: &str, output_mint: &str, amount: u64, slippage_bps: u16) -> Result<Quote> {
        let url = format!("{}/quote", self.base_url);
        let amount = amount.to_string();
        let slippage = slippage_bps.to_string();

        debug!(input_mint, output_mint, amount = %amount, "Requesting Jupiter quote");
        let resp = self
            .http
            .get(&url)
            .query(&[
                ("inputMint", input_mint),
                ("outputMint", output_mint),
                ("amount", amount.as_str()),
                ("slippageBps", slippage.as_str()),
            ])
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let body = Self::read_body(resp).await?;
        Quote::from_value(serde_json::from_str(&body)?)
    }

    /// Unsigned, base64-encoded transaction executing `quote` for `user_public_key`.
    pub async fn swap_transaction(&self, quote: &Quote, user_public_key: &str) -> Result<String> {
        let url = format!("{}/swap", self.base_url);
        let resp = self
            .http
            .post(&url)
            .json(&json!({
                "quoteResponse": quote.as_value(),
                "userPublicKey": user_public_key,
                "wrapAndUnwrapSol": true,
            }))
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let body = Self::read_body(resp).await?;
        parse_swap_response(&body)
    }

    async fn read_body(resp: reqwest::Response) -> Result<String> {
        let status = resp.status();
        let body = resp.text().await.map_err(|e| Error::Http(e.to_string()))?;
        if !status.is_success() {
            return Err(Error::Execution(format!("Jupiter HTTP {status}: {body}")));
        }
        Ok(body)
    }
}

fn parse_swap_response(body: &str) -> Result<String> {
    let swap: SwapResponse = serde_json::from_str(body)?;
    if swap.swap_transaction.is_empty() {
        return Err(Error::Execution("swap response has an empty transaction".into()));
    }
    Ok(swap.swap_transaction)
}
