use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use reqwest::Client;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use common::{Error, Result};

/// Minimal JSON-RPC client for the handful of Solana calls a swap needs.
pub struct SolanaRpc {
    http: Client,
    url: String,
    next_id: AtomicU64,
}

#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

/// Commitment reached by a submitted transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Processed,
    Confirmed,
    Finalized,
}

impl Confirmation {
    pub fn is_final_enough(self) -> bool {
        matches!(self, Confirmation::Confirmed | Confirmation::Finalized)
    }
}

impl SolanaRpc {
    pub fn new(http: Client, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
            next_id: AtomicU64::new(1),
        }
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let resp = self
            .http
            .post(&self.url)
            .json(&json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params }))
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| Error::Http(e.to_string()))?;
        if !status.is_success() {
            return Err(Error::Http(format!("{method}: HTTP {status}: {body}")));
        }

        let parsed: RpcResponse<T> = serde_json::from_str(&body)?;
        match (parsed.result, parsed.error) {
            (_, Some(err)) => Err(Error::Http(format!(
                "{method} failed ({}): {}",
                err.code, err.message
            ))),
            (Some(result), None) => Ok(result),
            (None, None) => Err(Error::Http(format!("{method} returned no result"))),
        }
    }

    /// Submit a signed base64 transaction. Returns its signature.
    pub async fn send_transaction(&self, signed_tx: &str) -> Result<String> {
        self.call(
            "sendTransaction",
            json!([signed_tx, { "encoding": "base64", "preflightCommitment": "confirmed" }]),
        )
        .await
    }

    /// `None` while the cluster has not seen the signature yet.
    pub async fn signature_status(&self, signature: &str) -> Result<Option<Confirmation>> {
        let result: Value = self
            .call(
                "getSignatureStatuses",
                json!([[signature], { "searchTransactionHistory": true }]),
            )
            .await?;
        parse_signature_status(&result)
    }

    /// Poll until the transaction is confirmed or finalized.
    ///
    /// Waits `interval` before the first poll. RPC errors are logged and
    /// retried. An on-chain failure (`Error::Execution`) ends the wait.
    pub async fn wait_for_confirmation(&self, signature: &str, polls: u32, interval: Duration) -> Result<Confirmation> {
        info!(signature, "Waiting for confirmation");
        for attempt in 1..=polls {
            tokio::time::sleep(interval).await;
            match self.signature_status(signature).await {
                Ok(Some(status)) if status.is_final_enough() => {
                    info!(signature, status = ?status, "Transaction confirmed");
                    return Ok(status);
                }
                Ok(status) => debug!(signature, attempt, status = ?status, "Not confirmed yet"),
                Err(e @ Error::Execution(_)) => return Err(e),
                Err(e) => warn!(signature, attempt, error = %e, "Status poll failed"),
            }
        }
        Err(Error::Execution(format!(
            "transaction {signature} not confirmed after {polls} polls"
        )))
    }

    /// Total raw balance of `mint` across the owner's token accounts.
    pub async fn token_balance(&self, owner: &str, mint: &str) -> Result<Decimal> {
        let result: Value = self
            .call(
                "getTokenAccountsByOwner",
                json!([owner, { "mint": mint }, { "encoding": "jsonParsed" }]),
            )
            .await?;
        sum_token_amounts(&result)
    }
}

fn parse_signature_status(result: &Value) -> Result<Option<Confirmation>> {
    let Some(status) = result.pointer("/value/0").filter(|s| !s.is_null()) else {
        return Ok(None);
    };
    if let Some(err) = status.get("err").filter(|e| !e.is_null()) {
        return Err(Error::Execution(format!("transaction failed on chain: {err}")));
    }
    Ok(match status.get("confirmationStatus").and_then(Value::as_str) {
        Some("finalized") => Some(Confirmation::Finalized),
        Some("confirmed") => Some(Confirmation::Confirmed),
        Some("processed") => Some(Confirmation::Processed),
        _ => None,
    })
}

fn sum_token_amounts(result: &Value) -> Result<Decimal> {
    let accounts = result
        .get("value")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::Execution("getTokenAccountsByOwner: missing value array".into()))?;

    accounts.iter().try_fold(Decimal::ZERO, |total, account| {
        let raw = account
            .pointer("/account/data/parsed/info/tokenAmount/amount")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Execution("token account without parsed amount".into()))?;
        let amount = Decimal::from_str(raw)
            .map_err(|e| Error::Execution(format!("bad token amount '{raw}': {e}")))?;
        Ok(total + amount)
    })
}
