use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use common::{Error, Result, WalletRef};

/// Abstraction over whatever holds the wallet keys.
///
/// Receives the unsigned base64 transaction from the swap API and returns it
/// signed, still base64-encoded. Key material never enters this process.
#[async_trait]
pub trait TransactionSigner: Send + Sync {
    async fn sign(&self, wallet: &WalletRef, unsigned_tx: &str) -> Result<String>;
}

/// Signs through an HTTP signing service.
///
/// `POST <url>` with `{"wallet": ..., "transaction": ...}`, expecting
/// `{"signedTransaction": ...}` back.
pub struct RemoteSigner {
    http: Client,
    url: String,
}

#[derive(Serialize)]
struct SignRequest<'a> {
    wallet: &'a str,
    transaction: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignResponse {
    signed_transaction: String,
}

impl RemoteSigner {
    pub fn new(http: Client, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }
}

#[async_trait]
impl TransactionSigner for RemoteSigner {
    async fn sign(&self, wallet: &WalletRef, unsigned_tx: &str) -> Result<String> {
        debug!(wallet = %wallet, "Requesting transaction signature");
        let resp = self
            .http
            .post(&self.url)
            .json(&SignRequest {
                wallet: wallet.as_str(),
                transaction: unsigned_tx,
            })
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| Error::Http(e.to_string()))?;
        if !status.is_success() {
            return Err(Error::Execution(format!("signer HTTP {status}: {body}")));
        }

        let signed: SignResponse = serde_json::from_str(&body)?;
        if signed.signed_transaction.is_empty() {
            return Err(Error::Execution("signer returned an empty transaction".into()));
        }
        Ok(signed.signed_transaction)
    }
}
