//! Solana JSON-RPC over HTTP
//!
//! Only the handful of methods the engine needs: balances, mint decimals,
//! transaction submission and signature status.

use crate::errors::ChainError;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

/// JSON-RPC 2.0 response envelope
#[derive(Debug, Deserialize)]
struct RpcEnvelope<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

/// `{ context, value }` wrapper used by most Solana RPC results
#[derive(Debug, Deserialize)]
struct WithContext<T> {
    value: T,
}

#[derive(Debug, Deserialize)]
struct TokenAccount {
    account: TokenAccountData,
}

#[derive(Debug, Deserialize)]
struct TokenAccountData {
    data: ParsedData,
}

#[derive(Debug, Deserialize)]
struct ParsedData {
    parsed: ParsedInfo,
}

#[derive(Debug, Deserialize)]
struct ParsedInfo {
    info: TokenAccountInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenAccountInfo {
    token_amount: UiTokenAmount,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UiTokenAmount {
    amount: String,
    decimals: u8,
}

impl UiTokenAmount {
    fn ui_amount(&self) -> Result<f64, ChainError> {
        let raw: u64 = self
            .amount
            .parse()
            .map_err(|_| ChainError::Malformed(format!("token amount '{}'", self.amount)))?;
        Ok(raw as f64 / 10f64.powi(self.decimals as i32))
    }
}

/// Confirmation state of a submitted signature
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureStatus {
    pub slot: u64,
    #[serde(default)]
    pub err: Option<Value>,
    #[serde(default)]
    pub confirmation_status: Option<String>,
}

impl SignatureStatus {
    /// Reached `confirmed` or `finalized` commitment
    pub fn is_confirmed(&self) -> bool {
        matches!(
            self.confirmation_status.as_deref(),
            Some("confirmed") | Some("finalized")
        )
    }
}

/// Minimal JSON-RPC 2.0 client, shared by the RPC node and the relay
pub struct JsonRpcClient {
    client: Client,
    url: String,
    auth_header: Option<(&'static str, String)>,
    next_id: AtomicU64,
}

impl JsonRpcClient {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            auth_header: None,
            next_id: AtomicU64::new(1),
        }
    }

    /// Attach a header sent with every call
    pub fn with_header(mut self, name: &'static str, value: String) -> Self {
        self.auth_header = Some((name, value));
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, ChainError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let mut request = self.client.post(&self.url).json(&body);
        if let Some((name, value)) = &self.auth_header {
            request = request.header(*name, value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ChainError::from_network_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChainError::Http {
                status: status.as_u16(),
                message: body,
            });
        }

        let envelope: RpcEnvelope<T> = response
            .json()
            .await
            .map_err(|e| ChainError::from_network_error(&e))?;

        if let Some(err) = envelope.error {
            return Err(ChainError::Rpc {
                code: err.code,
                message: err.message,
            });
        }

        envelope
            .result
            .ok_or_else(|| ChainError::Malformed(format!("{} returned no result", method)))
    }
}

/// Solana RPC node client
pub struct SolanaRpc {
    rpc: JsonRpcClient,
}

impl SolanaRpc {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            rpc: JsonRpcClient::new(client, url),
        }
    }

    pub fn url(&self) -> &str {
        self.rpc.url()
    }

    /// Native balance in lamports
    pub async fn get_balance(&self, owner: &str) -> Result<u64, ChainError> {
        let result: WithContext<u64> = self
            .rpc
            .call("getBalance", json!([owner, { "commitment": "confirmed" }]))
            .await?;
        Ok(result.value)
    }

    /// Sum of the owner's token accounts for a mint, in whole tokens
    pub async fn get_token_balance(&self, owner: &str, mint: &str) -> Result<f64, ChainError> {
        let result: WithContext<Vec<TokenAccount>> = self
            .rpc
            .call(
                "getTokenAccountsByOwner",
                json!([
                    owner,
                    { "mint": mint },
                    { "encoding": "jsonParsed", "commitment": "confirmed" }
                ]),
            )
            .await?;

        let mut total = 0.0;
        for account in &result.value {
            total += account.account.data.parsed.info.token_amount.ui_amount()?;
        }
        Ok(total)
    }

    /// Decimal precision declared by the mint
    pub async fn get_token_decimals(&self, mint: &str) -> Result<u8, ChainError> {
        let result: WithContext<UiTokenAmount> =
            self.rpc.call("getTokenSupply", json!([mint])).await?;
        Ok(result.value.decimals)
    }

    /// Submit a base64 wire transaction, returning its signature
    pub async fn send_transaction(&self, wire_base64: &str) -> Result<String, ChainError> {
        self.rpc
            .call(
                "sendTransaction",
                json!([
                    wire_base64,
                    { "encoding": "base64", "skipPreflight": true, "maxRetries": 0 }
                ]),
            )
            .await
    }

    /// Current status of a signature, `None` while the cluster has not seen it
    pub async fn get_signature_status(&self, signature: &str) -> Result<Option<SignatureStatus>, ChainError> {
        let result: WithContext<Vec<Option<SignatureStatus>>> = self
            .rpc
            .call("getSignatureStatuses", json!([[signature]]))
            .await?;
        Ok(result.value.into_iter().next().flatten())
    }

    /// Poll a signature until it reaches confirmed commitment.
    ///
    /// Loops until confirmed or failed; the caller bounds it with a timeout.
    pub async fn wait_for_confirmation(
        &self,
        signature: &str,
        poll_interval: Duration,
    ) -> Result<SignatureStatus, ChainError> {
        loop {
            match self.get_signature_status(signature).await {
                Ok(Some(status)) if status.err.is_some() || status.is_confirmed() => return Ok(status),
                Ok(_) => {}
                Err(e) => debug!("[Rpc] Status poll for {} failed: {}", signature, e),
            }
            tokio::time::sleep(poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_token_accounts() {
        let body = r#"{
            "jsonrpc": "2.0",
            "id": 1,
            "result": {
                "context": { "slot": 1 },
                "value": [
                    { "pubkey": "A", "account": { "data": { "parsed": { "info": {
                        "tokenAmount": { "amount": "1500000", "decimals": 6, "uiAmount": 1.5 }
                    }, "type": "account" }, "program": "spl-token" } } },
                    { "pubkey": "B", "account": { "data": { "parsed": { "info": {
                        "tokenAmount": { "amount": "250000", "decimals": 6, "uiAmount": 0.25 }
                    }, "type": "account" }, "program": "spl-token" } } }
                ]
            }
        }"#;

        let envelope: RpcEnvelope<WithContext<Vec<TokenAccount>>> = serde_json::from_str(body).unwrap();
        let accounts = envelope.result.unwrap().value;
        let total: f64 = accounts
            .iter()
            .map(|a| a.account.data.parsed.info.token_amount.ui_amount().unwrap())
            .sum();
        assert_eq!(total, 1.75);
    }

    #[test]
    fn test_parse_rpc_error() {
        let body = r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32602,"message":"Invalid param"}}"#;
        let envelope: RpcEnvelope<u64> = serde_json::from_str(body).unwrap();
        assert!(envelope.result.is_none());
        assert_eq!(envelope.error.unwrap().code, -32602);
    }

    #[test]
    fn test_signature_status_commitment() {
        let body = r#"{"context":{"slot":5},"value":[{"slot":5,"confirmations":null,"err":null,"confirmationStatus":"finalized"}, null]}"#;
        let result: WithContext<Vec<Option<SignatureStatus>>> = serde_json::from_str(body).unwrap();
        let status = result.value[0].clone().unwrap();
        assert!(status.is_confirmed());
        assert!(status.err.is_none());
        assert!(result.value[1].is_none());

        let processed = SignatureStatus {
            slot: 1,
            err: None,
            confirmation_status: Some("processed".to_string()),
        };
        assert!(!processed.is_confirmed());
    }
}
