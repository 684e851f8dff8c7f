//! Broadcast channels: Jito block-engine relay and direct RPC submission
//!
//! Both submit the same signed bytes, then poll the RPC node until the
//! signature reaches confirmed commitment.

use super::racer::{BroadcastChannel, Confirmation};
use super::signer::SignedTransfer;
use crate::chain::{JsonRpcClient, SolanaRpc};
use crate::errors::{BroadcastError, ChainError};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64_ENGINE, Engine as _};
use reqwest::Client;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Wait for `signature` and map the final status to a confirmation
async fn confirm(
    rpc: &SolanaRpc,
    channel: &'static str,
    signature: String,
) -> Result<Confirmation, BroadcastError> {
    let status = rpc
        .wait_for_confirmation(&signature, POLL_INTERVAL)
        .await
        .map_err(|e| rejected(channel, e))?;

    if let Some(err) = status.err {
        return Err(BroadcastError::OnChainFailure {
            channel,
            signature,
            message: err.to_string(),
        });
    }

    Ok(Confirmation {
        signature,
        channel,
        slot: Some(status.slot),
    })
}

fn rejected(channel: &'static str, err: ChainError) -> BroadcastError {
    BroadcastError::Rejected {
        channel,
        message: err.to_string(),
    }
}

/// Priority relay through a Jito block engine
pub struct RelayChannel {
    relay: JsonRpcClient,
    rpc: Arc<SolanaRpc>,
    timeout: Duration,
}

impl RelayChannel {
    pub const NAME: &'static str = "relay";

    pub fn new(url: &str, auth_token: Option<String>, rpc: Arc<SolanaRpc>, timeout: Duration) -> Self {
        let endpoint = format!("{}/api/v1/transactions", url.trim_end_matches('/'));
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        let mut relay = JsonRpcClient::new(client, endpoint);
        if let Some(token) = auth_token {
            relay = relay.with_header("x-jito-auth", token);
        }
        Self { relay, rpc, timeout }
    }
}

#[async_trait]
impl BroadcastChannel for RelayChannel {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn submit(&self, transfer: &SignedTransfer) -> Result<Confirmation, BroadcastError> {
        let encoded = BASE64_ENGINE.encode(&transfer.wire);
        let signature: String = self
            .relay
            .call("sendTransaction", json!([encoded, { "encoding": "base64" }]))
            .await
            .map_err(|e| rejected(Self::NAME, e))?;

        debug!("[Relay] Accepted {}", signature);
        confirm(&self.rpc, Self::NAME, signature).await
    }
}

/// Plain `sendTransaction` on the RPC node
pub struct DirectChannel {
    rpc: Arc<SolanaRpc>,
    timeout: Duration,
}

impl DirectChannel {
    pub const NAME: &'static str = "direct";

    pub fn new(rpc: Arc<SolanaRpc>, timeout: Duration) -> Self {
        Self { rpc, timeout }
    }
}

#[async_trait]
impl BroadcastChannel for DirectChannel {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn submit(&self, transfer: &SignedTransfer) -> Result<Confirmation, BroadcastError> {
        let encoded = BASE64_ENGINE.encode(&transfer.wire);
        let signature = self
            .rpc
            .send_transaction(&encoded)
            .await
            .map_err(|e| rejected(Self::NAME, e))?;

        debug!("[Direct] Accepted {}", signature);
        confirm(&self.rpc, Self::NAME, signature).await
    }
}
