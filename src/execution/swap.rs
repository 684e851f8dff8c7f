//! Swap quote and transaction build against the Jupiter v6 API
//!
//! The venue only ever sees public data: the quote and the account's public
//! key. Signing happens locally, see [`super::signer`].

use crate::errors::SwapError;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64_ENGINE, Engine as _};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use solana_sdk::pubkey::Pubkey;
use std::time::Duration;
use tracing::debug;

/// Wrapped SOL, the quote currency every sell routes into
pub const WRAPPED_SOL_MINT: &str = "So11111111111111111111111111111111111111112";

/// A priced route for selling `in_amount` of the asset
#[derive(Debug, Clone)]
pub struct Quote {
    pub input_mint: String,
    pub output_mint: String,
    /// Base units of the asset
    pub in_amount: u64,
    /// Expected base units of the output
    pub out_amount: u64,
    pub price_impact_pct: f64,
    /// Venue response echoed back on build
    pub raw: Value,
}

/// Serialized transaction awaiting the account's signature
#[derive(Debug, Clone)]
pub struct UnsignedTransfer {
    pub transaction: Vec<u8>,
    pub last_valid_block_height: Option<u64>,
}

#[async_trait]
pub trait SwapVenue: Send + Sync {
    async fn quote(&self, input_mint: &str, amount: u64, slippage_bps: u16) -> Result<Quote, SwapError>;

    async fn build(&self, quote: &Quote, owner: &Pubkey) -> Result<UnsignedTransfer, SwapError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteResponse {
    input_mint: String,
    output_mint: String,
    in_amount: String,
    out_amount: String,
    #[serde(default)]
    price_impact_pct: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SwapResponse {
    swap_transaction: String,
    #[serde(default)]
    last_valid_block_height: Option<u64>,
}

fn parse_amount(field: &str, value: &str) -> Result<u64, SwapError> {
    value
        .parse()
        .map_err(|_| SwapError::Malformed(format!("{} '{}' is not an integer", field, value)))
}

fn quote_from_value(raw: Value) -> Result<Quote, SwapError> {
    let parsed: QuoteResponse =
        serde_json::from_value(raw.clone()).map_err(|e| SwapError::Malformed(e.to_string()))?;

    let out_amount = parse_amount("outAmount", &parsed.out_amount)?;
    if out_amount == 0 {
        return Err(SwapError::NoRoute("quote returns zero output".to_string()));
    }

    Ok(Quote {
        in_amount: parse_amount("inAmount", &parsed.in_amount)?,
        out_amount,
        price_impact_pct: parsed
            .price_impact_pct
            .and_then(|p| p.parse().ok())
            .unwrap_or(0.0),
        input_mint: parsed.input_mint,
        output_mint: parsed.output_mint,
        raw,
    })
}

pub struct JupiterClient {
    client: Client,
    base_url: String,
    priority_fee_lamports: u64,
}

impl JupiterClient {
    pub fn new(base_url: impl Into<String>, priority_fee_lamports: u64, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            priority_fee_lamports,
        }
    }

    async fn read_json(response: reqwest::Response) -> Result<Value, SwapError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SwapError::from_response(status.as_u16(), &body));
        }
        response
            .json()
            .await
            .map_err(|e| SwapError::from_network_error(&e))
    }
}

#[async_trait]
impl SwapVenue for JupiterClient {
    async fn quote(&self, input_mint: &str, amount: u64, slippage_bps: u16) -> Result<Quote, SwapError> {
        if amount == 0 {
            return Err(SwapError::ZeroAmount);
        }

        let url = format!("{}/quote", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("inputMint", input_mint.to_string()),
                ("outputMint", WRAPPED_SOL_MINT.to_string()),
                ("amount", amount.to_string()),
                ("slippageBps", slippage_bps.to_string()),
            ])
            .send()
            .await
            .map_err(|e| SwapError::from_network_error(&e))?;

        let quote = quote_from_value(Self::read_json(response).await?)?;
        debug!(
            "[Jupiter] Quote {} -> {} lamports (impact {:.4}%)",
            quote.in_amount, quote.out_amount, quote.price_impact_pct
        );
        Ok(quote)
    }

    async fn build(&self, quote: &Quote, owner: &Pubkey) -> Result<UnsignedTransfer, SwapError> {
        let url = format!("{}/swap", self.base_url);
        let body = json!({
            "quoteResponse": quote.raw,
            "userPublicKey": owner.to_string(),
            "wrapAndUnwrapSol": true,
            "dynamicComputeUnitLimit": true,
            "prioritizationFeeLamports": self.priority_fee_lamports,
        });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| SwapError::from_network_error(&e))?;

        let parsed: SwapResponse = serde_json::from_value(Self::read_json(response).await?)
            .map_err(|e| SwapError::Malformed(e.to_string()))?;

        let transaction = BASE64_ENGINE
            .decode(parsed.swap_transaction.as_bytes())
            .map_err(|e| SwapError::Malformed(format!("swapTransaction: {}", e)))?;

        Ok(UnsignedTransfer {
            transaction,
            last_valid_block_height: parsed.last_valid_block_height,
        })
    }
}
