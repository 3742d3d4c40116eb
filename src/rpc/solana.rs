//! Solana JSON-RPC client.
//!
//! Reads go straight to a Solana node (`getSignaturesForAddress`,
//! `getTransaction` with jsonParsed encoding). Writes go to the signing
//! collaborator's HTTP endpoint, which holds the operator key and returns
//! the submitted signature.
//!
//! Every request carries a bounded deadline: the monitor is a single
//! task, and one hung call would stall the whole loop.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use super::{ChainRpc, TokenInstruction, TransactionDetail, TransferRequest};

// ---------------------------------------------------------------------------
// API response types (Solana JSON → Rust)
// ---------------------------------------------------------------------------

/// JSON-RPC 2.0 envelope. `result` is absent on error and null when the
/// node has no record for the query.
#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: serde::Deserialize<'de>"))]
struct RpcEnvelope<T> {
    #[serde(default)]
    result: Option<T>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

/// One entry from `getSignaturesForAddress`. Only the signature is needed.
#[derive(Debug, Deserialize)]
struct SignatureEntry {
    signature: String,
}

#[derive(Debug, Deserialize)]
struct TxResult {
    transaction: TxPayload,
}

#[derive(Debug, Deserialize)]
struct TxPayload {
    message: TxMessage,
}

#[derive(Debug, Deserialize)]
struct TxMessage {
    #[serde(default)]
    instructions: Vec<RawInstruction>,
}

/// A jsonParsed instruction. `parsed` is only present for instructions the
/// node could decode, and its shape varies by program, so it stays a
/// `Value` until we know we care about it.
#[derive(Debug, Deserialize)]
struct RawInstruction {
    #[serde(default)]
    program: Option<String>,
    #[serde(default)]
    parsed: Option<serde_json::Value>,
}

/// Response from the signing collaborator's transfer endpoint.
#[derive(Debug, Deserialize)]
struct SignerResponse {
    #[serde(default)]
    signature: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct SolanaRpcClient {
    client: Client,
    rpc_url: String,
    signer_url: String,
    /// Credential for the signing collaborator; never logged.
    signer_credential: SecretString,
}

impl SolanaRpcClient {
    pub fn new(
        rpc_url: &str,
        signer_url: &str,
        signer_credential: SecretString,
        request_timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            rpc_url: rpc_url.to_string(),
            signer_url: signer_url.to_string(),
            signer_credential,
        })
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<Option<T>> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let envelope: RpcEnvelope<T> = self
            .client
            .post(&self.rpc_url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("RPC request failed: {method}"))?
            .error_for_status()
            .with_context(|| format!("RPC returned HTTP error: {method}"))?
            .json()
            .await
            .with_context(|| format!("Failed to parse RPC response: {method}"))?;

        if let Some(err) = envelope.error {
            return Err(anyhow!("RPC error {} on {method}: {}", err.code, err.message));
        }
        Ok(envelope.result)
    }
}

#[async_trait]
impl ChainRpc for SolanaRpcClient {
    async fn recent_signatures(&self, address: &str, limit: u32) -> Result<Vec<String>> {
        let entries: Vec<SignatureEntry> = self
            .call(
                "getSignaturesForAddress",
                json!([address, { "limit": limit }]),
            )
            .await?
            .unwrap_or_default();

        debug!(address, count = entries.len(), "Fetched recent signatures");
        Ok(entries.into_iter().map(|e| e.signature).collect())
    }

    async fn get_transaction(&self, signature: &str) -> Result<Option<TransactionDetail>> {
        let result: Option<TxResult> = self
            .call(
                "getTransaction",
                json!([signature, { "encoding": "jsonParsed", "maxSupportedTransactionVersion": 0 }]),
            )
            .await?;

        let Some(result) = result else {
            return Ok(None);
        };

        let instructions = result
            .transaction
            .message
            .instructions
            .iter()
            .filter_map(parse_instruction)
            .collect();

        Ok(Some(TransactionDetail {
            signature: signature.to_string(),
            instructions,
        }))
    }

    async fn submit_transfer(&self, request: &TransferRequest) -> Result<String> {
        let response: SignerResponse = self
            .client
            .post(&self.signer_url)
            .bearer_auth(self.signer_credential.expose_secret())
            .json(request)
            .send()
            .await
            .context("Transfer submission failed")?
            .error_for_status()
            .context("Signer returned HTTP error")?
            .json()
            .await
            .context("Failed to parse signer response")?;

        if let Some(err) = response.error {
            return Err(anyhow!("Signer rejected transfer: {err}"));
        }
        response
            .signature
            .ok_or_else(|| anyhow!("Signer response carried no signature"))
    }
}

/// Extract a token instruction from a jsonParsed instruction, if it is one.
fn parse_instruction(raw: &RawInstruction) -> Option<TokenInstruction> {
    let program = raw.program.as_deref()?;
    let parsed = raw.parsed.as_ref()?.as_object()?;

    let kind = parsed.get("type")?.as_str()?.to_string();
    let info = parsed.get("info")?.as_object()?;
    let mint = info.get("mint")?.as_str()?.to_string();
    // jsonParsed renders amounts as decimal strings; tolerate bare numbers.
    let amount_field = info.get("amount")?;
    let amount = match amount_field {
        serde_json::Value::String(s) => s.parse().ok()?,
        serde_json::Value::Number(n) => n.as_u64()?,
        _ => return None,
    };

    Some(TokenInstruction {
        program: program.to_string(),
        kind,
        mint,
        amount,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
