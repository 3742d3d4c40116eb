//! Blockchain RPC collaborators.
//!
//! Defines the `ChainRpc` trait the monitor and mirroring engine depend
//! on, and provides the Solana JSON-RPC implementation. Transfer
//! submission is routed through an external signing collaborator — key
//! handling and transaction signing are out of this crate's hands.

pub mod solana;

use anyhow::Result;
use async_trait::async_trait;

/// Length of a base58-decoded Solana public key.
const PUBKEY_BYTES: usize = 32;

/// A token-transfer-shaped instruction extracted from a parsed transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenInstruction {
    /// Owning program label, e.g. "spl-token".
    pub program: String,
    /// Parsed instruction type, e.g. "transfer", "transferChecked", "burn".
    pub kind: String,
    /// Token mint address.
    pub mint: String,
    /// Raw amount in base units.
    pub amount: u64,
}

/// A fetched transaction in the shape the monitor cares about.
#[derive(Debug, Clone)]
pub struct TransactionDetail {
    pub signature: String,
    pub instructions: Vec<TokenInstruction>,
}

/// An outbound transfer to be signed and submitted on the operator's behalf.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct TransferRequest {
    pub from: String,
    pub to: String,
    pub mint: String,
    pub amount: u64,
}

/// Abstraction over the blockchain RPC collaborator.
///
/// Implementors provide recent-signature paging (newest first), parsed
/// transaction lookup, and transfer submission.
#[async_trait]
pub trait ChainRpc: Send + Sync {
    /// Most recent transaction signatures for an address, newest first,
    /// bounded by `limit`.
    async fn recent_signatures(&self, address: &str, limit: u32) -> Result<Vec<String>>;

    /// Full detail for one signature. `None` when the node has no record
    /// (yet) — callers treat that as a tolerated miss, not a failure.
    async fn get_transaction(&self, signature: &str) -> Result<Option<TransactionDetail>>;

    /// Sign and submit a transfer, returning its signature.
    async fn submit_transfer(&self, request: &TransferRequest) -> Result<String>;
}

/// Validate a base58-encoded Solana address.
pub fn validate_address(address: &str) -> Result<()> {
    let bytes = bs58::decode(address)
        .into_vec()
        .map_err(|e| anyhow::anyhow!("'{address}' is not base58: {e}"))?;
    if bytes.len() != PUBKEY_BYTES {
        anyhow::bail!(
            "'{address}' decodes to {} bytes, expected {PUBKEY_BYTES}",
            bytes.len()
        );
    }
    Ok(())
}
