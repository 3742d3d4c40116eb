//! Deterministic test doubles for integration tests.
//!
//! `MockChainRpc` is scripted from test code: signature pages are queued
//! per address and consumed one per tick, transaction details come from a
//! fixed map, and whole addresses or individual operations can be forced
//! to fail. All submissions are recorded. No external dependencies.
//!
//! Not every test binary uses every helper.
#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use solpeer::notify::Notifier;
use solpeer::rpc::{ChainRpc, TokenInstruction, TransactionDetail, TransferRequest};
use solpeer::store::Ledger;

// Syntactically valid base58 pubkeys for watched wallets.
pub const WALLET_A: &str = "4WAfwi1V6jUmFasSgMK3roUo6y9mHXxcUV75tVU9NtnQ";
pub const WALLET_B: &str = "CQvwRHaxNUScPrE3VTJsbw8LNRudaKS52LZb4r4zcuuB";

#[derive(Default)]
pub struct MockChainRpc {
    pages: Mutex<HashMap<String, VecDeque<Vec<String>>>>,
    transactions: Mutex<HashMap<String, TransactionDetail>>,
    failing_addresses: Mutex<HashSet<String>>,
    pub submitted: Mutex<Vec<TransferRequest>>,
    pub fail_submit: Mutex<bool>,
}

impl MockChainRpc {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one signatures page (newest first) for an address.
    pub fn push_page(&self, address: &str, signatures: &[&str]) {
        self.pages
            .lock()
            .unwrap()
            .entry(address.to_string())
            .or_default()
            .push_back(signatures.iter().map(|s| s.to_string()).collect());
    }

    /// Register a transaction whose only instruction is an spl-token
    /// operation of the given kind.
    pub fn add_token_tx(&self, signature: &str, kind: &str, mint: &str, amount: u64) {
        self.transactions.lock().unwrap().insert(
            signature.to_string(),
            TransactionDetail {
                signature: signature.to_string(),
                instructions: vec![TokenInstruction {
                    program: "spl-token".to_string(),
                    kind: kind.to_string(),
                    mint: mint.to_string(),
                    amount,
                }],
            },
        );
    }

    pub fn fail_address(&self, address: &str) {
        self.failing_addresses
            .lock()
            .unwrap()
            .insert(address.to_string());
    }

    pub fn submitted_amounts(&self) -> Vec<u64> {
        self.submitted.lock().unwrap().iter().map(|t| t.amount).collect()
    }
}

#[async_trait]
impl ChainRpc for MockChainRpc {
    async fn recent_signatures(&self, address: &str, _limit: u32) -> Result<Vec<String>> {
        if self.failing_addresses.lock().unwrap().contains(address) {
            return Err(anyhow!("rpc unavailable for {address}"));
        }
        Ok(self
            .pages
            .lock()
            .unwrap()
            .get_mut(address)
            .and_then(|q| q.pop_front())
            .unwrap_or_default())
    }

    async fn get_transaction(&self, signature: &str) -> Result<Option<TransactionDetail>> {
        Ok(self.transactions.lock().unwrap().get(signature).cloned())
    }

    async fn submit_transfer(&self, request: &TransferRequest) -> Result<String> {
        if *self.fail_submit.lock().unwrap() {
            return Err(anyhow!("signer refused transfer"));
        }
        let mut submitted = self.submitted.lock().unwrap();
        submitted.push(request.clone());
        Ok(format!("mirrored-{}", submitted.len()))
    }
}

/// Notifier that records every delivered message.
#[derive(Default)]
pub struct RecordingNotifier {
    pub messages: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, recipient: &str, message: &str) {
        self.messages
            .lock()
            .unwrap()
            .push((recipient.to_string(), message.to_string()));
    }
}

impl RecordingNotifier {
    pub fn texts(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .map(|(_, m)| m.clone())
            .collect()
    }
}

/// Fresh in-memory ledger with one registered user "u-1".
pub async fn test_ledger() -> Ledger {
    let ledger = Ledger::open("sqlite::memory:").await.unwrap();
    ledger.register_user("u-1").await.unwrap();
    ledger
}
