//! Trade mirroring engine.
//!
//! Replays a classified signal from a watched wallet as a single transfer
//! from the operator's wallet. Submission is at-most-once: a failure is
//! returned to the caller as a typed error and never retried here.

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::rpc::{ChainRpc, TransferRequest};
use crate::types::{MirroredTrade, TradeError, TradeSignal};
use std::sync::Arc;

/// Operator-side wallet endpoints for mirrored transfers.
///
/// The destination is static configuration: the upstream rule for deriving
/// a destination from trade direction is an unresolved product question.
#[derive(Debug, Clone)]
pub struct OperatorWallet {
    pub address: String,
    pub mirror_destination: String,
}

pub struct MirrorEngine {
    rpc: Arc<dyn ChainRpc>,
    operator: OperatorWallet,
}

impl MirrorEngine {
    pub fn new(rpc: Arc<dyn ChainRpc>, operator: OperatorWallet) -> Self {
        Self { rpc, operator }
    }

    /// Mirror one signal as an on-chain transfer.
    pub async fn execute_trade(&self, signal: &TradeSignal) -> Result<MirroredTrade, TradeError> {
        let request = TransferRequest {
            from: self.operator.address.clone(),
            to: self.operator.mirror_destination.clone(),
            mint: signal.mint.clone(),
            amount: signal.amount,
        };

        info!(
            action = %signal.action,
            mint = %signal.mint,
            amount = signal.amount,
            source = %signal.signature,
            "Submitting mirrored transfer"
        );

        match self.rpc.submit_transfer(&request).await {
            Ok(signature) => {
                info!(%signature, "Mirrored transfer submitted");
                Ok(MirroredTrade {
                    id: Uuid::new_v4().to_string(),
                    action: signal.action,
                    mint: signal.mint.clone(),
                    amount: signal.amount,
                    signature,
                    source_signature: signal.signature.clone(),
                    submitted_at: Utc::now(),
                })
            }
            Err(e) => {
                warn!(error = %e, source = %signal.signature, "Mirrored transfer failed");
                Err(TradeError::Execution(e.to_string()))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::TransactionDetail;
    use crate::types::TradeAction;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Minimal scripted RPC double: records submissions, optionally fails.
    struct ScriptedRpc {
        fail: bool,
        submitted: Mutex<Vec<TransferRequest>>,
    }

    #[async_trait]
    impl ChainRpc for ScriptedRpc {
        async fn recent_signatures(&self, _: &str, _: u32) -> Result<Vec<String>> {
            Ok(Vec::new())
        }

        async fn get_transaction(&self, _: &str) -> Result<Option<TransactionDetail>> {
            Ok(None)
        }

        async fn submit_transfer(&self, request: &TransferRequest) -> Result<String> {
            if self.fail {
                return Err(anyhow!("node unreachable"));
            }
            self.submitted.lock().unwrap().push(request.clone());
            Ok(format!("sig-{}", self.submitted.lock().unwrap().len()))
        }
    }

    fn engine(fail: bool) -> (Arc<ScriptedRpc>, MirrorEngine) {
        let rpc = Arc::new(ScriptedRpc {
            fail,
            submitted: Mutex::new(Vec::new()),
        });
        let engine = MirrorEngine::new(
            rpc.clone(),
            OperatorWallet {
                address: "op-wallet".into(),
                mirror_destination: "dest-wallet".into(),
            },
        );
        (rpc, engine)
    }

    fn signal() -> TradeSignal {
        TradeSignal {
            wallet: "watched".into(),
            signature: "src-sig".into(),
            action: TradeAction::Buy,
            mint: "mint-1".into(),
            amount: 42,
        }
    }

    #[tokio::test]
    async fn test_successful_mirror_carries_signal_fields() {
        let (rpc, engine) = engine(false);
        let trade = engine.execute_trade(&signal()).await.unwrap();

        assert_eq!(trade.action, TradeAction::Buy);
        assert_eq!(trade.amount, 42);
        assert_eq!(trade.source_signature, "src-sig");
        assert_eq!(trade.signature, "sig-1");

        let submitted = rpc.submitted.lock().unwrap();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].from, "op-wallet");
        assert_eq!(submitted[0].to, "dest-wallet");
        assert_eq!(submitted[0].mint, "mint-1");
    }

    #[tokio::test]
    async fn test_failure_surfaces_as_execution_error() {
        let (rpc, engine) = engine(true);
        let err = engine.execute_trade(&signal()).await.unwrap_err();
        assert!(matches!(err, TradeError::Execution(_)));
        assert!(err.to_string().contains("node unreachable"));
        // At-most-once: nothing was recorded, and the engine does not retry
        assert!(rpc.submitted.lock().unwrap().is_empty());
    }
}
