//! Wallet monitor loop.
//!
//! On each tick, pages recent transaction signatures for every watched
//! wallet, cuts each page at the wallet's cursor so a signature is
//! handed to the mirroring engine at most once, classifies token
//! instructions as buy/sell, and reports every mirroring outcome to the
//! operator.
//!
//! Failure containment: one wallet's RPC failure is logged and isolated
//! to that wallet for that tick; a single bad transaction is skipped
//! without blocking the rest of its batch; the loop itself never
//! terminates on per-item errors. Ticks are driven externally (see
//! `main`) and awaited inline, so two ticks can never overlap.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::mirror::MirrorEngine;
use crate::notify::Notifier;
use crate::rpc::{validate_address, ChainRpc, TokenInstruction};
use crate::types::{TradeAction, TradeSignal};

const SPL_TOKEN_PROGRAM: &str = "spl-token";

// ---------------------------------------------------------------------------
// Enable switch
// ---------------------------------------------------------------------------

/// Shared on/off state for copy trading.
///
/// Handed to both the front-end commands (`start`/`stop`) and the tick
/// loop; the flag is read once per tick, so a stop takes effect at the
/// next tick boundary and an in-flight tick runs to completion.
#[derive(Clone)]
pub struct MonitorSwitch {
    enabled: Arc<AtomicBool>,
}

impl MonitorSwitch {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: Arc::new(AtomicBool::new(enabled)),
        }
    }

    pub fn start(&self) {
        self.enabled.store(true, Ordering::Relaxed);
        info!("Copy trading enabled");
    }

    pub fn stop(&self) {
        self.enabled.store(false, Ordering::Relaxed);
        info!("Copy trading disabled");
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }
}

// ---------------------------------------------------------------------------
// Watched wallets
// ---------------------------------------------------------------------------

/// A watched address plus its dedup cursor: the newest signature already
/// handled. Cursors live in process memory for the monitor's lifetime.
#[derive(Debug, Clone)]
pub struct WatchedWallet {
    pub address: String,
    pub cursor: Option<String>,
}

/// Counters for one tick, for logging and tests.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub skipped_disabled: bool,
    pub wallets_processed: usize,
    pub wallets_failed: usize,
    pub signatures_new: usize,
    pub trades_mirrored: usize,
    pub mirror_failures: usize,
}

// ---------------------------------------------------------------------------
// Monitor
// ---------------------------------------------------------------------------

pub struct WalletMonitor {
    rpc: Arc<dyn ChainRpc>,
    mirror: MirrorEngine,
    notifier: Arc<dyn Notifier>,
    /// Recipient for mirroring outcome notifications (the operator).
    recipient: String,
    switch: MonitorSwitch,
    page_limit: u32,
    wallets: Vec<WatchedWallet>,
    /// Addresses refused at construction, with the reason.
    rejected: Vec<(String, String)>,
}

impl WalletMonitor {
    /// Build a monitor over the given addresses. Malformed addresses are
    /// dropped from monitoring and kept in `rejected_wallets()` for
    /// startup reporting; they are never fatal.
    pub fn new(
        rpc: Arc<dyn ChainRpc>,
        mirror: MirrorEngine,
        notifier: Arc<dyn Notifier>,
        recipient: String,
        switch: MonitorSwitch,
        page_limit: u32,
        addresses: Vec<String>,
    ) -> Self {
        let mut wallets = Vec::new();
        let mut rejected = Vec::new();
        for address in addresses {
            match validate_address(&address) {
                Ok(()) => wallets.push(WatchedWallet {
                    address,
                    cursor: None,
                }),
                Err(e) => {
                    warn!(address, error = %e, "Refusing to monitor malformed address");
                    rejected.push((address, e.to_string()));
                }
            }
        }

        Self {
            rpc,
            mirror,
            notifier,
            recipient,
            switch,
            page_limit,
            wallets,
            rejected,
        }
    }

    pub fn rejected_wallets(&self) -> &[(String, String)] {
        &self.rejected
    }

    pub fn watched_count(&self) -> usize {
        self.wallets.len()
    }

    /// Run one monitoring pass over all watched wallets.
    pub async fn tick(&mut self) -> TickReport {
        let mut report = TickReport::default();

        if !self.switch.is_enabled() {
            report.skipped_disabled = true;
            return report;
        }

        for i in 0..self.wallets.len() {
            match self.process_wallet(i, &mut report).await {
                Ok(()) => report.wallets_processed += 1,
                Err(e) => {
                    report.wallets_failed += 1;
                    warn!(
                        wallet = %self.wallets[i].address,
                        error = %e,
                        "Wallet processing failed this tick"
                    );
                }
            }
        }

        if report.signatures_new > 0 || report.wallets_failed > 0 {
            info!(
                wallets = report.wallets_processed,
                failed = report.wallets_failed,
                new = report.signatures_new,
                mirrored = report.trades_mirrored,
                "Monitor tick complete"
            );
        }
        report
    }

    async fn process_wallet(
        &mut self,
        index: usize,
        report: &mut TickReport,
    ) -> anyhow::Result<()> {
        let (address, cursor) = {
            let w = &self.wallets[index];
            (w.address.clone(), w.cursor.clone())
        };

        let page = self.rpc.recent_signatures(&address, self.page_limit).await?;
        if page.is_empty() {
            return Ok(());
        }

        // The page is newest-first; everything before the cursor is unseen.
        // A cursor missing from the page means the whole page is new.
        let unseen: Vec<String> = match &cursor {
            Some(cursor) => page.iter().take_while(|s| *s != cursor).cloned().collect(),
            None => page.clone(),
        };
        report.signatures_new += unseen.len();

        // Oldest first, so mirrored trades follow the source ordering.
        for signature in unseen.iter().rev() {
            self.process_signature(&address, signature, report).await;
        }

        // Cursor advances to the newest page entry even when individual
        // signatures failed to resolve: forward progress over completeness.
        self.wallets[index].cursor = page.first().cloned();
        Ok(())
    }

    async fn process_signature(
        &self,
        wallet: &str,
        signature: &str,
        report: &mut TickReport,
    ) {
        let detail = match self.rpc.get_transaction(signature).await {
            Ok(Some(detail)) => detail,
            Ok(None) => {
                debug!(signature, "Transaction not yet available, skipping");
                return;
            }
            Err(e) => {
                warn!(signature, error = %e, "Transaction fetch failed, skipping");
                return;
            }
        };

        for instruction in &detail.instructions {
            let Some(action) = classify_instruction(instruction) else {
                continue;
            };
            let signal = TradeSignal {
                wallet: wallet.to_string(),
                signature: signature.to_string(),
                action,
                mint: instruction.mint.clone(),
                amount: instruction.amount,
            };

            match self.mirror.execute_trade(&signal).await {
                Ok(trade) => {
                    report.trades_mirrored += 1;
                    self.notifier
                        .notify(
                            &self.recipient,
                            &format!(
                                "Copied trade: {} {} of {} ({})",
                                trade.action, trade.amount, trade.mint, trade.signature
                            ),
                        )
                        .await;
                }
                Err(e) => {
                    // At-most-once: report and move to the next signal.
                    report.mirror_failures += 1;
                    self.notifier
                        .notify(&self.recipient, &format!("Mirror failed for {signal}: {e}"))
                        .await;
                }
            }
        }
    }
}

/// Map a token instruction to a trade direction.
///
/// Transfers count as buys and every other spl-token instruction as a
/// sell — inherited placeholder policy. A direction-aware rule (which
/// side of the transfer the watched wallet is on) needs product input
/// before it can replace this.
fn classify_instruction(instruction: &TokenInstruction) -> Option<TradeAction> {
    if instruction.program != SPL_TOKEN_PROGRAM {
        return None;
    }
    Some(if instruction.kind == "transfer" {
        TradeAction::Buy
    } else {
        TradeAction::Sell
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
