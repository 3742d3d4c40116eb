//! SOLPEER — Solana P2P trading and copy-trading engine
//!
//! Entry point. Loads configuration, initialises structured logging,
//! opens the ledger, wires the monitor/mirroring pipeline, and runs the
//! periodic monitoring loop with graceful shutdown. The chat front end
//! drives the trading operations (offer book, escrow desk) and the
//! monitor switch through the library API.

use anyhow::{Context, Result};
use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use solpeer::config;
use solpeer::mirror::{MirrorEngine, OperatorWallet};
use solpeer::offers::OfferBook;
use solpeer::monitor::{MonitorSwitch, WalletMonitor};
use solpeer::notify::{LogNotifier, Notifier, TelegramNotifier};
use solpeer::price;
use solpeer::rpc::{self, solana::SolanaRpcClient};
use solpeer::store::Ledger;

const BANNER: &str = r#"
 ____   ___  _     ____  _____ _____ ____
/ ___| / _ \| |   |  _ \| ____| ____|  _ \
\___ \| | | | |   | |_) |  _| |  _| | |_) |
 ___) | |_| | |___|  __/| |___| |___|  _ <
|____/ \___/|_____|_|   |_____|_____|_| \_\

  Solana P2P Trading & Copy-Trading Engine
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    // Load configuration from TOML
    let cfg = config::AppConfig::load("config.toml")?;

    // Initialise structured logging
    init_logging();

    // Print startup banner
    println!("{BANNER}");
    info!(
        bot_name = %cfg.bot.name,
        interval_secs = cfg.monitor.interval_secs,
        watched_wallets = cfg.monitor.watched_wallets.len(),
        "SOLPEER starting up"
    );

    // -- Required credentials (the one fatal configuration check) ---------

    let signer_credential = SecretString::new(
        config::AppConfig::resolve_env(&cfg.operator.wallet_key_env)
            .context("Operator wallet credential is required at startup")?,
    );
    rpc::validate_address(&cfg.operator.wallet_address)
        .context("operator.wallet_address is malformed")?;
    rpc::validate_address(&cfg.operator.mirror_destination)
        .context("operator.mirror_destination is malformed")?;

    // -- Ledger ------------------------------------------------------------

    let ledger = Ledger::open(&cfg.bot.database_url)
        .await
        .context("Failed to open ledger database")?;

    // The chat front end drives trading through OfferBook/EscrowDesk
    // built over clones of this ledger handle.
    let offer_book = OfferBook::new(ledger);

    match offer_book.list_active_offers(None).await {
        Ok(open) => info!(open_offers = open.len(), "Offer book loaded"),
        Err(e) => warn!(error = %e, "Could not count open offers"),
    }

    // -- Notifier ----------------------------------------------------------

    let (notifier, recipient): (Arc<dyn Notifier>, String) = match telegram_env(&cfg) {
        Some((token, chat_id)) => {
            info!("Telegram notifier enabled");
            (Arc::new(TelegramNotifier::new(token)?), chat_id)
        }
        None => {
            warn!("No Telegram credentials configured — notifications go to the log");
            (Arc::new(LogNotifier), "operator".to_string())
        }
    };

    // -- RPC + mirroring pipeline ------------------------------------------

    let rpc_client = Arc::new(SolanaRpcClient::new(
        &cfg.rpc.url,
        &cfg.rpc.signer_url,
        signer_credential,
        Duration::from_secs(cfg.rpc.request_timeout_secs),
    )?);

    let engine = MirrorEngine::new(
        rpc_client.clone(),
        OperatorWallet {
            address: cfg.operator.wallet_address.clone(),
            mirror_destination: cfg.operator.mirror_destination.clone(),
        },
    );

    let switch = MonitorSwitch::new(cfg.monitor.autostart);
    let mut monitor = WalletMonitor::new(
        rpc_client,
        engine,
        notifier.clone(),
        recipient.clone(),
        switch.clone(),
        cfg.rpc.signature_page_limit,
        cfg.monitor.watched_wallets.clone(),
    );

    for (address, reason) in monitor.rejected_wallets() {
        notifier
            .notify(&recipient, &format!("Not monitoring {address}: {reason}"))
            .await;
    }

    // Startup greeting with the current SOL price (best-effort)
    if cfg.price.coingecko_enabled {
        match price::fetch_sol_price().await {
            Ok(p) => info!(sol_usd = %p, "Current Solana price"),
            Err(e) => warn!(error = %e, "Price lookup failed"),
        }
    }

    // -- Monitor loop ------------------------------------------------------

    let mut interval = tokio::time::interval(Duration::from_secs(cfg.monitor.interval_secs));
    // Ticks are awaited inline, so they can never overlap; if one runs
    // long, intervening deadlines are skipped rather than queued.
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(
        interval_secs = cfg.monitor.interval_secs,
        enabled = switch.is_enabled(),
        "Entering monitor loop. Press Ctrl+C to stop."
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let report = monitor.tick().await;
                if report.wallets_failed > 0 {
                    warn!(failed = report.wallets_failed, "Tick had wallet failures");
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received.");
                break;
            }
        }
    }

    info!("SOLPEER shut down cleanly.");
    Ok(())
}

/// Resolve Telegram credentials from the env vars named in config.
/// Both must be present for the Telegram notifier to be used.
fn telegram_env(cfg: &config::AppConfig) -> Option<(String, String)> {
    let token_env = cfg.alerts.telegram_bot_token_env.as_deref()?;
    let chat_env = cfg.alerts.telegram_chat_id_env.as_deref()?;
    let token = std::env::var(token_env).ok()?;
    let chat_id = std::env::var(chat_env).ok()?;
    Some((token, chat_id))
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("solpeer=info"));

    let json_logging = std::env::var("SOLPEER_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
