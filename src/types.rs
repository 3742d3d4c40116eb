//! Shared types for the SOLPEER engine.
//!
//! These types form the data model used across all modules.
//! They are designed to be stable so that the store, trading,
//! and monitoring modules can depend on them without circular
//! references.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Opaque id of an offer or escrow record (sqlite rowid — ascending,
/// which gives listings a stable deterministic order).
pub type RecordId = i64;

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A registered trader, keyed by their messaging-platform user id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    /// Wallet addresses keyed by coin symbol ("SOL" → base58 address).
    pub wallets: HashMap<String, String>,
    /// Running-average reputation from completed-trade reviews.
    pub reputation: f64,
    pub review_count: i64,
}

impl User {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            wallets: HashMap::new(),
            reputation: 0.0,
            review_count: 0,
        }
    }
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} wallets, rep {:.1}/{} reviews)",
            self.id,
            self.wallets.len(),
            self.reputation,
            self.review_count,
        )
    }
}

// ---------------------------------------------------------------------------
// Trade offers
// ---------------------------------------------------------------------------

/// Lifecycle of a posted offer.
///
/// `Reserved` is set transactionally when an escrow is opened against the
/// offer, so "a pending escrow exists" is an explicit stored fact rather
/// than a join on the escrows table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OfferStatus {
    Active,
    Reserved,
    Completed,
    Canceled,
}

impl OfferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OfferStatus::Active => "active",
            OfferStatus::Reserved => "reserved",
            OfferStatus::Completed => "completed",
            OfferStatus::Canceled => "canceled",
        }
    }
}

impl fmt::Display for OfferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OfferStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(OfferStatus::Active),
            "reserved" => Ok(OfferStatus::Reserved),
            "completed" => Ok(OfferStatus::Completed),
            "canceled" => Ok(OfferStatus::Canceled),
            other => Err(anyhow::anyhow!("unknown offer status: {other}")),
        }
    }
}

/// A posted intent to trade a coin at a price via a payment method.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeOffer {
    pub id: RecordId,
    pub user_id: String,
    /// Coin symbol, e.g. "SOL".
    pub coin: String,
    pub price: Decimal,
    /// Free-form payment method, e.g. "bank" or "cash".
    pub method: String,
    pub status: OfferStatus,
    pub expires_at: DateTime<Utc>,
}

impl TradeOffer {
    /// Whether the offer's expiration has passed. Expiry is lazy: there is
    /// no background sweep, so every read path must apply this check.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Active in storage and not past its expiration.
    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        self.status == OfferStatus::Active && !self.is_expired(now)
    }
}

impl fmt::Display for TradeOffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {} @ {} via {} [{}]",
            self.id, self.coin, self.price, self.method, self.status,
        )
    }
}

// ---------------------------------------------------------------------------
// Escrow
// ---------------------------------------------------------------------------

/// Escrow lifecycle. Completed and Canceled are terminal: no transition
/// out of either is ever permitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EscrowStatus {
    Pending,
    Completed,
    Canceled,
}

impl EscrowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EscrowStatus::Pending => "pending",
            EscrowStatus::Completed => "completed",
            EscrowStatus::Canceled => "canceled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, EscrowStatus::Pending)
    }
}

impl fmt::Display for EscrowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EscrowStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(EscrowStatus::Pending),
            "completed" => Ok(EscrowStatus::Completed),
            "canceled" => Ok(EscrowStatus::Canceled),
            other => Err(anyhow::anyhow!("unknown escrow status: {other}")),
        }
    }
}

/// A custody record binding a trade's funds-release to a state machine.
/// Exactly one escrow row is created per trade initiation, bound 1:1 to
/// its offer for its whole life.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Escrow {
    pub id: RecordId,
    pub offer_id: RecordId,
    pub status: EscrowStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Copy-trading signals
// ---------------------------------------------------------------------------

/// Direction of a mirrored trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeAction {
    Buy,
    Sell,
}

impl fmt::Display for TradeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeAction::Buy => write!(f, "BUY"),
            TradeAction::Sell => write!(f, "SELL"),
        }
    }
}

/// A classified token movement observed on a watched wallet,
/// handed from the monitor to the mirroring engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeSignal {
    /// Address of the watched wallet the movement was observed on.
    pub wallet: String,
    /// Source transaction signature (dedup key across ticks).
    pub signature: String,
    pub action: TradeAction,
    /// SPL token mint address.
    pub mint: String,
    /// Raw token amount (base units).
    pub amount: u64,
}

impl fmt::Display for TradeSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} of {} (seen on {})",
            self.action, self.amount, self.mint, self.wallet,
        )
    }
}

/// Receipt for a successfully submitted mirrored transfer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirroredTrade {
    /// Local correlation id.
    pub id: String,
    pub action: TradeAction,
    pub mint: String,
    pub amount: u64,
    /// Signature of the mirrored on-chain transfer.
    pub signature: String,
    /// Signature of the watched-wallet transaction this mirrors.
    pub source_signature: String,
    pub submitted_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error taxonomy for SOLPEER.
///
/// Everything here is surfaced to the caller as a typed failure; none of
/// these crash the process. The front end owns turning them into
/// user-facing text.
#[derive(Debug, thiserror::Error)]
pub enum TradeError {
    /// Bad input, user-correctable.
    #[error("invalid {field}: {message}")]
    Validation { field: String, message: String },

    /// A referenced record id does not exist.
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    /// The offer is not open for trading (non-active status or expired).
    #[error("offer {0} is not open for trading")]
    InactiveOffer(RecordId),

    /// A pending escrow already reserves this offer.
    #[error("offer {0} already has a pending escrow")]
    Conflict(RecordId),

    /// Illegal state-machine transition (escrow already terminal).
    #[error("escrow {escrow}: cannot move from {from} to {to}")]
    InvalidTransition {
        escrow: RecordId,
        from: EscrowStatus,
        to: EscrowStatus,
    },

    /// Downstream RPC/transfer failure during mirroring.
    #[error("trade execution failed: {0}")]
    Execution(String),

    /// Ledger store failure.
    #[error("storage error: {0}")]
    Storage(String),
}

impl TradeError {
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        TradeError::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }

    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        TradeError::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

impl From<sqlx::Error> for TradeError {
    fn from(e: sqlx::Error) -> Self {
        TradeError::Storage(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
