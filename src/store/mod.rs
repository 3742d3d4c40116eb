//! Ledger store — durable records for users, trade offers and escrows.
//!
//! Backed by sqlite via sqlx. The store owns all persisted state; the
//! services above it (offer book, escrow desk) are stateless per call.
//! State transitions that must be atomic (reserving an offer, settling
//! an escrow) are expressed here as single transactions whose UPDATEs
//! compare-and-set on the expected status, so a racing caller observes
//! a miss instead of clobbering the winner.

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::str::FromStr;
use tracing::{debug, info};

use crate::types::{
    Escrow, EscrowStatus, OfferStatus, RecordId, TradeError, TradeOffer, User,
};

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id           TEXT PRIMARY KEY,
    reputation   REAL NOT NULL DEFAULT 0.0,
    review_count INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS user_wallets (
    user_id TEXT NOT NULL REFERENCES users(id),
    coin    TEXT NOT NULL,
    address TEXT NOT NULL,
    PRIMARY KEY (user_id, coin)
);

CREATE TABLE IF NOT EXISTS trade_offers (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id    TEXT NOT NULL REFERENCES users(id),
    coin       TEXT NOT NULL,
    price      TEXT NOT NULL,
    method     TEXT NOT NULL,
    status     TEXT NOT NULL,
    expires_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS escrows (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    offer_id   INTEGER NOT NULL REFERENCES trade_offers(id),
    status     TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);
"#;

// ---------------------------------------------------------------------------
// Transition outcomes
// ---------------------------------------------------------------------------

/// Result of attempting to reserve an offer (open an escrow against it).
#[derive(Debug)]
pub enum ReserveOutcome {
    /// Offer flipped Active→Reserved and a Pending escrow was created.
    Reserved(RecordId),
    /// No offer row with that id.
    OfferMissing,
    /// Offer exists but its status is not Active; carries the status seen,
    /// so the caller can distinguish "already reserved" from "settled".
    NotActive(OfferStatus),
    /// Offer is Active in storage but its expiration has passed.
    Expired,
}

/// Result of attempting a terminal escrow transition.
#[derive(Debug)]
pub enum SettleOutcome {
    Settled,
    EscrowMissing,
    /// Escrow was not Pending; carries the status it already holds.
    AlreadyTerminal(EscrowStatus),
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// Handle to the sqlite-backed ledger. Cheap to clone.
#[derive(Clone)]
pub struct Ledger {
    pool: SqlitePool,
}

impl Ledger {
    /// Open (or create) the database and ensure the schema exists.
    pub async fn open(url: &str) -> Result<Self, TradeError> {
        // A single pooled connection: sqlite serializes writers anyway, and
        // it keeps `sqlite::memory:` databases shared across all callers.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(url)
            .await?;

        let ledger = Self { pool };
        ledger.init().await?;
        info!(url, "Ledger opened");
        Ok(ledger)
    }

    async fn init(&self) -> Result<(), TradeError> {
        for statement in SCHEMA.split(';').filter(|s| !s.trim().is_empty()) {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    // -- Users -------------------------------------------------------------

    /// Register a user, or return the existing record if already registered.
    pub async fn register_user(&self, user_id: &str) -> Result<User, TradeError> {
        sqlx::query("INSERT INTO users (id) VALUES (?) ON CONFLICT(id) DO NOTHING")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        self.get_user(user_id)
            .await?
            .ok_or_else(|| TradeError::not_found("user", user_id))
    }

    pub async fn get_user(&self, user_id: &str) -> Result<Option<User>, TradeError> {
        let row = sqlx::query("SELECT id, reputation, review_count FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else { return Ok(None) };

        let mut wallets = HashMap::new();
        let wallet_rows =
            sqlx::query("SELECT coin, address FROM user_wallets WHERE user_id = ?")
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?;
        for w in wallet_rows {
            wallets.insert(w.get::<String, _>("coin"), w.get::<String, _>("address"));
        }

        Ok(Some(User {
            id: row.get("id"),
            wallets,
            reputation: row.get("reputation"),
            review_count: row.get("review_count"),
        }))
    }

    /// Attach (or replace) a wallet address for a coin on a user.
    pub async fn add_wallet(
        &self,
        user_id: &str,
        coin: &str,
        address: &str,
    ) -> Result<(), TradeError> {
        if self.get_user(user_id).await?.is_none() {
            return Err(TradeError::not_found("user", user_id));
        }

        sqlx::query(
            "INSERT INTO user_wallets (user_id, coin, address) VALUES (?, ?, ?) \
             ON CONFLICT(user_id, coin) DO UPDATE SET address = excluded.address",
        )
        .bind(user_id)
        .bind(coin)
        .bind(address)
        .execute(&self.pool)
        .await?;

        debug!(user_id, coin, "Wallet attached");
        Ok(())
    }

    /// Fold a completed-trade review rating into the user's running average.
    pub async fn record_review(&self, user_id: &str, rating: f64) -> Result<(), TradeError> {
        let result = sqlx::query(
            "UPDATE users SET \
                 reputation = (reputation * review_count + ?) / (review_count + 1), \
                 review_count = review_count + 1 \
             WHERE id = ?",
        )
        .bind(rating)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(TradeError::not_found("user", user_id));
        }
        Ok(())
    }

    // -- Offers ------------------------------------------------------------

    /// Insert a new Active offer, returning its id.
    pub async fn insert_offer(
        &self,
        user_id: &str,
        coin: &str,
        price: Decimal,
        method: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<RecordId, TradeError> {
        let result = sqlx::query(
            "INSERT INTO trade_offers (user_id, coin, price, method, status, expires_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(coin)
        .bind(price.to_string())
        .bind(method)
        .bind(OfferStatus::Active.as_str())
        .bind(expires_at.timestamp())
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn get_offer(&self, offer_id: RecordId) -> Result<Option<TradeOffer>, TradeError> {
        let row = sqlx::query(
            "SELECT id, user_id, coin, price, method, status, expires_at \
             FROM trade_offers WHERE id = ?",
        )
        .bind(offer_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_offer).transpose()
    }

    /// Offers with status Active and expiration strictly after `now`,
    /// optionally filtered by coin, ordered by id ascending. Each call is
    /// a fresh snapshot.
    pub async fn list_open_offers(
        &self,
        coin: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Vec<TradeOffer>, TradeError> {
        let rows = match coin {
            Some(coin) => {
                sqlx::query(
                    "SELECT id, user_id, coin, price, method, status, expires_at \
                     FROM trade_offers \
                     WHERE status = 'active' AND expires_at > ? AND coin = ? \
                     ORDER BY id ASC",
                )
                .bind(now.timestamp())
                .bind(coin)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT id, user_id, coin, price, method, status, expires_at \
                     FROM trade_offers \
                     WHERE status = 'active' AND expires_at > ? \
                     ORDER BY id ASC",
                )
                .bind(now.timestamp())
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.into_iter().map(row_to_offer).collect()
    }

    // -- Escrow transitions ------------------------------------------------

    /// Atomically flip an offer Active→Reserved and create its Pending
    /// escrow. The compare-and-set on the offer row is what enforces the
    /// at-most-one-pending-escrow invariant: a second caller finds the
    /// offer already Reserved.
    pub async fn reserve_offer(
        &self,
        offer_id: RecordId,
        now: DateTime<Utc>,
    ) -> Result<ReserveOutcome, TradeError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT status, expires_at FROM trade_offers WHERE id = ?")
            .bind(offer_id)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(row) = row else {
            return Ok(ReserveOutcome::OfferMissing);
        };
        let status = parse_offer_status(&row)?;
        let expires_at = row.get::<i64, _>("expires_at");

        if status != OfferStatus::Active {
            return Ok(ReserveOutcome::NotActive(status));
        }
        if now.timestamp() >= expires_at {
            return Ok(ReserveOutcome::Expired);
        }

        let updated = sqlx::query(
            "UPDATE trade_offers SET status = 'reserved' WHERE id = ? AND status = 'active'",
        )
        .bind(offer_id)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            // Lost a race between the read above and this CAS.
            return Ok(ReserveOutcome::NotActive(OfferStatus::Reserved));
        }

        let inserted = sqlx::query(
            "INSERT INTO escrows (offer_id, status, created_at, updated_at) \
             VALUES (?, 'pending', ?, ?)",
        )
        .bind(offer_id)
        .bind(now.timestamp())
        .bind(now.timestamp())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(ReserveOutcome::Reserved(inserted.last_insert_rowid()))
    }

    pub async fn get_escrow(&self, escrow_id: RecordId) -> Result<Option<Escrow>, TradeError> {
        let row = sqlx::query(
            "SELECT id, offer_id, status, created_at, updated_at FROM escrows WHERE id = ?",
        )
        .bind(escrow_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_escrow).transpose()
    }

    /// Atomically move a Pending escrow to a terminal status and write the
    /// matching terminal status onto its offer. The UPDATE's status guard
    /// is the compare-and-set: of two racing settlements exactly one
    /// affects a row, the other observes `AlreadyTerminal`.
    pub async fn settle_escrow(
        &self,
        escrow_id: RecordId,
        to: EscrowStatus,
        offer_to: OfferStatus,
        now: DateTime<Utc>,
    ) -> Result<SettleOutcome, TradeError> {
        debug_assert!(to.is_terminal());

        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE escrows SET status = ?, updated_at = ? WHERE id = ? AND status = 'pending'",
        )
        .bind(to.as_str())
        .bind(now.timestamp())
        .bind(escrow_id)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            let row = sqlx::query("SELECT status FROM escrows WHERE id = ?")
                .bind(escrow_id)
                .fetch_optional(&mut *tx)
                .await?;
            return match row {
                None => Ok(SettleOutcome::EscrowMissing),
                Some(row) => {
                    let status = EscrowStatus::from_str(&row.get::<String, _>("status"))
                        .map_err(|e| TradeError::Storage(e.to_string()))?;
                    Ok(SettleOutcome::AlreadyTerminal(status))
                }
            };
        }

        sqlx::query(
            "UPDATE trade_offers SET status = ? \
             WHERE id = (SELECT offer_id FROM escrows WHERE id = ?)",
        )
        .bind(offer_to.as_str())
        .bind(escrow_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(SettleOutcome::Settled)
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn parse_offer_status(row: &SqliteRow) -> Result<OfferStatus, TradeError> {
    OfferStatus::from_str(&row.get::<String, _>("status"))
        .map_err(|e| TradeError::Storage(e.to_string()))
}

fn row_to_offer(row: SqliteRow) -> Result<TradeOffer, TradeError> {
    let price_text = row.get::<String, _>("price");
    let price = Decimal::from_str(&price_text)
        .map_err(|e| TradeError::Storage(format!("bad price '{price_text}': {e}")))?;

    Ok(TradeOffer {
        id: row.get("id"),
        user_id: row.get("user_id"),
        coin: row.get("coin"),
        price,
        method: row.get("method"),
        status: parse_offer_status(&row)?,
        expires_at: epoch(row.get("expires_at")),
    })
}

fn row_to_escrow(row: SqliteRow) -> Result<Escrow, TradeError> {
    Ok(Escrow {
        id: row.get("id"),
        offer_id: row.get("offer_id"),
        status: EscrowStatus::from_str(&row.get::<String, _>("status"))
            .map_err(|e| TradeError::Storage(e.to_string()))?,
        created_at: epoch(row.get("created_at")),
        updated_at: epoch(row.get("updated_at")),
    })
}

fn epoch(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or(DateTime::UNIX_EPOCH)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
