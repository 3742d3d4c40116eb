//! Trade offer manager.
//!
//! Validated creation and lazy-expiry listing of P2P trade offers.
//! Stateless: every call reads and writes through the ledger.

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use tracing::info;

use crate::store::Ledger;
use crate::types::{RecordId, TradeError, TradeOffer};

/// Longest allowed coin symbol ("SOL", "USDC", ...).
const MAX_COIN_LEN: usize = 10;
const MIN_COIN_LEN: usize = 2;

pub struct OfferBook {
    ledger: Ledger,
}

impl OfferBook {
    pub fn new(ledger: Ledger) -> Self {
        Self { ledger }
    }

    /// Post a new offer. The offer is Active immediately and expires
    /// `ttl_seconds` from now; expiry is enforced lazily on read paths.
    pub async fn create_offer(
        &self,
        user_id: &str,
        coin: &str,
        price: Decimal,
        method: &str,
        ttl_seconds: i64,
    ) -> Result<RecordId, TradeError> {
        let coin = normalize_coin(coin)?;
        if price <= Decimal::ZERO {
            return Err(TradeError::validation("price", "must be positive"));
        }
        if ttl_seconds <= 0 {
            return Err(TradeError::validation("ttl_seconds", "must be positive"));
        }
        if method.trim().is_empty() {
            return Err(TradeError::validation("method", "must not be empty"));
        }
        if self.ledger.get_user(user_id).await?.is_none() {
            return Err(TradeError::not_found("user", user_id));
        }

        let expires_at = Utc::now() + Duration::seconds(ttl_seconds);
        let id = self
            .ledger
            .insert_offer(user_id, &coin, price, method.trim(), expires_at)
            .await?;

        info!(offer_id = id, user_id, coin = %coin, %price, "Offer created");
        Ok(id)
    }

    /// Open offers (Active and unexpired as of this call), optionally
    /// filtered by coin, ordered by id ascending. Each call re-queries the
    /// ledger, so the result is a fresh snapshot.
    pub async fn list_active_offers(
        &self,
        coin: Option<&str>,
    ) -> Result<Vec<TradeOffer>, TradeError> {
        let coin = coin.map(normalize_coin).transpose()?;
        self.ledger
            .list_open_offers(coin.as_deref(), Utc::now())
            .await
    }
}

/// Uppercase and validate a coin symbol.
fn normalize_coin(coin: &str) -> Result<String, TradeError> {
    let coin = coin.trim().to_uppercase();
    let ok = (MIN_COIN_LEN..=MAX_COIN_LEN).contains(&coin.len())
        && coin.chars().all(|c| c.is_ascii_alphanumeric());
    if !ok {
        return Err(TradeError::validation(
            "coin",
            format!("'{coin}' is not a valid coin symbol"),
        ));
    }
    Ok(coin)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
