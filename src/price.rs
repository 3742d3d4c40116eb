//! Spot price lookup via CoinGecko.
//!
//! One endpoint, no key required on the free tier. Used for the startup
//! greeting; rendering price text for users is the front end's job.

use anyhow::{Context, Result};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;

const SIMPLE_PRICE_URL: &str =
    "https://api.coingecko.com/api/v3/simple/price?ids=solana&vs_currencies=usd";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct SimplePriceResponse {
    solana: UsdQuote,
}

#[derive(Debug, Deserialize)]
struct UsdQuote {
    usd: Decimal,
}

/// Current SOL/USD spot price.
pub async fn fetch_sol_price() -> Result<Decimal> {
    let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
    let response: SimplePriceResponse = client
        .get(SIMPLE_PRICE_URL)
        .send()
        .await
        .context("CoinGecko request failed")?
        .error_for_status()
        .context("CoinGecko returned HTTP error")?
        .json()
        .await
        .context("Failed to parse CoinGecko response")?;

    Ok(response.solana.usd)
}
