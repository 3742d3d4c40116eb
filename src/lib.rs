//! SOLPEER — Solana P2P trading and copy-trading engine
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod store;
pub mod offers;
pub mod escrow;
pub mod rpc;
pub mod monitor;
pub mod mirror;
pub mod notify;
pub mod price;
