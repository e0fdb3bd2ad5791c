//! Nonce ledger: the record of consumed single-use nonces.
//!
//! `claim` is the only operation that decides acceptance. It must be one
//! atomic insert-if-absent; a separate check followed by a set would let two
//! scanners accept the same proof.
//!
//! Two backends implement the same contract:
//!
//! - [`PgNonceLedger`]: shared PostgreSQL table. Every verifier instance
//!   behind the load balancer points at the same database, so the claim is a
//!   true distributed compare-and-set.
//! - [`MemoryNonceLedger`]: process-local map. Exactly-once holds only while
//!   a single verifier instance is running. Running two instances against
//!   two memory ledgers lets the same proof be accepted twice.

pub mod memory;
pub mod postgres;

pub use memory::MemoryNonceLedger;
pub use postgres::PgNonceLedger;

use crate::clock::Clock;
use crate::metrics::METRICS;
use async_trait::async_trait;
use log::{debug, warn};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("ledger backend error: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        LedgerError::Backend(e.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerBackend {
    /// Shared store; safe for multi-instance deployments.
    Postgres,
    /// Single-process fallback; no cross-instance guarantee.
    Memory,
}

impl LedgerBackend {
    pub fn is_shared(&self) -> bool {
        matches!(self, LedgerBackend::Postgres)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerStats {
    /// Claimed nonces whose retention has not yet run out.
    pub active_count: u64,
}

#[async_trait]
pub trait NonceLedger: Send + Sync {
    /// Atomically record `nonce` if unseen. Returns `true` for the single
    /// caller that recorded it and `false` for every later caller, including
    /// when the existing entry is past `expires_at` but not yet swept.
    async fn claim(&self, nonce: &str, expires_at: i64) -> Result<bool, LedgerError>;

    /// Diagnostics only. Never use this to accept or reject a proof.
    async fn is_claimed(&self, nonce: &str) -> Result<bool, LedgerError>;

    async fn stats(&self) -> Result<LedgerStats, LedgerError>;

    /// Drop entries with `expires_at <= now`. Returns how many were removed.
    async fn sweep_expired(&self, now: i64) -> Result<u64, LedgerError>;

    fn backend(&self) -> LedgerBackend;
}

/// Periodically garbage-collect expired nonces.
pub fn spawn_sweeper(
    ledger: Arc<dyn NonceLedger>,
    clock: Arc<dyn Clock>,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match ledger.sweep_expired(clock.now()).await {
                Ok(removed) => {
                    METRICS.nonces_swept.set(removed as i64);
                    if removed > 0 {
                        debug!("Nonce sweep removed {} expired entries", removed);
                    }
                }
                Err(e) => warn!("Nonce sweep failed: {}", e),
            }
        }
    })
}
