//! PostgreSQL-backed nonce ledger.
//!
//! The claim is a single `INSERT ... ON CONFLICT DO NOTHING`: the primary key
//! makes it a compare-and-set that every verifier instance shares. Expired
//! rows are removed by [`super::spawn_sweeper`]; until then they still block
//! re-claims, which is why retention must outlive proof validity.

use super::{LedgerBackend, LedgerError, LedgerStats, NonceLedger};
use crate::clock::Clock;
use async_trait::async_trait;
use backoff::ExponentialBackoff;
use log::{info, warn};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::sync::Arc;
use std::time::Duration;

pub struct PgNonceLedger {
    pool: PgPool,
    clock: Arc<dyn Clock>,
}

impl PgNonceLedger {
    pub fn new(pool: PgPool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    /// Connect with exponential backoff (the database may still be starting),
    /// then create the table if needed.
    pub async fn connect(
        url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, LedgerError> {
        let policy = ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(30)),
            ..ExponentialBackoff::default()
        };

        let pool = backoff::future::retry(policy, move || async move {
            PgPoolOptions::new()
                .max_connections(max_connections)
                .acquire_timeout(acquire_timeout)
                .connect(url)
                .await
                .map_err(|e| {
                    warn!("Nonce ledger connection attempt failed: {}", e);
                    backoff::Error::transient(e)
                })
        })
        .await?;

        let ledger = Self::new(pool, clock);
        ledger.initialize().await?;
        info!("Nonce ledger connected (postgres, {} max connections)", max_connections);
        Ok(ledger)
    }

    pub async fn initialize(&self) -> Result<(), LedgerError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS proof_nonces (
                nonce TEXT PRIMARY KEY,
                expires_at BIGINT NOT NULL,
                claimed_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_proof_nonces_expires_at
            ON proof_nonces (expires_at)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl NonceLedger for PgNonceLedger {
    async fn claim(&self, nonce: &str, expires_at: i64) -> Result<bool, LedgerError> {
        let result = sqlx::query(
            r#"
            INSERT INTO proof_nonces (nonce, expires_at)
            VALUES ($1, $2)
            ON CONFLICT (nonce) DO NOTHING
            "#,
        )
        .bind(nonce)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn is_claimed(&self, nonce: &str) -> Result<bool, LedgerError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM proof_nonces WHERE nonce = $1)")
                .bind(nonce)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn stats(&self) -> Result<LedgerStats, LedgerError> {
        let active: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM proof_nonces WHERE expires_at > $1")
                .bind(self.clock.now())
                .fetch_one(&self.pool)
                .await?;
        Ok(LedgerStats {
            active_count: active.max(0) as u64,
        })
    }

    async fn sweep_expired(&self, now: i64) -> Result<u64, LedgerError> {
        let result = sqlx::query("DELETE FROM proof_nonces WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    fn backend(&self) -> LedgerBackend {
        LedgerBackend::Postgres
    }
}
