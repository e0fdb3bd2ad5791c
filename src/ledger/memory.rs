// src/ledger/memory.rs
// Single-process nonce ledger (degraded mode, no cross-instance guarantee)

use super::{LedgerBackend, LedgerError, LedgerStats, NonceLedger};
use crate::clock::Clock;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Mutex-guarded map of nonce -> expiry.
///
/// Deployment constraint: only valid for a single verifier process. Two
/// processes each holding one of these will both accept the same nonce.
pub struct MemoryNonceLedger {
    entries: Mutex<HashMap<String, i64>>,
    clock: Arc<dyn Clock>,
}

impl MemoryNonceLedger {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[async_trait]
impl NonceLedger for MemoryNonceLedger {
    async fn claim(&self, nonce: &str, expires_at: i64) -> Result<bool, LedgerError> {
        // Lookup and insert happen under one lock acquisition.
        let mut entries = self.entries.lock();
        if entries.contains_key(nonce) {
            return Ok(false);
        }
        entries.insert(nonce.to_string(), expires_at);
        Ok(true)
    }

    async fn is_claimed(&self, nonce: &str) -> Result<bool, LedgerError> {
        Ok(self.entries.lock().contains_key(nonce))
    }

    async fn stats(&self) -> Result<LedgerStats, LedgerError> {
        let now = self.clock.now();
        let active = self
            .entries
            .lock()
            .values()
            .filter(|expires_at| **expires_at > now)
            .count();
        Ok(LedgerStats {
            active_count: active as u64,
        })
    }

    async fn sweep_expired(&self, now: i64) -> Result<u64, LedgerError> {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, expires_at| *expires_at > now);
        Ok((before - entries.len()) as u64)
    }

    fn backend(&self) -> LedgerBackend {
        LedgerBackend::Memory
    }
}
