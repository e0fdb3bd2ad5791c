// tests/common/mod.rs
// Shared fixtures: scripted ownership checker, manual clock, in-memory service
#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use ticket_proof::chain::{ChainConfig, ChainRegistry, RpcClientError};
use ticket_proof::clock::ManualClock;
use ticket_proof::config::ProtocolSettings;
use ticket_proof::crypto::LocalSigner;
use ticket_proof::ledger::MemoryNonceLedger;
use ticket_proof::oracle::{OwnershipChecker, OwnershipOracle};
use ticket_proof::{Address, ChainId, ProofService, TokenId};

pub const START: i64 = 1_700_000_000;

pub fn holder() -> Address {
    "0xabc0000000000000000000000000000000000001".parse().unwrap()
}

pub enum Behavior {
    Owner(Address),
    Fail,
    Hang,
}

/// Checker whose answer and call count the test controls.
pub struct ScriptedChecker {
    pub behavior: parking_lot::Mutex<Behavior>,
    pub calls: AtomicUsize,
}

impl ScriptedChecker {
    pub fn new(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            behavior: parking_lot::Mutex::new(behavior),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set(&self, behavior: Behavior) {
        *self.behavior.lock() = behavior;
    }

    fn immediate(&self) -> Option<Result<Address, RpcClientError>> {
        match &*self.behavior.lock() {
            Behavior::Owner(addr) => Some(Ok(*addr)),
            Behavior::Fail => Some(Err(RpcClientError::Rpc {
                code: -32000,
                message: "header not found".into(),
            })),
            Behavior::Hang => None,
        }
    }
}

#[async_trait]
impl OwnershipChecker for ScriptedChecker {
    async fn owner_of(&self, _token_id: &TokenId) -> Result<Address, RpcClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(result) = self.immediate() {
            return result;
        }
        tokio::time::sleep(Duration::from_secs(3_600)).await;
        Err(RpcClientError::EmptyResponse)
    }
}

pub struct Harness {
    pub service: Arc<ProofService>,
    pub clock: Arc<ManualClock>,
    pub checker: Arc<ScriptedChecker>,
    pub ledger: Arc<MemoryNonceLedger>,
}

pub fn chain(id: u64) -> ChainConfig {
    ChainConfig {
        chain_id: ChainId(id),
        rpc_endpoint: format!("http://127.0.0.1:{}", 10_000 + id % 1_000).parse().unwrap(),
        contract_address: Address::from_bytes([0xaa; 20]),
        name: None,
    }
}

/// Service on chains 1 and 137, with `checker` answering for both.
pub fn harness_with(settings: ProtocolSettings, behavior: Behavior) -> Harness {
    let registry = Arc::new(ChainRegistry::new(vec![chain(1), chain(137)]).unwrap());
    let checker = ScriptedChecker::new(behavior);
    let oracle = OwnershipOracle::new(registry, settings.oracle_timeout)
        .with_checker(ChainId(1), checker.clone())
        .with_checker(ChainId(137), checker.clone());
    let clock = Arc::new(ManualClock::new(START));
    let ledger = Arc::new(MemoryNonceLedger::new(clock.clone()));
    let service = ProofService::new(
        settings,
        Arc::new(LocalSigner::random()),
        Arc::new(oracle),
        ledger.clone(),
        clock.clone(),
    );
    Harness {
        service: Arc::new(service),
        clock,
        checker,
        ledger,
    }
}

pub fn harness() -> Harness {
    harness_with(ProtocolSettings::default(), Behavior::Owner(holder()))
}
