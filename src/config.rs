// src/config.rs
// Service configuration from the environment, with startup validation

use crate::chain::{ChainRegistry, RegistryError};
use log::{error, info, warn};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_API_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_SESSION_HEADER: &str = "x-authenticated-wallet";

/// Timing knobs of the proof protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolSettings {
    /// How long after `issuedAt` a proof is accepted.
    pub expiration_secs: i64,
    /// Window in which `refresh` may skip the on-chain ownership read.
    pub refresh_cooldown_secs: i64,
    /// Retention of claimed nonces. Must exceed `expiration_secs`.
    pub ledger_ttl_secs: i64,
    /// Suggested client re-render interval for the rotating code.
    pub rotation_interval_secs: i64,
    pub oracle_timeout: Duration,
    /// Bound on a nonce claim. A claim that times out may still commit, so
    /// the same proof can later read as already used.
    pub ledger_timeout: Duration,
    /// Deadline for a whole issue/refresh/verify call.
    pub request_timeout: Duration,
}

impl Default for ProtocolSettings {
    fn default() -> Self {
        Self {
            expiration_secs: 30,
            refresh_cooldown_secs: 30,
            ledger_ttl_secs: 300,
            rotation_interval_secs: 5,
            oracle_timeout: Duration::from_millis(5_000),
            ledger_timeout: Duration::from_millis(1_000),
            request_timeout: Duration::from_millis(10_000),
        }
    }
}

impl ProtocolSettings {
    /// Record invariant violations in `validation`.
    pub fn check(&self, validation: &mut ConfigValidation) {
        if self.expiration_secs <= 0 {
            validation.add_error("PROOF_EXPIRATION_SECS must be positive".into());
        }
        if self.refresh_cooldown_secs < 0 {
            validation.add_error("REFRESH_COOLDOWN_SECS must not be negative".into());
        }
        // An expired-but-unconsumed nonce must never be swept while its proof
        // could still verify.
        if self.ledger_ttl_secs <= self.expiration_secs {
            validation.add_error(format!(
                "LEDGER_TTL_SECS ({}) must exceed PROOF_EXPIRATION_SECS ({})",
                self.ledger_ttl_secs, self.expiration_secs
            ));
        }
        if self.rotation_interval_secs <= 0 || self.rotation_interval_secs >= self.expiration_secs {
            validation.add_warning(format!(
                "ROTATION_INTERVAL_SECS ({}) should be positive and below PROOF_EXPIRATION_SECS ({})",
                self.rotation_interval_secs, self.expiration_secs
            ));
        }
        if self.oracle_timeout >= self.request_timeout {
            validation.add_warning(
                "ORACLE_TIMEOUT_MS is not below REQUEST_TIMEOUT_MS - request deadline will fire first"
                    .into(),
            );
        }
    }
}

/// Where the chain registry comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainSource {
    File(PathBuf),
    Inline(String),
    Missing,
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub api_addr: SocketAddr,
    pub protocol: ProtocolSettings,
    pub chains: ChainSource,
    /// Postgres URL for the shared nonce ledger; `None` selects the in-memory ledger.
    pub ledger_url: Option<String>,
    pub ledger_max_connections: u32,
    pub sweep_interval: Duration,
    /// Scanner API keys. Empty leaves scanner routes open.
    pub api_keys: Vec<String>,
    pub session_header: String,
    pub signer_key_file: Option<PathBuf>,
    pub production: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            api_addr: DEFAULT_API_ADDR
                .parse()
                .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 8080))),
            protocol: ProtocolSettings::default(),
            chains: ChainSource::Missing,
            ledger_url: None,
            ledger_max_connections: 16,
            sweep_interval: Duration::from_secs(60),
            api_keys: Vec::new(),
            session_header: DEFAULT_SESSION_HEADER.to_string(),
            signer_key_file: None,
            production: false,
        }
    }
}

impl ServiceConfig {
    /// Read configuration from process environment variables.
    pub fn from_env() -> (Self, ConfigValidation) {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from any key lookup. Unparseable values keep their
    /// default and are reported as errors.
    pub fn from_lookup<F>(lookup: F) -> (Self, ConfigValidation)
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut validation = ConfigValidation::new();
        let mut cfg = ServiceConfig::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(addr) = get("API_ADDR") {
            match addr.parse::<SocketAddr>() {
                Ok(a) => cfg.api_addr = a,
                Err(_) => validation.add_error(format!(
                    "API_ADDR has invalid format: '{}' (expected IP:PORT)",
                    addr
                )),
            }
        }

        let p = &mut cfg.protocol;
        parse_into(&get, "PROOF_EXPIRATION_SECS", &mut p.expiration_secs, &mut validation);
        parse_into(&get, "REFRESH_COOLDOWN_SECS", &mut p.refresh_cooldown_secs, &mut validation);
        parse_into(&get, "LEDGER_TTL_SECS", &mut p.ledger_ttl_secs, &mut validation);
        parse_into(&get, "ROTATION_INTERVAL_SECS", &mut p.rotation_interval_secs, &mut validation);
        parse_millis(&get, "ORACLE_TIMEOUT_MS", &mut p.oracle_timeout, &mut validation);
        parse_millis(&get, "LEDGER_TIMEOUT_MS", &mut p.ledger_timeout, &mut validation);
        parse_millis(&get, "REQUEST_TIMEOUT_MS", &mut p.request_timeout, &mut validation);

        let mut sweep_secs = cfg.sweep_interval.as_secs();
        parse_into(&get, "LEDGER_SWEEP_INTERVAL_SECS", &mut sweep_secs, &mut validation);
        cfg.sweep_interval = Duration::from_secs(sweep_secs.max(1));
        parse_into(
            &get,
            "LEDGER_MAX_CONNECTIONS",
            &mut cfg.ledger_max_connections,
            &mut validation,
        );

        cfg.chains = match (get("CHAINS_FILE"), get("CHAINS")) {
            (Some(path), _) => ChainSource::File(PathBuf::from(path)),
            (None, Some(json)) => ChainSource::Inline(json),
            (None, None) => ChainSource::Missing,
        };

        cfg.ledger_url = get("NONCE_LEDGER_URL");
        cfg.api_keys = get("API_KEYS")
            .map(|keys| {
                keys.split(',')
                    .map(|k| k.trim().to_string())
                    .filter(|k| !k.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        if let Some(header) = get("SESSION_WALLET_HEADER") {
            cfg.session_header = header.trim().to_ascii_lowercase();
        }
        cfg.signer_key_file = get("SIGNER_KEY_FILE").map(PathBuf::from);
        cfg.production = get("ENVIRONMENT")
            .map(|e| e.eq_ignore_ascii_case("production") || e.eq_ignore_ascii_case("prod"))
            .unwrap_or(false);

        cfg.check(&mut validation);
        (cfg, validation)
    }

    fn check(&self, validation: &mut ConfigValidation) {
        self.protocol.check(validation);

        if self.chains == ChainSource::Missing {
            validation.add_error("No chains configured - set CHAINS_FILE or CHAINS".into());
        }

        match &self.ledger_url {
            Some(_) => info!(" Nonce ledger: shared postgres"),
            None if self.production => validation.add_error(
                "Production deployment MUST set NONCE_LEDGER_URL (in-memory ledger is single-instance only)"
                    .into(),
            ),
            None => validation.add_warning(
                "NONCE_LEDGER_URL not set - using in-memory nonce ledger; exactly-once redemption \
                 holds only while a single verifier instance runs"
                    .into(),
            ),
        }

        if self.api_keys.is_empty() {
            if self.production {
                validation.add_error("Production deployment MUST have API_KEYS configured!".into());
            } else {
                validation.add_warning(
                    "API_KEYS not set - scanner endpoints will run without authentication".into(),
                );
            }
        }
        for (i, key) in self.api_keys.iter().enumerate() {
            if key.len() < 32 {
                validation.add_warning(format!(
                    "API key #{} is too short ({} chars) - recommend at least 32 characters",
                    i + 1,
                    key.len()
                ));
            }
        }
    }

    pub fn load_chains(&self) -> Result<ChainRegistry, RegistryError> {
        match &self.chains {
            ChainSource::File(path) => ChainRegistry::from_file(path),
            ChainSource::Inline(json) => ChainRegistry::from_json(json),
            ChainSource::Missing => Ok(ChainRegistry::default()),
        }
    }
}

fn parse_into<F, T>(get: &F, key: &str, slot: &mut T, validation: &mut ConfigValidation)
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    if let Some(raw) = get(key) {
        match raw.trim().parse::<T>() {
            Ok(v) => *slot = v,
            Err(_) => validation.add_error(format!("{} is not a valid number: '{}'", key, raw)),
        }
    }
}

fn parse_millis<F>(get: &F, key: &str, slot: &mut Duration, validation: &mut ConfigValidation)
where
    F: Fn(&str) -> Option<String>,
{
    let mut ms = slot.as_millis() as u64;
    parse_into(get, key, &mut ms, validation);
    if ms == 0 {
        validation.add_error(format!("{} must be positive", key));
    }
    *slot = Duration::from_millis(ms);
}

/// Problems found while reading the environment. Errors block startup.
#[derive(Debug, Default)]
pub struct ConfigValidation {
    pub valid: bool,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl ConfigValidation {
    fn new() -> Self {
        Self {
            valid: true,
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn add_warning(&mut self, msg: String) {
        self.warnings.push(msg);
    }

    fn add_error(&mut self, msg: String) {
        self.errors.push(msg);
        self.valid = false;
    }

    pub fn print_summary(&self) {
        if !self.warnings.is_empty() {
            for w in &self.warnings {
                warn!("config: {}", w);
            }
        }

        if !self.errors.is_empty() {
            for e in &self.errors {
                error!("config: {}", e);
            }
        }

        if self.valid {
            info!(
                "Proof service config ok ({} warnings)",
                self.warnings.len()
            );
        } else {
            error!("Proof service config rejected ({} errors)", self.errors.len());
        }
    }
}
