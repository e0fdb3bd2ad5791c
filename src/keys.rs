// src/keys.rs
// Issuer key loading: key file, Docker secret or environment

use crate::crypto::{load_signing_key, LocalSigner};
use anyhow::{bail, Context, Result};
use log::info;
use std::fs;
use std::path::Path;

pub const SIGNER_SECRET_NAME: &str = "SIGNER_PRIVATE_KEY";

/// Read a secret from a Docker secret or an environment variable.
pub fn load_secret(name: &str) -> Option<String> {
    load_secret_from(Path::new("/run/secrets"), name)
}

fn load_secret_from(secrets_dir: &Path, name: &str) -> Option<String> {
    // Docker secrets path
    if let Ok(s) = fs::read_to_string(secrets_dir.join(name)) {
        let s = s.trim().to_string();
        if !s.is_empty() {
            return Some(s);
        }
    }

    // Fallback to environment variable
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => Some(v.trim().to_string()),
        _ => None,
    }
}

/// Load the issuer signing key. An explicit key file wins over the secret.
pub fn load_signer(key_file: Option<&Path>) -> Result<LocalSigner> {
    if let Some(path) = key_file {
        let signer = load_signing_key(path)?;
        info!("Issuer key loaded from {}", path.display());
        return Ok(signer);
    }

    let Some(secret) = load_secret(SIGNER_SECRET_NAME) else {
        bail!(
            "{} not set (run `ticket-keygen` and export it, or set SIGNER_KEY_FILE)",
            SIGNER_SECRET_NAME
        );
    };
    LocalSigner::from_hex(&secret).with_context(|| format!("{} is not a valid key", SIGNER_SECRET_NAME))
}
