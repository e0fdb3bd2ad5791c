// Rotating ticket-ownership proofs.
//
// A holder app asks for a short-lived signed proof that its wallet owns a
// ticket NFT; a venue scanner accepts each proof at most once.

pub mod api;
pub mod chain;
pub mod clock;
pub mod config;
pub mod crypto;
pub mod error;
pub mod issuer;
pub mod keys;
pub mod ledger;
pub mod metrics;
pub mod oracle;
pub mod proof;
pub mod service;
pub mod types;
pub mod verifier;

pub use error::{ProofError, ProofResult};
pub use proof::{ProofPayload, SignedProof};
pub use service::ProofService;
pub use types::{Address, ChainId, TokenId};

use crate::api::{ApiState, HeaderSession};
use crate::config::ServiceConfig;
use crate::crypto::Signer;
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::{error, info};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the proof issuance / verification API
    Serve {
        /// Override API_ADDR
        #[arg(long)]
        addr: Option<std::net::SocketAddr>,
    },
    /// Print the issuer address scanners should expect
    SignerAddress {
        /// Read the key from this file instead of SIGNER_PRIVATE_KEY
        #[arg(long)]
        key_file: Option<PathBuf>,
    },
    /// Validate configuration and exit
    CheckConfig,
}

pub async fn run() -> Result<()> {
    // load .env for local development (if present)
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { addr } => {
            let (mut config, validation) = ServiceConfig::from_env();
            validation.print_summary();
            if !validation.valid {
                bail!("configuration invalid, refusing to start");
            }
            if let Some(addr) = addr {
                config.api_addr = addr;
            }
            serve(config).await
        }
        Commands::SignerAddress { key_file } => {
            let (config, _) = ServiceConfig::from_env();
            let key_file = key_file.or(config.signer_key_file);
            let signer = keys::load_signer(key_file.as_deref())?;
            println!("{}", signer.address());
            Ok(())
        }
        Commands::CheckConfig => {
            let (config, validation) = ServiceConfig::from_env();
            validation.print_summary();
            let registry = config.load_chains().context("load chain registry")?;
            println!(
                "{} chain(s) configured: {:?}",
                registry.len(),
                registry.supported_chain_ids()
            );
            if !validation.valid {
                bail!("configuration invalid");
            }
            Ok(())
        }
    }
}

async fn serve(config: ServiceConfig) -> Result<()> {
    let signer: Arc<dyn Signer> = Arc::new(keys::load_signer(config.signer_key_file.as_deref())?);
    info!("Issuer address: {}", signer.address());

    let service = Arc::new(ProofService::from_config(&config, signer).await?);
    let session = HeaderSession::new(&config.session_header)
        .with_context(|| format!("invalid SESSION_WALLET_HEADER '{}'", config.session_header))?;
    let state = Arc::new(ApiState {
        service,
        session: Arc::new(session),
        api_keys: config.api_keys.clone(),
    });
    let router = api::router(state);

    info!("Starting proof API on http://{}", config.api_addr);
    axum::Server::try_bind(&config.api_addr)
        .with_context(|| format!("bind {}", config.api_addr))?
        .serve(router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| {
            error!("API server crashed on {}: {}", config.api_addr, e);
            e
        })?;

    info!("Proof API stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
