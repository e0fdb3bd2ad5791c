// Key generation CLI for the proof issuer
// Generates the secp256k1 key the issuer signs proofs with

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use ticket_proof::crypto::{generate_and_write_signing_key, load_signing_key, LocalSigner, Signer};

#[derive(Parser)]
#[command(name = "ticket-keygen")]
#[command(about = "Generate the issuer signing key for the ticket proof service", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a key and append SIGNER_PRIVATE_KEY to a .env file
    Init {
        /// Path to .env file (default: .env)
        #[arg(short, long, default_value = ".env")]
        env_file: String,
    },
    /// Generate a key and print it
    Signer {
        /// Print only the hex secret
        #[arg(short, long)]
        stdout: bool,
    },
    /// Generate a key into a file (mode 0600) for SIGNER_KEY_FILE
    File {
        #[arg(short, long)]
        output: PathBuf,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Show the address of an existing key file
    Address {
        #[arg(short, long)]
        key_file: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Init { env_file } => init_env(&env_file)?,
        Commands::Signer { stdout } => generate_signer(stdout),
        Commands::File { output, force } => generate_file(&output, force)?,
        Commands::Address { key_file } => {
            let signer = load_signing_key(&key_file)?;
            println!("{}", signer.address());
        }
    }

    Ok(())
}

fn init_env(env_file: &str) -> Result<()> {
    let env_path = Path::new(env_file);

    if env_path.exists() {
        let existing = fs::read_to_string(env_path).context("Failed to read .env file")?;
        if existing.lines().any(|l| l.trim_start().starts_with("SIGNER_PRIVATE_KEY=")) {
            bail!("{} already contains SIGNER_PRIVATE_KEY; refusing to replace the issuer key", env_file);
        }
    }

    let signer = LocalSigner::random();

    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(env_path)
        .context("Failed to open .env file")?;

    writeln!(file, "\n# Issuer key ({})", chrono::Utc::now())?;
    writeln!(file, "SIGNER_PRIVATE_KEY={}", signer.secret_hex())?;
    ticket_proof::crypto::set_restrictive_permissions(env_path);

    println!("Issuer address: {}", signer.address());
    println!("\nSuccess! Key saved to {}", env_file);
    println!("\nIMPORTANT:");
    println!("  - Never commit {} to version control", env_file);
    println!("  - Every issuer instance must share this key; scanners trust its address");

    Ok(())
}

fn generate_signer(stdout: bool) {
    let signer = LocalSigner::random();

    if stdout {
        println!("{}", signer.secret_hex());
    } else {
        println!("SIGNER_PRIVATE_KEY={}", signer.secret_hex());
        println!("# address {}", signer.address());
        println!("\nAdd this to your .env file");
    }
}

fn generate_file(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        bail!("{} exists (pass --force to overwrite)", output.display());
    }
    let signer = generate_and_write_signing_key(output)?;
    println!("Wrote issuer key to {}", output.display());
    println!("Issuer address: {}", signer.address());
    Ok(())
}
