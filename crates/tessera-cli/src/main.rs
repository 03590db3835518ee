// ABOUTME: CLI entry point for the tessera binary.
// ABOUTME: Parses arguments, resolves configuration and dispatches keyid/sign/verify.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(name = "tessera")]
#[command(about = "SSH key ids and detached signatures")]
#[command(version)]
struct Cli {
    /// Configuration file layered over the environment (defaults to ~/.config/tessera/ssh.toml when present)
    #[arg(long, global = true, env = "TESSERA_CONFIG")]
    config: Option<PathBuf>,

    /// Signature namespace
    #[arg(long, global = true)]
    namespace: Option<String>,

    /// Sign through the SSH agent even when the private key is available
    #[arg(long, global = true)]
    use_agent: bool,

    /// Debug logging for tessera crates
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the key id of an SSH key
    Keyid {
        /// Private key, public key or RFC 4716 public key file
        key: PathBuf,

        /// Print algorithm, key id, origin and comment as JSON
        #[arg(long)]
        json: bool,
    },

    /// Create a detached signature
    Sign {
        /// Key to sign with
        key: PathBuf,

        /// Data to sign (stdin when omitted)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Where to write the armored signature (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Verify a detached signature
    Verify {
        /// Key the signature must belong to
        key: PathBuf,

        /// Armored signature file
        #[arg(short, long)]
        signature: PathBuf,

        /// Signed data (stdin when omitted)
        #[arg(short, long)]
        input: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tessera_log::init_for(&["tessera-cli", "tessera-ssh"], cli.verbose);

    let config = commands::resolve_config(cli.config.as_deref(), cli.namespace, cli.use_agent)?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling");
            on_interrupt.cancel();
        }
    });

    match cli.command {
        Commands::Keyid { key, json } => commands::keyid(&config, &key, json, &cancel).await,
        Commands::Sign { key, input, output } => {
            commands::sign(&config, &key, input.as_deref(), output.as_deref(), &cancel).await
        }
        Commands::Verify {
            key,
            signature,
            input,
        } => commands::verify(&config, &key, &signature, input.as_deref(), &cancel).await,
    }
}
