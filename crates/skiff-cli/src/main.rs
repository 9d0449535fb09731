//! skiff command-line interface.
//!
//! Selects the transmitter or receiver role, runs the one-time key setup,
//! and composes invitation text. A failed session exits non-zero; Ctrl+C
//! destroys the transport context and lets sessions wind down cleanly.

mod invite;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use skiff_core::{Manager, SessionHandle};
use skiff_crypto::KeyStore;
use skiff_wire::DEFAULT_PORT;
use std::net::IpAddr;
use std::path::PathBuf;

/// skiff - credit-pipelined encrypted directory transfer
#[derive(Parser)]
#[command(name = "skiff")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Installation root holding public_keys/ and private_keys/
    #[arg(long, default_value = ".")]
    keys: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Publish a directory or single file and serve it to one receiver
    Transmit {
        /// Directory or file to send
        #[arg(long)]
        location: PathBuf,

        /// Port to serve on
        #[arg(long, default_value_t = DEFAULT_PORT)]
        port: u16,

        /// Receiver address to admit through the whitelist
        #[arg(long)]
        ip: Option<IpAddr>,
    },

    /// Pull a published directory into a local destination
    Receive {
        /// Transmitter address
        #[arg(long)]
        ip: IpAddr,

        /// Transmitter port
        #[arg(long, default_value_t = DEFAULT_PORT)]
        port: u16,

        /// Destination directory
        #[arg(long)]
        location: PathBuf,

        /// Transmitter public key: a .key file path or the raw hex key
        #[arg(long)]
        public_key: String,
    },

    /// Generate key material for both roles (idempotent, one-time)
    Keygen,

    /// Compose the invitation message carrying address, port, and key
    Invite {
        /// Port the transmitter will serve on
        #[arg(long, default_value_t = DEFAULT_PORT)]
        port: u16,
    },

    /// Compose the confirmation message sent back to a transmitter
    Confirm,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(if cli.verbose { "debug" } else { "info" })
        .init();

    match cli.command {
        Commands::Transmit { location, port, ip } => {
            let manager = Manager::new(&cli.keys);
            let handle = manager.publish(port, location, ip).await?;
            wait(handle, &manager).await?;
        }
        Commands::Receive {
            ip,
            port,
            location,
            public_key,
        } => {
            let manager = Manager::new(&cli.keys);
            let handle = manager.subscribe(ip, port, location, &public_key).await?;
            wait(handle, &manager).await?;
        }
        Commands::Keygen => {
            let store = KeyStore::new(&cli.keys);
            let created = store.generate()?;
            if created.is_empty() {
                println!("Key material already present under {}", cli.keys.display());
            } else {
                println!("Generated key material under {}", cli.keys.display());
            }
            let tx = store.public_key(skiff_crypto::KeyRole::Transmitter)?;
            println!("Transmitter public key: {}", hex::encode(tx));
        }
        Commands::Invite { port } => {
            let manager = Manager::new(&cli.keys);
            let key = manager
                .local_public_key()
                .context("no transmitter key material; run `skiff keygen` first")?;
            print!("{}", invite::invitation(manager.ip(), port, &key));
        }
        Commands::Confirm => {
            let manager = Manager::new(&cli.keys);
            print!("{}", invite::confirmation(manager.ip()));
        }
    }

    Ok(())
}

/// Wait for the session to finish, or shut everything down on Ctrl+C.
async fn wait(handle: SessionHandle, manager: &Manager) -> anyhow::Result<()> {
    tokio::select! {
        joined = handle => {
            joined.context("session task panicked")??;
        }
        _ = tokio::signal::ctrl_c() => {
            eprintln!("\nShutting down...");
            manager.shutdown();
        }
    }
    Ok(())
}
