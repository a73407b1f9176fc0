//! statekv CLI Client
//!
//! Command-line interface for versioned reads and writes.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use statekv::{
    Client, ClientConfig, Concurrency, Consistency, DeleteOptions, GetOptions, KvError,
    SetOptions,
};
use tracing_subscriber::{fmt, EnvFilter};

/// statekv CLI
#[derive(Parser, Debug)]
#[command(name = "statekv-cli")]
#[command(about = "CLI for versioned key-value access to a replicated store")]
#[command(version)]
struct Args {
    /// Store URL
    #[arg(short, long, default_value = "redis://127.0.0.1:6379")]
    url: String,

    /// Request timeout in milliseconds
    #[arg(short, long, default_value = "5000")]
    timeout_ms: u64,

    /// Fail if the replica count cannot be parsed
    #[arg(long)]
    strict_topology: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value and its version
    Get {
        /// The key to get
        key: String,
    },

    /// Set a value, checking the version first
    Set {
        /// The key to set
        key: String,

        /// The value to set
        value: String,

        /// Expected current version (0 = unconditional)
        #[arg(short, long, default_value = "0")]
        etag: u64,

        /// first-write or last-write
        #[arg(long, default_value = "first-write")]
        concurrency: Concurrency,

        /// eventual or strong
        #[arg(long, default_value = "eventual")]
        consistency: Consistency,
    },

    /// Delete a key, checking the version first
    Del {
        /// The key to delete
        key: String,

        /// Expected current version (0 = unconditional)
        #[arg(short, long, default_value = "0")]
        etag: u64,
    },

    /// Ping the store
    Ping,

    /// Show the replica count seen at connect time
    Replicas,
}

fn main() -> ExitCode {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(KvError::Conflict { key }) => {
            eprintln!("conflict: {} was modified by someone else; re-read and retry", key);
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> statekv::Result<()> {
    let config = ClientConfig::builder()
        .url(&args.url)
        .read_timeout_ms(args.timeout_ms)
        .write_timeout_ms(args.timeout_ms)
        .strict_topology(args.strict_topology)
        .build();

    let client = Client::connect_with(config)?;

    match args.command {
        Commands::Get { key } => {
            let entry = client.get(&key, &GetOptions::new())?;
            match entry.version {
                Some(version) => println!("version: {}", version),
                None => println!("version: (legacy)"),
            }
            println!("{}", String::from_utf8_lossy(&entry.data));
        }
        Commands::Set {
            key,
            value,
            etag,
            concurrency,
            consistency,
        } => {
            let options = SetOptions::new()
                .etag(etag)
                .concurrency(concurrency)
                .consistency(consistency);
            let version = client.set(&key, value.as_bytes(), &options)?;
            println!("OK version {}", version);
        }
        Commands::Del { key, etag } => {
            client.delete(&key, &DeleteOptions::new().etag(etag))?;
            println!("OK");
        }
        Commands::Ping => {
            client.ping()?;
            println!("PONG");
        }
        Commands::Replicas => {
            println!("{}", client.replica_count());
        }
    }

    Ok(())
}
