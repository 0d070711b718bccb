mod cli;
mod config;
mod migrate;
mod storage;

use std::{fs, path::Path};

use clap::Parser;
use color_eyre::Result;
use lectern_core::storage::{Document, DocumentStore};
use lectern_store::{
    cipher::{self, Envelope},
    key_provider::{KeyMaterial, DEFAULT_KEY_VARIABLE},
};
use serde_json::json;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cli::{Command, ConfigCommand};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();

    let cli = cli::Cli::parse();
    let config = config::load()?;
    match cli.command {
        Command::Health => run_health_check(&config).await?,
        Command::Keygen => run_keygen(),
        Command::Migrate { dir } => run_migrate(&dir, &config).await?,
        Command::Inspect { file } => run_inspect(&file, &config).await?,
        Command::Config(ConfigCommand::Init) => init_config(&config)?,
        Command::Version => print_version(),
    }

    Ok(())
}

fn init_tracing() {
    // Respect user-provided filters, default to info to avoid noisy stdout.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(false);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

fn print_version() {
    println!("lectern {}", env!("CARGO_PKG_VERSION"));
}

/// Probe the encrypted store with a write/read round trip in the data
/// directory, then clean the probe file up.
async fn run_health_check(config: &config::Config) -> Result<()> {
    let store = storage::store_from_config(config).await?;
    let dir = storage::resolve_data_dir(config)?;
    let probe = dir.join("health-probe.json");

    let payload = json!({"ok": true});
    store
        .write(&probe, &payload)
        .await
        .map_err(|err| color_eyre::eyre::eyre!(err.to_string()))?;
    let round_trip = store
        .read(&probe, json!({}))
        .await
        .map_err(|err| color_eyre::eyre::eyre!(err.to_string()))?;
    let _ = fs::remove_file(&probe);

    if round_trip != payload {
        return Err(color_eyre::eyre::eyre!("store probe did not round-trip"));
    }
    println!("Storage: ok");
    Ok(())
}

fn run_keygen() {
    let key = KeyMaterial::random("generated");
    println!("{}", key.to_hex());
    eprintln!("Set {DEFAULT_KEY_VARIABLE} to this value before starting the backend.");
}

async fn run_migrate(dir: &Path, config: &config::Config) -> Result<()> {
    let store = storage::store_from_config(config).await?;
    let report = migrate::run(&store, dir).await?;

    println!("Re-encrypted: {}", report.migrated.len());
    println!("Already encrypted: {}", report.already_encrypted.len());
    for (path, reason) in &report.failed {
        println!("Failed: {} ({reason})", path.display());
    }
    if !report.failed.is_empty() {
        return Err(color_eyre::eyre::eyre!(
            "{} file(s) could not be migrated",
            report.failed.len()
        ));
    }
    Ok(())
}

/// Report a file's on-disk state and print the logical document, the same
/// check an operator would otherwise do by hand after enabling encryption.
async fn run_inspect(file: &Path, config: &config::Config) -> Result<()> {
    let raw = fs::read(file)?;
    let parsed: Document = serde_json::from_slice(&raw)?;

    match Envelope::detect(&parsed) {
        Some(envelope) => {
            let key = storage::resolve_key(config).await?;
            let document = cipher::decrypt(&key, &envelope)?;
            match envelope.version {
                Some(version) => println!("Encrypted envelope (v{version})"),
                None => println!("Encrypted envelope (legacy, untagged)"),
            }
            println!("{}", serde_json::to_string_pretty(&document)?);
        }
        None => {
            println!("Plaintext (will be encrypted on next write)");
            println!("{}", serde_json::to_string_pretty(&parsed)?);
        }
    }
    Ok(())
}

fn init_config(config: &config::Config) -> Result<()> {
    let path = config::write_default_if_missing(config)?;
    println!("Config: {}", path.display());
    Ok(())
}
