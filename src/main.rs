use clap::Parser;
use miette::{IntoDiagnostic, Result};
use paybridge::application::coordinator::PaymentBridge;
use paybridge::domain::ports::PreferenceStoreBox;
use paybridge::infrastructure::in_memory::InMemoryPreferenceStore;
use paybridge::infrastructure::simulated::{SimulatedPaymentSdk, SimulatedWalletClient};
use paybridge::interfaces::script::reader::StepReader;
use paybridge::interfaces::script::runner::ScriptRunner;
use std::fs::File;
use std::io;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Scenario script, one JSON step per line
    input: PathBuf,

    /// Directory of the persistent preference store (optional). If provided, uses RocksDB.
    #[arg(long)]
    prefs_path: Option<PathBuf>,

    /// Make the simulated wallet report itself as unavailable
    #[arg(long)]
    wallet_unavailable: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let preferences = preference_store(cli.prefs_path)?;
    let bridge = PaymentBridge::builder(Box::new(SimulatedPaymentSdk::new()), preferences)
        .wallet(Box::new(SimulatedWalletClient::new(!cli.wallet_unavailable)))
        .build();

    let file = File::open(cli.input).into_diagnostic()?;
    let reader = StepReader::new(file);
    let mut runner = ScriptRunner::new(bridge, io::stdout().lock());
    for step_result in reader.steps() {
        match step_result {
            Ok(step) => runner.step(step).await.into_diagnostic()?,
            Err(e) => {
                eprintln!("Error reading step: {}", e);
            }
        }
    }
    runner.finish().await.into_diagnostic()?;

    Ok(())
}

#[cfg(feature = "storage-rocksdb")]
fn preference_store(prefs_path: Option<PathBuf>) -> Result<PreferenceStoreBox> {
    use paybridge::infrastructure::rocksdb::RocksDBPreferenceStore;

    Ok(match prefs_path {
        Some(path) => Box::new(RocksDBPreferenceStore::open(path).into_diagnostic()?),
        None => Box::new(InMemoryPreferenceStore::new()),
    })
}

#[cfg(not(feature = "storage-rocksdb"))]
fn preference_store(prefs_path: Option<PathBuf>) -> Result<PreferenceStoreBox> {
    if prefs_path.is_some() {
        tracing::warn!(
            "Persistent storage requested via --prefs-path, but 'storage-rocksdb' feature is not enabled. Falling back to in-memory preferences."
        );
    }
    Ok(Box::new(InMemoryPreferenceStore::new()))
}
