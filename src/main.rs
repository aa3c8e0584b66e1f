//! Temporal-KV: Main entry point

use anyhow::Context;
use clap::Parser;
use temporal_kv::cli::Cli;
use temporal_kv::config::StoreConfig;
use temporal_kv::store::TemporalStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => StoreConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => StoreConfig::default(),
    };
    if let Some(dir) = &cli.data_dir {
        config = config.with_data_dir(dir);
    }

    let store = TemporalStore::open(&config).context("opening store")?;
    let mut stdout = std::io::stdout().lock();
    cli.command.execute(&store, &mut stdout).await?;
    Ok(())
}
