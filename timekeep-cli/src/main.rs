mod cli;
mod commands;
mod config;
mod login;
mod session_store;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use config::TimekeepConfig;
use session_store::FileSessionStorage;
use std::sync::Arc;
use timekeep::{time_utils::local_offset, ApiError, CredentialStore, TimeTrackerClient};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Read before the runtime spawns threads, the local offset is unavailable after.
    let offset = local_offset();

    let cli = Cli::parse();
    let config = TimekeepConfig::load()?;
    init_tracing(&config.log_level);

    if let Commands::ConfigPath = cli.command {
        return commands::print_config_path();
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    let result = runtime.block_on(async {
        let storage = FileSessionStorage::default_location()?;
        let store = CredentialStore::open(Arc::new(storage));
        let client = TimeTrackerClient::new(&config.api_url, store, config.refresh_policy()?)?;
        commands::Session::new(client, offset).run(cli.command).await
    });

    if let Err(e) = &result {
        if e
            .downcast_ref::<ApiError>()
            .is_some_and(ApiError::is_unauthenticated)
        {
            eprintln!("Not logged in. Run `timekeep login` first.");
            std::process::exit(1);
        }
    }
    result
}

fn init_tracing(default_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
