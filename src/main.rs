#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::module_name_repetitions,
    clippy::uninlined_format_args
)]

use anyhow::Result;
use clap::{Parser, Subcommand};
use switchboard::store::create_store;
use switchboard::Config;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "switchboard", version, about = "Multi-channel chat gateway core")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default config file if none exists.
    Init,
    /// Validate the config and store wiring.
    Doctor,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Init => {
            let config = Config::load_or_init()?;
            info!(path = %Config::config_path()?.display(), agent_id = %config.agent_id, "config ready");
            Ok(())
        }
        Command::Doctor => doctor(),
    }
}

fn doctor() -> Result<()> {
    let config = Config::load_or_init()?;
    println!("config:  ok ({})", Config::config_path()?.display());
    println!("agent:   {}", config.agent_id);
    println!("gateway: {}", config.gateway_id);
    println!("model:   {}", config.default_model);
    match create_store(&config.store_backend) {
        Ok(store) => println!("store:   ok ({})", store.name()),
        Err(e) => println!("store:   FAIL ({e})"),
    }
    Ok(())
}
