//! Crashline server binary

use clap::Parser;
use crashline::api::{init_tracing, ApiServer};
use crashline::config::{generate_sample_config, ConfigLoader};
use crashline::CasinoResult;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "crashline")]
#[command(about = "Multiplayer crash game server", long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(long, short)]
    config: Option<String>,

    /// Override the listen host
    #[arg(long)]
    host: Option<String>,

    /// Override the listen port
    #[arg(long)]
    port: Option<u16>,

    /// Write the default configuration to this path and exit
    #[arg(long, value_name = "PATH")]
    write_default_config: Option<String>,
}

#[tokio::main]
async fn main() -> CasinoResult<()> {
    let args = Args::parse();

    if let Some(path) = args.write_default_config {
        generate_sample_config(&path)?;
        println!("Wrote default configuration to {}", path);
        return Ok(());
    }

    let mut loader = ConfigLoader::new();
    if let Some(path) = &args.config {
        loader = loader.with_path(path);
    }
    let mut config = loader.load()?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    config.validate()?;

    init_tracing(&config.logging.filter);
    info!(config_file = ?args.config, "starting crashline");

    ApiServer::new(config)?.run().await
}
