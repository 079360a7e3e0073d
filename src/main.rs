mod cli;
mod server;

use clap::Parser;
use cli::{AnyError, Cli, Commands};

use adsync::config::Config;
use adsync::observability::init_tracing;

#[tokio::main]
async fn main() -> Result<(), AnyError> {
    // .env may carry RUST_LOG as well as credentials
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command {
        Commands::Server(args) => server::run(config, args.address).await?,
        Commands::Fetch(args) => cli::fetch(config, args).await?,
        Commands::Import(args) => cli::import(config, args).await?,
        Commands::Config => cli::print_config(&config)?,
    }

    Ok(())
}
