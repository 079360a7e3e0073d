use std::net::SocketAddr;
use tracing::info;

use adsync::api;
use adsync::config::Config;
use adsync::runtime::Runtime;

use crate::cli::AnyError;

pub async fn run(config: Config, address: Option<SocketAddr>) -> Result<(), AnyError> {
    let address = address.unwrap_or(config.server.bind_addr);

    let runtime = Runtime::start(config)?;
    let sweep = runtime.spawn_retention_sweep();

    api::serve(address, api::router(runtime.app_state())).await?;

    info!("HTTP server stopped, draining workers");
    sweep.abort();
    runtime.shutdown().await;

    Ok(())
}
