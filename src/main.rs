use std::net::SocketAddr;

use signed_proxy::proxy::server;
use signed_proxy::{ConfigPreset, ProxyConfig};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "signed_proxy=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ProxyConfig::from(ConfigPreset::FromEnv);
    info!("{}", config.summary());
    for warning in config.validate() {
        warn!("{warning}");
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.listen_port));
    let listener = TcpListener::bind(addr).await?;

    server::serve(listener, config).await?;
    Ok(())
}
