use std::sync::Arc;

use reuseu_relay::{accept_connection, RelayConfig, RelayState};
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Arc::new(RelayConfig::from_env());
    let state = Arc::new(RelayState::new());

    let listener = match TcpListener::bind(&config.addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind to {}: {}", config.addr, e);
            std::process::exit(1);
        }
    };

    info!(
        namespace = %config.namespace,
        token_required = config.access_token.is_some(),
        "Chat relay listening on {}",
        config.addr
    );

    loop {
        match listener.accept().await {
            Ok((stream, peer_addr)) => {
                info!("New connection from {}", peer_addr);

                let state = state.clone();
                let config = config.clone();
                tokio::spawn(async move {
                    accept_connection(stream, state, config).await;
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}
