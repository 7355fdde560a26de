pub mod env;
pub mod error;
pub mod handlers;
pub mod result;
pub mod router;
pub mod ws;
pub mod ws_client;

use std::{net::SocketAddr, time::Duration};

use anyhow::{Result, anyhow};
use axum_server::{Handle, tls_rustls::RustlsConfig};
pub use env::Env;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::bitcoin_client::BitcoinRpc;

/// Starts the HTTP and WebSocket server and returns once it is listening,
/// along with the bound address (useful when the configured port is 0).
pub async fn run<C: BitcoinRpc>(env: Env<C>) -> Result<(JoinHandle<()>, SocketAddr)> {
    let tls = if env.config.should_use_tls() {
        let _ = rustls::crypto::ring::default_provider().install_default();
        Some(
            RustlsConfig::from_pem_file(
                env.config.data_dir.join("cert.pem"),
                env.config.data_dir.join("key.pem"),
            )
            .await?,
        )
    } else {
        None
    };
    let scheme = if tls.is_some() { "https" } else { "http" };
    let addr = SocketAddr::new(env.config.api_host, env.config.api_port);
    let handle = Handle::new();
    tokio::spawn({
        let handle = handle.clone();
        let cancel_token = env.cancel_token.clone();
        async move {
            cancel_token.cancelled().await;
            handle.graceful_shutdown(Some(Duration::from_secs(10)));
        }
    });
    let service = router::new(env).into_make_service_with_connect_info::<SocketAddr>();
    let server = tokio::spawn({
        let handle = handle.clone();
        async move {
            let result = match tls {
                Some(config) => {
                    axum_server::bind_rustls(addr, config)
                        .handle(handle)
                        .serve(service)
                        .await
                }
                None => axum_server::bind(addr).handle(handle).serve(service).await,
            };
            if let Err(e) = result {
                error!("Server failed: {}", e);
            }

            info!("Exited");
        }
    });
    let local_addr = handle
        .listening()
        .await
        .ok_or_else(|| anyhow!("Server failed to bind {}", addr))?;
    info!("Server running @ {}://{}", scheme, local_addr);
    Ok((server, local_addr))
}
