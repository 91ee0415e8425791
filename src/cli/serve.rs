use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::info;

use crate::config::AppConfig;
use crate::server::{build_router, ServeState};
use crate::service::PortalService;

#[derive(Args, Clone)]
pub struct ServeArgs {
    /// Address to listen on (overrides server.bind)
    #[arg(long)]
    pub bind: Option<SocketAddr>,

    /// Port to listen on, keeping the configured host
    #[arg(long)]
    pub port: Option<u16>,
}

pub async fn cmd_serve(args: ServeArgs, config: &AppConfig) -> Result<()> {
    let mut addr = match args.bind {
        Some(addr) => addr,
        None => config.bind_addr()?,
    };
    if let Some(port) = args.port {
        addr.set_port(port);
    }

    let service = Arc::new(PortalService::from_config(config));
    let router = build_router(ServeState::new(service, config.server.env.clone()));

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("API listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;
    info!("API stopped");
    Ok(())
}

async fn shutdown_signal() {
    if signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
