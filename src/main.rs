// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tlsa_sync::{
    cloudflare::CloudflareClient,
    config::Config,
    constants::{DEFAULT_LISTEN_ADDR, TOKIO_WORKER_THREADS},
    guard::{GuardStore, MemoryGuardStore, RedisGuardStore},
    reconcilers::TlsaSyncOrchestrator,
    server::{create_app, AppState},
    stalwart::StalwartClient,
    upstream::build_http_client,
};
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{debug, info, warn};

/// Keeps Cloudflare TLSA records in sync with the records Stalwart publishes.
#[derive(Parser, Debug)]
#[command(name = "tlsa-sync", version, about)]
struct Args {
    /// Address the HTTP trigger listens on
    #[arg(long, env = "LISTEN_ADDR", default_value = DEFAULT_LISTEN_ADDR)]
    listen_addr: SocketAddr,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Build Tokio runtime with custom thread names
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(TOKIO_WORKER_THREADS)
        .thread_name("tlsa-sync")
        .enable_all()
        .build()?;

    runtime.block_on(async_main(args))
}

fn init_tracing() {
    // Respects RUST_LOG (default INFO) and RUST_LOG_FORMAT (json or text)
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let log_format = std::env::var("RUST_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    match log_format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .with_ansi(true)
                .compact()
                .init();
        }
    }
}

async fn async_main(args: Args) -> Result<()> {
    init_tracing();

    info!("Starting TLSA sync service");

    let config = Config::from_env().context("Failed to load configuration")?;
    debug!(?config, "Configuration loaded");

    let http = build_http_client(config.http_timeout)?;
    let source = Arc::new(StalwartClient::from_config(http.clone(), &config.stalwart));
    let zones = Arc::new(CloudflareClient::from_config(http, &config.cloudflare));

    let guard: Arc<dyn GuardStore> = match &config.redis_url {
        Some(url) => {
            let store = RedisGuardStore::connect(url.expose())
                .await
                .context("Failed to connect to Redis")?;
            info!("Using Redis guard store");
            Arc::new(store)
        }
        None => {
            warn!("REDIS_URL not set, using in-process guard; do not run more than one replica");
            Arc::new(MemoryGuardStore::new())
        }
    };

    let orchestrator = Arc::new(TlsaSyncOrchestrator::from_config(
        &config, source, zones, guard,
    ));
    info!(
        domain = %config.stalwart.domain,
        hostnames = ?orchestrator.hostnames(),
        "Reconciler configured"
    );

    let app = create_app(AppState::new(orchestrator), &config.api_key);

    let listener = TcpListener::bind(args.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", args.listen_addr))?;
    info!(addr = %listener.local_addr()?, "HTTP trigger listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("TLSA sync service stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received SIGINT, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
    }
}
