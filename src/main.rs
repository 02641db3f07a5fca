//! dirshare server binary.
//!
//! Shares the current working directory over HTTP for a fixed time: download
//! listings, an upload receiver, or both, behind a one-time secret username.
//! The process exits on its own once the configured timeout elapses.

mod auth;
mod config;
mod error;
mod etag;
mod files;
mod html;
mod http;
mod lifecycle;
mod logging;
mod router;
mod storage;
mod upload;

use axum_server::Handle;
use clap::Parser;
use shadow_rs::shadow;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::signal;
use tracing::{debug, info};

use crate::config::{Args, ServerConfig};
use crate::lifecycle::LifecycleTimer;
use crate::storage::Storage;

shadow!(build);

/// Starts the server and blocks until timeout, interrupt, or listener failure.
#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    logging::init_logging();

    let args = Args::parse();
    let config = Arc::new(ServerConfig::from_args(&args));
    let storage = Arc::new(Storage::new(std::env::current_dir()?));
    debug!(root = %storage.root_path().display(), "serving directory");
    let app = router::build_router(config.clone(), storage);

    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.port));
    let handle = Handle::new();
    print_address(&config);

    let server = axum_server::bind(addr)
        .handle(handle.clone())
        .serve(app.into_make_service_with_connect_info::<SocketAddr>());

    LifecycleTimer::new(config.timeout).spawn(|| {
        std::process::exit(0);
    });

    tokio::select! {
        result = server => result?,
        _ = shutdown_signal(handle) => {}
    }

    Ok(())
}

fn print_address(config: &ServerConfig) {
    let host = http::local_ipv4()
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| "<your-local-ip-address>".to_string());

    println!();
    match &config.token {
        Some(token) => println!(
            "Use this address: http://{host}:{}\n (Enter {token} for username when requested. Ignore password)",
            config.port
        ),
        None => println!(
            "Use this address: http://{host}:{}\n (No secret username required)",
            config.port
        ),
    }
    println!();
}

async fn shutdown_signal(handle: Handle) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("received termination signal, shutting down");
    handle.shutdown();
}
