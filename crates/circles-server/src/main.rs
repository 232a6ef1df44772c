//! circles-server binary: loads config, prepares the store, and serves
//! WebSocket connections until SIGINT/SIGTERM.

use circles_server::store::{initialize_default_circles, SeedFile};
use circles_server::{CircleServer, CliOverrides, MemoryStore, ServerConfig};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

/// circles-server: realtime presence and circle broadcast
#[derive(Parser, Debug)]
#[command(name = "circles-server", version, about = "Realtime presence and circle broadcast server")]
struct Cli {
    /// Listen port
    #[arg(short, long)]
    port: Option<u16>,

    /// Bind address
    #[arg(long)]
    bind: Option<String>,

    /// Config file path
    #[arg(long, default_value = "~/.circles/config.toml")]
    config: String,

    /// HS256 secret for access tokens (overrides JWT_ACCESS_SECRET)
    #[arg(long)]
    access_secret: Option<String>,

    /// Seed file for the in-memory store
    #[arg(long)]
    seed: Option<String>,

    /// Skip creating the default circles at startup
    #[arg(long)]
    no_default_circles: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    use tracing_subscriber::EnvFilter;
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "starting circles-server");

    let overrides = CliOverrides {
        port: cli.port,
        bind: cli.bind.clone(),
        access_secret: cli.access_secret.clone(),
        seed: cli.seed.clone(),
        no_default_circles: cli.no_default_circles,
    };
    let config_path = PathBuf::from(&cli.config);
    let config = match ServerConfig::load(Some(&config_path), &overrides) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "failed to load config");
            std::process::exit(1);
        }
    };

    let store = match &config.seed_path {
        Some(path) => match SeedFile::load(path).and_then(MemoryStore::from_seed) {
            Ok(store) => store,
            Err(e) => {
                error!(path = %path.display(), error = %e, "failed to load seed file");
                std::process::exit(1);
            }
        },
        None => {
            warn!("no seed file configured, starting with an empty store");
            MemoryStore::new()
        }
    };
    let store = Arc::new(store);

    if config.default_circles {
        match initialize_default_circles(store.as_ref()).await {
            Ok(ids) => info!(count = ids.len(), "default circles ready"),
            Err(e) => {
                error!(error = %e, "failed to initialize default circles");
                std::process::exit(1);
            }
        }
    }

    let server = CircleServer::new(config, store);
    let shutdown = server.shutdown_handle();

    let listening = match server.listen().await {
        Ok(l) => l,
        Err(e) => {
            error!(error = %e, "failed to bind listener");
            std::process::exit(1);
        }
    };

    tokio::spawn(async move {
        shutdown_signal().await;
        info!("received shutdown signal");
        shutdown.trigger();
    });

    if let Err(e) = listening.serve().await {
        error!(error = %e, "server error");
        std::process::exit(1);
    }

    info!("circles-server stopped");
}

/// Wait for SIGTERM or SIGINT (Ctrl+C).
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "could not install SIGTERM handler");
                ctrl_c.await.ok();
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
}
