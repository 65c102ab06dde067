//! Sequoia - prompt compression for AI chat services.
//!
//! This is the main binary that runs the full application:
//! - Bridge actor (owns the database, talks to the compression service)
//! - MITM proxy (intercepts chat requests and compresses prompts)
//! - HTTP control API (popup and dashboard)

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use directories::ProjectDirs;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use sequoia_app::Args;
use sequoia_core::notifications::NotificationManager;
use sequoia_proxy::{CaManager, Interceptor, ProxyConfig, ProxyHandle, ProxyServer};
use sequoia_server::Server;
use sequoia_storage::Database;

/// Get the logs directory path.
fn logs_dir() -> Option<PathBuf> {
    ProjectDirs::from("com", "sequoia", "sequoia").map(|dirs| dirs.data_dir().join("logs"))
}

/// Initialize logging with file rotation.
fn init_logging(args: &Args) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("sequoia={},warn", args.log_level())));

    if let Some(log_dir) = logs_dir() {
        if std::fs::create_dir_all(&log_dir).is_ok() {
            let file_appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .max_log_files(5)
                .filename_prefix("sequoia")
                .filename_suffix("log")
                .build(&log_dir)
                .ok();

            if let Some(appender) = file_appender {
                let (non_blocking, guard) = tracing_appender::non_blocking(appender);

                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().with_writer(std::io::stdout))
                    .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
                    .init();

                tracing::info!("Logging to {:?}", log_dir);
                return Some(guard);
            }
        }
    }

    // Fallback: console logging only
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::warn!("File logging unavailable, using console only");
    None
}

fn open_database(args: &Args) -> anyhow::Result<Database> {
    let db = match &args.db_path {
        Some(path) => Database::with_path(path),
        None => Database::new(),
    }
    .context("failed to open database")?;

    match &args.db_path {
        Some(path) => tracing::info!("Database opened at {:?}", path),
        None => tracing::info!("Database opened at {:?}", Database::default_db_path()?),
    }

    let written = db
        .initialize_defaults(sequoia_core::rate_limit::today())
        .context("failed to initialize settings")?;
    tracing::debug!(written, "Settings defaults checked");

    Ok(db)
}

fn start_proxy(args: &Args, interceptor: Interceptor) -> anyhow::Result<ProxyHandle> {
    let mut config = ProxyConfig::new(interceptor)?.with_port(args.proxy_port);
    if let Some(dir) = &args.ca_dir {
        config = config.with_ca_manager(CaManager::new(dir));
    }

    let proxy = ProxyServer::new(config)?;
    tracing::info!("CA certificate: {:?}", proxy.ca_cert_path());

    Ok(proxy.start()?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Keep the guard alive for the duration of the program
    let _log_guard = init_logging(&args);

    tracing::info!("Starting Sequoia...");
    tracing::debug!("Args: {:?}", args);

    let db = open_database(&args)?;

    let (client, bridge) = sequoia_bridge::spawn(db, args.bridge_config())
        .context("failed to start bridge")?;
    tracing::info!(oracle = %args.oracle_url, "Bridge started");

    let notifier = Arc::new(NotificationManager::with_settings(
        args.notification_settings(),
    ));
    let interceptor = Interceptor::new(client.clone(), notifier);
    let paused = interceptor.sync_pause_state().await;
    let pause_listener = interceptor.spawn_pause_listener();
    tracing::info!(paused, "Interceptor ready");

    let proxy = if args.no_proxy {
        tracing::info!("Proxy disabled (--no-proxy)");
        None
    } else {
        Some(start_proxy(&args, interceptor)?)
    };

    let server = Server::new(args.server_config(), client)?;
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let mut api = tokio::spawn(server.run_with_shutdown(async move {
        let _ = stop_rx.await;
    }));

    let api_result = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                tracing::warn!("Failed to listen for Ctrl-C: {}", e);
            }
            tracing::info!("Shutdown requested");
            None
        }
        result = &mut api => Some(result),
    };

    let api_result = match api_result {
        Some(result) => result,
        None => {
            let _ = stop_tx.send(());
            api.await
        }
    };

    if let Some(proxy) = proxy {
        proxy.stop().await;
    }
    pause_listener.abort();
    bridge.stop().await;

    tracing::info!("Sequoia shutting down");

    match api_result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e).context("API server failed"),
        Err(e) => Err(e).context("API server task panicked"),
    }
}
