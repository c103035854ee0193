use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use wa_session_gen::{
    build_router,
    cli::{Cli, Commands},
    config::Config,
    connector::make_connector,
    registry::SessionRegistry,
    relay::RelayState,
};

fn init_tracing() {
    let filter_layer = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter_layer)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();

    if let Some(Commands::Debug {
        url,
        session,
        timeout_secs,
    }) = cli.command
    {
        if let Err(e) = wa_session_gen::cli::run_debug_client(url, session, timeout_secs).await {
            error!("debug client error: {e:#}");
            std::process::exit(1);
        }
        return Ok(());
    }

    let config = Config::from_env();
    info!(
        port = config.port,
        temp_root = %config.temp_root.display(),
        cleanup_delay_secs = config.cleanup_delay.as_secs(),
        "starting session generator"
    );

    let connector = make_connector(config.connector)?;
    let registry = SessionRegistry::new(config.temp_root.clone());

    // Stale directories from a previous run are gone before we accept
    // connections.
    registry.sweep_temp_root().await;

    let relay_state = RelayState::new(&config, registry.clone(), connector);
    let app = build_router(relay_state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!("listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server shutdown with error")?;

    info!(
        active_sessions = registry.len(),
        "shutdown signal received; draining sessions"
    );
    registry.drain().await;
    info!("shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let _ = signal::ctrl_c().await;
}
