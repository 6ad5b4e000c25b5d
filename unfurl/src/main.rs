mod config;

use clap::Parser;
use config::Config;
use metrics_exporter_statsd::StatsdBuilder;
use shared::metrics_defs::register_metrics;
use std::error::Error;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "unfurl", about = "URL resolution API service")]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let config = Config::from_file(&cli.config)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // The guard flushes pending events on drop; keep it for the process
    // lifetime.
    let sentry_guard = config.common.logging.as_ref().map(|logging| {
        sentry::init((
            logging.sentry_dsn.clone(),
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    });
    if sentry_guard.is_none() {
        tracing::info!("sentry disabled; add a logging section to enable it");
    }

    if let Some(metrics_config) = &config.common.metrics {
        let recorder = StatsdBuilder::from(
            metrics_config.statsd_host.as_str(),
            metrics_config.statsd_port,
        )
        .build(Some(&metrics_config.prefix))?;
        metrics::set_global_recorder(recorder)?;
        register_metrics(gateway::metrics_defs::ALL_METRICS);
        register_metrics(resolver::metrics_defs::ALL_METRICS);
    } else {
        tracing::info!("statsd metrics disabled; add a metrics section to enable them");
    }

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(run(config))
}

async fn run(config: Config) -> Result<(), Box<dyn Error>> {
    let pipeline = resolver::build(&config.resolver)?;

    // The grace period is slightly longer than the largest single request
    // can take, so draining either finishes or provably cannot.
    let grace = Duration::from_secs(
        config.resolver.request_timeout_secs + config.gateway.client_patience_secs,
    );
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    tracing::info!(
        host = %config.gateway.listener.host,
        port = config.gateway.listener.port,
        admin_port = config.gateway.admin_listener.port,
        "listening"
    );
    gateway::run(config.gateway, pipeline, grace, shutdown_rx).await?;

    tracing::info!("shutdown complete");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = term.recv() => {}
    }
    tracing::info!("shutdown signal received");
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
