use crate::{logging, ui};
use anyhow::{anyhow, Context, Result};
use beacon_config::load_config;
use beacon_metrics::{build_sink, AggregatorConfig, MetricsAggregator};
use beacon_service::AppState;
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

pub async fn execute(
    config_path: Option<PathBuf>,
    address: Option<String>,
    level_override: Option<&str>,
) -> Result<()> {
    let mut config = load_config(config_path.as_deref()).await?;
    if let Some(address) = address {
        config.server.address = address;
        config.validate().map_err(|e| anyhow!(e))?;
    }

    let _guard = logging::init(&config.log, level_override)?;

    ui::print_header("=== Beacon ===");
    println!("  Environment: {}", config.env.green());
    println!("  Version: {}", config.version);
    println!("  Address: {}", config.server.address);
    println!(
        "  Request Timeout: {}",
        humantime::format_duration(config.server.request_timeout)
    );

    let mut state = AppState::new(config.server.request_timeout);

    let metrics = if config.metrics.enabled {
        let built = build_sink(&config.metrics.sink, &config.env, &config.version);
        let aggregator =
            MetricsAggregator::start(built.sink, AggregatorConfig::from(&config.metrics))
                .await
                .context("failed to start metrics pipeline")?;
        let aggregator = Arc::new(aggregator);
        aggregator.start_system_sampling();

        println!("  Metrics Sink: {}", aggregator.sink_name().yellow());

        state = state.with_metrics(Arc::clone(&aggregator));
        if let Some(registry) = built.registry {
            state = state.with_registry(registry);
        }
        Some(aggregator)
    } else {
        println!("  Metrics: {}", "disabled".yellow());
        None
    };

    let listener = TcpListener::bind(&config.server.address)
        .await
        .with_context(|| format!("failed to bind {}", config.server.address))?;

    beacon_service::serve(listener, state, shutdown_signal()).await?;

    if let Some(metrics) = metrics {
        info!(
            "Stopping metrics pipeline (timeout {})",
            humantime::format_duration(config.metrics.shutdown_timeout)
        );
        let outcome = metrics.stop(config.metrics.shutdown_timeout).await;
        ui::print_outcome(outcome);
        ui::print_stats(&metrics.stats());
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
