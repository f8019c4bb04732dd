use crate::{logging, ui};
use anyhow::{bail, Context, Result};
use beacon_config::load_config;
use beacon_core::{MetricEvent, MetricKind};
use beacon_metrics::{build_sink, render_registry, AggregatorConfig, MetricsAggregator, ShutdownOutcome};
use colored::Colorize;
use std::path::PathBuf;

pub struct EmitArgs {
    pub kind: String,
    pub name: String,
    pub value: f64,
    pub tags: Vec<String>,
    pub rate: f64,
    pub config: Option<PathBuf>,
}

pub async fn execute(args: EmitArgs, level_override: Option<&str>) -> Result<()> {
    let kind: MetricKind = args.kind.parse()?;
    let event = MetricEvent::new(kind, args.name, args.value, args.tags, args.rate)?;

    let config = load_config(args.config.as_deref()).await?;
    let _guard = logging::init(&config.log, level_override)?;

    ui::print_header("=== Emitting Metric ===");
    println!("  Kind: {}", event.kind().to_string().yellow());
    println!("  Name: {}", event.name());
    println!("  Value: {}", event.value());
    if !event.tags().is_empty() {
        println!("  Tags: {}", event.tags().join(","));
    }
    println!("  Sink: {}", config.metrics.sink.kind());

    let built = build_sink(&config.metrics.sink, &config.env, &config.version);
    let aggregator = MetricsAggregator::start(built.sink, AggregatorConfig::from(&config.metrics))
        .await
        .context("failed to start metrics pipeline")?;

    aggregator.record(event);
    let outcome = aggregator.stop(config.metrics.shutdown_timeout).await;
    let stats = aggregator.stats();

    ui::print_outcome(outcome);
    ui::print_stats(&stats);

    if let Some(registry) = built.registry {
        println!("\n{}", "Prometheus Exposition:".bold());
        print!("{}", render_registry(&registry)?);
    }

    if outcome != ShutdownOutcome::Drained || stats.events_emitted == 0 {
        bail!("metric was not delivered");
    }

    ui::print_success("Metric delivered");
    Ok(())
}
