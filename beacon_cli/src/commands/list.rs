use anyhow::Result;
use beacon_config::SinkConfig;
use beacon_core::MetricKind;
use colored::Colorize;

fn describe(sink: &str) -> &'static str {
    match sink {
        "statsd" => "DogStatsD lines over UDP",
        "log" => "structured log records",
        "prometheus" => "registry scraped at /metrics",
        "memory" => "in-memory recorder for dry runs",
        _ => "",
    }
}

pub async fn execute() -> Result<()> {
    println!("{}", "=== Available Sinks ===".bold().cyan());
    println!("\nTotal sinks: {}\n", SinkConfig::KINDS.len());

    for sink in SinkConfig::KINDS {
        println!("  {} {:<12} {}", "•".green(), sink, describe(sink));
    }

    println!("\n{}", "=== Metric Kinds ===".bold().cyan());
    for kind in MetricKind::ALL {
        println!("  {} {}", "•".green(), kind);
    }

    println!("\n{}", "Use 'beacon emit' to send a single metric through a sink".yellow());

    Ok(())
}
