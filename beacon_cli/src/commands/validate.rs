use crate::ui;
use anyhow::Result;
use beacon_config::{parse_config_from_file, SinkConfig};
use colored::Colorize;
use std::path::PathBuf;

pub async fn execute(config_file: PathBuf) -> Result<()> {
    ui::print_header("=== Validating Config ===");
    println!("File: {}", config_file.display());

    match parse_config_from_file(&config_file).await {
        Ok(config) => {
            println!();
            ui::print_success("Config is valid!");

            println!("\nConfig Details:");
            println!("  Environment: {}", config.env);
            println!("  Version: {}", config.version);
            println!("  Log: {} ({:?})", config.log.level, config.log.format);
            println!("  Address: {}", config.server.address);
            println!(
                "  Request Timeout: {}",
                humantime::format_duration(config.server.request_timeout)
            );

            let metrics = &config.metrics;
            if !metrics.enabled {
                println!("\n{}", "⚠ Metrics are disabled".yellow());
                return Ok(());
            }

            println!("\n  Metrics:");
            println!("    Sink: {}", metrics.sink.kind().green());
            if let SinkConfig::Statsd(statsd) = &metrics.sink {
                println!("    Endpoint: {}", statsd.endpoint());
                println!("    Namespace: {}", statsd.namespace);
            }
            println!("    Buffer Capacity: {}", metrics.buffer_capacity);
            println!("    Max Batch Size: {}", metrics.max_batch_size);
            println!(
                "    Flush Interval: {}",
                humantime::format_duration(metrics.flush_interval)
            );
            println!(
                "    Sampling Interval: {}",
                humantime::format_duration(metrics.sampling_interval)
            );
            println!(
                "    Shutdown Timeout: {}",
                humantime::format_duration(metrics.shutdown_timeout)
            );

            Ok(())
        }
        Err(e) => {
            println!();
            ui::print_error("Config is invalid!");
            println!("\nError: {:#}", e);
            Err(e)
        }
    }
}
