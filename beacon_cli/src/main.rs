mod commands;
mod logging;
mod ui;

use beacon_config::LogConfig;
use clap::{Parser, Subcommand};
use commands::emit::EmitArgs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "beacon")]
#[command(about = "Buffered metrics pipeline for async HTTP services", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP service with the metrics pipeline
    Serve {
        /// Path to config file (YAML, TOML, or JSON)
        #[arg(short, long, env = "BEACON_CONFIG")]
        config: Option<PathBuf>,

        /// Override the listen address
        #[arg(short, long)]
        address: Option<String>,
    },

    /// Push a single metric through a freshly started pipeline
    Emit {
        /// Metric kind (count, gauge, histogram)
        #[arg(short, long)]
        kind: String,

        /// Metric name
        #[arg(short, long)]
        name: String,

        /// Metric value
        #[arg(long, default_value_t = 1.0)]
        value: f64,

        /// Tag in key:value form, repeatable
        #[arg(short, long = "tag")]
        tags: Vec<String>,

        /// Client-side sample rate in (0, 1]
        #[arg(short, long, default_value_t = 1.0)]
        rate: f64,

        /// Path to config file
        #[arg(short, long, env = "BEACON_CONFIG")]
        config: Option<PathBuf>,
    },

    /// Validate a config file
    Validate {
        /// Path to config file
        config_file: PathBuf,
    },

    /// List available sinks and metric kinds
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level_override = if cli.verbose {
        Some("debug")
    } else if cli.quiet {
        Some("error")
    } else {
        None
    };

    match cli.command {
        Commands::Serve { config, address } => {
            commands::serve::execute(config, address, level_override).await?;
        }

        Commands::Emit {
            kind,
            name,
            value,
            tags,
            rate,
            config,
        } => {
            let args = EmitArgs {
                kind,
                name,
                value,
                tags,
                rate,
                config,
            };
            commands::emit::execute(args, level_override).await?;
        }

        Commands::Validate { config_file } => {
            let _guard = logging::init(&LogConfig::default(), level_override)?;
            commands::validate::execute(config_file).await?;
        }

        Commands::List => {
            commands::list::execute().await?;
        }
    }

    Ok(())
}
