use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "shardscale",
    about = "Shardscale — scale one logical fleet across many scale groups",
    version,
    propagate_version = true,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show how a target total would be spread over shard capacities.
    Plan {
        /// Current capacity of each shard, in order (e.g. 4,4,4).
        #[arg(short, long, value_delimiter = ',', required = true)]
        capacity: Vec<u64>,
        /// Desired total instance count.
        #[arg(short, long)]
        target: u64,
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
    /// Scale an in-memory fleet described by a TOML file and print its status.
    ///
    /// Pass -1 as the target for a dry run.
    Simulate {
        /// Fleet description file.
        #[arg(long)]
        fleet: PathBuf,
        /// Desired total instance count.
        #[arg(short, long, allow_negative_numbers = true)]
        target: i64,
    },
    /// Parse and validate a target configuration file.
    CheckConfig {
        #[arg(short, long)]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .or_else(|_| tracing_subscriber::EnvFilter::try_new("info,shardscale=debug"))?,
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Plan {
            capacity,
            target,
            format,
        } => commands::plan::plan(&capacity, target, &format),
        Commands::Simulate { fleet, target } => commands::simulate::simulate(&fleet, target).await,
        Commands::CheckConfig { file } => commands::check_config::check_config(&file),
    }
}
