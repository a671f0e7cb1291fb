//! CPU p95 CLI
//!
//! Runs the sliding-window percentile engine over newline-delimited JSON
//! (or Kafka when built with the `kafka` feature), and offers a few offline
//! helpers.

mod commands;

use clap::{Parser, Subcommand};
use colored::Colorize;
use commands::{CheckConfigCommand, PercentileCommand, RunCommand};
use cpu_p95_config::Settings;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(
    name = "cpu-p95",
    version,
    about = "Per-device CPU 95th percentile over sliding event-time windows",
    long_about = "Streams CPU samples through 30s windows sliding every 5s and emits the \
                  95th percentile of every device window once the watermark has passed \
                  its end plus the allowed lateness."
)]
struct Cli {
    /// Configuration file
    #[arg(
        short,
        long,
        global = true,
        value_name = "FILE",
        env = "CPU_P95_CONFIG",
        help = "Path to a YAML configuration file"
    )]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true, help = "Enable debug logging")]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the engine
    #[command(name = "run", about = "Run the window engine")]
    Run(RunCommand),

    /// Compute a percentile offline
    #[command(name = "percentile", about = "Compute the percentile of the given values")]
    Percentile(PercentileCommand),

    /// Validate configuration
    #[command(name = "check-config", about = "Validate and print the effective configuration")]
    CheckConfig(CheckConfigCommand),
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Percentile(command) => command.execute(),
        Commands::CheckConfig(command) => command.execute(cli.config),
        Commands::Run(command) => {
            let mut settings = Settings::load(cli.config)?;
            command.apply_overrides(&mut settings);
            init_tracing(&settings, cli.verbose);
            command.execute(settings).await
        }
    }
}

/// Initialize tracing/logging on stderr, stdout carries results
fn init_tracing(settings: &Settings, verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("processor=debug,cpu_p95_cli=debug,info")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&settings.observability.log_level))
    };

    let registry = tracing_subscriber::registry().with(filter);
    if settings.observability.json_logging {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}
