pub mod mock_engine;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "integration-tests")]
#[command(about = "Integration and throughput testing tool for the traffic shaper")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the end-to-end shaping scenarios
    Integration,

    /// Measure achieved throughput through the throttled stream
    Throughput {
        /// Rate limit in bytes per second (negative disables throttling)
        #[arg(short, long, default_value = "1048576")]
        rate: i64,

        /// Total payload to move in bytes
        #[arg(short, long, default_value = "4194304")]
        bytes: u64,

        /// Write chunk size in bytes
        #[arg(short, long, default_value = "16384")]
        chunk: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Integration => {
            let results = integration_tests::run_all_tests().await?;
            if results.failed > 0 {
                std::process::exit(1);
            }
        }
        Commands::Throughput { rate, bytes, chunk } => {
            performance_tests::run_throughput_test(rate, bytes, chunk).await?;
        }
    }

    Ok(())
}
