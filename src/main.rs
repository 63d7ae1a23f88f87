//! CLI Entry Point for sensor-daq
//!
//! Provides command-line interface for:
//! - Running an acquisition session until Ctrl+C (or a time limit)
//! - Listing the configured channel array
//!
//! No ADC driver ships with this binary; `run` samples simulated 12-bit
//! channels so the scheduling and logging path can be exercised anywhere.
//!
//! # Usage
//!
//! ```bash
//! sensor-daq run --config config/sensor_daq.toml --rate 20 --output run.csv
//! sensor-daq run --duration 30 --summary-json
//! sensor-daq channels
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sensor_daq::config::AcquisitionConfig;
use sensor_daq::hardware::mock::SimulatedReader;
use sensor_daq::hardware::ChannelReader;
use sensor_daq::{logging, SessionController};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Parser)]
#[command(name = "sensor-daq")]
#[command(about = "Fixed-rate analog sensor logger", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sample all channels into the CSV log until interrupted
    Run {
        /// TOML configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Override the target sample rate (Hz)
        #[arg(long)]
        rate: Option<f64>,

        /// Override the log file path
        #[arg(long)]
        output: Option<PathBuf>,

        /// Stop after this many seconds
        #[arg(long)]
        duration: Option<f64>,

        /// Print the session summary as JSON on stdout
        #[arg(long)]
        summary_json: bool,
    },

    /// List the configured channels
    Channels {
        /// TOML configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            rate,
            output,
            duration,
            summary_json,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(rate) = rate {
                config.sample_rate_hz = rate;
            }
            if let Some(output) = output {
                config.log_path = output;
            }
            run_session(config, duration, summary_json).await
        }
        Commands::Channels { config } => {
            let config = load_config(config.as_deref())?;
            config.validate()?;
            for channel in config.channel_list() {
                println!(
                    "{:<12} ({:.2}, {:.2})",
                    channel.id, channel.coordinates.0, channel.coordinates.1
                );
            }
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<AcquisitionConfig> {
    let config = match path {
        Some(path) => AcquisitionConfig::load_from(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => AcquisitionConfig::load()?,
    };
    Ok(config)
}

async fn run_session(
    config: AcquisitionConfig,
    duration: Option<f64>,
    summary_json: bool,
) -> Result<()> {
    logging::init_from_config(&config).map_err(anyhow::Error::msg)?;

    let controller = SessionController::open(&config, |_| {
        Arc::new(SimulatedReader::new(2048, 200)) as Arc<dyn ChannelReader>
    })?;
    let cancel = controller.cancellation_handle();

    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel("operator interrupt");
        }
    });

    if let Some(secs) = duration {
        let limit = Duration::try_from_secs_f64(secs)
            .with_context(|| format!("invalid duration {secs}"))?;
        let timer = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(limit).await;
            timer.cancel("duration elapsed");
        });
    }

    info!("Press Ctrl+C to stop the acquisition");
    let summary = controller.run().await;

    if summary_json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }

    if summary.is_clean() {
        Ok(())
    } else {
        anyhow::bail!("session did not end cleanly: {:?}", summary.end)
    }
}
