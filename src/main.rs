// Copyright 2025 coScene
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use anyhow::{Context, Result};
use clap::Parser;
use sensor_collector::config::{load_config_with_env, LoggingConfig};
use sensor_collector::{DurableLog, Supervisor};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

/// Sensor Collector - Capture binary sensor streams into a crash-safe log
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/default.yaml")]
    config: PathBuf,

    /// Output log path (overrides config file)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Log level (overrides config file)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Load configuration from file
    let mut config = load_config_with_env(&args.config)?;

    // Apply CLI overrides
    if let Some(output) = args.output {
        config.storage.path = output;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }

    init_tracing(&config.logging)?;

    info!("Starting sensor collector");
    info!("Loaded configuration from: {:?}", args.config);
    for endpoint in &config.endpoints {
        info!("Endpoint: {}", endpoint);
    }

    let log = Arc::new(DurableLog::open(&config.storage).context("Failed to open durable log")?);
    let supervisor = Supervisor::from_config(&config, log.clone());
    let handle = supervisor.handle();
    let mut run = tokio::spawn(supervisor.run());

    // Runs until a signal arrives or storage fails
    tokio::select! {
        joined = &mut run => {
            joined.context("Supervisor task failed")??;
            return Ok(());
        }
        signal = shutdown_signal() => {
            signal?;
            info!("Shutdown requested, stopping links");
        }
    }

    handle.shutdown();
    match tokio::time::timeout(config.shutdown_timeout(), run).await {
        Ok(joined) => joined.context("Supervisor task failed")??,
        Err(_) => warn!(
            "Links did not stop within {:?}, exiting anyway",
            config.shutdown_timeout()
        ),
    }

    info!(
        "Sensor collector shut down after {} records",
        log.committed()
    );
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let log_level = match logging.level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match logging.format.as_str() {
        "json" => builder.json().try_init(),
        _ => builder.try_init(),
    }
    .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))
}

async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate =
            signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result.context("Failed to listen for Ctrl+C")?,
            _ = terminate.recv() => {}
        }
    }

    #[cfg(not(unix))]
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;

    Ok(())
}
