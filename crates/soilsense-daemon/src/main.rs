//! SoilSense - Main entry point
//!
//! Serves the sensor web front end by default; the `select` and `send`
//! subcommands drive the same workflow from the terminal.

mod cli;
mod config;
mod server;
mod state;
mod web;

use anyhow::Result;
use clap::{Parser, Subcommand};
use soilsense_core::{ConnectionString, DeviceIdentity, TelemetryPayload};
use soilsense_hub::http::build_client;
use soilsense_hub::{send_telemetry, HttpsHubTransport};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "soilsense")]
#[command(about = "Provision simulated moisture sensors and send sample telemetry to Azure IoT Hub")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "soilsense.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the web front end (default)
    Serve {
        /// Bind address for web server
        #[arg(short, long)]
        bind: Option<String>,
    },
    /// Pick one or more sensors and send sample telemetry concurrently
    Select {
        /// Comma-separated 1-based sensor numbers; prompts when omitted
        #[arg(long)]
        sensors: Option<String>,
    },
    /// Send one sample message using an existing device connection string
    Send {
        #[arg(long)]
        connection_string: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("SoilSense v{}", env!("CARGO_PKG_VERSION"));

    let mut config = config::load_config(&args.config)?;

    match args.command.unwrap_or(Command::Serve { bind: None }) {
        Command::Serve { bind } => {
            if let Some(bind) = bind {
                config.daemon.bind = bind;
            }
            let credentials = config::Credentials::from_env(&config)?;
            let bind = config.daemon.bind.clone();
            let state = state::AppState::new(config, credentials)?;
            server::run(state, &bind).await?;
        }
        Command::Select { sensors } => {
            let credentials = config::Credentials::from_env(&config)?;
            let state = state::AppState::new(config, credentials)?;
            cli::run(state.manager.clone(), sensors).await?;
        }
        Command::Send { connection_string } => {
            let parsed: ConnectionString = connection_string.parse()?;
            let sensor = DeviceIdentity::new(parsed.device_id.clone().unwrap_or_default());
            info!(connection = %parsed.redacted(), "Sending sample telemetry");

            let transport = HttpsHubTransport::new(
                build_client(config.http.timeout_secs)?,
                config.hub.telemetry_api_version.clone(),
                config.hub.sas_ttl_secs,
            );
            send_telemetry(&transport, &connection_string, &TelemetryPayload::sample(&sensor)).await?;
            println!("Telemetry sent for {}", sensor);
        }
    }

    Ok(())
}
