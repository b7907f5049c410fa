//! FlashForge bridge - command-line driver for the printer protocol client.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use flashforge_bridge as app;
use serde::Serialize;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use app::config::{AppConfig, ConfigLoadResult, LoggingConfig};
use app::printer::{DeviceAddress, PrinterClient};

/// Talk to a FlashForge printer over its TCP control port.
#[derive(Parser)]
#[command(name = "flashforge-bridge", version)]
struct Cli {
    /// Config file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Use config.toml from current directory (dev mode)
    #[arg(long, global = true, conflicts_with = "config")]
    dev: bool,

    #[command(subcommand)]
    command: CliCommand,
}

/// Printer to talk to.
#[derive(Args)]
struct Target {
    /// Printer host name or IP address
    host: String,

    /// Control port (defaults to the configured port)
    #[arg(long)]
    port: Option<u16>,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Firmware and machine details
    Info(Target),
    /// Print head coordinates
    Position(Target),
    /// Extruder and bed temperatures
    Temperature(Target),
    /// Print progress in bytes
    Progress(Target),
    /// Endstop states
    Status(Target),
    /// Home all axes or a single one
    Home {
        #[command(flatten)]
        target: Target,
        /// Axis to home (x, y, z or all)
        #[arg(long)]
        axis: Option<String>,
    },
    /// Move the print head
    Move {
        #[command(flatten)]
        target: Target,
        #[arg(long, allow_negative_numbers = true)]
        x: Option<f64>,
        #[arg(long, allow_negative_numbers = true)]
        y: Option<f64>,
        #[arg(long, allow_negative_numbers = true)]
        z: Option<f64>,
        /// Feed rate in mm/min (default 3000)
        #[arg(long)]
        speed: Option<u32>,
    },
    /// Set a solid LED color
    Led {
        #[command(flatten)]
        target: Target,
        #[arg(long)]
        r: Option<u8>,
        #[arg(long)]
        g: Option<u8>,
        #[arg(long)]
        b: Option<u8>,
    },
    /// Pause the current print
    Pause(Target),
    /// Resume a paused print
    Resume(Target),
    /// Cancel the current print
    Stop(Target),
    /// Upload a file to the printer's user storage
    Upload {
        #[command(flatten)]
        target: Target,
        /// Local file to send
        file: PathBuf,
        /// Name on the printer (defaults to the local file name)
        #[arg(long)]
        name: Option<String>,
    },
    /// Write a default config file
    InitConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Determine config path based on mode
    let config_path = match (&cli.config, cli.dev) {
        (Some(path), _) => path.clone(),
        (None, true) => PathBuf::from("config.toml"),
        (None, false) => AppConfig::default_path(),
    };

    let load_result = AppConfig::try_load(&config_path);
    let config = match &load_result {
        ConfigLoadResult::Loaded(config) => config.clone(),
        ConfigLoadResult::Missing => AppConfig::default(),
        ConfigLoadResult::Invalid(e) => anyhow::bail!("Invalid config {}: {e}", config_path.display()),
    };

    // Initialize logging
    let _guard = init_logging(&config.logging)?;

    match load_result {
        ConfigLoadResult::Loaded(_) => tracing::debug!("Config loaded from {:?}", config_path),
        _ => tracing::debug!("No config at {:?}, using defaults", config_path),
    }

    run(cli.command, &config, &config_path).await
}

/// Install the tracing subscriber. RUST_LOG overrides the configured level.
fn init_logging(logging: &LoggingConfig) -> anyhow::Result<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&logging.level))?;

    let (writer, guard) = match &logging.file {
        Some(path) => {
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
            let file_name = path
                .file_name()
                .with_context(|| format!("Log file path {} has no file name", path.display()))?;
            tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name))
        }
        None => tracing_appender::non_blocking(std::io::stderr()),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .init();

    Ok(guard)
}

async fn run(command: CliCommand, config: &AppConfig, config_path: &Path) -> anyhow::Result<()> {
    let client = PrinterClient::from_config(&config.printer);
    let address = |target: &Target| DeviceAddress::with_port(&target.host, target.port.unwrap_or(config.printer.port));

    match command {
        CliCommand::Info(t) => print_json(&client.get_info(&address(&t)).await?),
        CliCommand::Position(t) => print_json(&client.get_position(&address(&t)).await?),
        CliCommand::Temperature(t) => print_json(&client.get_temperature(&address(&t)).await?),
        CliCommand::Progress(t) => print_json(&client.get_progress(&address(&t)).await?),
        CliCommand::Status(t) => print_json(&client.get_status(&address(&t)).await?),
        CliCommand::Home { target, axis } => print_json(&client.home(&address(&target), axis.as_deref()).await?),
        CliCommand::Move { target, x, y, z, speed } => {
            print_json(&client.move_axis(&address(&target), x, y, z, speed).await?)
        }
        CliCommand::Led { target, r, g, b } => print_json(&client.set_led(&address(&target), r, g, b).await?),
        CliCommand::Pause(t) => print_json(&client.pause(&address(&t)).await?),
        CliCommand::Resume(t) => print_json(&client.resume(&address(&t)).await?),
        CliCommand::Stop(t) => print_json(&client.stop(&address(&t)).await?),
        CliCommand::Upload { target, file, name } => {
            let filename = match name {
                Some(name) => name,
                None => file
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .with_context(|| format!("{} has no file name", file.display()))?,
            };
            let content = tokio::fs::read(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            print_json(&client.upload_file(&address(&target), &filename, &content).await?)
        }
        CliCommand::InitConfig => {
            config.save(config_path)?;
            tracing::info!("Wrote config to {:?}", config_path);
            println!("{}", config_path.display());
            Ok(())
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
