// btbridge: command-line driver for the Bluetooth daemon bridge
//
// Connects to the daemon socket, registers the GATT module and runs one
// GATT operation per invocation.

mod config;

use anyhow::{Context, Result};
use btbridge_core::gatt::{AdvertiseData, AttHandle, GattDbElement, GattWriteType};
use btbridge_core::{BdAddr, Bridge, GattEvent};
use clap::{Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "btbridge")]
#[command(about = "Drive a Bluetooth daemon's GATT stack from the command line", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the daemon socket path
    #[arg(long, global = true)]
    socket: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Write logs to a file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan for LE devices
    Scan {
        #[arg(short, long, default_value = "10")]
        seconds: u64,
    },
    /// Advertise as a connectable peripheral
    Advertise {
        /// Local name to put in the advertising data
        #[arg(short, long)]
        name: Option<String>,
        #[arg(short, long, default_value = "30")]
        seconds: u64,
    },
    /// Connect to a device and list its GATT database
    Discover { addr: BdAddr },
    /// Read a characteristic value
    Read {
        addr: BdAddr,
        /// Attribute handle, decimal or 0x-prefixed hex
        #[arg(value_parser = parse_handle)]
        handle: u16,
    },
    /// Write a characteristic value
    Write {
        addr: BdAddr,
        #[arg(value_parser = parse_handle)]
        handle: u16,
        /// Value as hex bytes, e.g. 0100
        value: String,
        /// Write without response
        #[arg(long)]
        no_response: bool,
    },
    /// Configure settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    Set { key: String, value: String },
    Get { key: String },
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = config::Config::load(cli.config.as_deref())?;
    if let Some(socket) = cli.socket {
        config.bridge.socket_path = socket;
    }

    let _guard = init_logging(&config.bridge.log_filter, cli.json, cli.log_file.as_deref())?;

    match cli.command {
        Commands::Scan { seconds } => cmd_scan(&config, seconds).await,
        Commands::Advertise { name, seconds } => cmd_advertise(&config, name, seconds).await,
        Commands::Discover { addr } => cmd_discover(&config, addr).await,
        Commands::Read { addr, handle } => cmd_read(&config, addr, handle).await,
        Commands::Write {
            addr,
            handle,
            value,
            no_response,
        } => cmd_write(&config, addr, handle, &value, no_response).await,
        Commands::Config { action } => cmd_config(config, action),
    }
}

/// Plain stderr logging goes through the core initialiser; JSON output and
/// log files need their own subscriber
fn init_logging(filter: &str, json: bool, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    if !json && log_file.is_none() {
        btbridge_core::logging::init(filter);
        return Ok(None);
    }

    let (writer, guard) = match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            tracing_appender::non_blocking(file)
        }
        None => tracing_appender::non_blocking(std::io::stderr()),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(writer);
    let installed = if json {
        builder.json().try_init()
    } else {
        builder.with_ansi(false).try_init()
    };
    installed.map_err(|e| anyhow::anyhow!(e))?;
    Ok(Some(guard))
}

fn parse_handle(s: &str) -> Result<u16, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid handle {}: {}", s, e))
}

async fn connect(config: &config::Config) -> Result<Bridge> {
    let socket = &config.bridge.socket_path;
    Bridge::connect(&config.bridge)
        .await
        .with_context(|| format!("Failed to connect to daemon at {}", socket.display()))
}

/// Connect a fresh client to `addr`. Returns the client's app UUID.
async fn connect_client(bridge: &Bridge, addr: BdAddr) -> Result<Uuid> {
    let app = Uuid::new_v4();
    println!("{} Connecting to {}...", "•".bright_green(), addr.to_string().bright_cyan());
    bridge
        .gatt()
        .connect(app, addr)
        .await
        .with_context(|| format!("Failed to connect to {}", addr))?;
    println!("  {} Connected", "✓".green());
    Ok(app)
}

async fn disconnect_client(bridge: Bridge, app: Uuid, addr: BdAddr) -> Result<()> {
    if let Err(e) = bridge.gatt().disconnect(app, addr).await {
        tracing::warn!("disconnect from {} failed: {}", addr, e);
    }
    bridge.shutdown().await.context("Failed to shut down bridge")
}

async fn cmd_scan(config: &config::Config, seconds: u64) -> Result<()> {
    let mut bridge = connect(config).await?;
    let mut events = bridge.take_events().context("GATT event stream unavailable")?;

    let scan = bridge
        .gatt()
        .start_le_scan(vec![])
        .await
        .context("Failed to start LE scan")?;
    println!("{} ({}s)", "Scanning".bold(), seconds);
    println!();

    let deadline = tokio::time::sleep(Duration::from_secs(seconds));
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Some(GattEvent::LeDeviceFound { addr, rssi, adv_data, device_type }) => {
                    println!(
                        "  {} {}  {:>4} dBm  {:?}",
                        "•".bright_green(),
                        addr.to_string().bright_cyan(),
                        rssi,
                        device_type
                    );
                    println!("    {}", hex::encode(adv_data).dimmed());
                }
                Some(_) => {}
                None => anyhow::bail!("Bridge stopped while scanning"),
            },
        }
    }

    bridge
        .gatt()
        .stop_le_scan(scan)
        .await
        .context("Failed to stop LE scan")?;
    bridge.shutdown().await.context("Failed to shut down bridge")
}

async fn cmd_advertise(config: &config::Config, name: Option<String>, seconds: u64) -> Result<()> {
    let bridge = connect(config).await?;
    let app = Uuid::new_v4();
    let data = AdvertiseData {
        local_name: name.clone(),
        include_tx_power: true,
        ..Default::default()
    };

    bridge
        .gatt()
        .start_advertising(app, data, AdvertiseData::default())
        .await
        .context("Failed to start advertising")?;
    println!(
        "{} Advertising{} for {}s",
        "✓".green(),
        name.map(|n| format!(" as {}", n.bright_cyan())).unwrap_or_default(),
        seconds
    );

    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(seconds)) => {}
        _ = tokio::signal::ctrl_c() => {}
    }

    bridge
        .gatt()
        .stop_advertising(app)
        .await
        .context("Failed to stop advertising")?;
    println!("{} Stopped advertising", "✓".green());
    bridge.shutdown().await.context("Failed to shut down bridge")
}

fn print_db(db: &[GattDbElement]) {
    for element in db {
        println!(
            "  {:>5}  {:<16} {}",
            format!("0x{:04x}", element.handle.0).bright_yellow(),
            format!("{:?}", element.attr_type),
            element.uuid.to_string().bright_cyan()
        );
    }
}

async fn cmd_discover(config: &config::Config, addr: BdAddr) -> Result<()> {
    let bridge = connect(config).await?;
    let app = connect_client(&bridge, addr).await?;

    let db = bridge
        .gatt()
        .discover(app)
        .await
        .context("Service discovery failed")?;
    println!();
    println!("{} ({} attributes)", "GATT Database".bold(), db.len());
    print_db(&db);

    disconnect_client(bridge, app, addr).await
}

async fn cmd_read(config: &config::Config, addr: BdAddr, handle: u16) -> Result<()> {
    let bridge = connect(config).await?;
    let app = connect_client(&bridge, addr).await?;

    let value = bridge
        .gatt()
        .read_characteristic(app, AttHandle(handle))
        .await
        .with_context(|| format!("Failed to read handle 0x{:04x}", handle))?;
    println!("  0x{:04x} = {}", handle, hex::encode(&value).bright_yellow());

    disconnect_client(bridge, app, addr).await
}

async fn cmd_write(
    config: &config::Config,
    addr: BdAddr,
    handle: u16,
    value: &str,
    no_response: bool,
) -> Result<()> {
    let value = hex::decode(value).context("Value must be hex bytes")?;
    let write_type = if no_response {
        GattWriteType::NoResponse
    } else {
        GattWriteType::Normal
    };

    let bridge = connect(config).await?;
    let app = connect_client(&bridge, addr).await?;

    bridge
        .gatt()
        .write_characteristic(app, AttHandle(handle), write_type, value)
        .await
        .with_context(|| format!("Failed to write handle 0x{:04x}", handle))?;
    println!("  {} Wrote 0x{:04x}", "✓".green(), handle);

    disconnect_client(bridge, app, addr).await
}

fn cmd_config(mut config: config::Config, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Set { key, value } => {
            config.set(&key, &value)?;
            println!("{} Set {} = {}", "✓".green(), key.bright_cyan(), value);
        }

        ConfigAction::Get { key } => {
            if let Some(value) = config.get(&key) {
                println!("{} = {}", key.bright_cyan(), value);
            } else {
                anyhow::bail!("Unknown config key: {}", key);
            }
        }

        ConfigAction::List => {
            println!("{}", "Configuration".bold());
            println!("  {}", config.path().display().to_string().dimmed());
            println!();

            for (key, value) in config.list() {
                println!("  {:<26} {}", key.bright_cyan(), value);
            }
        }
    }

    Ok(())
}
