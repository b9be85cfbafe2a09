//! smactl - SMA register access from the command line
//!
//! Reads and writes catalog registers, lists the device map and switches
//! battery operating modes on an SMA inverter reachable over Modbus/TCP.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use voltage_sma::catalog::{self, RegisterDefinition, DEVICE_MAP_UNIT_ID};
use voltage_sma::device_map::{DEVICE_MAP_START, DEVICE_MAP_STRIDE};
use voltage_sma::simulator::SimulatorServer;
use voltage_sma::{
    ModbusTcpTransport, RegisterAccess, RegisterValue, ScalarType, SimulatedDevice, SmaConfig,
};

#[derive(Parser)]
#[command(name = "smactl")]
#[command(about = "SMA inverter register access over Modbus/TCP")]
#[command(long_about = "SMA inverter register access over Modbus/TCP

Examples:
  smactl --host 192.168.1.50 read invWLim GridMs.Hz
  smactl write Inv.Ext.Ctrl 803
  smactl devices --json
  smactl mode external --watts -1500
  smactl range --min -50 --max 50
  smactl --simulate read 30233")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// YAML configuration file
    #[arg(short = 'c', long = "config", global = true)]
    config: Option<PathBuf>,

    /// Device host (overrides configuration)
    #[arg(long, global = true)]
    host: Option<String>,

    /// Modbus/TCP port (overrides configuration)
    #[arg(long, global = true)]
    port: Option<u16>,

    /// Unit ID (overrides configuration)
    #[arg(short = 'u', long = "unit", global = true)]
    unit: Option<u8>,

    /// Run against a built-in simulated device
    #[arg(long, global = true)]
    simulate: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Read registers by identifier or address
    Read {
        #[arg(required = true)]
        registers: Vec<String>,
    },

    /// Write one register
    Write {
        register: String,
        /// Number, or text for string registers
        #[arg(allow_hyphen_values = true)]
        value: String,
    },

    /// List the register catalog
    Registers,

    /// Show the device map
    Devices {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Switch the battery operating mode
    Mode {
        #[command(subcommand)]
        mode: ModeCommand,
    },

    /// Limit the charge/discharge power range
    Range {
        #[arg(long, allow_hyphen_values = true)]
        min: f64,
        #[arg(long, allow_hyphen_values = true)]
        max: f64,
        /// Interpret min/max as watts instead of percent of nominal power
        #[arg(long)]
        watts: bool,
    },
}

#[derive(Subcommand)]
enum ModeCommand {
    /// Inverter-controlled self-consumption
    SelfConsumption,
    /// Fixed external set-point
    External {
        /// Positive discharges, negative charges
        #[arg(long, allow_hyphen_values = true)]
        watts: f64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let mut config = SmaConfig::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(unit) = cli.unit {
        config.unit_id = unit;
    }

    // keep the server alive for the whole run
    let _simulator = if cli.simulate {
        let server = start_simulator().await?;
        config.host = server.local_addr().ip().to_string();
        config.port = server.local_addr().port();
        Some(server)
    } else {
        None
    };
    config.validate()?;

    let transport = ModbusTcpTransport::from_config(&config);
    let mut session = RegisterAccess::with_config(transport, &config);

    if config.discover_unit_id {
        match session.set_default_unit_id().await {
            Some(unit) => info!("Using discovered unit ID {}", unit),
            None => warn!("No unit ID discovered, keeping {}", session.unit_id()),
        }
    }

    run(&mut session, cli.command).await
}

async fn run(session: &mut RegisterAccess<ModbusTcpTransport>, command: Commands) -> Result<()> {
    match command {
        Commands::Read { registers } => {
            for name in registers {
                let def = catalog::resolve(&name)?;
                let value = session.try_read_register(def).await?;
                println!("{:<22} {}", def.identifier, display_value(def, &value));
            }
        },
        Commands::Write { register, value } => {
            let def = catalog::resolve(&register)?;
            let value = parse_value(def, &value)?;
            session.try_write_register(def, &value).await?;
            println!("{} <- {}", def.identifier, display_value(def, &value));
        },
        Commands::Registers => {
            println!(
                "{:<22} {:>5} {:>2} {:<5} {:<4} {:<2} DESCRIPTION",
                "IDENTIFIER", "ADDR", "W", "TYPE", "FMT", "AC"
            );
            for def in catalog::CATALOG {
                println!(
                    "{:<22} {:>5} {:>2} {:<5} {:<4} {:<2} {}",
                    def.identifier,
                    def.address,
                    def.word_count,
                    def.scalar_type,
                    def.format,
                    def.access,
                    def.description
                );
            }
        },
        Commands::Devices { json } => {
            let entries = session.device_map().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else if entries.is_empty() {
                println!("device map is empty or unreachable");
            } else {
                println!("{:>6} {:>12} {:>5}", "SUSY", "SERIAL", "UNIT");
                for entry in entries {
                    println!(
                        "{:>6} {:>12} {:>5}",
                        entry.susy_id, entry.serial_number, entry.unit_id
                    );
                }
            }
        },
        Commands::Mode { mode } => match mode {
            ModeCommand::SelfConsumption => session.set_self_consumption_mode().await?,
            ModeCommand::External { watts } => {
                session.set_external_power_control_mode(watts).await?
            },
        },
        Commands::Range { min, max, watts } => {
            if min > max {
                bail!("--min ({min}) must not exceed --max ({max})");
            }
            if watts {
                session.set_power_range_in_watts(min, max).await?;
            } else {
                session.set_power_range_in_percent(min, max).await?;
            }
        },
    }
    Ok(())
}

fn parse_value(def: &RegisterDefinition, raw: &str) -> Result<RegisterValue> {
    if def.scalar_type == ScalarType::FixedString {
        return Ok(RegisterValue::text(raw));
    }
    let number: f64 = if raw.eq_ignore_ascii_case("nan") {
        f64::NAN
    } else {
        raw.parse()
            .with_context(|| format!("{} expects a number, got '{raw}'", def.identifier))?
    };
    Ok(RegisterValue::from_f64(number, def.scalar_type, def.format))
}

fn display_value(def: &RegisterDefinition, value: &RegisterValue) -> String {
    match value {
        RegisterValue::Text(bytes) => {
            let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
            String::from_utf8_lossy(&bytes[..end]).into_owned()
        },
        _ => format!("{value} ({}/{})", def.scalar_type, def.format),
    }
}

/// A simulated storage inverter on unit 3 with a one-entry device map
async fn start_simulator() -> Result<SimulatorServer> {
    let device = SimulatedDevice::new();
    let unit = catalog::DEFAULT_UNIT_ID;

    device.set_u32(unit, catalog::NAMEPLATE_DEVICE_CLASS.address, 8009).await;
    device.set_u32(unit, catalog::NAMEPLATE_DEVICE_TYPE.address, 9428).await;
    device.set_u32(unit, catalog::SERIAL_NUMBER.address, 3_007_000_001).await;
    device.set_u32(unit, catalog::FIRMWARE_VERSION.address, 0x0314_0204).await;
    device.set_u32(unit, catalog::SYSTEM_TIME.address, 1_760_000_000).await;
    device.set_u32(unit, catalog::DEVICE_HEALTH.address, 307).await;
    device.set_u32(unit, catalog::INVERTER_NOMINAL_POWER.address, 3680).await;
    device.set_u64(unit, catalog::TOTAL_YIELD.address, 1_234_567).await;
    device.set_u64(unit, catalog::OPERATING_TIME.address, 86_400).await;
    device.set_u32(unit, catalog::ACTIVE_POWER.address, (-1200i32) as u32).await;
    device.set_u32(unit, catalog::GRID_VOLTAGE_L1.address, 23_015).await;
    device.set_u32(unit, catalog::GRID_FREQUENCY.address, 4_998).await;
    device.set_u32(unit, catalog::BATTERY_STATE_OF_CHARGE.address, 64).await;
    device.set_u32(unit, catalog::BATTERY_TEMPERATURE.address, 251).await;
    device.set_u32(unit, catalog::EXTERNAL_POWER_IN_WATTS.address, 0).await;
    device.set_u32(unit, catalog::EXTERNAL_POWER_CONTROL.address, 803).await;
    device.set_u32(unit, catalog::BMS_OPERATING_MODE.address, 1438).await;
    device.set_u32(unit, catalog::BATTERY_CHARGE_MAX_IN_WATTS.address, 3680).await;
    device
        .set_string(
            unit,
            catalog::DEVICE_NAME.address,
            catalog::DEVICE_NAME.word_count,
            "SBS3.7-10",
        )
        .await;
    device.set_u32(unit, catalog::GRID_GUARD_CODE.address, 0).await;

    // SUSy 438, serial, unit 3; then the end marker
    let entry = (0x01B6_u64 << 48) | (3_007_000_001_u64 << 16) | u64::from(unit);
    device
        .set_u64(DEVICE_MAP_UNIT_ID, DEVICE_MAP_START, entry)
        .await;
    device
        .set_u64(DEVICE_MAP_UNIT_ID, DEVICE_MAP_START + DEVICE_MAP_STRIDE, u64::MAX)
        .await;

    Ok(device.serve("127.0.0.1:0").await?)
}
