//! usbtree
//!
//! Lists the USB descriptor tree of the local host and issues one-off
//! control transfers.

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use common::setup_logging;
use host::config::{HostConfig, expand_path};
use host::{ControlRequest, RusbBackend, Session};
use model::constants::CONSTANTS;
use model::{Bus, Device, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "usbtree")]
#[command(
    author,
    version,
    about = "usbtree - Inspect USB devices and issue control transfers"
)]
#[command(long_about = "
Enumerates USB busses into a descriptor tree (bus, device, configuration,
interface, endpoint) and drives simple device operations through libusb.

EXAMPLES:
    # Print the device tree
    usbtree list

    # Print the device tree as JSON
    usbtree list --json

    # Read the device descriptor of device 003 on bus 001
    usbtree control --bus 001 --device 003 --request-type 0x80 --request 6 --value 0x0100 --length 18

    # Print the USB constants table
    usbtree constants

CONFIGURATION:
    The configuration file is looked up in the following order:
    1. Path specified with --config
    2. ~/.config/usbtree/host.toml
    3. /etc/usbtree/host.toml
    4. Built-in defaults
")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Save default configuration to default location and exit
    #[arg(long)]
    save_config: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL", global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Enumerate busses and print the descriptor tree
    List {
        /// Print JSON instead of the indented tree
        #[arg(long)]
        json: bool,
    },

    /// Issue one control transfer to a device
    Control {
        /// Bus directory name, as shown by `list`
        #[arg(long, value_name = "DIR")]
        bus: String,

        /// Device file name, as shown by `list`
        #[arg(long, value_name = "FILE")]
        device: String,

        /// bmRequestType (decimal or 0x-prefixed hex)
        #[arg(long, value_parser = parse_u8)]
        request_type: u8,

        /// bRequest
        #[arg(long, value_parser = parse_u8)]
        request: u8,

        /// wValue
        #[arg(long, default_value = "0", value_parser = parse_u16)]
        value: u16,

        /// wIndex
        #[arg(long, default_value = "0", value_parser = parse_u16)]
        index: u16,

        /// Timeout in milliseconds (defaults to the configured timeout)
        #[arg(long, value_name = "MS")]
        timeout: Option<u64>,

        /// Payload of a host-to-device request as JSON, e.g. '[1, 2, 3]' or '"AB"'
        #[arg(long, value_name = "JSON")]
        data: Option<String>,

        /// Bytes to read for a device-to-host request
        #[arg(long, default_value_t = 255)]
        length: usize,

        /// Interface to claim before the transfer
        #[arg(long, value_name = "IFACE")]
        claim: Option<u8>,

        /// Configuration to activate before the transfer
        #[arg(long, value_name = "N")]
        configuration: Option<u8>,
    },

    /// Print the USB constants table
    Constants,
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.save_config {
        let config = HostConfig::default();
        let path = args
            .config
            .as_deref()
            .map(expand_path)
            .unwrap_or_else(HostConfig::default_path);
        config.save(&path).context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    let config = if let Some(ref path) = args.config {
        HostConfig::load(Some(expand_path(path))).context("Failed to load configuration")?
    } else {
        HostConfig::load_or_default()
    };

    let log_level = args.log_level.as_deref().unwrap_or(&config.logging.level);
    setup_logging(log_level).context("Failed to setup logging")?;

    info!("usbtree v{}", env!("CARGO_PKG_VERSION"));

    match args.command.unwrap_or(Command::List { json: false }) {
        Command::List { json } => list_mode(&config, json),
        Command::Control {
            bus,
            device,
            request_type,
            request,
            value,
            index,
            timeout,
            data,
            length,
            claim,
            configuration,
        } => {
            let timeout = timeout.map_or_else(|| config.timeout(), Duration::from_millis);
            let request = ControlRequest::new(request_type, request)
                .with_value(value)
                .with_index(index)
                .with_timeout(timeout);
            let payload = match data {
                Some(json) => parse_payload(&json)?,
                None => Value::Bytes(Vec::new()),
            };
            control_mode(
                &bus,
                &device,
                &request,
                &payload,
                length,
                claim,
                configuration,
            )
        }
        Command::Constants => {
            for (name, value) in CONSTANTS {
                println!("{:<32} {:#06x} ({})", name, value, value);
            }
            Ok(())
        }
    }
}

fn list_mode(config: &HostConfig, json: bool) -> Result<()> {
    let backend = RusbBackend::new().context("Failed to initialize libusb")?;
    let mut session = Session::new(backend);
    let busses = session.busses().context("Failed to enumerate USB busses")?;

    let busses: Vec<Bus> = busses
        .iter()
        .map(|bus| Bus {
            dirname: bus.dirname.clone(),
            location: bus.location,
            devices: bus
                .devices
                .iter()
                .filter(|d| config.allows(d.vendor_id, d.product_id))
                .cloned()
                .collect(),
        })
        .collect();

    if json {
        let out = serde_json::to_string_pretty(&busses).context("Failed to serialize tree")?;
        println!("{}", out);
        return Ok(());
    }

    for bus in &busses {
        println!("Bus {} (location {})", bus.dirname, bus.location);
        for device in &bus.devices {
            print_device(device);
        }
    }
    Ok(())
}

fn print_device(device: &Device) {
    println!(
        "  Device {}  class {:#04x}/{:#04x}/{:#04x}  ep0 {} bytes  release {}",
        device,
        device.device_class,
        device.device_sub_class,
        device.device_protocol,
        device.max_packet_size,
        device.device_version
    );
    for config in &device.configurations {
        let mut flags = String::new();
        if config.self_powered {
            flags.push_str("  self-powered");
        }
        if config.remote_wakeup {
            flags.push_str("  remote-wakeup");
        }
        println!(
            "    Configuration {}  {} mA{}",
            config.value, config.max_power, flags
        );
        for alternates in &config.interfaces {
            for interface in alternates {
                println!(
                    "      Interface {} alt {}  class {:#04x}/{:#04x}/{:#04x}",
                    interface.interface_number,
                    interface.alternate_setting,
                    interface.interface_class,
                    interface.interface_sub_class,
                    interface.interface_protocol
                );
                for ep in &interface.endpoints {
                    println!(
                        "        Endpoint {:#04x} {:?} {}  {} bytes  interval {}",
                        ep.address,
                        ep.direction(),
                        ep.kind(),
                        ep.max_packet_size,
                        ep.interval
                    );
                }
            }
        }
    }
}

fn control_mode(
    bus: &str,
    device: &str,
    request: &ControlRequest,
    payload: &Value,
    length: usize,
    claim: Option<u8>,
    configuration: Option<u8>,
) -> Result<()> {
    let backend = RusbBackend::new().context("Failed to initialize libusb")?;
    let mut session = Session::new(backend);
    let busses = session.busses().context("Failed to enumerate USB busses")?;

    let target: Arc<Device> = busses
        .iter()
        .filter(|b| b.dirname == bus)
        .flat_map(|b| b.devices.iter())
        .find(|d| d.filename == device)
        .cloned()
        .ok_or_else(|| anyhow!("No device {} on bus {}", device, bus))?;

    let id = session.open(&target).context("Failed to open device")?;
    let handle = session.handle_mut(id)?;

    if let Some(value) = configuration {
        handle
            .set_configuration(value)
            .with_context(|| format!("Failed to set configuration {}", value))?;
    }
    if let Some(interface) = claim {
        handle
            .claim_interface(interface)
            .with_context(|| format!("Failed to claim interface {}", interface))?;
    }

    if request.is_in() {
        let bytes = handle
            .control_read(request, length)
            .context("Control transfer failed")?;
        println!("{} bytes read", bytes.len());
        let hex: Vec<String> = bytes.iter().map(|b| format!("{:02x}", b)).collect();
        println!("{}", hex.join(" "));
    } else {
        let n = handle
            .control_msg(request, payload)
            .context("Control transfer failed")?;
        println!("{} bytes written", n);
    }

    session.close(id)?;
    Ok(())
}

fn parse_payload(json: &str) -> Result<Value> {
    let parsed: serde_json::Value =
        serde_json::from_str(json).with_context(|| format!("Invalid JSON payload: {}", json))?;
    Ok(Value::from(parsed))
}

fn parse_u8(s: &str) -> std::result::Result<u8, String> {
    parse_int(s)
        .and_then(|n| u8::try_from(n).map_err(|_| format!("{} does not fit in a byte", s)))
}

fn parse_u16(s: &str) -> std::result::Result<u16, String> {
    parse_int(s)
        .and_then(|n| u16::try_from(n).map_err(|_| format!("{} does not fit in 16 bits", s)))
}

fn parse_int(s: &str) -> std::result::Result<u32, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|_| format!("'{}' is not a number", s))
}
