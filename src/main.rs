//! DCI card register CLI
//!
//! A command-line interface for reading and writing card registers.

use anyhow::{bail, Context, Result};
use clap::Parser;
use dcihid::dcihid_transport::{
    DeviceBinder, HidBinder, PrinterBinder, PrinterConfig, SimulatedBinder, SimulatedCard,
};
use dcihid::{CardType, DciConfig, Session, SessionTable};
use tracing::info;

// CLI definitions
mod cli;
use cli::{Cli, Commands};

/// Device name used with --simulate when no --device is given
const SIM_DEVICE: &str = "sim0";

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config_path = DciConfig::resolve_path(cli.config.as_deref());
    info!("Loading config from {:?}", config_path);
    let mut config = DciConfig::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    if let Some(ms) = cli.timeout_ms {
        config.response_timeout_ms = ms;
    }
    if cli.monitor {
        config.monitor = true;
    }

    // Commands that need no device
    match cli.command {
        Commands::Cards => {
            for card in CardType::ALL {
                println!("0x{:02X}  {}", card.id(), card.name());
            }
            return Ok(());
        }
        Commands::Config => {
            print!("{}", toml::to_string_pretty(&config)?);
            return Ok(());
        }
        _ => {}
    }

    let device = match (&cli.device, cli.simulate) {
        (Some(device), _) => device.clone(),
        (None, true) => SIM_DEVICE.to_string(),
        (None, false) => bail!("--device is required unless --simulate is given"),
    };

    let table = if cli.simulate {
        let binder = SimulatedBinder::new().with_device(&device, SimulatedCard::new(&device));
        build_table(binder, config, cli.hex)
    } else {
        let binder = HidBinder::new().with_report_id(config.report_id);
        build_table(binder, config, cli.hex)
    };

    let card_label = match CardType::from_id(cli.card) {
        Some(card) => card.name().to_string(),
        None => format!("0x{:02X}", cli.card),
    };
    let session = Session::open(&table, &device, cli.card, cli.num)
        .with_context(|| format!("opening {} #{} on {}", card_label, cli.num, device))?;

    match cli.command {
        Commands::Probe => {
            let info = session.device_info()?;
            let link = match table.is_connected(session.handle())? {
                true => "connected",
                false => "not connected",
            };
            println!(
                "{}: {} (VID={:04X} PID={:04X}, {})",
                device,
                info.product_name.as_deref().unwrap_or("unknown product"),
                info.vid,
                info.pid,
                link
            );
            match session.read_register(0) {
                Ok(_) => println!("{device}: {card_label} #{} responded", cli.num),
                Err(e) => bail!("{device}: {card_label} #{} not responding: {e}", cli.num),
            }
        }
        Commands::Read { address, wide } => {
            if wide {
                let mut bytes = [0u8; 4];
                for (offset, byte) in (0u32..).zip(bytes.iter_mut()) {
                    *byte = session.read_register(address.wrapping_add(offset))?;
                }
                println!("0x{:08X}: 0x{:08X}", address, u32::from_le_bytes(bytes));
            } else {
                let value = session.read_register(address)?;
                println!("0x{:08X}: 0x{:02X}", address, value);
            }
        }
        Commands::Write { address, data } => {
            session.write_register(address, data)?;
            println!("0x{:08X} <- 0x{:08X}", address, data);
        }
        Commands::Dump { start, count } => dump(&session, start, count)?,
        Commands::Cards | Commands::Config => unreachable!("handled before opening a device"),
    }

    session.close()?;
    Ok(())
}

/// Build the session table, wrapping the binder with the printer when monitoring
fn build_table<B: DeviceBinder + 'static>(binder: B, config: DciConfig, hex: bool) -> SessionTable {
    if config.monitor {
        let printer = PrinterBinder::new(binder, PrinterConfig::default().with_hex(hex));
        SessionTable::new(printer, config)
    } else {
        SessionTable::new(binder, config)
    }
}

/// Print `count` registers starting at `start`, 16 per line
fn dump(session: &Session<'_>, start: u32, count: u32) -> Result<()> {
    let mut line = Vec::with_capacity(16);
    let mut line_start = start;
    for i in 0..count {
        let address = start.wrapping_add(i);
        if line.is_empty() {
            line_start = address;
        }
        line.push(session.read_register(address)?);
        if line.len() == 16 || i + 1 == count {
            let hex: Vec<String> = line.iter().map(|b| format!("{b:02X}")).collect();
            println!("0x{:08X}: {}", line_start, hex.join(" "));
            line.clear();
        }
    }
    Ok(())
}
