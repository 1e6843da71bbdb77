// CLI definitions using clap

use clap::{Parser, Subcommand};
use dcihid::{parse_card_id, parse_number};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "dcihid")]
#[command(author, version, about = "Register access for DCI cards over USB HID")]
#[command(propagate_version = true)]
pub struct Cli {
    /// HID device path (e.g. /dev/hidraw3); defaults to "sim0" with --simulate
    #[arg(short, long, global = true)]
    pub device: Option<String>,

    /// Card id: a name like USB_16PIO or a number
    #[arg(short, long, global = true, default_value = "USB_16PIO", value_parser = parse_card_id)]
    pub card: u32,

    /// Card instance number
    #[arg(short, long, global = true, default_value_t = 0)]
    pub num: u32,

    /// Response timeout in milliseconds (overrides config)
    #[arg(long, global = true)]
    pub timeout_ms: Option<u64>,

    /// Talk to an in-process simulated card instead of hardware
    #[arg(long, global = true)]
    pub simulate: bool,

    /// Print every frame sent and received
    #[arg(long, global = true)]
    pub monitor: bool,

    /// Show raw hex dump alongside monitored frames
    #[arg(long, global = true)]
    pub hex: bool,

    /// Config file (default: $DCIHID_CONFIG or the user config dir)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log level when RUST_LOG is unset
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check that the card answers (open, read address 0, close)
    #[command(visible_alias = "p")]
    Probe,

    /// Read one register (8-bit result)
    #[command(visible_alias = "r")]
    Read {
        #[arg(value_parser = parse_number)]
        address: u32,
        /// Read four consecutive addresses and print them as a little-endian u32
        #[arg(short, long)]
        wide: bool,
    },

    /// Write a 32-bit value to one register
    #[command(visible_alias = "w")]
    Write {
        #[arg(value_parser = parse_number)]
        address: u32,
        #[arg(value_parser = parse_number)]
        data: u32,
    },

    /// Read a range of registers and print a hex dump
    #[command(visible_alias = "d")]
    Dump {
        #[arg(value_parser = parse_number)]
        start: u32,
        #[arg(value_parser = parse_number, default_value = "16")]
        count: u32,
    },

    /// List known card types
    Cards,

    /// Print the effective configuration as TOML
    Config,
}
