//! PrinterTransport middleware for monitoring register traffic
//!
//! Wraps any Transport and prints every request and response frame that
//! passes through it to stderr.
//!
//! # Example
//!
//! ```ignore
//! use dcihid_transport::{HidBinder, PrinterBinder, PrinterConfig};
//!
//! let binder = PrinterBinder::new(HidBinder::new(), PrinterConfig::default().with_hex(true));
//! // Every transport bound through `binder` now prints its traffic
//! ```

use std::sync::Arc;
use std::time::Duration;

use crossterm::style::Stylize;

use crate::command::{DeviceStatus, RegisterRequest, RegisterResponse};
use crate::protocol::status;
use crate::{BoxedTransport, DeviceBinder, Transport, TransportDeviceInfo, TransportError};

/// Configuration for the PrinterTransport
#[derive(Debug, Clone, Default)]
pub struct PrinterConfig {
    /// Show raw hex dump alongside decoded output
    pub show_hex: bool,
}

impl PrinterConfig {
    /// Create config with hex output setting
    pub fn with_hex(mut self, show: bool) -> Self {
        self.show_hex = show;
        self
    }
}

/// Transport middleware that prints all requests and responses
pub struct PrinterTransport {
    inner: BoxedTransport,
    config: PrinterConfig,
}

impl PrinterTransport {
    /// Wrap a transport with printing middleware
    pub fn wrap(transport: BoxedTransport, config: PrinterConfig) -> BoxedTransport {
        Arc::new(Self {
            inner: transport,
            config,
        })
    }

    /// Print a request being sent (`report[0]` is the report ID)
    fn print_request(&self, report: &[u8]) {
        let payload = report.get(1..).unwrap_or_default();
        match RegisterRequest::decode(payload) {
            Ok(req) => eprintln!(
                "{} {}  {} {} seq={} addr=0x{:08X} data=0x{:08X}",
                ">>>".cyan(),
                "REQ".cyan().bold(),
                req.opcode.to_string().yellow(),
                req.card,
                req.seq,
                req.address,
                req.data
            ),
            Err(e) => eprintln!(
                "{} {}  {} ({})",
                ">>>".cyan(),
                "REQ".cyan().bold(),
                "MALFORMED".red().bold(),
                e
            ),
        }
        self.print_hex(payload);
    }

    /// Print a response received
    fn print_response(&self, payload: &[u8]) {
        match RegisterResponse::decode(payload) {
            Ok(resp) => {
                let status_text = match resp.status {
                    DeviceStatus::Ok => "OK".green().to_string(),
                    DeviceStatus::Error(code) => {
                        format!("{} 0x{:02X}", status::name(code), code).red().to_string()
                    }
                };
                eprintln!(
                    "{} {}  {} seq={} addr=0x{:08X} data=0x{:02X} {}",
                    "<<<".green(),
                    "RSP".green().bold(),
                    resp.opcode.to_string().yellow(),
                    resp.seq,
                    resp.address,
                    resp.data,
                    status_text
                );
            }
            Err(e) => eprintln!(
                "{} {}  {} ({})",
                "<<<".green(),
                "RSP".green().bold(),
                "UNKNOWN".red().bold(),
                e
            ),
        }
        self.print_hex(payload);
    }

    fn print_hex(&self, payload: &[u8]) {
        if self.config.show_hex {
            let end = payload
                .iter()
                .rposition(|&b| b != 0)
                .map_or(0, |i| i + 1);
            eprintln!("    {}  {:02x?}", "HEX".dim(), &payload[..end]);
        }
    }
}

impl Transport for PrinterTransport {
    fn send_report(&self, report: &[u8]) -> Result<(), TransportError> {
        self.print_request(report);
        self.inner.send_report(report)
    }

    fn read_report(&self, timeout: Duration) -> Result<Option<Vec<u8>>, TransportError> {
        let result = self.inner.read_report(timeout)?;
        if let Some(ref payload) = result {
            self.print_response(payload);
        }
        Ok(result)
    }

    fn device_info(&self) -> &TransportDeviceInfo {
        self.inner.device_info()
    }

    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    fn close(&self) -> Result<(), TransportError> {
        self.inner.close()
    }
}

/// Binder that wraps every transport it binds in a [`PrinterTransport`]
pub struct PrinterBinder<B> {
    inner: B,
    config: PrinterConfig,
}

impl<B: DeviceBinder> PrinterBinder<B> {
    pub fn new(inner: B, config: PrinterConfig) -> Self {
        Self { inner, config }
    }
}

impl<B: DeviceBinder> DeviceBinder for PrinterBinder<B> {
    fn bind(&self, device_name: &str) -> Result<BoxedTransport, TransportError> {
        let transport = self.inner.bind(device_name)?;
        Ok(PrinterTransport::wrap(transport, self.config.clone()))
    }
}
