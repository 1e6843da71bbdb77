//! Transport layer for DCI register cards
//!
//! Provides the HID report exchange that the register protocol runs over,
//! plus the frame codec shared by host and card:
//!
//! - HID raw (hidapi, output reports out / input reports in)
//! - Simulated card (in-process, for tests and dry runs)
//! - Printer middleware (prints every frame crossing a transport)

pub mod command;
pub mod error;
pub mod printer;
pub mod protocol;
pub mod simulated;
pub mod types;

mod hid_raw;

pub use command::{
    CardSelector, DeviceStatus, Opcode, ParseError, RegisterRequest, RegisterResponse,
};
pub use error::TransportError;
pub use hid_raw::{HidBinder, HidRawTransport};
pub use printer::{PrinterBinder, PrinterConfig, PrinterTransport};
pub use simulated::{SimulatedBinder, SimulatedCard};
pub use types::{TransportDeviceInfo, TransportType};

use std::sync::Arc;
use std::time::Duration;

/// Raw report I/O - all backends implement this
///
/// A transport moves whole HID reports and knows nothing about registers.
/// Correlating requests with responses is the caller's job.
pub trait Transport: Send + Sync {
    /// Send one report
    ///
    /// `report[0]` is the report ID, followed by the payload.
    fn send_report(&self, report: &[u8]) -> Result<(), TransportError>;

    /// Wait up to `timeout` for one input report
    ///
    /// # Returns
    /// `None` on timeout, otherwise the payload (report ID stripped)
    fn read_report(&self, timeout: Duration) -> Result<Option<Vec<u8>>, TransportError>;

    /// Get device information
    fn device_info(&self) -> &TransportDeviceInfo;

    /// Check if transport is still connected
    fn is_connected(&self) -> bool;

    /// Close the transport gracefully
    fn close(&self) -> Result<(), TransportError>;
}

/// Type alias for a shared transport
pub type BoxedTransport = Arc<dyn Transport>;

/// Establishes transports by device name
pub trait DeviceBinder: Send + Sync {
    /// Bind the named device, returning a ready transport
    fn bind(&self, device_name: &str) -> Result<BoxedTransport, TransportError>;
}
