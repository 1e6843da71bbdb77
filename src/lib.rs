//! Register access for DCI debug/control cards over USB HID
//!
//! Callers open a card on a named HID device, get back an opaque 32-bit
//! handle, then read and write registers through it:
//!
//! ```ignore
//! use dcihid::{DciConfig, SessionTable};
//! use dcihid_transport::HidBinder;
//!
//! let table = SessionTable::new(HidBinder::new(), DciConfig::default());
//! let h = table.open("/dev/hidraw3", 0x01, 0)?;
//! table.write(h, 0x1000, 0xDEADBEEF)?;
//! let low = table.read(h, 0x1000)?; // 0xEF
//! table.close(h)?;
//! ```
//!
//! The same operations are exported with C linkage from [`ffi`].

pub mod card;
pub mod config;
pub mod engine;
pub mod error;
pub mod ffi;
pub mod session;

pub use card::{parse_card_id, parse_number, CardType};
pub use config::{ConfigError, DciConfig};
pub use engine::RequestState;
pub use error::{status, to_status, DciError};
pub use session::{Session, SessionHandle, SessionTable, MAX_SESSIONS};

// Re-export the transport layer for consumers building their own tables
pub use dcihid_transport;
