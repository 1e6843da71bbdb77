//! C boundary
//!
//! ```c
//! u_int32_t dcihid_open(const char *dev_name, const u_int card_id, const u_int card_num);
//! int32_t   dcihid_close(const u_int32_t dcihid_handle);
//! int32_t   dcihid_write(const u_int32_t dcihid_handle, const u_int32_t addr, const u_int32_t data);
//! int32_t   dcihid_read(const u_int32_t dcihid_handle, const u_int32_t addr, u_int8_t *data);
//! ```
//!
//! `dcihid_open` returns 0 on failure. The other calls return 0 on success
//! or one of the negative codes in [`crate::error::status`].
//!
//! All calls share one process-wide [`SessionTable`], created on first use
//! with the hidapi binder and the configuration found at
//! [`DciConfig::resolve_path`].

use std::ffi::CStr;
use std::sync::OnceLock;

use dcihid_transport::{HidBinder, PrinterBinder, PrinterConfig};
use libc::{c_char, c_uint};
use tracing::{debug, warn};

use crate::config::DciConfig;
use crate::error::{status, to_status};
use crate::session::{SessionHandle, SessionTable};

static TABLE: OnceLock<SessionTable> = OnceLock::new();

/// Get the process-wide session table
pub fn global_table() -> &'static SessionTable {
    TABLE.get_or_init(|| {
        let path = DciConfig::resolve_path(None);
        let config = DciConfig::load(&path).unwrap_or_else(|e| {
            warn!("Ignoring config {}: {}", path.display(), e);
            DciConfig::default()
        });
        debug!("Session table config: {:?}", config);
        let hid = HidBinder::new().with_report_id(config.report_id);
        if config.monitor {
            let binder = PrinterBinder::new(hid, PrinterConfig::default());
            SessionTable::new(binder, config)
        } else {
            SessionTable::new(hid, config)
        }
    })
}

/// `dcihid_open` against an explicit table
///
/// # Safety
/// `dev_name` must be null or point to a NUL-terminated string.
pub unsafe fn open_in(
    table: &SessionTable,
    dev_name: *const c_char,
    card_id: c_uint,
    card_num: c_uint,
) -> u32 {
    if dev_name.is_null() {
        return SessionHandle::NONE;
    }
    // SAFETY: non-null and NUL-terminated per the caller contract
    let name = unsafe { CStr::from_ptr(dev_name) };
    let Ok(name) = name.to_str() else {
        warn!("dcihid_open: device name is not UTF-8");
        return SessionHandle::NONE;
    };
    match table.open(name, card_id, card_num) {
        Ok(handle) => handle.raw(),
        Err(e) => {
            warn!("dcihid_open({}, {}, {}) failed: {}", name, card_id, card_num, e);
            SessionHandle::NONE
        }
    }
}

/// `dcihid_close` against an explicit table
pub fn close_in(table: &SessionTable, handle: u32) -> i32 {
    to_status(table.close(SessionHandle::from_raw(handle)))
}

/// `dcihid_write` against an explicit table
pub fn write_in(table: &SessionTable, handle: u32, addr: u32, data: u32) -> i32 {
    to_status(table.write(SessionHandle::from_raw(handle), addr, data))
}

/// `dcihid_read` against an explicit table
///
/// `*data` is only written on success.
///
/// # Safety
/// `data` must be null or valid for a one-byte write.
pub unsafe fn read_in(table: &SessionTable, handle: u32, addr: u32, data: *mut u8) -> i32 {
    if data.is_null() {
        return status::INVALID_ARGUMENT;
    }
    match table.read(SessionHandle::from_raw(handle), addr) {
        Ok(value) => {
            // SAFETY: non-null and writable per the caller contract
            unsafe { data.write(value) };
            status::SUCCESS
        }
        Err(e) => e.status_code(),
    }
}

/// # Safety
/// `dev_name` must be null or point to a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn dcihid_open(
    dev_name: *const c_char,
    card_id: c_uint,
    card_num: c_uint,
) -> u32 {
    // SAFETY: forwarded caller contract
    unsafe { open_in(global_table(), dev_name, card_id, card_num) }
}

#[no_mangle]
pub extern "C" fn dcihid_close(dcihid_handle: u32) -> i32 {
    close_in(global_table(), dcihid_handle)
}

#[no_mangle]
pub extern "C" fn dcihid_write(dcihid_handle: u32, addr: u32, data: u32) -> i32 {
    write_in(global_table(), dcihid_handle, addr, data)
}

/// # Safety
/// `data` must be null or valid for a one-byte write.
#[no_mangle]
pub unsafe extern "C" fn dcihid_read(dcihid_handle: u32, addr: u32, data: *mut u8) -> i32 {
    // SAFETY: forwarded caller contract
    unsafe { read_in(global_table(), dcihid_handle, addr, data) }
}
