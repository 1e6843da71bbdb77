//! Session table
//!
//! Maps opaque 32-bit handles to bound cards. Handles index a slot arena and
//! carry the slot's generation, so a handle from a closed session never
//! resolves again even after its slot is reused.
//!
//! ```text
//!  handle = generation << 16 | (slot + 1)
//! ```
//!
//! Several sessions may address different cards on the same device. They
//! share one [`DeviceLink`], whose exchange lock serializes every
//! request/response cycle on that device.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use dcihid_transport::{
    BoxedTransport, CardSelector, DeviceBinder, TransportDeviceInfo, TransportError,
};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, warn};

use crate::config::DciConfig;
use crate::engine::{LinkState, RequestState};
use crate::error::DciError;

/// Maximum number of simultaneously live sessions
pub const MAX_SESSIONS: usize = 0xFFFF;

const SLOT_BITS: u32 = 16;
const SLOT_MASK: u32 = (1 << SLOT_BITS) - 1;

/// Opaque session identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionHandle(u32);

impl SessionHandle {
    /// Raw value meaning "no session"
    pub const NONE: u32 = 0;

    fn new(slot: usize, generation: u16) -> Self {
        debug_assert!(slot < MAX_SESSIONS && generation != 0);
        Self((u32::from(generation) << SLOT_BITS) | (slot as u32 + 1))
    }

    /// Wrap a raw value received from a caller
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    fn slot(self) -> Option<usize> {
        match self.0 & SLOT_MASK {
            0 => None,
            n => Some(n as usize - 1),
        }
    }

    fn generation(self) -> u16 {
        (self.0 >> SLOT_BITS) as u16
    }
}

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

/// One bound device, shared by every session addressing a card on it
pub(crate) struct DeviceLink {
    pub(crate) name: String,
    pub(crate) transport: BoxedTransport,
    /// Held for the duration of each request/response cycle
    pub(crate) exchange: Mutex<LinkState>,
}

/// Live session state
pub(crate) struct SessionBinding {
    pub(crate) card: CardSelector,
    pub(crate) link: Arc<DeviceLink>,
    pub(crate) state: Mutex<RequestState>,
}

struct Slot {
    generation: u16,
    binding: Option<Arc<SessionBinding>>,
}

struct DeviceEntry {
    link: Arc<DeviceLink>,
    cards: HashSet<CardSelector>,
    /// Last session is gone and the transport is being closed
    closing: bool,
}

#[derive(Default)]
struct TableInner {
    slots: Vec<Slot>,
    free: Vec<usize>,
    live: usize,
    devices: HashMap<String, DeviceEntry>,
}

impl TableInner {
    fn has_capacity(&self) -> bool {
        !self.free.is_empty() || self.slots.len() < MAX_SESSIONS
    }

    fn allocate(&mut self, binding: Arc<SessionBinding>) -> SessionHandle {
        let slot = match self.free.pop() {
            Some(slot) => slot,
            None => {
                self.slots.push(Slot {
                    generation: 1,
                    binding: None,
                });
                self.slots.len() - 1
            }
        };
        let entry = &mut self.slots[slot];
        entry.binding = Some(binding);
        self.live += 1;
        SessionHandle::new(slot, entry.generation)
    }

    fn lookup(&self, handle: SessionHandle) -> Option<&Arc<SessionBinding>> {
        let slot = self.slots.get(handle.slot()?)?;
        if slot.generation != handle.generation() {
            return None;
        }
        slot.binding.as_ref()
    }

    fn release(&mut self, handle: SessionHandle) -> Option<Arc<SessionBinding>> {
        let index = handle.slot()?;
        let slot = self.slots.get_mut(index)?;
        if slot.generation != handle.generation() {
            return None;
        }
        let binding = slot.binding.take()?;
        slot.generation = match slot.generation.wrapping_add(1) {
            0 => 1,
            g => g,
        };
        self.free.push(index);
        self.live -= 1;
        Some(binding)
    }
}

/// Process-wide table of open sessions
pub struct SessionTable {
    binder: Box<dyn DeviceBinder>,
    config: DciConfig,
    inner: Mutex<TableInner>,
    /// Signalled when a closing device leaves the table
    device_closed: Condvar,
}

impl SessionTable {
    pub fn new(binder: impl DeviceBinder + 'static, config: DciConfig) -> Self {
        Self {
            binder: Box::new(binder),
            config,
            inner: Mutex::new(TableInner::default()),
            device_closed: Condvar::new(),
        }
    }

    pub fn config(&self) -> &DciConfig {
        &self.config
    }

    /// Bind a card on the named device and return a fresh handle
    ///
    /// Nothing is recorded if any step fails.
    pub fn open(
        &self,
        device_name: &str,
        card_id: u32,
        card_num: u32,
    ) -> Result<SessionHandle, DciError> {
        let card = match (u8::try_from(card_id), u8::try_from(card_num)) {
            (Ok(id), Ok(num)) => CardSelector::new(id, num),
            _ => {
                return Err(DciError::InvalidCard {
                    id: card_id,
                    num: card_num,
                })
            }
        };

        let mut inner = self.inner.lock();
        // A device is never bound again while its previous transport is closing
        while inner
            .devices
            .get(device_name)
            .is_some_and(|entry| entry.closing)
        {
            debug!("Waiting for {} to finish closing", device_name);
            self.device_closed.wait(&mut inner);
        }
        if !inner.has_capacity() {
            return Err(DciError::TableFull);
        }

        let link = match inner.devices.get(device_name) {
            Some(entry) if entry.cards.contains(&card) => {
                return Err(DciError::DeviceBusy(format!("{device_name} {card}")));
            }
            Some(entry) => entry.link.clone(),
            None => {
                let transport = self.binder.bind(device_name).map_err(|e| match e {
                    TransportError::DeviceNotFound(name) => DciError::DeviceNotFound(name),
                    other => DciError::Transport(other),
                })?;
                let link = Arc::new(DeviceLink {
                    name: device_name.to_string(),
                    transport,
                    exchange: Mutex::new(LinkState::default()),
                });
                inner.devices.insert(
                    device_name.to_string(),
                    DeviceEntry {
                        link: link.clone(),
                        cards: HashSet::new(),
                        closing: false,
                    },
                );
                link
            }
        };

        if let Some(entry) = inner.devices.get_mut(device_name) {
            entry.cards.insert(card);
        }
        let binding = Arc::new(SessionBinding {
            card,
            link,
            state: Mutex::new(RequestState::Idle),
        });
        let handle = inner.allocate(binding);
        info!("Opened {} on {} as handle {}", card, device_name, handle);
        Ok(handle)
    }

    /// Release a session; the device is closed with its last session
    ///
    /// The binding is gone once this returns, even if closing the transport
    /// reports an error.
    pub fn close(&self, handle: SessionHandle) -> Result<(), DciError> {
        let (binding, last) = {
            let mut inner = self.inner.lock();
            let binding = inner
                .release(handle)
                .ok_or(DciError::InvalidHandle(handle.raw()))?;
            let last = match inner.devices.get_mut(&binding.link.name) {
                Some(entry) => {
                    entry.cards.remove(&binding.card);
                    entry.closing = entry.cards.is_empty();
                    entry.closing
                }
                None => false,
            };
            (binding, last)
        };

        // Let an in-flight exchange on this device finish first
        let exchange = binding.link.exchange.lock();
        info!(
            "Closed handle {} ({} on {})",
            handle, binding.card, binding.link.name
        );
        if !last {
            return Ok(());
        }

        debug!("Last session on {} closed, releasing device", binding.link.name);
        let result = binding.link.transport.close();
        drop(exchange);

        // Opens of this name wait until the entry is gone
        self.inner.lock().devices.remove(&binding.link.name);
        self.device_closed.notify_all();

        result.map_err(|e| {
            warn!("Closing {} failed: {}", binding.link.name, e);
            DciError::Transport(e)
        })
    }

    /// Resolve a handle to its live binding
    pub(crate) fn resolve(&self, handle: SessionHandle) -> Result<Arc<SessionBinding>, DciError> {
        self.inner
            .lock()
            .lookup(handle)
            .cloned()
            .ok_or(DciError::InvalidHandle(handle.raw()))
    }

    /// Whether the handle refers to a live session
    pub fn contains(&self, handle: SessionHandle) -> bool {
        self.inner.lock().lookup(handle).is_some()
    }

    /// Number of live sessions
    pub fn len(&self) -> usize {
        self.inner.lock().live
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Identity of the device a session is bound to
    pub fn device_info(&self, handle: SessionHandle) -> Result<TransportDeviceInfo, DciError> {
        Ok(self.resolve(handle)?.link.transport.device_info().clone())
    }

    /// Whether the device behind a session still answers
    pub fn is_connected(&self, handle: SessionHandle) -> Result<bool, DciError> {
        Ok(self.resolve(handle)?.link.transport.is_connected())
    }

    /// Current request state of a session
    pub fn request_state(&self, handle: SessionHandle) -> Result<RequestState, DciError> {
        Ok(*self.resolve(handle)?.state.lock())
    }
}

/// RAII session: closes its handle on drop
pub struct Session<'t> {
    table: &'t SessionTable,
    handle: Option<SessionHandle>,
}

impl<'t> Session<'t> {
    pub fn open(
        table: &'t SessionTable,
        device_name: &str,
        card_id: u32,
        card_num: u32,
    ) -> Result<Self, DciError> {
        let handle = table.open(device_name, card_id, card_num)?;
        Ok(Self {
            table,
            handle: Some(handle),
        })
    }

    /// Raw handle value
    pub fn handle(&self) -> SessionHandle {
        self.handle
            .unwrap_or_else(|| SessionHandle::from_raw(SessionHandle::NONE))
    }

    pub fn write_register(&self, address: u32, data: u32) -> Result<(), DciError> {
        self.table.write(self.handle(), address, data)
    }

    pub fn read_register(&self, address: u32) -> Result<u8, DciError> {
        self.table.read(self.handle(), address)
    }

    pub fn device_info(&self) -> Result<TransportDeviceInfo, DciError> {
        self.table.device_info(self.handle())
    }

    /// Close now and report the outcome
    pub fn close(mut self) -> Result<(), DciError> {
        match self.handle.take() {
            Some(handle) => self.table.close(handle),
            None => Ok(()),
        }
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(e) = self.table.close(handle) {
                debug!("Closing handle {} on drop failed: {}", handle, e);
            }
        }
    }
}
