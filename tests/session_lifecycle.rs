//! Integration tests for the session table.
//!
//! These go through the public API only: opening cards on a simulated
//! device, moving register values, and checking what reached the wire.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dcihid::dcihid_transport::{
    CardSelector, PrinterBinder, PrinterConfig, SimulatedBinder, SimulatedCard,
};
use dcihid::{status, to_status, CardType, DciConfig, DciError, Session, SessionHandle, SessionTable};

fn sim_table(config: DciConfig) -> (SessionTable, Arc<SimulatedCard>) {
    let binder = SimulatedBinder::new().with_device("dci0", SimulatedCard::new("dci0"));
    let card = binder.device("dci0").unwrap();
    (SessionTable::new(binder, config), card)
}

// ── Lifecycle ──

#[test]
fn lifecycle_register_round_trip() {
    let (table, _card) = sim_table(DciConfig::default());

    let h = table.open("dci0", 1, 0).unwrap();
    assert_ne!(h.raw(), SessionHandle::NONE);
    assert_eq!(to_status(table.write(h, 0x1000, 0xDEAD_BEEF)), status::SUCCESS);
    assert_eq!(table.read(h, 0x1000).unwrap(), 0xEF);
    assert_eq!(to_status(table.close(h)), status::SUCCESS);
    assert_eq!(to_status(table.close(h)), status::INVALID_HANDLE);
    assert!(table.is_empty());
}

#[test]
fn lifecycle_distinct_cards_get_distinct_handles() {
    let (table, card) = sim_table(DciConfig::default());

    let a = table.open("dci0", CardType::Usb16Pio.id(), 0).unwrap();
    let b = table.open("dci0", CardType::Usb16Pio.id(), 1).unwrap();
    let c = table.open("dci0", CardType::Usb8Pr.id(), 0).unwrap();
    assert_ne!(a, b);
    assert_ne!(b, c);
    assert_ne!(a, c);
    assert_eq!(table.len(), 3);

    // Each handle addresses its own card
    table.write(a, 0x10, 0xA1).unwrap();
    table.write(b, 0x10, 0xB2).unwrap();
    table.write(c, 0x10, 0xC3).unwrap();
    assert_eq!(table.read(a, 0x10).unwrap(), 0xA1);
    assert_eq!(table.read(b, 0x10).unwrap(), 0xB2);
    assert_eq!(table.read(c, 0x10).unwrap(), 0xC3);
    assert_eq!(card.register(CardSelector::new(0x06, 0), 0x10), Some(0xC3));

    // Closing one card leaves the device open for the others
    table.close(a).unwrap();
    assert!(!card.is_closed());
    assert_eq!(table.read(b, 0x10).unwrap(), 0xB2);
    table.close(b).unwrap();
    table.close(c).unwrap();
    assert!(card.is_closed());
}

#[test]
fn lifecycle_same_card_twice_is_busy() {
    let (table, _card) = sim_table(DciConfig::default());
    let h = table.open("dci0", 1, 0).unwrap();
    assert!(matches!(
        table.open("dci0", 1, 0),
        Err(DciError::DeviceBusy(_))
    ));
    table.close(h).unwrap();
    // Free again once closed
    let h2 = table.open("dci0", 1, 0).unwrap();
    assert_ne!(h, h2);
}

#[test]
fn lifecycle_open_failures() {
    let (table, _card) = sim_table(DciConfig::default());
    assert!(matches!(
        table.open("nope", 1, 0),
        Err(DciError::DeviceNotFound(_))
    ));
    assert!(matches!(
        table.open("dci0", 0x1_00, 0),
        Err(DciError::InvalidCard { .. })
    ));
    assert!(table.is_empty());
}

// ── Handle validation ──

#[test]
fn handles_never_issued_or_closed_send_nothing() {
    let (table, card) = sim_table(DciConfig::default());
    let bogus = SessionHandle::from_raw(0x0042_0007);
    assert!(matches!(table.write(bogus, 0, 0), Err(DciError::InvalidHandle(_))));
    assert!(matches!(table.read(bogus, 0), Err(DciError::InvalidHandle(_))));
    assert!(matches!(table.close(bogus), Err(DciError::InvalidHandle(_))));

    let h = table.open("dci0", 1, 0).unwrap();
    table.close(h).unwrap();
    assert_eq!(to_status(table.write(h, 0, 0)), status::INVALID_HANDLE);
    assert_eq!(card.sent_count(), 0);
}

#[test]
fn handles_stale_after_slot_reuse() {
    let (table, _card) = sim_table(DciConfig::default());
    let old = table.open("dci0", 1, 0).unwrap();
    table.close(old).unwrap();
    let new = table.open("dci0", 1, 0).unwrap();

    assert_ne!(old.raw(), new.raw());
    assert!(matches!(table.read(old, 0), Err(DciError::InvalidHandle(_))));
    assert!(table.read(new, 0).is_ok());
}

// ── Timeouts ──

#[test]
fn timeout_is_bounded() {
    let config = DciConfig::default().with_response_timeout(Duration::from_millis(80));
    let (table, card) = sim_table(config);
    let h = table.open("dci0", 1, 0).unwrap();
    card.set_silent(true);

    let started = Instant::now();
    let err = table.read(h, 0x1000).unwrap_err();
    assert_eq!(err.status_code(), status::TIMEOUT);
    assert!(started.elapsed() >= Duration::from_millis(80));
    assert!(started.elapsed() < Duration::from_secs(5));

    // The session recovers once the card answers again
    card.set_silent(false);
    table.write(h, 0x1000, 0x42).unwrap();
    assert_eq!(table.read(h, 0x1000).unwrap(), 0x42);
}

#[test]
fn timeout_on_absent_card() {
    let binder = SimulatedBinder::new().with_device(
        "dci0",
        SimulatedCard::new("dci0").with_cards(&[CardSelector::new(1, 0)]),
    );
    let config = DciConfig::default().with_response_timeout(Duration::from_millis(50));
    let table = SessionTable::new(binder, config);

    let present = table.open("dci0", 1, 0).unwrap();
    let absent = table.open("dci0", 2, 0).unwrap();
    assert!(table.read(present, 0).is_ok());
    assert!(matches!(table.read(absent, 0), Err(DciError::Timeout(50))));
}

// ── Guards and monitoring ──

#[test]
fn session_guard_closes_on_drop() {
    let (table, card) = sim_table(DciConfig::default());
    let raw = {
        let session = Session::open(&table, "dci0", 1, 0).unwrap();
        session.write_register(0x20, 0x1234).unwrap();
        assert_eq!(session.read_register(0x20).unwrap(), 0x34);
        session.handle()
    };
    assert!(!table.contains(raw));
    assert!(card.is_closed());
}

#[test]
fn monitored_table_passes_traffic_through() {
    let binder = SimulatedBinder::new().with_device("dci0", SimulatedCard::new("dci0"));
    let card = binder.device("dci0").unwrap();
    let printer = PrinterBinder::new(binder, PrinterConfig::default().with_hex(true));
    let table = SessionTable::new(printer, DciConfig::default());

    let session = Session::open(&table, "dci0", 1, 0).unwrap();
    session.write_register(0x1000, 0xDEAD_BEEF).unwrap();
    assert_eq!(session.read_register(0x1000).unwrap(), 0xEF);
    session.close().unwrap();
    assert_eq!(card.sent_count(), 2);
}
