//! Card classes
//!
//! Card ids select the class of card on the bus. The ids below are the ones
//! shipped by the card vendor; any other id is still accepted numerically.

use std::fmt;
use std::str::FromStr;

/// Known card classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CardType {
    Usb16Pio,
    UsbLabkit,
    Usb16Pr,
    Usb8Pr,
    Usb4Pr,
    Usb8Pi,
    Usb8Ro,
    Usb16Pi,
    Usb16Ro,
    Usb32Pi,
    Usb32Ro,
}

impl CardType {
    pub const ALL: [CardType; 11] = [
        CardType::Usb16Pio,
        CardType::UsbLabkit,
        CardType::Usb16Pr,
        CardType::Usb8Pr,
        CardType::Usb4Pr,
        CardType::Usb8Pi,
        CardType::Usb8Ro,
        CardType::Usb16Pi,
        CardType::Usb16Ro,
        CardType::Usb32Pi,
        CardType::Usb32Ro,
    ];

    /// Card id passed to `open`
    pub fn id(self) -> u32 {
        match self {
            CardType::Usb16Pio => 0x01,
            CardType::UsbLabkit => 0x02,
            CardType::Usb16Pr => 0x03,
            CardType::Usb8Pr => 0x06,
            CardType::Usb4Pr => 0x07,
            CardType::Usb8Pi => 0x08,
            CardType::Usb8Ro => 0x09,
            CardType::Usb16Pi => 0x0A,
            CardType::Usb16Ro => 0x0B,
            CardType::Usb32Pi => 0x0C,
            CardType::Usb32Ro => 0x0D,
        }
    }

    /// Vendor name, e.g. `USB_16PIO`
    pub fn name(self) -> &'static str {
        match self {
            CardType::Usb16Pio => "USB_16PIO",
            CardType::UsbLabkit => "USB_LABKIT",
            CardType::Usb16Pr => "USB_16PR",
            CardType::Usb8Pr => "USB_8PR",
            CardType::Usb4Pr => "USB_4PR",
            CardType::Usb8Pi => "USB_8PI",
            CardType::Usb8Ro => "USB_8RO",
            CardType::Usb16Pi => "USB_16PI",
            CardType::Usb16Ro => "USB_16RO",
            CardType::Usb32Pi => "USB_32PI",
            CardType::Usb32Ro => "USB_32RO",
        }
    }

    pub fn from_id(id: u32) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.id() == id)
    }
}

impl fmt::Display for CardType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CardType {
    type Err = String;

    /// Accepts `USB_16PIO`, `usb_16pio` or the bare suffix `16pio`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.to_ascii_uppercase();
        let full = if upper.starts_with("USB_") {
            upper
        } else {
            format!("USB_{upper}")
        };
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.name() == full)
            .ok_or_else(|| format!("unknown card type: \"{s}\""))
    }
}

/// Parse a card id given as a card name or a number (decimal or 0x-hex)
pub fn parse_card_id(s: &str) -> Result<u32, String> {
    if let Ok(card) = s.parse::<CardType>() {
        return Ok(card.id());
    }
    parse_number(s).map_err(|_| {
        format!("unknown card: \"{s}\". Use a name like USB_16PIO or a numeric id")
    })
}

/// Parse a decimal or `0x`-prefixed hex number
pub fn parse_number(s: &str) -> Result<u32, String> {
    let result = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse::<u32>(),
    };
    result.map_err(|e| format!("invalid number \"{s}\": {e}"))
}
