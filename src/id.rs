//! USB vendor and product identities.

use std::fmt;

use crate::{hex_u16, Error, Functions};

/// USB gadget id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Id {
    /// Vendor id.
    pub vendor: u16,
    /// Product id.
    pub product: u16,
}

impl Id {
    /// Creates a new USB device id.
    pub const fn new(vendor: u16, product: u16) -> Self {
        Self { vendor, product }
    }

    /// Vendor id in the `0x%04x` form written to configfs.
    pub fn vendor_hex(&self) -> String {
        hex_u16(self.vendor)
    }

    /// Product id in the `0x%04x` form written to configfs.
    pub fn product_hex(&self) -> String {
        hex_u16(self.product)
    }

    /// Network function together with debug bridge on a platform with an external modem.
    pub const EXTERNAL_NETWORK_DEFAULT: Id = Id::new(QUALCOMM, 0x90e7);
    /// Network function together with debug bridge on a platform with an internal modem.
    pub const INTERNAL_NETWORK_DEFAULT: Id = Id::new(QUALCOMM, 0x90e9);
    /// Debug bridge composition on a platform with an external modem.
    pub const EXTERNAL_DEFAULT: Id = Id::new(QUALCOMM, 0x90e5);
    /// Debug bridge composition on a platform without modem.
    pub const STANDALONE_DEFAULT: Id = Id::new(QUALCOMM, 0x901d);
    /// Debug bridge composition on a platform with an internal modem.
    pub const MODEM_DEFAULT: Id = Id::new(QUALCOMM, 0x90db);
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.vendor_hex(), self.product_hex())
    }
}

const GOOGLE: u16 = 0x18d1;
const QUALCOMM: u16 = 0x05c6;

/// Supported generic function combinations and their identities.
const IDS: [(Functions, Id); 15] = [
    (Functions::ADB, Id::new(GOOGLE, 0x4ee7)),
    (Functions::MTP, Id::new(GOOGLE, 0x4ee1)),
    (Functions::ADB.union(Functions::MTP), Id::new(GOOGLE, 0x4ee2)),
    (Functions::RNDIS, Id::new(GOOGLE, 0x4ee3)),
    (Functions::ADB.union(Functions::RNDIS), Id::new(GOOGLE, 0x4ee4)),
    (Functions::PTP, Id::new(GOOGLE, 0x4ee5)),
    (Functions::ADB.union(Functions::PTP), Id::new(GOOGLE, 0x4ee6)),
    (Functions::MIDI, Id::new(GOOGLE, 0x4ee8)),
    (Functions::ADB.union(Functions::MIDI), Id::new(GOOGLE, 0x4ee9)),
    (Functions::ACCESSORY, Id::new(GOOGLE, 0x2d00)),
    (Functions::ADB.union(Functions::ACCESSORY), Id::new(GOOGLE, 0x2d01)),
    (Functions::AUDIO_SOURCE, Id::new(GOOGLE, 0x2d02)),
    (Functions::ADB.union(Functions::AUDIO_SOURCE), Id::new(GOOGLE, 0x2d03)),
    (Functions::ACCESSORY.union(Functions::AUDIO_SOURCE), Id::new(GOOGLE, 0x2d04)),
    (Functions::ADB.union(Functions::ACCESSORY).union(Functions::AUDIO_SOURCE), Id::new(GOOGLE, 0x2d05)),
];

/// Selects the identity for a requested function combination.
///
/// Combinations not listed in the fixed identity table are rejected
/// with [`Error::Unsupported`].
pub fn select_id(functions: Functions) -> Result<Id, Error> {
    IDS.iter().find(|(f, _)| *f == functions).map(|(_, id)| *id).ok_or(Error::Unsupported(functions))
}

/// All supported function combinations.
pub fn supported_functions() -> impl Iterator<Item = Functions> {
    IDS.iter().map(|(f, _)| *f)
}
