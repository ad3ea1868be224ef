//! USB gadget function sets.

use bitflags::bitflags;
use std::{
    fmt,
    io::{Error, ErrorKind},
    str::FromStr,
};

bitflags! {
    /// Set of USB functions requested for the gadget.
    ///
    /// The bit values are fixed by the gadget HAL interface.
    /// The empty set means "no functions".
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct Functions: u64 {
        /// Android debug bridge.
        const ADB = 1;
        /// Android open accessory.
        const ACCESSORY = 1 << 1;
        /// Media transfer protocol.
        const MTP = 1 << 2;
        /// MIDI.
        const MIDI = 1 << 3;
        /// Picture transfer protocol.
        const PTP = 1 << 4;
        /// RNDIS network function.
        const RNDIS = 1 << 5;
        /// Accessory audio source.
        const AUDIO_SOURCE = 1 << 6;
    }
}

impl Functions {
    /// No functions.
    pub const NONE: Self = Self::empty();
}

impl fmt::Display for Functions {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "none");
        }

        let mut first = true;
        for (name, _) in self.iter_names() {
            if !first {
                write!(f, ",")?;
            }
            write!(f, "{}", name.to_ascii_lowercase())?;
            first = false;
        }

        let unknown = self.bits() & !Self::all().bits();
        if unknown != 0 {
            if !first {
                write!(f, ",")?;
            }
            write!(f, "{unknown:#x}")?;
        }

        Ok(())
    }
}

impl FromStr for Functions {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut functions = Functions::NONE;

        for name in s.split(|c| c == ',' || c == '+' || c == '|').map(str::trim) {
            if name.is_empty() || name.eq_ignore_ascii_case("none") {
                continue;
            }

            let upper = name.to_ascii_uppercase().replace('-', "_");
            let flag = Functions::from_name(&upper)
                .ok_or_else(|| Error::new(ErrorKind::InvalidInput, format!("unknown USB function: {name}")))?;
            functions |= flag;
        }

        Ok(functions)
    }
}
