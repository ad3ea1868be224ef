//! USB device controller (UDC).

use std::{
    fmt, fs,
    io::{Error, ErrorKind, Result},
    path::{Path, PathBuf},
};

/// Default sysfs directory listing the USB device controllers.
pub const UDC_CLASS_DIR: &str = "/sys/class/udc";

/// USB device controller (UDC).
///
/// Call [`udcs`] to obtain the controllers available on the system.
#[derive(Clone)]
pub struct Udc {
    dir: PathBuf,
}

impl fmt::Debug for Udc {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Udc").field("name", &self.name()).finish()
    }
}

impl Udc {
    /// The name of the USB device controller, as written to a gadget's `UDC` attribute.
    pub fn name(&self) -> String {
        self.dir.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default()
    }

    /// Current state of the USB device controller.
    ///
    /// Not all controllers support reporting all states.
    pub fn state(&self) -> Result<UdcState> {
        Ok(fs::read_to_string(self.dir.join("state"))?.trim().parse().unwrap_or_default())
    }

    /// Name of the gadget driver currently bound to this controller, if any.
    pub fn function(&self) -> Result<Option<String>> {
        let data = fs::read_to_string(self.dir.join("function"))?;
        let data = data.trim_matches(|c| c == '\n' || c == ' ' || c == '\0');
        Ok((!data.is_empty()).then(|| data.to_string()))
    }
}

/// USB device controller (UDC) connection state.
#[derive(
    Default, Debug, strum::Display, strum::EnumString, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[non_exhaustive]
pub enum UdcState {
    /// Not attached.
    #[strum(serialize = "not attached")]
    NotAttached,
    /// Attached.
    #[strum(serialize = "attached")]
    Attached,
    /// Powered.
    #[strum(serialize = "powered")]
    Powered,
    /// Default.
    #[strum(serialize = "default")]
    Default,
    /// Addressed.
    #[strum(serialize = "addressed")]
    Addressed,
    /// Configured.
    #[strum(serialize = "configured")]
    Configured,
    /// Suspended.
    #[strum(serialize = "suspended")]
    Suspended,
    /// Unknown state.
    #[default]
    #[strum(serialize = "UNKNOWN")]
    Unknown,
}

/// Gets the USB device controllers (UDCs) listed in the specified sysfs class directory.
///
/// A missing directory yields no controllers.
pub fn udcs_at(class_dir: impl AsRef<Path>) -> Result<Vec<Udc>> {
    let class_dir = class_dir.as_ref();
    if !class_dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut udcs = Vec::new();
    for entry in fs::read_dir(class_dir)? {
        let Ok(entry) = entry else { continue };
        udcs.push(Udc { dir: entry.path() });
    }

    udcs.sort_by_key(|udc| udc.name());
    Ok(udcs)
}

/// Gets the available USB device controllers (UDCs) in the system, sorted by name.
pub fn udcs() -> Result<Vec<Udc>> {
    if !Path::new("/sys/class").is_dir() {
        return Err(Error::new(ErrorKind::NotFound, "sysfs is not available"));
    }
    udcs_at(UDC_CLASS_DIR)
}

/// The default USB device controller (UDC) in the system by alphabetical sorting.
///
/// A not found error is returned if no UDC is present.
pub fn default_udc() -> Result<Udc> {
    udcs()?
        .into_iter()
        .next()
        .ok_or_else(|| Error::new(ErrorKind::NotFound, "no USB device controller (UDC) available"))
}
