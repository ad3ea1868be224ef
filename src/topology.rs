//! Modem topology classification.

use std::{
    fs,
    path::{Path, PathBuf},
};

/// Default directory enumerating external SoC (esoc) modem devices.
pub const ESOC_DEVICE_DIR: &str = "/sys/bus/esoc/devices";

/// Default file holding the machine identity of the SoC.
pub const SOC_MACHINE_PATH: &str = "/sys/devices/soc0/machine";

/// Modem attachment configuration of the platform.
#[derive(Debug, strum::Display, strum::EnumString, Clone, Copy, PartialEq, Eq, Hash)]
#[strum(serialize_all = "kebab-case")]
pub enum Topology {
    /// Modem integrated into the SoC.
    Internal,
    /// External modem module only.
    External,
    /// Integrated modem and external modem module.
    InternalExternal,
    /// No modem.
    None,
}

impl Topology {
    /// Whether an external modem module is attached.
    pub fn has_external(self) -> bool {
        matches!(self, Self::External | Self::InternalExternal)
    }
}

/// Probes sysfs to classify the modem topology.
///
/// The classifier keeps no state and may be called repeatedly.
/// Missing sysfs files are treated as absent evidence, never as errors.
#[derive(Debug, Clone)]
pub struct Classifier {
    esoc_dir: PathBuf,
    machine_path: PathBuf,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(ESOC_DEVICE_DIR, SOC_MACHINE_PATH)
    }
}

impl Classifier {
    /// Creates a classifier probing the specified esoc device directory and machine identity file.
    pub fn new(esoc_dir: impl AsRef<Path>, machine_path: impl AsRef<Path>) -> Self {
        Self { esoc_dir: esoc_dir.as_ref().to_path_buf(), machine_path: machine_path.as_ref().to_path_buf() }
    }

    /// Classifies the modem topology.
    pub fn classify(&self) -> Topology {
        let mut topology = if self.has_external_modem() { Topology::External } else { Topology::Internal };

        match fs::read_to_string(&self.machine_path) {
            Ok(machine) => {
                let machine = machine.trim();
                if is_standalone_machine(machine) {
                    if topology == Topology::Internal {
                        topology = Topology::None;
                    }
                } else if topology == Topology::External {
                    topology = Topology::InternalExternal;
                }
            }
            Err(err) => log::debug!("cannot read machine identity {}: {err}", self.machine_path.display()),
        }

        log::info!("modem topology is {topology}");
        topology
    }

    /// Scans esoc devices for an external modem module.
    fn has_external_modem(&self) -> bool {
        let entries = match fs::read_dir(&self.esoc_dir) {
            Ok(entries) => entries,
            Err(err) => {
                log::debug!("no esoc devices at {}: {err}", self.esoc_dir.display());
                return false;
            }
        };

        for entry in entries {
            let Ok(entry) = entry else { continue };
            if entry.file_name().to_string_lossy().starts_with('.') {
                continue;
            }

            let Ok(name) = fs::read_to_string(entry.path().join("esoc_name")) else { continue };
            let name = name.trim();
            if name.contains("MDM") || name.contains("SDX") {
                log::debug!("found external modem {name} at {}", entry.path().display());
                return true;
            }
        }

        false
    }
}

/// Whether the machine identity denotes a platform variant without integrated modem.
fn is_standalone_machine(machine: &str) -> bool {
    machine.contains("SDA") || machine.ends_with('P')
}
