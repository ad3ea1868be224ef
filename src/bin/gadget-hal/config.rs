//! Configuration file.

use serde::Deserialize;
use std::{collections::HashMap, fs, io::Result, path::Path, path::PathBuf};

use gadget_hal::{Classifier, MemoryProperties, ESOC_DEVICE_DIR, SOC_MACHINE_PATH, UDC_CLASS_DIR};

/// Name of the gadget below `usb_gadget` in configfs when no directory is configured.
pub const DEFAULT_GADGET_NAME: &str = "g1";

/// Contents of the TOML configuration file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Gadget directory in configfs.
    pub gadget_dir: Option<PathBuf>,
    /// Directory enumerating esoc modem devices.
    pub esoc_dir: PathBuf,
    /// SoC machine identity file.
    pub machine_path: PathBuf,
    /// Directory listing the USB device controllers.
    pub udc_class_dir: PathBuf,
    /// Use the Android system properties instead of the `properties` table.
    pub android_properties: bool,
    /// System properties.
    pub properties: HashMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gadget_dir: None,
            esoc_dir: ESOC_DEVICE_DIR.into(),
            machine_path: SOC_MACHINE_PATH.into(),
            udc_class_dir: UDC_CLASS_DIR.into(),
            android_properties: false,
            properties: HashMap::new(),
        }
    }
}

impl Config {
    /// Loads the configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        toml::from_str(&text).map_err(std::io::Error::other)
    }

    /// Topology classifier probing the configured paths.
    pub fn classifier(&self) -> Classifier {
        Classifier::new(&self.esoc_dir, &self.machine_path)
    }

    /// In-memory property store seeded from the `properties` table.
    pub fn memory_properties(&self) -> MemoryProperties {
        self.properties.iter().collect()
    }
}
