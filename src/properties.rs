//! System property access.
//!
//! The controller reads its configuration from a key/value property store
//! at the start of every transaction.

use std::{
    collections::HashMap,
    fmt,
    io::{Error, ErrorKind, Result},
    process::Command,
    sync::{Arc, Mutex, PoisonError},
};

/// Name of the USB device controller (UDC) used for pull-up.
pub const CONTROLLER: &str = "vendor.usb.controller";
/// Persistent override of the USB device controller name, consulted at startup.
pub const PERSIST_CONTROLLER: &str = "persist.vendor.usb.controller";
/// Function name of the RNDIS network function.
pub const RNDIS_FUNC_NAME: &str = "vendor.usb.rndis.func.name";
/// Function driver of the modem network and data-path-log instances.
pub const RMNET_FUNC_NAME: &str = "vendor.usb.rmnet.func.name";
/// Instance name of the modem network function.
pub const RMNET_INST_NAME: &str = "vendor.usb.rmnet.inst.name";
/// Instance name of the data-path-log function.
pub const DPL_INST_NAME: &str = "vendor.usb.dpl.inst.name";
/// Vendor composition replacing the debug bridge default composition.
pub const PERSIST_VENDOR_CONFIG: &str = "persist.vendor.usb.config";
/// Active vendor composition, acted upon by the vendor init scripts.
pub const VENDOR_CONFIG: &str = "vendor.usb.config";

/// Key/value property store.
pub trait Properties: fmt::Debug + Send + Sync {
    /// Gets a property value.
    ///
    /// Unset and empty properties both yield `None`.
    fn get(&self, key: &str) -> Option<String>;

    /// Sets a property value.
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

impl<P: Properties + ?Sized> Properties for Arc<P> {
    fn get(&self, key: &str) -> Option<String> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        (**self).set(key, value)
    }
}

/// Android system properties accessed through `getprop` and `setprop`.
#[derive(Debug, Default, Clone)]
pub struct AndroidProperties;

impl AndroidProperties {
    fn run(tool: &str, args: &[&str]) -> Result<Vec<u8>> {
        let mut res = Command::new(tool).args(args).output();

        match res {
            Err(err) if err.kind() == ErrorKind::NotFound => {
                res = Command::new(format!("/system/bin/{tool}")).args(args).output();
            }
            _ => (),
        }

        match res {
            Ok(out) if out.status.success() => Ok(out.stdout),
            Ok(_) => Err(Error::new(ErrorKind::Other, format!("{tool} failed"))),
            Err(err) => Err(err),
        }
    }
}

impl Properties for AndroidProperties {
    fn get(&self, key: &str) -> Option<String> {
        match Self::run("getprop", &[key]) {
            Ok(out) => {
                let value = String::from_utf8_lossy(&out).trim().to_string();
                (!value.is_empty()).then_some(value)
            }
            Err(err) => {
                log::warn!("cannot get property {key}: {err}");
                None
            }
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        log::debug!("setting property {key} to {value}");
        Self::run("setprop", &[key, value]).map(|_| ())
    }
}

/// In-memory property store.
#[derive(Debug, Default)]
pub struct MemoryProperties(Mutex<HashMap<String, String>>);

impl MemoryProperties {
    /// Creates an empty property store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a property value.
    #[must_use]
    pub fn with(self, key: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.insert(key, value);
        self
    }

    /// Sets a property value.
    pub fn insert(&self, key: impl AsRef<str>, value: impl AsRef<str>) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.as_ref().to_string(), value.as_ref().to_string());
    }

    /// Removes a property.
    pub fn remove(&self, key: impl AsRef<str>) {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).remove(key.as_ref());
    }
}

impl<K: AsRef<str>, V: AsRef<str>> FromIterator<(K, V)> for MemoryProperties {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let props = Self::new();
        for (key, value) in iter {
            props.insert(key, value);
        }
        props
    }
}

impl Properties for MemoryProperties {
    fn get(&self, key: &str) -> Option<String> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).get(key).filter(|v| !v.is_empty()).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.insert(key, value);
        Ok(())
    }
}

/// Configuration snapshot taken at the start of a transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    /// USB device controller (UDC) name.
    pub controller: Option<String>,
    /// RNDIS function name.
    pub rndis_function: Option<String>,
    /// Modem network function driver.
    pub rmnet_function: String,
    /// Modem network function instance.
    pub rmnet_instance: String,
    /// Data-path-log function instance.
    pub dpl_instance: String,
    /// Vendor composition replacing the debug bridge default composition.
    pub vendor_config: Option<String>,
}

impl Settings {
    /// Reads the settings from the property store.
    pub fn load(props: &dyn Properties) -> Self {
        let rmnet_instance = props.get(RMNET_INST_NAME).unwrap_or_else(|| {
            log::error!("rmnet instance not defined");
            "rmnet".to_string()
        });

        let dpl_instance = props.get(DPL_INST_NAME).unwrap_or_else(|| {
            log::error!("dpl instance not defined");
            "dpl".to_string()
        });

        Self {
            controller: props.get(CONTROLLER),
            rndis_function: props.get(RNDIS_FUNC_NAME),
            rmnet_function: props.get(RMNET_FUNC_NAME).unwrap_or_default(),
            rmnet_instance,
            dpl_instance,
            vendor_config: props.get(PERSIST_VENDOR_CONFIG),
        }
    }

    /// Function link name of the modem network function instance.
    pub fn rmnet_link(&self) -> String {
        format!("{}.{}", self.rmnet_function, self.rmnet_instance)
    }

    /// Function link name of the data-path-log function instance.
    pub fn dpl_link(&self) -> String {
        format!("{}.{}", self.rmnet_function, self.dpl_instance)
    }
}
