//! USB gadget in configfs.

use std::{
    fmt, fs,
    io::{Error, ErrorKind, Result},
    os::unix::fs::symlink,
    path::{Path, PathBuf},
};

use crate::{configfs_dir, request_module, Id};

/// Name of the gadget configuration holding the function links.
const CONFIG_NAME: &str = "b.1";

/// Prefix of function link names within the gadget configuration.
const FUNCTION_LINK_PREFIX: &str = "function";

/// Low-level USB gadget operations.
///
/// Every operation is a direct, non-transactional side effect on the gadget.
pub trait Gadget: fmt::Debug + Send + Sync {
    /// Pulls the gadget down, clears the device class and OS descriptors and
    /// removes all function links.
    ///
    /// Calling this on an already reset gadget succeeds.
    fn reset(&self) -> Result<()>;

    /// Links the named function as function number `index` of the configuration.
    fn link_function(&self, function: &str, index: usize) -> Result<()>;

    /// Sets the vendor and product id.
    fn set_id(&self, id: Id) -> Result<()>;

    /// Enables Microsoft OS descriptors.
    fn enable_os_descriptors(&self) -> Result<()>;

    /// Binds the gadget to the named USB device controller (UDC), presenting it to the host.
    fn pull_up(&self, udc: &str) -> Result<()>;

    /// Unbinds the gadget from its USB device controller (UDC).
    ///
    /// Succeeds if the gadget is not bound.
    fn pull_down(&self) -> Result<()>;
}

/// USB gadget defined in configfs.
#[derive(Clone)]
pub struct ConfigFsGadget {
    dir: PathBuf,
}

impl fmt::Debug for ConfigFsGadget {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ConfigFsGadget").field("dir", &self.dir).finish()
    }
}

impl ConfigFsGadget {
    /// Uses the gadget at the specified configfs directory.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref().to_path_buf();
        if !dir.join("os_desc").is_dir() {
            log::error!("configfs setup not done yet at {}", dir.display());
        }
        Self { dir }
    }

    /// Uses the named gadget below the `usb_gadget` directory of the mounted configfs.
    pub fn open(name: impl AsRef<Path>) -> Result<Self> {
        let _ = request_module("libcomposite");

        let usb_gadget_dir = configfs_dir()?.join("usb_gadget");
        if !usb_gadget_dir.is_dir() {
            return Err(Error::new(ErrorKind::NotFound, "usb_gadget not found in configfs"));
        }

        Ok(Self::new(usb_gadget_dir.join(name)))
    }

    /// Path of this USB gadget in configfs.
    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Path of the configuration holding the function links.
    pub fn config_path(&self) -> PathBuf {
        self.dir.join("configs").join(CONFIG_NAME)
    }

    /// Name of the USB device controller (UDC) the gadget is bound to.
    pub fn udc(&self) -> Result<Option<String>> {
        let udc = fs::read_to_string(self.dir.join("UDC"))?;
        let udc = udc.trim();
        if udc.is_empty() || udc == "none" {
            Ok(None)
        } else {
            Ok(Some(udc.to_string()))
        }
    }

    /// Names of the linked functions in link order.
    pub fn linked_functions(&self) -> Result<Vec<String>> {
        let mut links = Vec::new();
        for entry in fs::read_dir(self.config_path())? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            let Some(index) = name.strip_prefix(FUNCTION_LINK_PREFIX).and_then(|i| i.parse::<usize>().ok()) else {
                continue;
            };
            if !entry.file_type()?.is_symlink() {
                continue;
            }

            let target = fs::read_link(entry.path())?;
            let function = target.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
            links.push((index, function));
        }

        links.sort();
        Ok(links.into_iter().map(|(_, function)| function).collect())
    }

    fn write(&self, name: impl AsRef<Path>, value: impl AsRef<[u8]>) -> Result<()> {
        let path = self.dir.join(name);
        let value = value.as_ref();
        log::debug!("setting {} to {}", path.display(), String::from_utf8_lossy(value));
        fs::write(path, value)
    }

    /// Removes all function links from the configuration.
    fn unlink_functions(&self) -> Result<()> {
        for entry in fs::read_dir(self.config_path())? {
            let entry = entry?;
            if !entry.file_name().to_string_lossy().starts_with(FUNCTION_LINK_PREFIX) {
                continue;
            }
            if entry.file_type()?.is_symlink() {
                log::debug!("removing function link {}", entry.path().display());
                fs::remove_file(entry.path())?;
            }
        }
        Ok(())
    }
}

impl Gadget for ConfigFsGadget {
    fn reset(&self) -> Result<()> {
        self.pull_down()?;

        self.write("bDeviceClass", "0")?;
        self.write("bDeviceSubClass", "0")?;
        self.write("bDeviceProtocol", "0")?;
        self.write("os_desc/use", "0")?;

        self.unlink_functions()
    }

    fn link_function(&self, function: &str, index: usize) -> Result<()> {
        let function_dir = self.dir.join("functions").join(function);
        let link = self.config_path().join(format!("{FUNCTION_LINK_PREFIX}{index}"));
        log::debug!("linking function {} at {}", function_dir.display(), link.display());
        symlink(&function_dir, &link)
            .map_err(|err| Error::new(err.kind(), format!("cannot link function {function}: {err}")))
    }

    fn set_id(&self, id: Id) -> Result<()> {
        self.write("idVendor", id.vendor_hex())?;
        self.write("idProduct", id.product_hex())
    }

    fn enable_os_descriptors(&self) -> Result<()> {
        self.write("os_desc/use", "1")
    }

    fn pull_up(&self, udc: &str) -> Result<()> {
        log::debug!("binding gadget {} to UDC {udc}", self.dir.display());
        self.write("UDC", udc)
    }

    fn pull_down(&self) -> Result<()> {
        match self.write("UDC", "none") {
            Ok(()) => Ok(()),
            Err(err) if err.raw_os_error() == Some(libc::ENODEV) => Ok(()),
            Err(err) => Err(err),
        }
    }
}
