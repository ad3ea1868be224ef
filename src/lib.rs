//! This library composes **USB gadgets** on Linux modem platforms from a
//! requested set of USB functions and presents them to the host.
//!
//! A request to change the active functions tears down the previous
//! composition, waits for the host to notice the disconnect, selects the
//! vendor and product id, links the functions in configfs in the order the
//! modem topology of the platform requires and finally pulls the gadget up,
//! either directly or, when userspace-backed FunctionFS functions are part
//! of the composition, through an external [`Monitor`].
//!
//! ### Requirements
//!
//! The Linux kernel configuration options `CONFIG_USB_GADGET` and
//! `CONFIG_USB_CONFIGFS` need to be enabled, the `configfs` filesystem must
//! be mounted and the gadget directory with its function instances must
//! already exist.
//!
//! ### Usage
//!
//! Create a [`UsbGadget`] from a [`Gadget`] backend (normally
//! [`ConfigFsGadget`]), a [`Monitor`] and a [`Properties`] store, then call
//! [`UsbGadget::set_current_usb_functions`].

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

#[cfg(not(target_os = "linux"))]
compile_error!("gadget_hal only supports Linux");

use proc_mounts::MountIter;
use std::{
    ffi::OsStr,
    io::{Error as IoError, ErrorKind, Result as IoResult},
    path::PathBuf,
    process::Command,
};

pub mod composition;
pub mod properties;

mod controller;
pub use controller::*;

mod error;
pub use error::*;

mod functions;
pub use functions::*;

mod gadget;
pub use gadget::*;

mod id;
pub use id::*;

mod monitor;
pub use monitor::*;

mod topology;
pub use topology::*;

mod udc;
pub use udc::*;

pub use properties::{AndroidProperties, MemoryProperties, Properties, Settings};

/// 16-bit value to hexadecimal notation.
fn hex_u16(value: u16) -> String {
    format!("0x{:04x}", value)
}

/// Returns where configfs is mounted.
fn configfs_dir() -> IoResult<PathBuf> {
    for mount in MountIter::new()? {
        let Ok(mount) = mount else { continue };
        if mount.fstype == "configfs" {
            return Ok(mount.dest);
        }
    }

    Err(IoError::new(ErrorKind::NotFound, "configfs is not mounted"))
}

/// Request a kernel module to be loaded.
fn request_module(name: impl AsRef<OsStr>) -> IoResult<()> {
    let mut res = Command::new("modprobe").arg("-q").arg(name.as_ref()).output();

    match res {
        Err(err) if err.kind() == ErrorKind::NotFound => {
            res = Command::new("/sbin/modprobe").arg("-q").arg(name.as_ref()).output();
        }
        _ => (),
    }

    match res {
        Ok(out) if out.status.success() => Ok(()),
        Ok(_) => Err(IoError::new(ErrorKind::Other, "modprobe failed")),
        Err(err) => Err(err),
    }
}
