//! Transaction errors.

use std::{io, time::Duration};
use thiserror::Error;

use crate::{Functions, Status};

/// Error of a gadget composition transaction.
#[derive(Error, Debug)]
pub enum Error {
    /// Writing to configfs, sysfs or a FunctionFS watch failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The requested function combination has no identity mapping.
    #[error("function combination {0} is not supported")]
    Unsupported(Functions),

    /// The monitor did not confirm pull-up in time.
    #[error("functions not applied within {0:?}")]
    Timeout(Duration),

    /// No USB device controller (UDC) name is configured.
    #[error("USB device controller (UDC) name not defined")]
    NoController,
}

impl Error {
    /// Status code reported to the caller for this error.
    pub fn status(&self) -> Status {
        match self {
            Self::Unsupported(_) => Status::ConfigurationNotSupported,
            _ => Status::Error,
        }
    }
}

/// Result of a gadget composition transaction.
pub type Result<T> = std::result::Result<T, Error>;
