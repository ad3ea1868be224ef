//! Gadget lifecycle controller.

use std::{
    fmt, io,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex, PoisonError,
    },
    thread,
    time::Duration,
};

use crate::{
    composition::{plan, Plan},
    id::select_id,
    properties::VENDOR_CONFIG,
    Classifier, Error, Functions, Gadget, Monitor, Properties, Result, Settings,
};

/// Time the gadget stays pulled down so that the host notices the disconnect.
pub const DISCONNECT_WAIT: Duration = Duration::from_millis(100);

/// Status reported to callers.
#[derive(Debug, strum::Display, Clone, Copy, PartialEq, Eq, Hash)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    /// Request succeeded.
    Success,
    /// Request failed.
    Error,
    /// Requested function combination is not supported.
    ConfigurationNotSupported,
    /// Current functions are active.
    FunctionsApplied,
    /// Current functions are not active.
    FunctionsNotApplied,
}

/// Receiver of request outcomes.
pub trait Callback: Send + Sync {
    /// Outcome of [`UsbGadget::set_current_usb_functions`].
    fn set_current_usb_functions(&self, functions: Functions, status: Status) -> io::Result<()>;

    /// Answer to [`UsbGadget::get_current_usb_functions`].
    fn get_current_usb_functions(&self, functions: Functions, status: Status) -> io::Result<()>;
}

/// Phase of the set-functions transaction.
#[derive(Debug, Default, strum::Display, Clone, Copy, PartialEq, Eq, Hash)]
#[strum(serialize_all = "kebab-case")]
pub enum Phase {
    /// No transaction in progress.
    #[default]
    Idle,
    /// Removing the previous composition.
    TearingDown,
    /// Waiting for the host to notice the disconnect.
    Settling,
    /// Selecting the identity of the requested functions.
    SelectingIdentity,
    /// Linking the composition.
    Building,
    /// Pulling up the gadget.
    DirectActivate,
    /// Waiting for the monitor to pull up the gadget.
    AwaitingMonitor,
}

/// How a successful transaction activated the gadget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Activation {
    /// No functions requested, gadget left pulled down.
    Disconnected,
    /// Pulled up directly.
    PulledUp,
    /// Vendor composition handed over.
    VendorOverride,
    /// Monitor pulls up once userspace attached.
    Monitored,
}

/// USB gadget composition controller.
///
/// Only one set-functions transaction runs at a time; concurrent callers
/// wait for the running transaction to finish completely.
pub struct UsbGadget {
    gadget: Box<dyn Gadget>,
    monitor: Arc<dyn Monitor>,
    properties: Box<dyn Properties>,
    classifier: Classifier,
    disconnect_wait: Duration,
    transaction: Mutex<()>,
    phase: Mutex<Phase>,
    current_functions: AtomicU64,
    applied: Arc<AtomicBool>,
}

impl fmt::Debug for UsbGadget {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("UsbGadget")
            .field("gadget", &self.gadget)
            .field("current_functions", &self.current_functions())
            .field("applied", &self.functions_applied())
            .field("phase", &self.phase())
            .finish()
    }
}

impl UsbGadget {
    /// Creates a controller for the gadget, coordinating with the monitor and
    /// reading its configuration from the property store.
    pub fn new(
        gadget: impl Gadget + 'static, monitor: Arc<dyn Monitor>, properties: impl Properties + 'static,
    ) -> Self {
        Self {
            gadget: Box::new(gadget),
            monitor,
            properties: Box::new(properties),
            classifier: Classifier::default(),
            disconnect_wait: DISCONNECT_WAIT,
            transaction: Mutex::new(()),
            phase: Mutex::new(Phase::Idle),
            current_functions: AtomicU64::new(Functions::NONE.bits()),
            applied: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Uses the specified modem topology classifier.
    #[must_use]
    pub fn with_classifier(mut self, classifier: Classifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Sets the time the gadget stays pulled down between compositions.
    #[must_use]
    pub fn with_disconnect_wait(mut self, disconnect_wait: Duration) -> Self {
        self.disconnect_wait = disconnect_wait;
        self
    }

    /// Last requested functions.
    pub fn current_functions(&self) -> Functions {
        Functions::from_bits_retain(self.current_functions.load(Ordering::SeqCst))
    }

    /// Whether the last requested functions are active.
    pub fn functions_applied(&self) -> bool {
        self.applied.load(Ordering::SeqCst)
    }

    /// Phase of the running transaction.
    pub fn phase(&self) -> Phase {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn enter(&self, phase: Phase) {
        log::debug!("transaction phase {phase}");
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner) = phase;
    }

    /// Reports the last requested functions and whether they are active.
    pub fn get_current_usb_functions(&self, callback: &dyn Callback) {
        let status =
            if self.functions_applied() { Status::FunctionsApplied } else { Status::FunctionsNotApplied };

        if let Err(err) = callback.get_current_usb_functions(self.current_functions(), status) {
            log::error!("call to get_current_usb_functions callback failed: {err}");
        }
    }

    /// Pulls the gadget down immediately.
    ///
    /// The composition and the monitor are left untouched.
    pub fn reset(&self) -> Status {
        match self.gadget.pull_down() {
            Ok(()) => Status::Success,
            Err(err) => {
                log::error!("reset: unable to clear pull-up: {err}");
                Status::Error
            }
        }
    }

    /// Replaces the active composition by one providing the requested functions.
    ///
    /// The outcome is reported to the callback. When userspace-backed functions
    /// are requested, the callback is invoked after the monitor pulled up the
    /// gadget or `timeout` elapsed. The monitor keeps updating the applied state
    /// after the transaction finished.
    pub fn set_current_usb_functions(&self, functions: Functions, callback: Option<&dyn Callback>, timeout: Duration) {
        let _transaction = self.transaction.lock().unwrap_or_else(PoisonError::into_inner);

        let res = self.set_functions(functions, callback.is_some(), timeout);
        self.enter(Phase::Idle);

        let status = match res {
            Ok(activation) => {
                log::info!("USB gadget functions {functions} set ({activation:?})");
                Status::Success
            }
            Err(err) => {
                log::error!("setting USB gadget functions {functions} failed: {err}");
                err.status()
            }
        };

        if let Some(callback) = callback {
            if let Err(err) = callback.set_current_usb_functions(functions, status) {
                log::error!("call to set_current_usb_functions callback failed: {err}");
            }
        }
    }

    fn set_functions(&self, functions: Functions, wait: bool, timeout: Duration) -> Result<Activation> {
        self.current_functions.store(functions.bits(), Ordering::SeqCst);
        self.applied.store(false, Ordering::SeqCst);

        self.enter(Phase::TearingDown);
        self.tear_down()?;

        self.enter(Phase::Settling);
        thread::sleep(self.disconnect_wait);

        if functions.is_empty() {
            return Ok(Activation::Disconnected);
        }

        self.enter(Phase::SelectingIdentity);
        let id = select_id(functions)?;
        self.gadget.set_id(id)?;

        self.enter(Phase::Building);
        let settings = Settings::load(&*self.properties);
        let controller = settings.controller.clone().ok_or(Error::NoController)?;
        let topology = self.classifier.classify();

        let comp = match plan(functions, topology, &settings) {
            Plan::VendorOverride(vendor_config) => {
                self.properties.set(VENDOR_CONFIG, &vendor_config)?;
                return Ok(Activation::VendorOverride);
            }
            Plan::Compose(comp) => comp,
        };
        log::info!("composition {comp}");
        comp.apply(&*self.gadget, &*self.monitor)?;

        if !comp.needs_userspace() {
            self.enter(Phase::DirectActivate);
            self.gadget.pull_up(&controller)?;
            self.applied.store(true, Ordering::SeqCst);
            log::info!("gadget pulled up without FunctionFS functions");
            return Ok(Activation::PulledUp);
        }

        self.enter(Phase::AwaitingMonitor);
        let applied = self.applied.clone();
        self.monitor.register_callback(Box::new(move |pulled_up| applied.store(pulled_up, Ordering::SeqCst)));
        self.monitor.start();
        log::info!("started monitor for FunctionFS functions");

        if wait && !self.monitor.wait_for_pull_up(timeout) {
            return Err(Error::Timeout(timeout));
        }

        Ok(Activation::Monitored)
    }

    /// Removes the previous composition and stops the monitor.
    fn tear_down(&self) -> Result<()> {
        self.gadget.reset()?;

        if self.monitor.is_running() {
            self.monitor.stop();
        } else {
            log::debug!("monitor not running");
        }

        Ok(())
    }
}
