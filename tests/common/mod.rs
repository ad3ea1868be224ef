//! Common test functions.
#![allow(dead_code)]

use std::{
    fs,
    io::{Error, ErrorKind, Result},
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex, Once,
    },
    thread,
    time::Duration,
};
use tempfile::TempDir;

use gadget_hal::{
    properties::CONTROLLER, AppliedCallback, Callback, Classifier, Functions, Gadget, Id, MemoryProperties,
    Monitor, PullUpLatch, Status, UsbGadget,
};

pub const UDC: &str = "a600000.dwc3";

pub fn init() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

/// Operation performed on a [`FakeGadget`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Reset,
    Link(String, usize),
    SetId(Id),
    OsDescriptors,
    PullUp(String),
    PullDown,
}

#[derive(Debug, Default)]
struct GadgetState {
    ops: Vec<Op>,
    fail_reset: bool,
    fail_pull_down: bool,
    fail_link: Option<String>,
}

/// Gadget recording all operations.
#[derive(Debug, Clone, Default)]
pub struct FakeGadget(Arc<Mutex<GadgetState>>);

impl FakeGadget {
    pub fn ops(&self) -> Vec<Op> {
        self.0.lock().unwrap().ops.clone()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().ops.clear();
    }

    pub fn links(&self) -> Vec<String> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                Op::Link(function, _) => Some(function),
                _ => None,
            })
            .collect()
    }

    pub fn fail_reset(&self) {
        self.0.lock().unwrap().fail_reset = true;
    }

    pub fn fail_pull_down(&self) {
        self.0.lock().unwrap().fail_pull_down = true;
    }

    pub fn fail_link(&self, function: &str) {
        self.0.lock().unwrap().fail_link = Some(function.to_string());
    }

    fn record(&self, op: Op) {
        self.0.lock().unwrap().ops.push(op);
    }
}

impl Gadget for FakeGadget {
    fn reset(&self) -> Result<()> {
        if self.0.lock().unwrap().fail_reset {
            return Err(Error::new(ErrorKind::PermissionDenied, "reset failed"));
        }
        self.record(Op::Reset);
        Ok(())
    }

    fn link_function(&self, function: &str, index: usize) -> Result<()> {
        if self.0.lock().unwrap().fail_link.as_deref() == Some(function) {
            return Err(Error::new(ErrorKind::NotFound, format!("no function {function}")));
        }
        self.record(Op::Link(function.to_string(), index));
        Ok(())
    }

    fn set_id(&self, id: Id) -> Result<()> {
        self.record(Op::SetId(id));
        Ok(())
    }

    fn enable_os_descriptors(&self) -> Result<()> {
        self.record(Op::OsDescriptors);
        Ok(())
    }

    fn pull_up(&self, udc: &str) -> Result<()> {
        self.record(Op::PullUp(udc.to_string()));
        Ok(())
    }

    fn pull_down(&self) -> Result<()> {
        if self.0.lock().unwrap().fail_pull_down {
            return Err(Error::new(ErrorKind::PermissionDenied, "pull-down failed"));
        }
        self.record(Op::PullDown);
        Ok(())
    }
}

#[derive(Default)]
struct MonitorState {
    running: AtomicBool,
    callback: Mutex<Option<Arc<AppliedCallback>>>,
    latch: PullUpLatch,
    confirm_after: Mutex<Option<Duration>>,
    ffs_dirs: Mutex<Vec<PathBuf>>,
    endpoints: Mutex<Vec<PathBuf>>,
    starts: AtomicUsize,
    stops: AtomicUsize,
}

/// Monitor that confirms pull-up on its own thread after a configurable delay.
#[derive(Clone, Default)]
pub struct FakeMonitor(Arc<MonitorState>);

impl std::fmt::Debug for FakeMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("FakeMonitor").field("running", &self.is_running()).finish()
    }
}

impl FakeMonitor {
    /// Monitor that never confirms pull-up.
    pub fn silent() -> Self {
        Self::default()
    }

    /// Monitor that confirms pull-up after the delay once started.
    pub fn confirming(delay: Duration) -> Self {
        let this = Self::default();
        *this.0.confirm_after.lock().unwrap() = Some(delay);
        this
    }

    pub fn starts(&self) -> usize {
        self.0.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.0.stops.load(Ordering::SeqCst)
    }

    pub fn ffs_dirs(&self) -> Vec<PathBuf> {
        self.0.ffs_dirs.lock().unwrap().clone()
    }

    pub fn endpoints(&self) -> Vec<PathBuf> {
        self.0.endpoints.lock().unwrap().clone()
    }

    /// Reports a pulled-up state change, as if the userspace process attached or went away.
    pub fn report(&self, pulled_up: bool) {
        Self::notify(&self.0, pulled_up);
    }

    fn notify(state: &MonitorState, pulled_up: bool) {
        let callback = state.callback.lock().unwrap().clone();
        if let Some(callback) = callback {
            callback(pulled_up);
        }
        state.latch.set(pulled_up);
    }
}

impl Monitor for FakeMonitor {
    fn is_running(&self) -> bool {
        self.0.running.load(Ordering::SeqCst)
    }

    fn start(&self) {
        self.0.running.store(true, Ordering::SeqCst);
        self.0.starts.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = *self.0.confirm_after.lock().unwrap() {
            let state = self.0.clone();
            thread::spawn(move || {
                thread::sleep(delay);
                if state.running.load(Ordering::SeqCst) {
                    Self::notify(&state, true);
                }
            });
        }
    }

    fn stop(&self) {
        self.0.running.store(false, Ordering::SeqCst);
        self.0.stops.fetch_add(1, Ordering::SeqCst);
        self.0.latch.set(false);
        self.0.ffs_dirs.lock().unwrap().clear();
        self.0.endpoints.lock().unwrap().clear();
    }

    fn register_callback(&self, callback: AppliedCallback) {
        *self.0.callback.lock().unwrap() = Some(Arc::new(callback));
    }

    fn wait_for_pull_up(&self, timeout: Duration) -> bool {
        self.0.latch.wait(timeout)
    }

    fn add_ffs_dir(&self, dir: &Path) -> Result<()> {
        self.0.ffs_dirs.lock().unwrap().push(dir.to_path_buf());
        Ok(())
    }

    fn add_endpoint(&self, endpoint: &Path) {
        self.0.endpoints.lock().unwrap().push(endpoint.to_path_buf());
    }
}

/// Callback recording all reports.
#[derive(Debug, Default)]
pub struct Recorder {
    pub set: Mutex<Vec<(Functions, Status)>>,
    pub get: Mutex<Vec<(Functions, Status)>>,
}

impl Recorder {
    pub fn set_reports(&self) -> Vec<(Functions, Status)> {
        self.set.lock().unwrap().clone()
    }

    pub fn get_reports(&self) -> Vec<(Functions, Status)> {
        self.get.lock().unwrap().clone()
    }
}

impl Callback for Recorder {
    fn set_current_usb_functions(&self, functions: Functions, status: Status) -> Result<()> {
        self.set.lock().unwrap().push((functions, status));
        Ok(())
    }

    fn get_current_usb_functions(&self, functions: Functions, status: Status) -> Result<()> {
        self.get.lock().unwrap().push((functions, status));
        Ok(())
    }
}

/// Sysfs tree describing the modem topology of a platform.
pub struct Platform {
    pub dir: TempDir,
}

impl Platform {
    pub fn new() -> Self {
        Self { dir: TempDir::new().expect("cannot create temporary directory") }
    }

    pub fn esoc_dir(&self) -> PathBuf {
        self.dir.path().join("esoc")
    }

    pub fn machine_path(&self) -> PathBuf {
        self.dir.path().join("machine")
    }

    /// Adds an esoc device directory, optionally with an `esoc_name` attribute.
    pub fn with_esoc(self, entry: &str, name: Option<&str>) -> Self {
        let dir = self.esoc_dir().join(entry);
        fs::create_dir_all(&dir).unwrap();
        if let Some(name) = name {
            fs::write(dir.join("esoc_name"), format!("{name}\n")).unwrap();
        }
        self
    }

    pub fn with_machine(self, machine: &str) -> Self {
        fs::write(self.machine_path(), format!("{machine}\n")).unwrap();
        self
    }

    pub fn classifier(&self) -> Classifier {
        Classifier::new(self.esoc_dir(), self.machine_path())
    }
}

/// Controller wired to fakes.
pub struct Harness {
    pub gadget: FakeGadget,
    pub monitor: FakeMonitor,
    pub props: Arc<MemoryProperties>,
    pub recorder: Recorder,
    pub usb: UsbGadget,
    pub platform: Platform,
}

impl Harness {
    pub fn new(platform: Platform, monitor: FakeMonitor) -> Self {
        Self::with_properties(platform, monitor, MemoryProperties::new().with(CONTROLLER, UDC))
    }

    pub fn with_properties(platform: Platform, monitor: FakeMonitor, props: MemoryProperties) -> Self {
        init();

        let gadget = FakeGadget::default();
        let props = Arc::new(props);
        let usb = UsbGadget::new(gadget.clone(), Arc::new(monitor.clone()), props.clone())
            .with_classifier(platform.classifier())
            .with_disconnect_wait(Duration::from_millis(1));

        Self { gadget, monitor, props, recorder: Recorder::default(), usb, platform }
    }

    pub fn set(&self, functions: Functions, timeout: Duration) -> Vec<(Functions, Status)> {
        self.recorder.set.lock().unwrap().clear();
        self.usb.set_current_usb_functions(functions, Some(&self.recorder), timeout);
        self.recorder.set_reports()
    }
}
