//! FunctionFS completion monitor contract.
//!
//! A monitor watches the FunctionFS endpoints of userspace-backed functions
//! and pulls the gadget up once all of them have been initialized by their
//! userspace processes. It runs on its own thread and reports the outcome
//! through a registered callback, possibly long after the transaction that
//! started it has finished (for example when a userspace process restarts).

use std::{
    fmt,
    io::Result,
    path::Path,
    sync::{Condvar, Mutex, PoisonError},
    time::{Duration, Instant},
};

/// Callback invoked by the monitor with the pulled-up state.
pub type AppliedCallback = Box<dyn Fn(bool) + Send + Sync>;

/// Watcher of userspace-backed gadget functions.
pub trait Monitor: fmt::Debug + Send + Sync {
    /// Whether the monitor is running.
    fn is_running(&self) -> bool;

    /// Starts monitoring the registered FunctionFS directories and endpoints.
    fn start(&self);

    /// Stops monitoring and forgets all registered directories and endpoints.
    fn stop(&self);

    /// Registers the callback receiving the pulled-up state.
    ///
    /// Replaces a previously registered callback.
    fn register_callback(&self, callback: AppliedCallback);

    /// Blocks until the gadget has been pulled up or the timeout elapses.
    ///
    /// Returns whether the gadget was pulled up.
    fn wait_for_pull_up(&self, timeout: Duration) -> bool;

    /// Adds a FunctionFS mount directory to watch for userspace attachment.
    fn add_ffs_dir(&self, dir: &Path) -> Result<()>;

    /// Adds a FunctionFS endpoint that must appear before pull-up.
    fn add_endpoint(&self, endpoint: &Path);
}

/// Pull-up latch for implementing [`Monitor::wait_for_pull_up`].
///
/// The monitor thread calls [`set`](Self::set) whenever the pulled-up
/// state changes and waiting transactions are woken up.
#[derive(Debug, Default)]
pub struct PullUpLatch {
    pulled_up: Mutex<bool>,
    changed: Condvar,
}

impl PullUpLatch {
    /// Creates a latch in pulled-down state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the pulled-up state and wakes up waiters.
    pub fn set(&self, pulled_up: bool) {
        *self.pulled_up.lock().unwrap_or_else(PoisonError::into_inner) = pulled_up;
        self.changed.notify_all();
    }

    /// Current pulled-up state.
    pub fn get(&self) -> bool {
        *self.pulled_up.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Waits until pulled up or the timeout elapses.
    pub fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let mut pulled_up = self.pulled_up.lock().unwrap_or_else(PoisonError::into_inner);

        while !*pulled_up {
            let remaining = match deadline {
                Some(deadline) => deadline.saturating_duration_since(Instant::now()),
                None => Duration::from_secs(3600),
            };
            if remaining.is_zero() {
                break;
            }

            let (guard, _) = self.changed.wait_timeout(pulled_up, remaining).unwrap_or_else(PoisonError::into_inner);
            pulled_up = guard;
        }

        *pulled_up
    }
}
