//! Background deadlock detection.
//!
//! A single named thread wakes every `detection_interval_ms`, resolves any
//! deadlocks in the lock table, and goes back to sleep. Shutdown is signalled
//! through a condvar so the thread exits without waiting out its interval.

use parking_lot::{Condvar, Mutex};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info};

use stratalock_core::Result;

use crate::database::config::saturating_millis;
use crate::database::DatabaseInner;

/// Thread name of the detector.
pub const DETECTOR_THREAD_NAME: &str = "stratalock-deadlock";

#[derive(Default)]
struct ShutdownSignal {
    stopped: Mutex<bool>,
    wake: Condvar,
}

/// Handle to the running detector thread.
///
/// The thread holds only a weak reference to the database; it exits on
/// [`stop`](Self::stop), on drop, or once the database is gone.
pub struct DeadlockDetector {
    signal: Arc<ShutdownSignal>,
    handle: Option<JoinHandle<()>>,
    interval: Duration,
}

impl DeadlockDetector {
    /// Spawn the detector thread.
    pub(crate) fn spawn(db: Weak<DatabaseInner>, interval: Duration) -> Result<Self> {
        let signal = Arc::new(ShutdownSignal::default());
        let thread_signal = Arc::clone(&signal);

        let handle = std::thread::Builder::new()
            .name(DETECTOR_THREAD_NAME.to_string())
            .spawn(move || detector_loop(&db, &thread_signal, interval))?;

        info!(interval_ms = saturating_millis(interval), "deadlock detector started");
        Ok(Self {
            signal,
            handle: Some(handle),
            interval,
        })
    }

    /// Scan period.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Check if the thread has not been stopped.
    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Signal the thread to exit and join it.
    pub fn stop(&mut self) {
        {
            let mut stopped = self.signal.stopped.lock();
            *stopped = true;
            self.signal.wake.notify_all();
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
            debug!("deadlock detector stopped");
        }
    }
}

impl Drop for DeadlockDetector {
    fn drop(&mut self) {
        self.stop();
    }
}

fn detector_loop(db: &Weak<DatabaseInner>, signal: &ShutdownSignal, interval: Duration) {
    loop {
        {
            let mut stopped = signal.stopped.lock();
            if !*stopped {
                signal.wake.wait_for(&mut stopped, interval);
            }
            if *stopped {
                break;
            }
        }

        let Some(db) = db.upgrade() else {
            break;
        };
        let victims = db.resolve_deadlocks();
        if !victims.is_empty() {
            debug!(count = victims.len(), "detector pass aborted victims");
        }
    }
}
