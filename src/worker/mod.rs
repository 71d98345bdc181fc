//! Per-device poll loop on its own named thread.
//!
//! A [`Worker`] owns one device, one querier and one log file. Stopping is
//! cooperative: [`Worker::stop`] cancels the [`StopToken`], which cuts short
//! the interval sleep; the loop sees the request at its next check, runs the
//! end-of-run analytics and finally sets its `stopped` latch.

mod signal;

pub use signal::{Latch, RunLimit, StopToken};

use crate::analytics;
use crate::cli::{CliAutomaton, LoginOutcome, ProcessSpawner};
use crate::config::{Items, Profile};
use crate::devlog::DeviceLog;
use crate::snmp::{Snmp2Session, SnmpError, SnmpPoller};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// What the poll loop does after preparing an iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Run the query cycle
    Continue,
    /// Stop request or deadline hit while preparing; re-check the loop conditions
    Interrupted,
    /// Unrecoverable for this device; end the run
    Abort,
}

/// The two polling strategies, chosen from the profile's utility
#[derive(Debug)]
pub enum Querier {
    Cli(CliAutomaton),
    Snmp(SnmpPoller),
}

impl Querier {
    /// Build the querier for a validated profile with the real transports
    pub fn for_profile(profile: &Profile) -> Result<Self, SnmpError> {
        match &profile.items {
            Items::Commands(items) => Ok(Querier::Cli(CliAutomaton::new(
                profile.device_target.clone(),
                profile.credentials.clone(),
                items.clone(),
                Box::new(ProcessSpawner),
            ))),
            Items::Oids(oids) => {
                let session = Snmp2Session::new(&profile.device_target, &profile.snmp)?;
                Ok(Querier::Snmp(SnmpPoller::new(Box::new(session), oids.clone())))
            }
        }
    }

    /// Component name used in log lines and analytics sections
    pub fn source(&self) -> &'static str {
        match self {
            Querier::Cli(_) => "CLI-MONITOR",
            Querier::Snmp(_) => "SNMP-MONITOR",
        }
    }

    fn prepare(&mut self, log: &mut DeviceLog, limit: &RunLimit) -> Flow {
        match self {
            Querier::Snmp(_) => Flow::Continue,
            Querier::Cli(automaton) => match automaton.ensure_session(log, limit) {
                LoginOutcome::AuthExhausted => Flow::Abort,
                LoginOutcome::Interrupted => Flow::Interrupted,
                // Without a session the cycle still logs one error line per item
                LoginOutcome::Privileged
                | LoginOutcome::NotConnected
                | LoginOutcome::ConnectionDead => Flow::Continue,
            },
        }
    }

    fn query(&mut self, log: &mut DeviceLog) {
        match self {
            Querier::Cli(automaton) => automaton.query_all(log),
            Querier::Snmp(poller) => {
                poller.poll(log);
            }
        }
    }

    fn close(&mut self) {
        if let Querier::Cli(automaton) = self {
            automaton.close();
        }
    }
}

/// State shared between a [`Worker`] handle and its thread
#[derive(Debug)]
struct WorkerShared {
    stop: StopToken,
    /// Poll loop has returned
    exited: Latch,
    /// Analytics appended, nothing more will be written
    stopped: Latch,
    /// Number of the next iteration (starts at 1)
    iteration: AtomicU64,
}

pub struct Worker {
    device_id: String,
    log_path: PathBuf,
    shared: Arc<WorkerShared>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Worker {
    /// Create the device log and launch the poll loop
    pub fn start(profile: Profile, log_path: PathBuf, querier: Querier) -> std::io::Result<Self> {
        let device_id = profile.device_id().to_string();
        let log = DeviceLog::create(device_id.clone(), &log_path)?.with_source(querier.source());
        let shared = Arc::new(WorkerShared {
            stop: StopToken::new(),
            exited: Latch::new(),
            stopped: Latch::new(),
            iteration: AtomicU64::new(1),
        });

        let thread_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name(format!("worker-{}", device_id))
            .spawn(move || run_worker(profile, log, querier, thread_shared))?;

        tracing::info!("Started worker for {} (log: {})", device_id, log_path.display());

        Ok(Self {
            device_id,
            log_path,
            shared,
            handle: Mutex::new(Some(handle)),
        })
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Number of the iteration that runs next
    pub fn iteration(&self) -> u64 {
        self.shared.iteration.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        !self.shared.exited.is_set()
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.stopped.is_set()
    }

    /// Request termination. Idempotent and non-blocking.
    pub fn stop(&self) {
        if !self.shared.stop.is_cancelled() {
            tracing::info!("Stop command received for worker {}", self.device_id);
        }
        self.shared.stop.cancel();
    }

    /// Wait for the poll loop to exit. Returns false on timeout.
    pub fn join(&self, timeout: Option<Duration>) -> bool {
        self.shared.exited.wait(timeout)
    }

    /// Wait until the loop and its end-of-run analytics have finished.
    /// Returns false on timeout.
    pub fn wait_stopped(&self, timeout: Option<Duration>) -> bool {
        if !self.shared.stopped.wait(timeout) {
            return false;
        }
        let handle = self.handle.lock().unwrap().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                tracing::error!("Worker thread for {} panicked after stopping", self.device_id);
            }
        }
        true
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("device_id", &self.device_id)
            .field("log_path", &self.log_path)
            .field("iteration", &self.iteration())
            .field("running", &self.is_running())
            .finish()
    }
}

/// Sets the `stopped` latch when dropped, so waiters are released even if
/// the thread unwinds
struct StoppedOnDrop(Latch);

impl Drop for StoppedOnDrop {
    fn drop(&mut self) {
        self.0.set();
    }
}

fn panic_reason(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

fn run_worker(profile: Profile, mut log: DeviceLog, mut querier: Querier, shared: Arc<WorkerShared>) {
    let _stopped = StoppedOnDrop(shared.stopped.clone());
    let deadline = profile.timeout.map(|timeout| Instant::now() + timeout);
    let limit = RunLimit::new(shared.stop.clone(), deadline);
    log.event("INFO", "run", "Worker operation started.\n\n");

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        poll_loop(&profile, &mut log, &mut querier, &shared, &limit)
    }));
    if let Err(payload) = result {
        log.event(
            "CRITICAL",
            "run",
            format!("Poll loop failed: {}", panic_reason(payload.as_ref())),
        );
    }
    shared.exited.set();

    querier.close();
    let report = panic::catch_unwind(AssertUnwindSafe(|| {
        analytics::end_of_run(log.path(), &profile.analytics, querier.source())
    }));
    match report {
        Ok(report) => log.append_raw(&report),
        Err(payload) => log.event(
            "CRITICAL",
            "analytics",
            format!("End-of-run analytics failed: {}", panic_reason(payload.as_ref())),
        ),
    }
    tracing::info!("Worker for {} finished", profile.device_id());
}

fn poll_loop(
    profile: &Profile,
    log: &mut DeviceLog,
    querier: &mut Querier,
    shared: &WorkerShared,
    limit: &RunLimit,
) {
    loop {
        if limit.expired() {
            log.event("INFO", "run", "Worker finished execution. Time limit reached.");
            break;
        }
        if limit.stop_requested() {
            log.event(
                "WARNING",
                "run",
                "Worker stopped ahead of time due to a call to stop().",
            );
            break;
        }

        match querier.prepare(log, limit) {
            Flow::Continue => {}
            Flow::Interrupted => continue,
            Flow::Abort => {
                shared.stop.cancel();
                break;
            }
        }

        let iteration = shared.iteration.load(Ordering::SeqCst);
        log.iteration_started(iteration);
        querier.query(log);
        log.iteration_finished();
        shared.iteration.fetch_add(1, Ordering::SeqCst);

        limit.sleep(profile.interval);
    }
}
