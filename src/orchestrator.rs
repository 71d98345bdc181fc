use crate::config::{Profile, RawProfile};
use crate::devlog;
use crate::preflight;
use crate::worker::{Querier, Worker};
use anyhow::{Context, Result};
use chrono::Local;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

/// Settings that apply to every worker of a run
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub log_dir: PathBuf,
    /// Pause between consecutive worker starts
    pub stagger: Duration,
    /// Run the environment check for each profile before starting it
    pub preflight: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("logfiles"),
            stagger: Duration::from_secs(1),
            preflight: true,
        }
    }
}

/// Which workers a control call applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target<'a> {
    All,
    Device(&'a str),
}

/// Registry of running workers, keyed by device id
pub struct Orchestrator {
    config: OrchestratorConfig,
    workers: RwLock<HashMap<String, Arc<Worker>>>,
    /// Start order, used for ordered stop/join
    order: RwLock<Vec<String>>,
    shutting_down: AtomicBool,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig) -> Self {
        Self {
            config,
            workers: RwLock::new(HashMap::new()),
            order: RwLock::new(Vec::new()),
            shutting_down: AtomicBool::new(false),
        }
    }

    /// Validate every profile and start one worker per device.
    /// Returns the number of workers started.
    pub fn run(&self, profiles: Vec<RawProfile>) -> usize {
        tracing::info!("Operation started with {} profile(s)", profiles.len());
        let mut started = 0;
        for (index, raw) in profiles.into_iter().enumerate() {
            if self.shutting_down.load(Ordering::SeqCst) {
                tracing::warn!("Shutdown requested, not starting remaining profiles");
                break;
            }
            let profile = match raw.validate() {
                Ok(profile) => profile,
                Err(e) => {
                    tracing::error!("Skipping profile #{}: {}", index + 1, e);
                    continue;
                }
            };
            if self.config.preflight {
                if let Err(e) = preflight::check(profile.utility, &profile.device_target) {
                    tracing::error!(
                        "Environment check failed for {}: {}. Skipping it.",
                        profile.device_id(),
                        e
                    );
                    continue;
                }
            }

            if started > 0 && !self.config.stagger.is_zero() {
                std::thread::sleep(self.config.stagger);
            }
            match self.init_worker(profile) {
                Ok(true) => started += 1,
                Ok(false) => {}
                Err(e) => tracing::error!("{:#}", e),
            }
        }
        tracing::info!("{} worker(s) running", self.len());
        started
    }

    /// Build the real querier for a profile and start its worker.
    /// Returns false when the device already has a worker.
    pub fn init_worker(&self, profile: Profile) -> Result<bool> {
        if self.contains(profile.device_id()) {
            tracing::warn!(
                "A worker for {} already exists. Skipping the initialization process.",
                profile.device_id()
            );
            return Ok(false);
        }
        let querier = Querier::for_profile(&profile)
            .with_context(|| format!("Failed to create querier for {}", profile.device_id()))?;
        self.init_worker_with(profile, querier)
    }

    /// Start a worker with an explicit querier
    pub fn init_worker_with(&self, profile: Profile, querier: Querier) -> Result<bool> {
        let device_id = profile.device_id().to_string();
        let mut workers = self.workers.write().unwrap();
        if workers.contains_key(&device_id) {
            tracing::warn!(
                "A worker for {} already exists. Skipping the initialization process.",
                device_id
            );
            return Ok(false);
        }

        tracing::info!("Creating {} worker for {}", profile.utility, device_id);
        let log_path = devlog::log_file_path(
            &self.config.log_dir,
            profile.utility.as_str(),
            &profile.device_target,
            Local::now(),
        );
        let worker = Worker::start(profile, log_path, querier)
            .with_context(|| format!("Failed to start worker for {}", device_id))?;
        workers.insert(device_id.clone(), Arc::new(worker));
        self.order.write().unwrap().push(device_id);
        Ok(true)
    }

    pub fn contains(&self, device_id: &str) -> bool {
        self.workers.read().unwrap().contains_key(device_id)
    }

    pub fn len(&self) -> usize {
        self.workers.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Device ids in start order
    pub fn device_ids(&self) -> Vec<String> {
        self.order.read().unwrap().clone()
    }

    pub fn worker(&self, device_id: &str) -> Option<Arc<Worker>> {
        self.workers.read().unwrap().get(device_id).cloned()
    }

    fn select(&self, target: Target<'_>) -> Vec<Arc<Worker>> {
        let workers = self.workers.read().unwrap();
        match target {
            Target::All => {
                let order = self.order.read().unwrap();
                order.iter().filter_map(|id| workers.get(id).cloned()).collect()
            }
            Target::Device(id) => {
                let selected: Vec<Arc<Worker>> = workers.get(id).cloned().into_iter().collect();
                if selected.is_empty() {
                    tracing::warn!("No worker for device {}", id);
                }
                selected
            }
        }
    }

    /// Request termination. Stopping all also prevents further starts.
    pub fn stop(&self, target: Target<'_>) {
        if target == Target::All {
            self.shutting_down.store(true, Ordering::SeqCst);
        }
        for worker in self.select(target) {
            worker.stop();
        }
    }

    /// Wait for poll loops to exit. `None` waits forever.
    /// Returns false if any worker was still running at the timeout.
    pub fn join(&self, target: Target<'_>, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut all_exited = true;
        for worker in self.select(target) {
            tracing::info!("Now joining worker of {}", worker.device_id());
            let remaining = deadline.map(|d| d.saturating_duration_since(Instant::now()));
            if worker.join(remaining) {
                tracing::info!("Worker of {} finished its activity", worker.device_id());
            } else {
                all_exited = false;
            }
        }
        all_exited
    }

    /// Wait until workers have also finished their end-of-run analytics
    pub fn wait_stopped(&self, target: Target<'_>, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut all_stopped = true;
        for worker in self.select(target) {
            let remaining = deadline.map(|d| d.saturating_duration_since(Instant::now()));
            if worker.wait_stopped(remaining) {
                tracing::info!("Worker of {} finished execution", worker.device_id());
            } else {
                tracing::warn!("Worker of {} did not stop in time", worker.device_id());
                all_stopped = false;
            }
        }
        all_stopped
    }

    /// Stop every worker, then wait for each to fully quiesce
    pub fn stop_workers(&self, timeout: Option<Duration>) -> bool {
        self.stop(Target::All);
        self.wait_stopped(Target::All, timeout)
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .field("devices", &self.device_ids())
            .finish()
    }
}
