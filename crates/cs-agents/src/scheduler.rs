//! Autonomous scheduler
//!
//! A fixed-tick polling loop. On every tick each worker whose interval has
//! elapsed is launched on its own task; a worker still running from an
//! earlier tick is skipped. Alerts pass a per-(customer, kind) cooldown
//! before they reach the bus; the cooldown starts only once the bus has
//! accepted the alert.

use crate::bus::AlertBus;
use crate::config::AgentConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::workers::{default_workers, Worker, WorkerContext};
use chrono::{DateTime, Utc};
use cs_customers::{Alert, AlertKind, CustomerStore};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Outcome of one worker run.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerRunReport {
    /// Worker name
    pub worker: String,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// Run time in milliseconds
    pub duration_ms: u64,
    /// Alerts the worker returned
    pub alerts_found: usize,
    /// Alerts published to the bus
    pub alerts_published: usize,
    /// Alerts dropped by the cooldown
    pub alerts_suppressed: usize,
    /// Alerts the bus failed to deliver; they stay eligible next run
    pub alerts_failed: usize,
}

/// Point-in-time view of one worker.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerStatus {
    /// Worker name
    pub name: String,
    /// Configured interval in seconds
    pub interval_secs: u64,
    /// Whether a run is in flight
    pub running: bool,
    /// Completed runs
    pub runs: u64,
    /// Start of the last run
    pub last_run_at: Option<DateTime<Utc>>,
    /// Alerts found in the last completed run
    pub last_alert_count: usize,
    /// Error from the last completed run
    pub last_error: Option<String>,
}

/// A launched worker run.
#[derive(Debug)]
pub struct LaunchedRun {
    /// Worker name
    pub worker: &'static str,
    /// Task handle
    pub handle: JoinHandle<()>,
}

#[derive(Debug, Default)]
struct RunState {
    running: bool,
    last_started: Option<Instant>,
    last_run_at: Option<DateTime<Utc>>,
    runs: u64,
    last_alert_count: usize,
    last_error: Option<String>,
}

struct WorkerSlot {
    worker: Arc<dyn Worker>,
    state: Mutex<RunState>,
}

impl WorkerSlot {
    fn state(&self) -> MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark the slot running if it is due. Returns false when skipped.
    fn try_start(&self, now: Instant, force: bool) -> bool {
        let mut state = self.state();
        if state.running {
            return false;
        }
        let due = match state.last_started {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.worker.interval(),
        };
        if !due && !force {
            return false;
        }
        state.running = true;
        state.last_started = Some(now);
        state.last_run_at = Some(Utc::now());
        true
    }

    fn finish(&self, result: &WorkerResult<WorkerRunReport>) {
        let mut state = self.state();
        state.running = false;
        state.runs += 1;
        match result {
            Ok(report) => {
                state.last_alert_count = report.alerts_found;
                state.last_error = (report.alerts_failed > 0)
                    .then(|| format!("{} alerts failed to publish", report.alerts_failed));
            }
            Err(e) => {
                state.last_alert_count = 0;
                state.last_error = Some(e.to_string());
            }
        }
    }

    fn abort(&self, reason: &str) {
        let mut state = self.state();
        state.running = false;
        state.runs += 1;
        state.last_alert_count = 0;
        state.last_error = Some(reason.to_string());
    }
}

const ABORTED_RUN: &str = "run ended before completing";

/// Holds a slot's running flag for one run.
///
/// A run that ends without [`RunGuard::finish`] (the task panicked or the
/// caller's future was dropped) still clears the flag and records why.
struct RunGuard {
    inner: Arc<Inner>,
    index: usize,
    finished: bool,
}

impl RunGuard {
    fn slot(&self) -> &WorkerSlot {
        &self.inner.slots[self.index]
    }

    fn finish(mut self, result: &WorkerResult<WorkerRunReport>) {
        self.finished = true;
        self.slot().finish(result);
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if !self.finished {
            warn!(worker = self.slot().worker.name(), "Worker run ended before completing");
            self.slot().abort(ABORTED_RUN);
        }
    }
}

struct Inner {
    store: Arc<CustomerStore>,
    bus: Arc<dyn AlertBus>,
    config: Arc<AgentConfig>,
    slots: Vec<WorkerSlot>,
    cooldowns: Mutex<HashMap<(Uuid, AlertKind), DateTime<Utc>>>,
}

/// Runs the risk workers on their intervals.
///
/// Cloning is cheap; clones share workers, state and cooldowns.
#[derive(Clone)]
pub struct AutonomousScheduler {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for AutonomousScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutonomousScheduler")
            .field("workers", &self.worker_names())
            .field("tick", &self.inner.config.tick)
            .finish()
    }
}

impl AutonomousScheduler {
    /// Scheduler with the seven standard workers.
    pub fn new(store: Arc<CustomerStore>, bus: Arc<dyn AlertBus>, config: AgentConfig) -> Self {
        let workers = default_workers(&config);
        Self::with_workers(store, bus, config, workers)
    }

    /// Scheduler with a custom worker set. Later duplicates of a name are ignored.
    pub fn with_workers(
        store: Arc<CustomerStore>,
        bus: Arc<dyn AlertBus>,
        config: AgentConfig,
        workers: Vec<Arc<dyn Worker>>,
    ) -> Self {
        let mut slots: Vec<WorkerSlot> = Vec::with_capacity(workers.len());
        for worker in workers {
            if slots.iter().any(|s| s.worker.name() == worker.name()) {
                warn!(worker = worker.name(), "Duplicate worker name ignored");
                continue;
            }
            slots.push(WorkerSlot {
                worker,
                state: Mutex::new(RunState::default()),
            });
        }

        Self {
            inner: Arc::new(Inner {
                store,
                bus,
                config: Arc::new(config),
                slots,
                cooldowns: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Scheduler configuration.
    pub fn config(&self) -> &AgentConfig {
        &self.inner.config
    }

    /// Registered worker names, in registration order.
    pub fn worker_names(&self) -> Vec<&'static str> {
        self.inner.slots.iter().map(|s| s.worker.name()).collect()
    }

    /// Spawn the polling loop; it stops when `cancel` fires.
    pub fn spawn(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let scheduler = self.clone();
        tokio::spawn(async move { scheduler.run(cancel).await })
    }

    /// Run the polling loop until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            workers = self.inner.slots.len(),
            tick_secs = self.inner.config.tick.as_secs(),
            "Autonomous scheduler started"
        );

        loop {
            let launched = self.run_due(Instant::now());
            if !launched.is_empty() {
                debug!(count = launched.len(), "Workers launched");
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.inner.config.tick) => {}
            }
        }

        info!("Autonomous scheduler stopped");
    }

    /// Launch every worker that is due at `now` and not already running.
    ///
    /// Runs are fire-and-forget; the handles are returned for callers that
    /// want to wait.
    pub fn run_due(&self, now: Instant) -> Vec<LaunchedRun> {
        let mut launched = Vec::new();

        for index in 0..self.inner.slots.len() {
            let Some(guard) = self.start(index, now, false) else {
                continue;
            };
            let worker = guard.slot().worker.clone();

            let scheduler = self.clone();
            let handle = tokio::spawn(async move {
                let result = scheduler.execute(worker.as_ref()).await;
                if let Err(e) = &result {
                    error!(worker = worker.name(), error = %e, "Worker run failed");
                }
                guard.finish(&result);
            });

            launched.push(LaunchedRun {
                worker: self.inner.slots[index].worker.name(),
                handle,
            });
        }

        launched
    }

    /// Run one worker immediately, regardless of its interval, and wait for it.
    pub async fn run_worker_now(&self, name: &str) -> WorkerResult<WorkerRunReport> {
        let index = self
            .inner
            .slots
            .iter()
            .position(|s| s.worker.name() == name)
            .ok_or_else(|| WorkerError::UnknownWorker(name.to_string()))?;

        let guard = self
            .start(index, Instant::now(), true)
            .ok_or_else(|| WorkerError::AlreadyRunning(name.to_string()))?;
        let worker = guard.slot().worker.clone();

        let result = self.execute(worker.as_ref()).await;
        guard.finish(&result);
        result
    }

    fn start(&self, index: usize, now: Instant, force: bool) -> Option<RunGuard> {
        self.inner.slots[index]
            .try_start(now, force)
            .then(|| RunGuard {
                inner: self.inner.clone(),
                index,
                finished: false,
            })
    }

    /// Status of every worker.
    pub fn statuses(&self) -> Vec<WorkerStatus> {
        self.inner
            .slots
            .iter()
            .map(|slot| {
                let state = slot.state();
                WorkerStatus {
                    name: slot.worker.name().to_string(),
                    interval_secs: slot.worker.interval().as_secs(),
                    running: state.running,
                    runs: state.runs,
                    last_run_at: state.last_run_at,
                    last_alert_count: state.last_alert_count,
                    last_error: state.last_error.clone(),
                }
            })
            .collect()
    }

    #[instrument(skip_all, fields(worker = worker.name()))]
    async fn execute(&self, worker: &dyn Worker) -> WorkerResult<WorkerRunReport> {
        let started_at = Utc::now();
        let started = Instant::now();

        let ctx = WorkerContext {
            store: self.inner.store.clone(),
            config: self.inner.config.clone(),
            now: started_at,
        };
        let alerts = worker.run(&ctx).await?;
        let found = alerts.len();

        let mut published = 0;
        let mut failed = 0;
        for alert in alerts {
            if self.in_cooldown(&alert).await {
                continue;
            }
            let (key, detected_at) = ((alert.customer_id, alert.kind), alert.detected_at);
            match self.inner.bus.publish(alert).await {
                Ok(()) => {
                    self.cooldowns().insert(key, detected_at);
                    published += 1;
                }
                Err(e) => {
                    warn!(customer_id = %key.0, error = %e, "Alert not delivered");
                    failed += 1;
                }
            }
        }

        let report = WorkerRunReport {
            worker: worker.name().to_string(),
            started_at,
            duration_ms: started.elapsed().as_millis() as u64,
            alerts_found: found,
            alerts_published: published,
            alerts_suppressed: found - published - failed,
            alerts_failed: failed,
        };

        info!(
            alerts_found = report.alerts_found,
            alerts_published = report.alerts_published,
            alerts_suppressed = report.alerts_suppressed,
            alerts_failed = report.alerts_failed,
            duration_ms = report.duration_ms,
            "Worker run complete"
        );
        Ok(report)
    }

    /// True when an alert of the same kind for the same customer went out
    /// within the cooldown.
    async fn in_cooldown(&self, alert: &Alert) -> bool {
        let key = (alert.customer_id, alert.kind);
        let cooldown = chrono::Duration::from_std(self.inner.config.alert_cooldown)
            .unwrap_or_else(|_| chrono::Duration::days(1));

        let remembered = self.cooldowns().get(&key).copied();
        let last = match remembered {
            Some(at) => Some(at),
            // Alerts persisted before a restart still count
            None => match self.inner.store.last_alert_for(alert.customer_id, alert.kind).await {
                Ok(at) => at,
                Err(e) => {
                    warn!(customer_id = %alert.customer_id, error = %e, "Cooldown lookup failed");
                    None
                }
            },
        };

        if let Some(last) = last {
            if alert.detected_at - last < cooldown {
                debug!(
                    customer_id = %alert.customer_id,
                    kind = alert.kind.as_str(),
                    "Alert suppressed by cooldown"
                );
                return true;
            }
        }

        false
    }

    fn cooldowns(&self) -> MutexGuard<'_, HashMap<(Uuid, AlertKind), DateTime<Utc>>> {
        self.inner
            .cooldowns
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
