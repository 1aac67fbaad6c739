//! Bulk multi-repository operation engine.
//!
//! [`BulkEngine::start`] partitions the requested targets, then runs one
//! operation over the valid ones with at most `max_concurrent` tasks in
//! flight. Each task is raced against a per-task timeout. Failures stay on
//! their own repository unless `abort_on_error` is set, and
//! [`BulkEngine::abort`] stops further dispatch without touching work that
//! already started.
//!
//! ```no_run
//! use gitfleet::bulk::{BulkEngine, BulkOptions, Operation, RepositoryTarget};
//! use gitfleet::git::Git2Backend;
//! use std::sync::Arc;
//!
//! let engine = BulkEngine::new(Arc::new(Git2Backend::new()));
//! engine.on_progress(|s| eprintln!("{}/{}", s.settled(), s.total));
//! let targets = vec![RepositoryTarget::new("web", "web", "/src/web")];
//! let handle = engine.start(&targets, Operation::Status, BulkOptions::default())?;
//! let report = handle.wait()?;
//! println!("{:?}", report.stats());
//! # Ok::<(), gitfleet::bulk::EngineError>(())
//! ```

mod eligibility;
mod error;
mod executor;
mod operation;
mod progress;
mod scheduler;
mod task;
#[cfg(test)]
pub(crate) mod testing;

use parking_lot::Mutex;
use rayon::ThreadPoolBuilder;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};

use crate::git::GitBackend;
use scheduler::{Scheduler, SchedulerEvent};

pub use eligibility::{InvalidTarget, LockSet, Partition, partition};
pub use error::EngineError;
pub use executor::execute;
pub use operation::{
    CheckoutParams, CleanParams, CreateBranchParams, DeleteBranchParams, FetchParams, Operation,
    OperationKind, OperationSpec, RemoteParams, ResetMode, ResetParams, StashParams,
};
pub use progress::{ProgressSnapshot, RunStats, SubscriptionId, snapshot, stats};
pub use scheduler::{AbortCause, RunReport};
pub use task::{BulkOperationResult, BulkOptions, RepositoryTarget, TIMEOUT_PREFIX, TaskStatus};

/// State shared between the engine handle and its scheduler thread.
pub(crate) struct Shared {
    state: Mutex<EngineState>,
    pub(crate) subscribers: progress::Subscribers,
    locks: Mutex<LockSet>,
}

#[derive(Default)]
struct EngineState {
    next_run_id: u64,
    active: Option<ActiveRun>,
    last: Option<RunReport>,
}

struct ActiveRun {
    run_id: u64,
    gate: Arc<AtomicBool>,
    wake: Sender<SchedulerEvent>,
    abort_requested: bool,
}

impl Shared {
    /// Store the report (if any) and release the single-run slot. Progress
    /// subscribers belong to the run and are dropped with it.
    pub(crate) fn finish_run(&self, run_id: u64, report: Option<RunReport>) {
        let mut state = self.state.lock();
        if let Some(report) = report {
            state.last = Some(report);
        }
        if state.active.as_ref().is_some_and(|a| a.run_id == run_id) {
            state.active = None;
            self.subscribers.clear();
        }
    }
}

/// Runs one bulk operation at a time against a [`GitBackend`].
pub struct BulkEngine {
    backend: Arc<dyn GitBackend>,
    shared: Arc<Shared>,
}

impl BulkEngine {
    pub fn new(backend: Arc<dyn GitBackend>) -> Self {
        Self {
            backend,
            shared: Arc::new(Shared {
                state: Mutex::new(EngineState::default()),
                subscribers: progress::Subscribers::default(),
                locks: Mutex::new(LockSet::new()),
            }),
        }
    }

    /// Split `targets` using the engine's current lock set. Has no effect on
    /// any run.
    pub fn partition(&self, targets: &[RepositoryTarget]) -> Partition {
        partition(targets, &self.shared.locks.lock())
    }

    /// Register an exclusive lock; the target is rejected until unlocked.
    pub fn lock(&self, repository_id: impl Into<String>, reason: impl Into<String>) {
        self.shared.locks.lock().lock(repository_id, reason);
    }

    pub fn unlock(&self, repository_id: &str) -> bool {
        self.shared.locks.lock().unlock(repository_id)
    }

    /// Subscribe to progress snapshots. The callback runs on the scheduler
    /// thread after every task transition; all subscribers are dropped when
    /// the current run resolves.
    pub fn on_progress<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&ProgressSnapshot) + Send + Sync + 'static,
    {
        self.shared.subscribers.add(Arc::new(callback))
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.shared.subscribers.remove(id)
    }

    pub fn is_running(&self) -> bool {
        self.shared.state.lock().active.is_some()
    }

    /// Start a run. Fails fast with [`EngineError::AlreadyRunning`] if
    /// another run on this engine has not resolved yet.
    ///
    /// # Errors
    /// Returns an error for invalid options or parameters, a concurrent run,
    /// or when the worker pool or scheduler thread cannot be created.
    pub fn start(
        &self,
        targets: &[RepositoryTarget],
        operation: Operation,
        options: BulkOptions,
    ) -> Result<RunHandle, EngineError> {
        options.validate().map_err(EngineError::InvalidOptions)?;
        operation
            .validate()
            .map_err(EngineError::InvalidParameters)?;

        let mut state = self.shared.state.lock();
        if state.active.is_some() {
            return Err(EngineError::AlreadyRunning);
        }

        let Partition { valid, invalid } = self.partition(targets);
        let pool = ThreadPoolBuilder::new()
            .num_threads(options.max_concurrent)
            .thread_name(|i| format!("gitfleet-worker-{}", i))
            .build()
            .map_err(|e| EngineError::InvalidOptions(e.to_string()))?;

        state.next_run_id += 1;
        let run_id = state.next_run_id;
        let gate = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel();
        let total = valid.len();

        let scheduler = Scheduler {
            run_id,
            operation: Arc::new(operation),
            options,
            targets: valid,
            invalid: invalid.clone(),
            backend: Arc::clone(&self.backend),
            gate: Arc::clone(&gate),
            tx: tx.clone(),
            rx,
            pool,
            shared: Arc::clone(&self.shared),
        };

        let join = thread::Builder::new()
            .name(format!("gitfleet-run-{}", run_id))
            .spawn(move || scheduler.run())
            .map_err(EngineError::SchedulerSpawn)?;

        state.active = Some(ActiveRun {
            run_id,
            gate,
            wake: tx,
            abort_requested: false,
        });

        Ok(RunHandle {
            run_id,
            total,
            invalid,
            join,
        })
    }

    /// Stop dispatching new tasks for the active run. Pending tasks become
    /// skipped; running tasks finish and keep their outcome.
    ///
    /// # Errors
    /// [`EngineError::NotRunning`] without an active run,
    /// [`EngineError::AlreadyAborted`] on a second call for the same run.
    pub fn abort(&self) -> Result<(), EngineError> {
        let mut state = self.shared.state.lock();
        let run = state.active.as_mut().ok_or(EngineError::NotRunning)?;
        if run.abort_requested {
            return Err(EngineError::AlreadyAborted);
        }
        run.abort_requested = true;
        run.gate.store(true, Ordering::SeqCst);
        let _ = run.wake.send(SchedulerEvent::Abort);
        tracing::info!(run_id = run.run_id, "abort requested");
        Ok(())
    }

    /// Results of the most recently resolved run.
    pub fn results(&self) -> Option<HashMap<String, BulkOperationResult>> {
        self.shared
            .state
            .lock()
            .last
            .as_ref()
            .map(|r| r.results.clone())
    }

    pub fn last_report(&self) -> Option<RunReport> {
        self.shared.state.lock().last.clone()
    }
}

/// Handle to a started run.
#[derive(Debug)]
pub struct RunHandle {
    run_id: u64,
    total: usize,
    invalid: Vec<InvalidTarget>,
    join: JoinHandle<RunReport>,
}

impl RunHandle {
    pub fn run_id(&self) -> u64 {
        self.run_id
    }

    /// Number of tasks created, i.e. valid targets.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Targets rejected before scheduling.
    pub fn invalid(&self) -> &[InvalidTarget] {
        &self.invalid
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Block until every task is terminal.
    ///
    /// # Errors
    /// [`EngineError::SchedulerPanicked`] if the scheduler thread unwound.
    pub fn wait(self) -> Result<RunReport, EngineError> {
        self.join.join().map_err(|_| EngineError::SchedulerPanicked)
    }
}
