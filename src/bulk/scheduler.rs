//! Bounded task scheduler.
//!
//! One scheduler thread per run owns the task map and the slot count. Tasks
//! execute on a rayon pool sized to `max_concurrent` and report back through
//! an mpsc channel, so every state change happens here, one event at a time.

use chrono::Utc;
use rayon::ThreadPool;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, Sender};
use std::time::{Duration, Instant};

use super::Shared;
use super::eligibility::InvalidTarget;
use super::executor::execute;
use super::operation::{Operation, OperationKind};
use super::progress::{RunStats, snapshot, stats};
use super::task::{BulkOperationResult, BulkOptions, RepositoryTarget, TaskStatus};
use crate::git::GitBackend;

pub(crate) enum SchedulerEvent {
    Finished(BulkOperationResult),
    /// Wakes the scheduler after the dispatch gate was closed.
    Abort,
}

/// Why dispatch stopped before the queue drained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortCause {
    Requested,
    TaskFailed { repository_id: String },
}

/// Everything a resolved run produced.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: u64,
    pub operation: OperationKind,
    pub results: HashMap<String, BulkOperationResult>,
    pub invalid: Vec<InvalidTarget>,
    pub abort: Option<AbortCause>,
    pub elapsed: Duration,
    order: Vec<String>,
}

impl RunReport {
    pub fn stats(&self) -> RunStats {
        stats(&self.results)
    }

    /// Results in the order the targets were submitted.
    pub fn ordered(&self) -> Vec<&BulkOperationResult> {
        self.order
            .iter()
            .filter_map(|id| self.results.get(id))
            .collect()
    }

    pub fn has_failures(&self) -> bool {
        self.results
            .values()
            .any(|r| r.status == TaskStatus::Failed)
    }
}

pub(crate) struct Scheduler {
    pub(crate) run_id: u64,
    pub(crate) operation: Arc<Operation>,
    pub(crate) options: BulkOptions,
    pub(crate) targets: Vec<RepositoryTarget>,
    pub(crate) invalid: Vec<InvalidTarget>,
    pub(crate) backend: Arc<dyn GitBackend>,
    pub(crate) gate: Arc<AtomicBool>,
    pub(crate) tx: Sender<SchedulerEvent>,
    pub(crate) rx: Receiver<SchedulerEvent>,
    pub(crate) pool: ThreadPool,
    pub(crate) shared: Arc<Shared>,
}

struct RunState {
    queue: VecDeque<usize>,
    tasks: HashMap<String, BulkOperationResult>,
    running: usize,
    cause: Option<AbortCause>,
}

/// Releases the engine's single-run slot even if the scheduler unwinds.
struct ActiveGuard {
    shared: Arc<Shared>,
    run_id: u64,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.shared.finish_run(self.run_id, None);
    }
}

impl Scheduler {
    pub(crate) fn run(self) -> RunReport {
        let kind = self.operation.kind();
        let span = tracing::info_span!("bulk_run", run_id = self.run_id, operation = %kind);
        let _enter = span.enter();
        let guard = ActiveGuard {
            shared: Arc::clone(&self.shared),
            run_id: self.run_id,
        };
        let clock = Instant::now();

        tracing::info!(
            total = self.targets.len(),
            invalid = self.invalid.len(),
            max_concurrent = self.options.max_concurrent,
            timeout_ms = self.options.timeout.as_millis() as u64,
            "bulk run started"
        );

        let mut st = RunState {
            queue: (0..self.targets.len()).collect(),
            tasks: self
                .targets
                .iter()
                .map(|t| (t.id.clone(), BulkOperationResult::pending(t)))
                .collect(),
            running: 0,
            cause: None,
        };
        self.publish(&st);

        loop {
            if self.gate_closed(&st) {
                self.skip_pending(&mut st);
            } else {
                self.dispatch_ready(&mut st);
            }
            if st.running == 0 && st.queue.is_empty() {
                break;
            }
            match self.rx.recv() {
                Ok(SchedulerEvent::Finished(result)) => self.settle(&mut st, result),
                Ok(SchedulerEvent::Abort) => {}
                Err(_) => break,
            }
        }

        let report = RunReport {
            run_id: self.run_id,
            operation: kind,
            results: st.tasks,
            invalid: self.invalid.clone(),
            abort: st.cause,
            elapsed: clock.elapsed(),
            order: self.targets.iter().map(|t| t.id.clone()).collect(),
        };
        let s = report.stats();
        tracing::info!(
            completed = s.completed,
            failed = s.failed,
            skipped = s.skipped,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "bulk run finished"
        );

        self.shared.finish_run(self.run_id, Some(report.clone()));
        drop(guard);
        report
    }

    fn gate_closed(&self, st: &RunState) -> bool {
        st.cause.is_some() || self.gate.load(Ordering::SeqCst)
    }

    fn dispatch_ready(&self, st: &mut RunState) {
        while st.running < self.options.max_concurrent {
            if self.gate_closed(st) {
                self.skip_pending(st);
                return;
            }
            let Some(idx) = st.queue.pop_front() else {
                return;
            };
            let target = self.targets[idx].clone();
            if let Some(task) = st.tasks.get_mut(&target.id) {
                task.status = TaskStatus::Running;
                task.started_at = Utc::now();
            }
            st.running += 1;
            tracing::debug!(repository = %target.id, running = st.running, "task dispatched");

            let tx = self.tx.clone();
            let backend = Arc::clone(&self.backend);
            let operation = Arc::clone(&self.operation);
            let timeout = self.options.timeout;
            self.pool.spawn(move || {
                let result = execute(backend, &operation, &target, timeout);
                let _ = tx.send(SchedulerEvent::Finished(result));
            });
            self.publish(st);
        }
    }

    fn settle(&self, st: &mut RunState, result: BulkOperationResult) {
        st.running = st.running.saturating_sub(1);
        match result.status {
            TaskStatus::Failed => tracing::warn!(
                repository = %result.repository_id,
                error = result.error.as_deref().unwrap_or(""),
                timed_out = result.timed_out(),
                "task failed"
            ),
            _ => tracing::debug!(
                repository = %result.repository_id,
                duration_ms = result.duration_ms,
                "task completed"
            ),
        }

        let failed = result.status == TaskStatus::Failed;
        let id = result.repository_id.clone();
        st.tasks.insert(id.clone(), result);
        self.publish(st);

        if failed && self.options.abort_on_error && st.cause.is_none() {
            tracing::info!(repository = %id, "stopping dispatch after failure");
            st.cause = Some(AbortCause::TaskFailed { repository_id: id });
        }
    }

    fn skip_pending(&self, st: &mut RunState) {
        if st.cause.is_none() {
            tracing::info!(pending = st.queue.len(), "abort requested");
            st.cause = Some(AbortCause::Requested);
        }
        let reason = match &st.cause {
            Some(AbortCause::TaskFailed { repository_id }) => {
                format!("skipped after {} failed", repository_id)
            }
            _ => "aborted before dispatch".to_string(),
        };
        while let Some(idx) = st.queue.pop_front() {
            let target = &self.targets[idx];
            st.tasks.insert(
                target.id.clone(),
                BulkOperationResult::skipped(target, reason.clone()),
            );
            self.publish(st);
        }
    }

    fn publish(&self, st: &RunState) {
        let snap = snapshot(
            self.operation.name(),
            &st.tasks,
            self.targets.len(),
        );
        self.shared.subscribers.publish(&snap);
    }
}
