use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

use super::task::{BulkOperationResult, TaskStatus};

/// Counts published after every task transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    pub operation_name: String,
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub pending: usize,
    pub running: usize,
}

impl ProgressSnapshot {
    /// Tasks that reached a terminal state.
    pub fn settled(&self) -> usize {
        self.completed + self.failed + self.skipped
    }

    pub fn is_done(&self) -> bool {
        self.settled() == self.total
    }
}

/// Recount the task map from scratch.
pub fn snapshot(
    operation_name: &str,
    tasks: &HashMap<String, BulkOperationResult>,
    total: usize,
) -> ProgressSnapshot {
    let mut snap = ProgressSnapshot {
        operation_name: operation_name.to_string(),
        total,
        completed: 0,
        failed: 0,
        skipped: 0,
        pending: 0,
        running: 0,
    };
    for r in tasks.values() {
        match r.status {
            TaskStatus::Pending => snap.pending += 1,
            TaskStatus::Running => snap.running += 1,
            TaskStatus::Completed => snap.completed += 1,
            TaskStatus::Failed => snap.failed += 1,
            TaskStatus::Skipped => snap.skipped += 1,
        }
    }
    snap
}

/// Derived statistics over a result map.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunStats {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Mean over terminal tasks with a recorded duration; 0 when there are none.
    pub avg_duration_ms: f64,
    pub total_duration_ms: u64,
}

pub fn stats(results: &HashMap<String, BulkOperationResult>) -> RunStats {
    let mut out = RunStats {
        total: results.len(),
        ..RunStats::default()
    };
    let mut timed = 0u64;
    for r in results.values() {
        match r.status {
            TaskStatus::Completed => out.completed += 1,
            TaskStatus::Failed => out.failed += 1,
            TaskStatus::Skipped => out.skipped += 1,
            TaskStatus::Pending | TaskStatus::Running => continue,
        }
        if let Some(ms) = r.duration_ms {
            out.total_duration_ms += ms;
            timed += 1;
        }
    }
    if timed > 0 {
        out.avg_duration_ms = out.total_duration_ms as f64 / timed as f64;
    }
    out
}

/// Handle returned by `on_progress`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback = Arc<dyn Fn(&ProgressSnapshot) + Send + Sync>;

/// Progress observers. Callbacks run on the scheduler thread, outside the
/// registry lock, so a callback may call back into the engine.
#[derive(Default)]
pub(crate) struct Subscribers {
    inner: Mutex<SubscriberList>,
}

#[derive(Default)]
struct SubscriberList {
    next_id: u64,
    entries: Vec<(SubscriptionId, Callback)>,
}

impl Subscribers {
    pub(crate) fn add(&self, cb: Callback) -> SubscriptionId {
        let mut list = self.inner.lock();
        list.next_id += 1;
        let id = SubscriptionId(list.next_id);
        list.entries.push((id, cb));
        id
    }

    pub(crate) fn remove(&self, id: SubscriptionId) -> bool {
        let mut list = self.inner.lock();
        let before = list.entries.len();
        list.entries.retain(|(i, _)| *i != id);
        list.entries.len() != before
    }

    pub(crate) fn clear(&self) {
        self.inner.lock().entries.clear();
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub(crate) fn publish(&self, snap: &ProgressSnapshot) {
        let callbacks: Vec<Callback> = self
            .inner
            .lock()
            .entries
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();
        for cb in callbacks {
            cb(snap);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bulk::task::RepositoryTarget;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn result(id: &str, status: TaskStatus, ms: Option<u64>) -> (String, BulkOperationResult) {
        let mut r = BulkOperationResult::pending(&RepositoryTarget::new(id, id, "/x"));
        r.status = status;
        r.duration_ms = ms;
        (id.to_string(), r)
    }

    #[test]
    fn snapshot_counts_each_status() {
        let tasks: HashMap<_, _> = [
            result("a", TaskStatus::Pending, None),
            result("b", TaskStatus::Running, None),
            result("c", TaskStatus::Completed, Some(10)),
            result("d", TaskStatus::Failed, Some(5)),
            result("e", TaskStatus::Skipped, None),
        ]
        .into_iter()
        .collect();

        let s = snapshot("pull", &tasks, 5);
        assert_eq!(s.operation_name, "pull");
        assert_eq!((s.pending, s.running, s.completed, s.failed, s.skipped), (1, 1, 1, 1, 1));
        assert_eq!(s.settled(), 3);
        assert!(!s.is_done());
    }

    #[test]
    fn stats_average_only_timed_terminal_tasks() {
        let results: HashMap<_, _> = [
            result("a", TaskStatus::Completed, Some(100)),
            result("b", TaskStatus::Completed, Some(300)),
            result("c", TaskStatus::Failed, Some(200)),
            result("d", TaskStatus::Skipped, None),
        ]
        .into_iter()
        .collect();

        let s = stats(&results);
        assert_eq!(s.total, 4);
        assert_eq!((s.completed, s.failed, s.skipped), (2, 1, 1));
        assert_eq!(s.total_duration_ms, 600);
        assert!((s.avg_duration_ms - 200.0).abs() < f64::EPSILON);
    }

    #[test]
    fn stats_of_empty_map_are_zero() {
        let s = stats(&HashMap::new());
        assert_eq!(s, RunStats::default());
    }

    #[test]
    fn subscribers_receive_until_removed() {
        let subs = Subscribers::default();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let id = subs.add(Arc::new(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        }));
        let snap = snapshot("fetch", &HashMap::new(), 0);

        subs.publish(&snap);
        assert!(subs.remove(id));
        assert!(!subs.remove(id));
        subs.publish(&snap);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(subs.len(), 0);
    }
}
