use chrono::Utc;
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use super::operation::Operation;
use super::task::{BulkOperationResult, RepositoryTarget, TIMEOUT_PREFIX, TaskStatus};
use crate::git::GitBackend;

/// Run `operation` against one repository, racing the backend call against
/// `timeout`.
///
/// The backend call gets its own thread. If the timer wins, that thread is
/// left to finish on its own and whatever it sends is dropped with the
/// channel.
pub fn execute(
    backend: Arc<dyn GitBackend>,
    operation: &Operation,
    target: &RepositoryTarget,
    timeout: Duration,
) -> BulkOperationResult {
    let started_at = Utc::now();
    let clock = Instant::now();
    let invocation = operation.invocation(&target.path);

    let (tx, rx) = mpsc::sync_channel(1);
    let spawned = thread::Builder::new()
        .name(format!("gitfleet-call-{}", target.id))
        .spawn(move || {
            let res = backend.invoke(&invocation);
            let _ = tx.send(res);
        });

    let (status, output, error) = match spawned {
        Err(e) => (
            TaskStatus::Failed,
            None,
            Some(format!("failed to start backend call: {}", e)),
        ),
        Ok(_) => match rx.recv_timeout(timeout) {
            Ok(Ok(outcome)) => (TaskStatus::Completed, Some(outcome.message), None),
            Ok(Err(e)) => (TaskStatus::Failed, None, Some(format!("{:#}", e))),
            Err(RecvTimeoutError::Timeout) => (
                TaskStatus::Failed,
                None,
                Some(format!("{} after {} ms", TIMEOUT_PREFIX, timeout.as_millis())),
            ),
            Err(RecvTimeoutError::Disconnected) => (
                TaskStatus::Failed,
                None,
                Some("backend call panicked".to_string()),
            ),
        },
    };

    let duration_ms = u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX);
    BulkOperationResult {
        repository_id: target.id.clone(),
        repository_name: target.name.clone(),
        status,
        error,
        output,
        duration_ms: Some(duration_ms),
        started_at,
        completed_at: Some(Utc::now()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bulk::testing::ScriptedBackend;

    fn target(path: &str) -> RepositoryTarget {
        RepositoryTarget::new(path, path, path)
    }

    #[test]
    fn success_is_completed_with_output() {
        let backend = ScriptedBackend::new();
        let r = execute(backend.arc(), &Operation::Status, &target("/a"), Duration::from_secs(1));
        assert_eq!(r.status, TaskStatus::Completed);
        assert_eq!(r.output.as_deref(), Some("ok /a"));
        assert_eq!(r.error, None);
        assert!(r.duration_ms.is_some());
        assert!(r.completed_at.is_some());
    }

    #[test]
    fn backend_error_is_captured_verbatim() {
        let backend = ScriptedBackend::new().fail("/a", "remote rejected: non-fast-forward");
        let r = execute(backend.arc(), &Operation::Status, &target("/a"), Duration::from_secs(1));
        assert_eq!(r.status, TaskStatus::Failed);
        assert_eq!(r.error.as_deref(), Some("remote rejected: non-fast-forward"));
        assert!(!r.timed_out());
    }

    #[test]
    fn timeout_wins_over_slow_backend() {
        let backend = ScriptedBackend::new().delay("/a", Duration::from_millis(200));
        let r = execute(backend.arc(), &Operation::Status, &target("/a"), Duration::from_millis(50));
        assert_eq!(r.status, TaskStatus::Failed);
        assert!(r.timed_out());
        assert!(r.error.unwrap().contains("50 ms"));
        let ms = r.duration_ms.unwrap();
        assert!((50..180).contains(&ms), "duration {ms}");
    }

    #[test]
    fn panicking_backend_is_a_failure() {
        let backend = ScriptedBackend::new().panic_on("/a");
        let r = execute(backend.arc(), &Operation::Status, &target("/a"), Duration::from_secs(1));
        assert_eq!(r.status, TaskStatus::Failed);
        assert_eq!(r.error.as_deref(), Some("backend call panicked"));
    }
}
