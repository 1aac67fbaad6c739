use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Prefix of every timeout error message.
pub const TIMEOUT_PREFIX: &str = "operation timed out";

/// One repository selected by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryTarget {
    pub id: String,
    pub name: String,
    pub path: PathBuf,
}

impl RepositoryTarget {
    pub fn new(id: impl Into<String>, name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            path: path.into(),
        }
    }
}

/// Run-wide knobs. Immutable once a run starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkOptions {
    pub max_concurrent: usize,
    /// Per task, not per run.
    pub timeout: Duration,
    pub abort_on_error: bool,
}

impl BulkOptions {
    pub const DEFAULT_MAX_CONCURRENT: usize = 3;
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

    pub fn validate(&self) -> Result<(), String> {
        if self.max_concurrent == 0 {
            return Err("max_concurrent must be at least 1".to_string());
        }
        if self.timeout.is_zero() {
            return Err("timeout must be greater than zero".to_string());
        }
        Ok(())
    }
}

impl Default for BulkOptions {
    fn default() -> Self {
        Self {
            max_concurrent: Self::DEFAULT_MAX_CONCURRENT,
            timeout: Self::DEFAULT_TIMEOUT,
            abort_on_error: false,
        }
    }
}

/// Task lifecycle: `Pending -> Running -> {Completed | Failed}` or `Pending -> Skipped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Skipped
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// Per-repository record of one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkOperationResult {
    pub repository_id: String,
    pub repository_name: String,
    pub status: TaskStatus,
    pub error: Option<String>,
    /// Backend message on success.
    pub output: Option<String>,
    pub duration_ms: Option<u64>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl BulkOperationResult {
    pub(crate) fn pending(target: &RepositoryTarget) -> Self {
        Self {
            repository_id: target.id.clone(),
            repository_name: target.name.clone(),
            status: TaskStatus::Pending,
            error: None,
            output: None,
            duration_ms: None,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    pub(crate) fn skipped(target: &RepositoryTarget, reason: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            status: TaskStatus::Skipped,
            error: Some(reason.into()),
            started_at: now,
            completed_at: Some(now),
            ..Self::pending(target)
        }
    }

    /// `true` when the task failed because the backend never answered in time.
    pub fn timed_out(&self) -> bool {
        self.status == TaskStatus::Failed
            && self
                .error
                .as_deref()
                .is_some_and(|e| e.starts_with(TIMEOUT_PREFIX))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_match_documented_values() {
        let o = BulkOptions::default();
        assert_eq!(o.max_concurrent, 3);
        assert_eq!(o.timeout, Duration::from_secs(120));
        assert!(!o.abort_on_error);
        assert!(o.validate().is_ok());
    }

    #[test]
    fn options_reject_zero_slots_and_zero_timeout() {
        let o = BulkOptions {
            max_concurrent: 0,
            ..BulkOptions::default()
        };
        assert!(o.validate().is_err());
        let o = BulkOptions {
            timeout: Duration::ZERO,
            ..BulkOptions::default()
        };
        assert!(o.validate().is_err());
    }

    #[test]
    fn skipped_result_is_terminal_without_duration() {
        let t = RepositoryTarget::new("a", "A", "/a");
        let r = BulkOperationResult::skipped(&t, "aborted");
        assert!(r.status.is_terminal());
        assert_eq!(r.duration_ms, None);
        assert!(r.completed_at.is_some());
        assert!(!r.timed_out());
    }

    #[test]
    fn timed_out_only_for_failed_timeout_messages() {
        let t = RepositoryTarget::new("a", "A", "/a");
        let mut r = BulkOperationResult::pending(&t);
        r.status = TaskStatus::Failed;
        r.error = Some(format!("{} after 50 ms", TIMEOUT_PREFIX));
        assert!(r.timed_out());
        r.error = Some("remote rejected".into());
        assert!(!r.timed_out());
    }
}
