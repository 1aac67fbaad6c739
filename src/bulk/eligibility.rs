//! Pre-scheduling validity check.
//!
//! Splits the requested targets into the ones the scheduler will run and the
//! ones it will not, each with a reason. Only the filesystem is consulted;
//! the git backend is never called from here.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use super::task::RepositoryTarget;

/// A target excluded before scheduling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidTarget {
    pub target: RepositoryTarget,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Partition {
    pub valid: Vec<RepositoryTarget>,
    pub invalid: Vec<InvalidTarget>,
}

/// Exclusive locks the caller already knows about, keyed by repository id.
#[derive(Debug, Clone, Default)]
pub struct LockSet {
    locks: HashMap<String, String>,
}

impl LockSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock(&mut self, repository_id: impl Into<String>, reason: impl Into<String>) {
        self.locks.insert(repository_id.into(), reason.into());
    }

    pub fn unlock(&mut self, repository_id: &str) -> bool {
        self.locks.remove(repository_id).is_some()
    }

    pub fn reason(&self, repository_id: &str) -> Option<&str> {
        self.locks.get(repository_id).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Partition `targets` preserving input order on both sides.
pub fn partition(targets: &[RepositoryTarget], locks: &LockSet) -> Partition {
    let mut out = Partition::default();
    let mut seen: HashSet<&str> = HashSet::new();

    for target in targets {
        let duplicate = !seen.insert(target.id.as_str());
        let verdict = if target.id.trim().is_empty() {
            Err("empty repository id".to_string())
        } else if duplicate {
            Err("duplicate repository id".to_string())
        } else {
            check(target, locks)
        };

        match verdict {
            Ok(()) => out.valid.push(target.clone()),
            Err(reason) => {
                tracing::debug!(repository = %target.id, %reason, "target excluded");
                out.invalid.push(InvalidTarget {
                    target: target.clone(),
                    reason,
                });
            }
        }
    }
    out
}

fn check(target: &RepositoryTarget, locks: &LockSet) -> Result<(), String> {
    let path = target.path.as_path();
    let meta = match fs::metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err("path not found".to_string());
        }
        Err(e) => return Err(format!("path is not readable: {}", e)),
    };
    if !meta.is_dir() {
        return Err("path is not a directory".to_string());
    }
    if let Err(e) = fs::read_dir(path) {
        return Err(format!("path is not readable: {}", e));
    }
    if !path.join(".git").exists() {
        return Err("not a git repository".to_string());
    }
    if let Some(reason) = locks.reason(&target.id) {
        return Err(format!("locked: {}", reason));
    }
    if has_index_lock(path) {
        return Err("repository is locked by another git process".to_string());
    }
    Ok(())
}

fn has_index_lock(repo: &Path) -> bool {
    let git_dir = repo.join(".git");
    git_dir.is_dir() && git_dir.join("index.lock").exists()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn repo_dir(root: &TempDir, name: &str) -> RepositoryTarget {
        let p = root.path().join(name);
        fs::create_dir_all(p.join(".git")).unwrap();
        RepositoryTarget::new(name, name, p)
    }

    #[test]
    fn deleted_path_is_invalid_with_reason() {
        let tmp = TempDir::new().unwrap();
        let a = repo_dir(&tmp, "a");
        let b = repo_dir(&tmp, "b");
        let c = repo_dir(&tmp, "c");
        fs::remove_dir_all(&b.path).unwrap();

        let part = partition(&[a.clone(), b.clone(), c.clone()], &LockSet::new());
        assert_eq!(part.valid, vec![a, c]);
        assert_eq!(part.invalid.len(), 1);
        assert_eq!(part.invalid[0].target, b);
        assert_eq!(part.invalid[0].reason, "path not found");
    }

    #[test]
    fn file_and_plain_dir_are_rejected() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("file");
        fs::write(&file, "x").unwrap();
        let plain = tmp.path().join("plain");
        fs::create_dir(&plain).unwrap();

        let part = partition(
            &[
                RepositoryTarget::new("f", "f", &file),
                RepositoryTarget::new("p", "p", &plain),
            ],
            &LockSet::new(),
        );
        assert!(part.valid.is_empty());
        assert_eq!(part.invalid[0].reason, "path is not a directory");
        assert_eq!(part.invalid[1].reason, "not a git repository");
    }

    #[test]
    fn caller_locks_and_index_lock_exclude_targets() {
        let tmp = TempDir::new().unwrap();
        let a = repo_dir(&tmp, "a");
        let b = repo_dir(&tmp, "b");
        fs::write(b.path.join(".git").join("index.lock"), "").unwrap();

        let mut locks = LockSet::new();
        locks.lock("a", "rebase in progress");

        let part = partition(&[a, b], &locks);
        assert!(part.valid.is_empty());
        assert_eq!(part.invalid[0].reason, "locked: rebase in progress");
        assert_eq!(
            part.invalid[1].reason,
            "repository is locked by another git process"
        );

        assert!(locks.unlock("a"));
        assert!(!locks.unlock("a"));
        assert!(locks.is_empty());
    }

    #[test]
    fn duplicate_and_empty_ids_are_rejected() {
        let tmp = TempDir::new().unwrap();
        let a = repo_dir(&tmp, "a");
        let mut dup = a.clone();
        dup.name = "again".into();
        let mut blank = a.clone();
        blank.id = " ".into();

        let part = partition(&[a.clone(), dup, blank], &LockSet::new());
        assert_eq!(part.valid, vec![a]);
        let reasons: Vec<_> = part.invalid.iter().map(|i| i.reason.as_str()).collect();
        assert_eq!(reasons, ["duplicate repository id", "empty repository id"]);
    }

    #[test]
    fn every_invalid_entry_has_a_reason() {
        let tmp = TempDir::new().unwrap();
        let targets: Vec<_> = (0..4)
            .map(|i| RepositoryTarget::new(format!("r{i}"), "r", tmp.path().join(format!("missing{i}"))))
            .collect();
        let part = partition(&targets, &LockSet::new());
        assert_eq!(part.invalid.len(), 4);
        assert!(part.invalid.iter().all(|i| !i.reason.is_empty()));
    }
}
