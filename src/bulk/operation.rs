//! Operation registry.
//!
//! Every bulk operation is a variant of [`Operation`] carrying its own typed
//! parameters. [`OperationKind::spec`] is the lookup table from kind to the
//! backend command it issues; the `match` there is exhaustive, so adding a
//! kind without registering it does not compile.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::git::Invocation;

/// Parameterless identifier of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Pull,
    Push,
    Fetch,
    Checkout,
    CreateBranch,
    DeleteBranch,
    Stash,
    Reset,
    Clean,
    Status,
    Sync,
}

/// Registry entry for one operation kind.
#[derive(Debug)]
pub struct OperationSpec {
    pub kind: OperationKind,
    /// Command name passed to the backend.
    pub command: &'static str,
    pub summary: &'static str,
}

static PULL: OperationSpec = OperationSpec {
    kind: OperationKind::Pull,
    command: "pull_from_remote",
    summary: "fetch and fast-forward the branch",
};
static PUSH: OperationSpec = OperationSpec {
    kind: OperationKind::Push,
    command: "push_to_remote",
    summary: "push the branch to the remote",
};
static FETCH: OperationSpec = OperationSpec {
    kind: OperationKind::Fetch,
    command: "fetch_from_remote",
    summary: "fetch refs from the remote",
};
static CHECKOUT: OperationSpec = OperationSpec {
    kind: OperationKind::Checkout,
    command: "switch_branch",
    summary: "switch to a branch",
};
static CREATE_BRANCH: OperationSpec = OperationSpec {
    kind: OperationKind::CreateBranch,
    command: "create_branch",
    summary: "create a branch at HEAD",
};
static DELETE_BRANCH: OperationSpec = OperationSpec {
    kind: OperationKind::DeleteBranch,
    command: "delete_branch",
    summary: "delete a local branch",
};
static STASH: OperationSpec = OperationSpec {
    kind: OperationKind::Stash,
    command: "create_stash",
    summary: "stash working tree changes",
};
static RESET: OperationSpec = OperationSpec {
    kind: OperationKind::Reset,
    command: "reset_to_commit",
    summary: "reset HEAD to a revision",
};
static CLEAN: OperationSpec = OperationSpec {
    kind: OperationKind::Clean,
    command: "clean_working_tree",
    summary: "remove untracked files",
};
static STATUS: OperationSpec = OperationSpec {
    kind: OperationKind::Status,
    command: "get_repository_status",
    summary: "summarize working tree status",
};
static SYNC: OperationSpec = OperationSpec {
    kind: OperationKind::Sync,
    command: "sync_with_remote",
    summary: "pull then push",
};

impl OperationKind {
    pub const ALL: [OperationKind; 11] = [
        OperationKind::Pull,
        OperationKind::Push,
        OperationKind::Fetch,
        OperationKind::Checkout,
        OperationKind::CreateBranch,
        OperationKind::DeleteBranch,
        OperationKind::Stash,
        OperationKind::Reset,
        OperationKind::Clean,
        OperationKind::Status,
        OperationKind::Sync,
    ];

    pub fn spec(self) -> &'static OperationSpec {
        match self {
            OperationKind::Pull => &PULL,
            OperationKind::Push => &PUSH,
            OperationKind::Fetch => &FETCH,
            OperationKind::Checkout => &CHECKOUT,
            OperationKind::CreateBranch => &CREATE_BRANCH,
            OperationKind::DeleteBranch => &DELETE_BRANCH,
            OperationKind::Stash => &STASH,
            OperationKind::Reset => &RESET,
            OperationKind::Clean => &CLEAN,
            OperationKind::Status => &STATUS,
            OperationKind::Sync => &SYNC,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::Pull => "pull",
            OperationKind::Push => "push",
            OperationKind::Fetch => "fetch",
            OperationKind::Checkout => "checkout",
            OperationKind::CreateBranch => "create_branch",
            OperationKind::DeleteBranch => "delete_branch",
            OperationKind::Stash => "stash",
            OperationKind::Reset => "reset",
            OperationKind::Clean => "clean",
            OperationKind::Status => "status",
            OperationKind::Sync => "sync",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().replace('-', "_");
        OperationKind::ALL
            .into_iter()
            .find(|k| k.as_str() == wanted)
            .ok_or_else(|| format!("unknown operation: {}", s))
    }
}

fn default_remote() -> String {
    "origin".to_string()
}

/// Parameters shared by pull, push and sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteParams {
    #[serde(default = "default_remote")]
    pub remote: String,
    /// Branch to operate on; `None` means the branch HEAD points at.
    #[serde(default)]
    pub branch: Option<String>,
}

impl Default for RemoteParams {
    fn default() -> Self {
        Self {
            remote: default_remote(),
            branch: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchParams {
    #[serde(default = "default_remote")]
    pub remote: String,
    #[serde(default)]
    pub prune: bool,
}

impl Default for FetchParams {
    fn default() -> Self {
        Self {
            remote: default_remote(),
            prune: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutParams {
    pub branch: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBranchParams {
    pub name: String,
    #[serde(default)]
    pub checkout: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteBranchParams {
    pub name: String,
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StashParams {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub include_untracked: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResetMode {
    Soft,
    #[default]
    Mixed,
    Hard,
}

impl FromStr for ResetMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "soft" => Ok(ResetMode::Soft),
            "mixed" => Ok(ResetMode::Mixed),
            "hard" => Ok(ResetMode::Hard),
            other => Err(format!(
                "invalid reset mode '{}' (use soft, mixed or hard)",
                other
            )),
        }
    }
}

fn default_reset_target() -> String {
    "HEAD".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetParams {
    #[serde(default)]
    pub mode: ResetMode,
    #[serde(default = "default_reset_target")]
    pub target: String,
}

impl Default for ResetParams {
    fn default() -> Self {
        Self {
            mode: ResetMode::default(),
            target: default_reset_target(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanParams {
    #[serde(default)]
    pub directories: bool,
}

/// A bulk operation together with its parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Pull(RemoteParams),
    Push(RemoteParams),
    Fetch(FetchParams),
    Checkout(CheckoutParams),
    CreateBranch(CreateBranchParams),
    DeleteBranch(DeleteBranchParams),
    Stash(StashParams),
    Reset(ResetParams),
    Clean(CleanParams),
    Status,
    Sync(RemoteParams),
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Pull(_) => OperationKind::Pull,
            Operation::Push(_) => OperationKind::Push,
            Operation::Fetch(_) => OperationKind::Fetch,
            Operation::Checkout(_) => OperationKind::Checkout,
            Operation::CreateBranch(_) => OperationKind::CreateBranch,
            Operation::DeleteBranch(_) => OperationKind::DeleteBranch,
            Operation::Stash(_) => OperationKind::Stash,
            Operation::Reset(_) => OperationKind::Reset,
            Operation::Clean(_) => OperationKind::Clean,
            Operation::Status => OperationKind::Status,
            Operation::Sync(_) => OperationKind::Sync,
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind().as_str()
    }

    /// Reject parameters that cannot succeed against any repository.
    pub fn validate(&self) -> Result<(), String> {
        fn non_empty(field: &str, value: &str) -> Result<(), String> {
            if value.trim().is_empty() {
                Err(format!("{} must not be empty", field))
            } else {
                Ok(())
            }
        }
        fn valid_branch(value: &str) -> Result<(), String> {
            non_empty("branch name", value)?;
            if git2::Branch::name_is_valid(value).unwrap_or(false) {
                Ok(())
            } else {
                Err(format!("invalid branch name: {}", value))
            }
        }

        match self {
            Operation::Pull(p) | Operation::Push(p) | Operation::Sync(p) => {
                non_empty("remote", &p.remote)?;
                match &p.branch {
                    Some(b) => valid_branch(b),
                    None => Ok(()),
                }
            }
            Operation::Fetch(p) => non_empty("remote", &p.remote),
            Operation::Checkout(p) => valid_branch(&p.branch),
            Operation::CreateBranch(p) => valid_branch(&p.name),
            Operation::DeleteBranch(p) => valid_branch(&p.name),
            Operation::Reset(p) => non_empty("reset target", &p.target),
            Operation::Stash(_) | Operation::Clean(_) | Operation::Status => Ok(()),
        }
    }

    /// Parameter record as a JSON object.
    pub fn parameters(&self) -> Value {
        let value = match self {
            Operation::Pull(p) | Operation::Push(p) | Operation::Sync(p) => serde_json::to_value(p),
            Operation::Fetch(p) => serde_json::to_value(p),
            Operation::Checkout(p) => serde_json::to_value(p),
            Operation::CreateBranch(p) => serde_json::to_value(p),
            Operation::DeleteBranch(p) => serde_json::to_value(p),
            Operation::Stash(p) => serde_json::to_value(p),
            Operation::Reset(p) => serde_json::to_value(p),
            Operation::Clean(p) => serde_json::to_value(p),
            Operation::Status => Ok(Value::Object(Default::default())),
        };
        value.unwrap_or_default()
    }

    /// Backend call for one repository.
    pub fn invocation(&self, repo_path: &Path) -> Invocation {
        Invocation::new(self.kind().spec().command, repo_path, self.parameters())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn every_kind_is_registered_under_its_own_kind() {
        for kind in OperationKind::ALL {
            assert_eq!(kind.spec().kind, kind);
            assert!(!kind.spec().command.is_empty());
        }
    }

    #[test]
    fn commands_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for kind in OperationKind::ALL {
            assert!(seen.insert(kind.spec().command), "duplicate {}", kind);
        }
    }

    #[test]
    fn kind_parses_from_its_name_and_dashed_form() {
        for kind in OperationKind::ALL {
            assert_eq!(kind.as_str().parse::<OperationKind>(), Ok(kind));
        }
        assert_eq!(
            "create-branch".parse::<OperationKind>(),
            Ok(OperationKind::CreateBranch)
        );
        assert!("rebase".parse::<OperationKind>().is_err());
    }

    #[test]
    fn invocation_carries_repo_path_and_parameters() {
        let op = Operation::Pull(RemoteParams {
            remote: "upstream".into(),
            branch: Some("main".into()),
        });
        let inv = op.invocation(Path::new("/tmp/repo"));
        assert_eq!(inv.command, "pull_from_remote");
        assert_eq!(inv.repo_path(), Some(PathBuf::from("/tmp/repo")));
        assert_eq!(inv.args["remote"], "upstream");
        assert_eq!(inv.args["branch"], "main");
    }

    #[test]
    fn status_invocation_has_only_repo_path() {
        let inv = Operation::Status.invocation(Path::new("/r"));
        assert_eq!(inv.command, "get_repository_status");
        assert_eq!(inv.args.len(), 1);
    }

    #[test]
    fn parameters_use_camel_case_keys() {
        let op = Operation::Stash(StashParams {
            message: None,
            include_untracked: true,
        });
        assert_eq!(op.parameters()["includeUntracked"], true);
    }

    #[test]
    fn reset_defaults_to_mixed_head() {
        let p: ResetParams = serde_json::from_str("{}").unwrap();
        assert_eq!(p, ResetParams::default());
        assert_eq!(p.mode, ResetMode::Mixed);
        assert_eq!(p.target, "HEAD");
        assert!("hard".parse::<ResetMode>().is_ok());
        assert!("keep".parse::<ResetMode>().is_err());
    }

    #[test]
    fn validate_rejects_bad_branch_names() {
        let bad = Operation::Checkout(CheckoutParams {
            branch: "  ".into(),
        });
        assert!(bad.validate().is_err());

        let bad = Operation::CreateBranch(CreateBranchParams {
            name: "feature..x".into(),
            checkout: false,
        });
        assert!(bad.validate().is_err());

        let ok = Operation::DeleteBranch(DeleteBranchParams {
            name: "feature/x".into(),
            force: false,
        });
        assert!(ok.validate().is_ok());

        let bad = Operation::Fetch(FetchParams {
            remote: String::new(),
            prune: false,
        });
        assert!(bad.validate().is_err());
    }
}
