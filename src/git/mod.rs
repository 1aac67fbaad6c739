//! Git integration layer.
//!
//! The bulk engine never talks to git directly. It hands an [`Invocation`]
//! (a command name plus a JSON argument object) to a [`GitBackend`] and gets
//! an [`Outcome`] or an error back. `git2_backend` is the implementation the
//! CLI uses; tests plug in scripted backends instead.

mod git2_backend;

use anyhow::Result;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

pub use git2_backend::Git2Backend;

/// One call into the backend: `command` plus `{ "repoPath": ..., ...parameters }`.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub command: &'static str,
    pub args: Map<String, Value>,
}

impl Invocation {
    /// Repository path carried in `args["repoPath"]`.
    pub fn repo_path(&self) -> Option<PathBuf> {
        self.args
            .get("repoPath")
            .and_then(Value::as_str)
            .map(PathBuf::from)
    }

    pub(crate) fn new(command: &'static str, repo_path: &Path, params: Value) -> Self {
        let mut args = match params {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        args.insert(
            "repoPath".to_string(),
            Value::String(repo_path.to_string_lossy().into_owned()),
        );
        Self { command, args }
    }
}

/// Successful backend response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub message: String,
}

impl Outcome {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// The external collaborator that actually runs git.
///
/// `invoke` must eventually return. The engine cannot cancel a call once it
/// has been made; a call that outlives its timeout keeps running on its own
/// thread and its result is dropped.
pub trait GitBackend: Send + Sync + 'static {
    fn invoke(&self, invocation: &Invocation) -> Result<Outcome>;
}
