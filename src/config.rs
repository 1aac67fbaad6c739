use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::bulk::{BulkOptions, LockSet, RepositoryTarget};
use crate::paths::{config_path, resolve_path};

/// Top-level configuration loaded from `config.toml`.
///
/// Example TOML:
/// ```toml
/// [bulk]
/// max_concurrent = 3
/// timeout_ms = 120000
/// abort_on_error = false
///
/// [[repositories]]
/// id     = "web"
/// name   = "web-app"
/// path   = "~/src/web-app"
/// locked = "release freeze"
/// ```
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub bulk: BulkSettings,
    #[serde(default)]
    pub repositories: Vec<Repository>,
    /// Directory relative repository paths resolve against.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

/// `[bulk]` table. Missing keys take the engine defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BulkSettings {
    /// `0` means one slot per CPU.
    pub max_concurrent: usize,
    pub timeout_ms: u64,
    pub abort_on_error: bool,
}

impl Default for BulkSettings {
    fn default() -> Self {
        let d = BulkOptions::default();
        Self {
            max_concurrent: d.max_concurrent,
            timeout_ms: d.timeout.as_millis() as u64,
            abort_on_error: d.abort_on_error,
        }
    }
}

impl BulkSettings {
    pub fn options(&self) -> BulkOptions {
        BulkOptions {
            max_concurrent: concurrency_slots(self.max_concurrent),
            timeout: Duration::from_millis(self.timeout_ms),
            abort_on_error: self.abort_on_error,
        }
    }
}

/// Resolve a configured slot count; `0` means one slot per CPU.
pub fn concurrency_slots(n: usize) -> usize {
    match n {
        0 => num_cpus::get().max(1),
        n => n,
    }
}

/// One `[[repositories]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct Repository {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    pub path: String,
    /// Reason for an exclusive lock; locked repositories are never run.
    #[serde(default)]
    pub locked: Option<String>,
}

impl Repository {
    /// Display name: `name`, or the last path component.
    pub fn display_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| {
            Path::new(&self.path)
                .file_name()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| self.path.clone())
        })
    }

    pub fn id(&self) -> String {
        self.id.clone().unwrap_or_else(|| self.display_name())
    }
}

impl Config {
    pub fn parse(txt: &str, base_dir: &Path) -> Result<Self> {
        let mut cfg: Config = toml::from_str(txt).context("failed to parse config.toml")?;
        cfg.base_dir = base_dir.to_path_buf();
        for r in &cfg.repositories {
            if r.path.trim().is_empty() {
                bail!("repository '{}' has an empty path", r.display_name());
            }
        }
        Ok(cfg)
    }

    /// Repository targets in file order.
    pub fn targets(&self) -> Result<Vec<RepositoryTarget>> {
        self.repositories
            .iter()
            .map(|r| {
                Ok(RepositoryTarget {
                    id: r.id(),
                    name: r.display_name(),
                    path: resolve_path(&r.path, &self.base_dir)?,
                })
            })
            .collect()
    }

    pub fn locks(&self) -> LockSet {
        let mut locks = LockSet::new();
        for r in &self.repositories {
            if let Some(reason) = &r.locked {
                locks.lock(r.id(), reason.clone());
            }
        }
        locks
    }
}

/// Load `config.toml` from `path`, or from the default location.
///
/// # Errors
/// - Returns an error if the file cannot be read.
/// - Returns an error if parsing the TOML fails.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => config_path()?,
    };
    let txt = fs::read_to_string(&path)
        .with_context(|| format!("config not found: {}", path.display()))?;
    let base = path.parent().unwrap_or(Path::new("."));
    Config::parse(&txt, base)
}
