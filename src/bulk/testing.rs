//! Scripted backend for engine tests.

use anyhow::{Result, anyhow};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crate::git::{GitBackend, Invocation, Outcome};

#[derive(Debug, Clone)]
pub(crate) struct Call {
    pub path: String,
    pub command: &'static str,
    pub started: Instant,
    pub finished: Instant,
}

/// Answers every call after an optional per-path delay, failing or panicking
/// for configured paths. Tracks how many calls overlapped.
#[derive(Default)]
pub(crate) struct ScriptedBackend {
    default_delay: Duration,
    delays: HashMap<String, Duration>,
    failures: HashMap<String, String>,
    panics: HashSet<String>,
    active: AtomicUsize,
    peak: AtomicUsize,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delay_all(mut self, d: Duration) -> Self {
        self.default_delay = d;
        self
    }

    pub fn delay(mut self, path: &str, d: Duration) -> Self {
        self.delays.insert(path.to_string(), d);
        self
    }

    pub fn fail(mut self, path: &str, message: &str) -> Self {
        self.failures.insert(path.to_string(), message.to_string());
        self
    }

    pub fn panic_on(mut self, path: &str) -> Self {
        self.panics.insert(path.to_string());
        self
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }
}

impl GitBackend for ScriptedBackend {
    fn invoke(&self, invocation: &Invocation) -> Result<Outcome> {
        let path = invocation
            .repo_path()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();
        let started = Instant::now();
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let delay = self.delays.get(&path).copied().unwrap_or(self.default_delay);
        if !delay.is_zero() {
            thread::sleep(delay);
        }

        self.active.fetch_sub(1, Ordering::SeqCst);
        self.calls.lock().push(Call {
            path: path.clone(),
            command: invocation.command,
            started,
            finished: Instant::now(),
        });

        if self.panics.contains(&path) {
            panic!("scripted panic for {}", path);
        }
        match self.failures.get(&path) {
            Some(msg) => Err(anyhow!("{}", msg)),
            None => Ok(Outcome::new(format!("ok {}", path))),
        }
    }
}
