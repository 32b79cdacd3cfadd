//! Durable run state: one JSON document per run under `state_dir`.

use std::fs::{self, File, OpenOptions, TryLockError};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::invariants::validate_run_id;
use crate::core::types::{ExecutionPlan, StepResult, TaskUnderstanding};
use crate::error::EngineError;

/// Persisted record of a run (`<state_dir>/<run_id>.json`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunState {
    pub run_id: String,
    pub created_at: DateTime<Utc>,
    /// First-write-wins: set once, never replaced by a resume.
    pub understanding: Option<TaskUnderstanding>,
    /// First-write-wins: set once, never replaced by a resume.
    pub plan: Option<ExecutionPlan>,
    /// Append-only step history in execution order.
    pub steps: Vec<StepResult>,
}

impl RunState {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            created_at: Utc::now(),
            understanding: None,
            plan: None,
            steps: Vec::new(),
        }
    }

    /// Attach inputs that are not yet persisted. Returns true if anything changed.
    pub fn attach_inputs(
        &mut self,
        understanding: &TaskUnderstanding,
        plan: &ExecutionPlan,
    ) -> bool {
        let mut changed = false;
        if self.understanding.is_none() {
            self.understanding = Some(understanding.clone());
            changed = true;
        }
        if self.plan.is_none() {
            self.plan = Some(plan.clone());
            changed = true;
        }
        changed
    }

    pub fn record(&mut self, result: StepResult) {
        self.steps.push(result);
    }
}

/// File-backed store of [`RunState`] documents.
#[derive(Debug, Clone)]
pub struct RunStore {
    state_dir: PathBuf,
}

impl RunStore {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
        }
    }

    pub fn path(&self, run_id: &str) -> PathBuf {
        self.state_dir.join(format!("{run_id}.json"))
    }

    pub fn lock_path(&self, run_id: &str) -> PathBuf {
        self.state_dir.join(format!("{run_id}.lock"))
    }

    /// Mint a fresh run id, write its initial empty state, and return the id.
    ///
    /// Ids are `run-<yyyymmdd-HHMMSS>` with a numeric suffix on collision. The
    /// document path is reserved with create-new semantics, so concurrent or
    /// rapid successive calls never hand out the same id.
    pub fn create(&self) -> Result<String> {
        self.create_from(&format!("run-{}", Utc::now().format("%Y%m%d-%H%M%S")))
    }

    fn create_from(&self, base: &str) -> Result<String> {
        self.ensure_dir()?;
        for suffix in 1..=9999u32 {
            let run_id = if suffix == 1 {
                base.to_string()
            } else {
                format!("{base}-{suffix}")
            };
            let path = self.path(&run_id);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(_) => {
                    if let Err(err) = self.save(&run_id, &RunState::new(run_id.clone())) {
                        if let Err(remove_err) = fs::remove_file(&path) {
                            warn!(
                                path = %path.display(),
                                error = %remove_err,
                                "failed to remove run id reservation"
                            );
                        }
                        return Err(err);
                    }
                    info!(run_id = %run_id, "created run");
                    return Ok(run_id);
                }
                Err(err) if err.kind() == ErrorKind::AlreadyExists => continue,
                Err(err) => {
                    return Err(err).with_context(|| format!("reserve {}", path.display()));
                }
            }
        }
        Err(anyhow::anyhow!(
            "unable to allocate a unique run id from base '{base}'"
        ))
    }

    pub fn exists(&self, run_id: &str) -> bool {
        self.path(run_id).is_file()
    }

    /// Atomically persist the full document for `run_id` (temp file + rename).
    pub fn save(&self, run_id: &str, state: &RunState) -> Result<()> {
        ensure_valid_run_id(run_id)?;
        debug!(run_id = %run_id, steps = state.steps.len(), "writing run state");
        let mut buf = serde_json::to_string_pretty(state).context("serialize run state")?;
        buf.push('\n');
        self.ensure_dir()?;
        write_atomic(&self.path(run_id), &buf)
    }

    /// Load the document for `run_id`; fails with [`EngineError::RunNotFound`] if absent.
    pub fn load(&self, run_id: &str) -> Result<RunState> {
        ensure_valid_run_id(run_id)?;
        let path = self.path(run_id);
        debug!(path = %path.display(), "loading run state");
        if !path.is_file() {
            return Err(EngineError::RunNotFound {
                run_id: run_id.to_string(),
            }
            .into());
        }
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("read run state {}", path.display()))?;
        let state: RunState = serde_json::from_str(&contents)
            .with_context(|| format!("parse run state {}", path.display()))?;
        debug!(run_id = %state.run_id, steps = state.steps.len(), "run state loaded");
        Ok(state)
    }

    /// Known run ids, sorted.
    pub fn list(&self) -> Result<Vec<String>> {
        if !self.state_dir.exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&self.state_dir)
            .with_context(|| format!("read state dir {}", self.state_dir.display()))?;
        let mut ids = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                ids.push(stem.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Take the per-run advisory lock; fails with [`EngineError::RunLocked`] if held.
    ///
    /// The lock is an OS lock on `<run_id>.lock`, so it is released when the
    /// holder exits, even without unwinding. The file itself stays on disk.
    pub fn lock(&self, run_id: &str) -> Result<RunLock> {
        ensure_valid_run_id(run_id)?;
        self.ensure_dir()?;
        let path = self.lock_path(run_id);
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .with_context(|| format!("open {}", path.display()))?;
        match file.try_lock() {
            Ok(()) => {}
            Err(TryLockError::WouldBlock) => {
                return Err(EngineError::RunLocked {
                    run_id: run_id.to_string(),
                    path,
                }
                .into());
            }
            Err(TryLockError::Error(err)) => {
                return Err(err).with_context(|| format!("lock {}", path.display()));
            }
        }
        file.set_len(0)
            .with_context(|| format!("truncate {}", path.display()))?;
        writeln!(
            file,
            "pid={} acquired_at={}",
            std::process::id(),
            Utc::now().to_rfc3339()
        )
        .with_context(|| format!("write {}", path.display()))?;
        debug!(run_id = %run_id, "run lock acquired");
        Ok(RunLock { path, file })
    }

    /// Whether a live invocation currently holds the lock for `run_id`.
    pub fn is_locked(&self, run_id: &str) -> bool {
        let Ok(file) = File::open(self.lock_path(run_id)) else {
            return false;
        };
        matches!(file.try_lock(), Err(TryLockError::WouldBlock))
    }

    fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.state_dir)
            .with_context(|| format!("create directory {}", self.state_dir.display()))
    }
}

/// Held for the duration of one engine invocation; releases the OS lock on drop.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
    file: File,
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(err) = self.file.unlock() {
            warn!(path = %self.path.display(), error = %err, "failed to release run lock");
        }
    }
}

fn ensure_valid_run_id(run_id: &str) -> Result<()> {
    let errors = validate_run_id(run_id);
    if errors.is_empty() {
        return Ok(());
    }
    Err(EngineError::validation(errors).into())
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp run state {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace run state {}", path.display()))?;
    Ok(())
}
