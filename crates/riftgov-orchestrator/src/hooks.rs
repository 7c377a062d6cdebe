//! Pre/post hook execution.
//!
//! Hooks live at `{hooks_dir}/{pre|post}/{name}.sh`. Every hook in a phase
//! runs even after a sibling fails; the phase fails if any hook did. A hook
//! file that does not exist is a warning only. Hooks are set to
//! [`HOOK_MODE`] before they are invoked.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

use riftgov_exec::{CommandRunner, CommandSpec};
use riftgov_types::{AuditOutcome, RiftError, RunContext};

use crate::permissions::{self, FileMode};

pub const HOOK_TIMEOUT: Duration = Duration::from_secs(300);
/// Mode applied to every hook before it runs.
pub const HOOK_MODE: FileMode = FileMode::new(0o750);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HookPhase {
    Pre,
    Post,
}

impl HookPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            HookPhase::Pre => "pre",
            HookPhase::Post => "post",
        }
    }
}

impl fmt::Display for HookPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "detail")]
pub enum HookStatus {
    Succeeded,
    Failed(String),
    /// No hook file; logged and skipped.
    Missing,
    /// Dry run; the hook exists but was not invoked.
    Skipped,
}

impl HookStatus {
    pub fn is_failure(&self) -> bool {
        matches!(self, HookStatus::Failed(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            HookStatus::Succeeded => "succeeded",
            HookStatus::Failed(_) => "failed",
            HookStatus::Missing => "missing",
            HookStatus::Skipped => "skipped",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HookResult {
    pub hook: String,
    pub path: PathBuf,
    pub status: HookStatus,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseReport {
    pub phase: HookPhase,
    pub results: Vec<HookResult>,
}

impl PhaseReport {
    pub fn failed(&self) -> Vec<String> {
        self.results
            .iter()
            .filter(|r| r.status.is_failure())
            .map(|r| r.hook.clone())
            .collect()
    }

    pub fn is_success(&self) -> bool {
        !self.results.iter().any(|r| r.status.is_failure())
    }

    /// `HookFailure` naming every failed hook, if any failed.
    pub fn failure(&self, script: &str) -> Option<RiftError> {
        let failed = self.failed();
        (!failed.is_empty()).then(|| RiftError::HookFailure {
            script: script.to_string(),
            phase: self.phase.to_string(),
            failed,
        })
    }
}

pub struct HookRunner {
    hooks_dir: PathBuf,
    timeout: Duration,
    runner: Arc<dyn CommandRunner>,
    dry_run: bool,
}

impl HookRunner {
    pub fn new(hooks_dir: impl Into<PathBuf>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            hooks_dir: hooks_dir.into(),
            timeout: HOOK_TIMEOUT,
            runner,
            dry_run: false,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn hook_path(&self, phase: HookPhase, name: &str) -> PathBuf {
        self.hooks_dir
            .join(phase.as_str())
            .join(format!("{name}.sh"))
    }

    /// Run every hook of `phase` for `script`, in order, with `env` added to
    /// the filtered parent environment.
    pub async fn run_phase(
        &self,
        ctx: &RunContext,
        script: &str,
        phase: HookPhase,
        hooks: &[String],
        env: &HashMap<String, String>,
    ) -> PhaseReport {
        let mut results = Vec::with_capacity(hooks.len());
        for hook in hooks {
            let result = self.run_one(script, phase, hook, env).await;
            let (outcome, detail) = match &result.status {
                HookStatus::Succeeded => (
                    AuditOutcome::Passed,
                    format!("succeeded, mode {HOOK_MODE} applied"),
                ),
                HookStatus::Failed(reason) => (AuditOutcome::Failed, reason.clone()),
                HookStatus::Missing => (
                    AuditOutcome::Warning,
                    format!("hook script not found: {}", result.path.display()),
                ),
                HookStatus::Skipped => (AuditOutcome::Passed, "dry-run".to_string()),
            };
            ctx.audit
                .append(format!("{script} {phase}-hook {hook}"), outcome, detail)
                .await;
            results.push(result);
        }
        PhaseReport { phase, results }
    }

    async fn run_one(
        &self,
        script: &str,
        phase: HookPhase,
        hook: &str,
        env: &HashMap<String, String>,
    ) -> HookResult {
        let path = self.hook_path(phase, hook);
        let started = Instant::now();
        let finish = |status: HookStatus, path: PathBuf| HookResult {
            hook: hook.to_string(),
            path,
            status,
            duration_ms: started.elapsed().as_millis() as u64,
        };

        if !is_file(&path).await {
            tracing::warn!(script, phase = %phase, hook, path = %path.display(), "Hook script not found");
            return finish(HookStatus::Missing, path);
        }

        if self.dry_run {
            tracing::info!(script, phase = %phase, hook, "[dry-run] would execute hook");
            return finish(HookStatus::Skipped, path);
        }

        if let Err(e) = permissions::set_mode(&path, HOOK_MODE).await {
            tracing::error!(script, phase = %phase, hook, error = %e, "Cannot set hook mode");
            return finish(
                HookStatus::Failed(format!("cannot set mode {HOOK_MODE} on hook: {e}")),
                path,
            );
        }

        let spec = CommandSpec::new(&path, self.timeout).envs(env.clone());
        let status = match self.runner.run(&spec).await {
            Ok(result) if result.success() => {
                tracing::debug!(script, phase = %phase, hook, "Hook succeeded");
                HookStatus::Succeeded
            }
            Ok(result) => {
                tracing::error!(
                    script,
                    phase = %phase,
                    hook,
                    stderr = %result.stderr.trim(),
                    "Hook failed"
                );
                HookStatus::Failed(result.failure_summary())
            }
            Err(e) => {
                tracing::error!(script, phase = %phase, hook, error = %e, "Hook could not start");
                HookStatus::Failed(e.to_string())
            }
        };
        finish(status, path)
    }
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}
