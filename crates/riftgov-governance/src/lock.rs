//! SemVerX lock compliance via the external validator.
//!
//! Contract: `<tool> --semverx-validate --project-root <root> --package <name>
//! --version <version>`; exit 0 means compliant. Any other exit, a timeout,
//! or a tool that cannot be started is a violation, never a skip.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use riftgov_exec::{CommandRunner, CommandSpec};
use riftgov_types::GovernanceDescriptor;

pub const DEFAULT_SEMVERX_TOOL: &str = "nlink";
pub const LOCK_CHECK_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockVerdict {
    /// `semverx_lock` or `nlink_enabled` is off; the tool is not consulted.
    Skipped,
    Compliant,
    Violation(String),
}

pub struct LockChecker {
    tool: PathBuf,
    timeout: Duration,
    runner: Arc<dyn CommandRunner>,
}

impl LockChecker {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            tool: PathBuf::from(DEFAULT_SEMVERX_TOOL),
            timeout: LOCK_CHECK_TIMEOUT,
            runner,
        }
    }

    pub fn with_tool(mut self, tool: impl Into<PathBuf>) -> Self {
        self.tool = tool.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn check(&self, project_root: &Path, descriptor: &GovernanceDescriptor) -> LockVerdict {
        if !descriptor.requires_lock_check() {
            return LockVerdict::Skipped;
        }

        let spec = CommandSpec::new(&self.tool, self.timeout).args([
            "--semverx-validate".to_string(),
            "--project-root".to_string(),
            project_root.display().to_string(),
            "--package".to_string(),
            descriptor.package_name.clone(),
            "--version".to_string(),
            descriptor.version.clone(),
        ]);

        match self.runner.run(&spec).await {
            Ok(result) if result.success() => LockVerdict::Compliant,
            Ok(result) => {
                tracing::warn!(
                    package = %descriptor.package_name,
                    version = %descriptor.version,
                    exit_code = result.exit_code,
                    timed_out = result.timed_out,
                    "SemVerX validation rejected package"
                );
                LockVerdict::Violation(format!(
                    "{} {}",
                    spec.program_name(),
                    result.failure_summary()
                ))
            }
            Err(e) => {
                tracing::warn!(
                    tool = %self.tool.display(),
                    error = %e,
                    "SemVerX validator unavailable - treating as non-compliant"
                );
                LockVerdict::Violation(format!("{} unavailable: {e}", spec.program_name()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use riftgov_exec::{RecordingRunner, ScriptedResponse};
    use std::path::Path;

    fn descriptor(semverx_lock: bool, nlink_enabled: bool) -> GovernanceDescriptor {
        let json = serde_json::json!({
            "package_name": "rift-core",
            "version": "2.1.0",
            "stage": 2,
            "timestamp": "2026-01-01T00:00:00Z",
            "semverx_lock": semverx_lock,
            "nlink_enabled": nlink_enabled,
        });
        GovernanceDescriptor::from_value(Path::new("d"), json).unwrap()
    }

    fn checker(runner: &Arc<RecordingRunner>) -> LockChecker {
        LockChecker::new(runner.clone())
    }

    #[tokio::test]
    async fn skipped_without_nlink_even_if_tool_missing() {
        let runner = Arc::new(RecordingRunner::with_default(ScriptedResponse::NotFound));
        let verdict = checker(&runner)
            .check(Path::new("/proj"), &descriptor(true, false))
            .await;
        assert_eq!(verdict, LockVerdict::Skipped);
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn skipped_without_lock() {
        let runner = Arc::new(RecordingRunner::new());
        let verdict = checker(&runner)
            .check(Path::new("/proj"), &descriptor(false, true))
            .await;
        assert_eq!(verdict, LockVerdict::Skipped);
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn exit_zero_is_compliant_and_uses_fixed_arguments() {
        let runner = Arc::new(RecordingRunner::new());
        let verdict = checker(&runner)
            .check(Path::new("/proj"), &descriptor(true, true))
            .await;
        assert_eq!(verdict, LockVerdict::Compliant);

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].program, PathBuf::from("nlink"));
        assert_eq!(
            calls[0].args,
            vec![
                "--semverx-validate",
                "--project-root",
                "/proj",
                "--package",
                "rift-core",
                "--version",
                "2.1.0"
            ]
        );
        assert_eq!(calls[0].timeout, LOCK_CHECK_TIMEOUT);
    }

    #[tokio::test]
    async fn non_zero_exit_is_violation() {
        let runner = Arc::new(RecordingRunner::with_default(ScriptedResponse::exit(1)));
        let verdict = checker(&runner)
            .check(Path::new("/proj"), &descriptor(true, true))
            .await;
        assert!(matches!(verdict, LockVerdict::Violation(_)));
    }

    #[tokio::test]
    async fn timeout_is_violation() {
        let runner = Arc::new(RecordingRunner::with_default(ScriptedResponse::TimedOut));
        let verdict = checker(&runner)
            .check(Path::new("/proj"), &descriptor(true, true))
            .await;
        match verdict {
            LockVerdict::Violation(reason) => assert!(reason.contains("timed out")),
            other => panic!("expected violation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_tool_is_violation() {
        let runner = Arc::new(RecordingRunner::with_default(ScriptedResponse::NotFound));
        let verdict = checker(&runner)
            .with_tool("/opt/semverx/nlink")
            .check(Path::new("/proj"), &descriptor(true, true))
            .await;
        match verdict {
            LockVerdict::Violation(reason) => assert!(reason.contains("unavailable")),
            other => panic!("expected violation, got {other:?}"),
        }
    }
}
