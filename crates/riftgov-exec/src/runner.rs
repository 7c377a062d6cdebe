use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;

/// A single external invocation: program, arguments, extra environment, and
/// the hard timeout bounding it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub cwd: Option<PathBuf>,
    pub timeout: Duration,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: HashMap::new(),
            cwd: None,
            timeout,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn envs(mut self, vars: HashMap<String, String>) -> Self {
        self.env.extend(vars);
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Program name without its directory, used for logging and lookup.
    pub fn program_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.display().to_string())
    }
}

/// Result of running an external command to completion or timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecResult {
    pub stdout: String,
    pub stderr: String,
    /// Process exit code; `-1` when killed by a signal or timed out.
    pub exit_code: i32,
    pub timed_out: bool,
    pub duration_ms: u64,
}

impl ExecResult {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == 0
    }

    /// One-line description of a failed run for audit detail.
    pub fn failure_summary(&self) -> String {
        if self.timed_out {
            format!("timed out after {}ms", self.duration_ms)
        } else {
            format!("exited with code {}", self.exit_code)
        }
    }
}

/// The only way riftgov talks to the outside world.
///
/// `Err` means the command could not be started at all (e.g. the program does
/// not exist); callers treat that the same as a failed run.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, spec: &CommandSpec) -> riftgov_types::Result<ExecResult>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_collects_args_and_env() {
        let spec = CommandSpec::new("/usr/bin/nlink", Duration::from_secs(30))
            .arg("--semverx-validate")
            .args(["--package", "rift"])
            .env("RIFT_STAGE", "3")
            .current_dir("/tmp");

        assert_eq!(spec.args, vec!["--semverx-validate", "--package", "rift"]);
        assert_eq!(spec.env.get("RIFT_STAGE").map(String::as_str), Some("3"));
        assert_eq!(spec.cwd, Some(PathBuf::from("/tmp")));
        assert_eq!(spec.program_name(), "nlink");
    }

    #[test]
    fn exec_result_success_requires_zero_and_no_timeout() {
        let ok = ExecResult {
            stdout: String::new(),
            stderr: String::new(),
            exit_code: 0,
            timed_out: false,
            duration_ms: 5,
        };
        assert!(ok.success());

        let timed_out = ExecResult {
            timed_out: true,
            exit_code: -1,
            ..ok.clone()
        };
        assert!(!timed_out.success());
        assert!(timed_out.failure_summary().contains("timed out"));

        let failed = ExecResult {
            exit_code: 2,
            ..ok
        };
        assert!(!failed.success());
        assert_eq!(failed.failure_summary(), "exited with code 2");
    }
}
