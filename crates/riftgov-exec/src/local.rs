use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::runner::{CommandRunner, CommandSpec, ExecResult};

/// Grace period between SIGTERM and SIGKILL for a timed-out process group.
const TERMINATE_GRACE: Duration = Duration::from_secs(2);

/// Runs commands as local child processes.
#[derive(Debug, Clone, Default)]
pub struct LocalRunner;

impl LocalRunner {
    pub fn new() -> Self {
        Self
    }

    /// Inherited environment with secrets stripped.
    fn filtered_env() -> HashMap<String, String> {
        let exclude_suffixes: &[&str] = &[
            "_api_key",
            "_secret",
            "_token",
            "_password",
            "_credential",
        ];
        let always_include: &[&str] = &[
            "PATH", "HOME", "USER", "SHELL", "LANG", "TERM", "TMPDIR",
        ];

        let mut result = HashMap::new();
        for (key, value) in std::env::vars() {
            let lower = key.to_lowercase();
            if always_include.contains(&key.as_str())
                || !exclude_suffixes.iter().any(|s| lower.ends_with(s))
            {
                result.insert(key, value);
            }
        }
        result
    }
}

async fn read_pipe<R: AsyncRead + Unpin>(pipe: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_end(&mut buf).await;
    }
    buf
}

#[async_trait]
impl CommandRunner for LocalRunner {
    async fn run(&self, spec: &CommandSpec) -> riftgov_types::Result<ExecResult> {
        let mut cmd = tokio::process::Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .env_clear()
            .envs(Self::filtered_env())
            .envs(&spec.env)
            .kill_on_drop(true);
        if let Some(dir) = &spec.cwd {
            cmd.current_dir(dir);
        }

        // On Unix, use process_group for clean kill
        #[cfg(unix)]
        {
            cmd.process_group(0);
        }

        tracing::debug!(program = %spec.program.display(), args = ?spec.args, "Spawning command");
        let start = tokio::time::Instant::now();
        let deadline = start + spec.timeout;
        let mut child = cmd.spawn()?;
        let pid = child.id();

        // Drain pipes while waiting so a chatty child cannot block on a full pipe.
        let mut stdout_task = tokio::spawn(read_pipe(child.stdout.take()));
        let mut stderr_task = tokio::spawn(read_pipe(child.stderr.take()));

        tokio::select! {
            status = child.wait() => {
                let status = status?;
                // A background grandchild can hold the pipes open after the
                // script exits; the timeout covers the drain as well.
                let drained = tokio::time::timeout_at(deadline, async {
                    let stdout = (&mut stdout_task).await.unwrap_or_default();
                    let stderr = (&mut stderr_task).await.unwrap_or_default();
                    (stdout, stderr)
                })
                .await;
                let Ok((stdout, stderr)) = drained else {
                    #[cfg(unix)]
                    {
                        if let Some(pid) = pid {
                            // SAFETY: signalling the process group we created.
                            unsafe { libc::kill(-(pid as i32), libc::SIGKILL); }
                        }
                    }
                    stdout_task.abort();
                    stderr_task.abort();
                    return Ok(timed_out(spec, start));
                };
                Ok(ExecResult {
                    stdout: String::from_utf8_lossy(&stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&stderr).into_owned(),
                    exit_code: status.code().unwrap_or(-1),
                    timed_out: false,
                    duration_ms: start.elapsed().as_millis() as u64,
                })
            }
            _ = tokio::time::sleep_until(deadline) => {
                #[cfg(unix)]
                {
                    if let Some(pid) = pid {
                        // SAFETY: signalling our own child's process group.
                        unsafe { libc::kill(-(pid as i32), libc::SIGTERM); }
                    }
                    tokio::select! {
                        _ = child.wait() => {}
                        _ = tokio::time::sleep(TERMINATE_GRACE) => {
                            if let Some(pid) = pid {
                                // SAFETY: as above.
                                unsafe { libc::kill(-(pid as i32), libc::SIGKILL); }
                            }
                            let _ = child.kill().await;
                        }
                    }
                }
                #[cfg(not(unix))]
                {
                    let _ = child.kill().await;
                }
                stdout_task.abort();
                stderr_task.abort();
                Ok(timed_out(spec, start))
            }
        }
    }
}

fn timed_out(spec: &CommandSpec, start: tokio::time::Instant) -> ExecResult {
    let timeout_ms = spec.timeout.as_millis() as u64;
    tracing::warn!(program = %spec.program.display(), timeout_ms, "Command timed out");
    ExecResult {
        stdout: String::new(),
        stderr: format!("Command timed out after {}ms", timeout_ms),
        exit_code: -1,
        timed_out: true,
        duration_ms: start.elapsed().as_millis() as u64,
    }
}
