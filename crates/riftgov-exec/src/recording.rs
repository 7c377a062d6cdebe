use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use riftgov_types::RiftError;

use crate::runner::{CommandRunner, CommandSpec, ExecResult};

/// What a [`RecordingRunner`] answers for a given program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedResponse {
    /// Finish with this exit code and stdout.
    Exit { code: i32, stdout: String },
    /// Behave like a run that hit its timeout.
    TimedOut,
    /// Fail to start, as if the program were not installed.
    NotFound,
}

impl ScriptedResponse {
    pub fn exit(code: i32) -> Self {
        ScriptedResponse::Exit {
            code,
            stdout: String::new(),
        }
    }
}

/// Scripted [`CommandRunner`] that never spawns anything.
///
/// Responses are looked up by the full program path first, then by file
/// name; anything unmatched gets the default response. Every spec passed to
/// [`run`](CommandRunner::run) is recorded.
pub struct RecordingRunner {
    responses: Mutex<HashMap<String, ScriptedResponse>>,
    default: ScriptedResponse,
    calls: Mutex<Vec<CommandSpec>>,
}

impl RecordingRunner {
    /// Runner whose unmatched commands exit 0.
    pub fn new() -> Self {
        Self::with_default(ScriptedResponse::exit(0))
    }

    pub fn with_default(default: ScriptedResponse) -> Self {
        Self {
            responses: Mutex::new(HashMap::new()),
            default,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn respond(&self, program: impl Into<String>, response: ScriptedResponse) {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(program.into(), response);
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// File names of every program run so far, in call order.
    pub fn programs(&self) -> Vec<String> {
        self.calls().iter().map(CommandSpec::program_name).collect()
    }

    fn lookup(&self, spec: &CommandSpec) -> ScriptedResponse {
        let responses = self.responses.lock().unwrap_or_else(PoisonError::into_inner);
        responses
            .get(&spec.program.display().to_string())
            .or_else(|| responses.get(&spec.program_name()))
            .cloned()
            .unwrap_or_else(|| self.default.clone())
    }
}

impl Default for RecordingRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(&self, spec: &CommandSpec) -> riftgov_types::Result<ExecResult> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(spec.clone());

        match self.lookup(spec) {
            ScriptedResponse::Exit { code, stdout } => Ok(ExecResult {
                stdout,
                stderr: String::new(),
                exit_code: code,
                timed_out: false,
                duration_ms: 0,
            }),
            ScriptedResponse::TimedOut => Ok(ExecResult {
                stdout: String::new(),
                stderr: format!(
                    "Command timed out after {}ms",
                    spec.timeout.as_millis()
                ),
                exit_code: -1,
                timed_out: true,
                duration_ms: spec.timeout.as_millis() as u64,
            }),
            ScriptedResponse::NotFound => Err(RiftError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{}: not found", spec.program.display()),
            ))),
        }
    }
}
