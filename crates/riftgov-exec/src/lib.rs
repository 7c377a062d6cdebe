//! Timeout-bounded external command execution.
//!
//! Every external invocation (hook scripts, primary script actions, the
//! SemVerX validator) goes through the [`CommandRunner`] trait: one awaited
//! call, bounded by an explicit timeout, returning captured output and exit
//! status. [`LocalRunner`] spawns real processes; [`RecordingRunner`] is a
//! scripted stand-in for tests and dry runs.

pub mod local;
pub mod recording;
pub mod runner;
pub mod truncation;

pub use local::LocalRunner;
pub use recording::{RecordingRunner, ScriptedResponse};
pub use runner::{CommandRunner, CommandSpec, ExecResult};
pub use truncation::{truncate_output, TruncationMode};
