//! Script orchestration under zero-trust governance.
//!
//! A [`RegistryConfig`] is loaded once into a [`DependencyGraph`]. For a
//! target, the graph yields a dependency-respecting order and the
//! [`LifecycleExecutor`] drives each node through permission, governance,
//! hook and execution phases. [`governed_run`] puts the stage governance
//! report in front of execution.

pub mod config;
pub mod events;
pub mod gate;
pub mod graph;
pub mod hooks;
pub mod lifecycle;
pub mod orchestrator;
pub mod permissions;
pub mod policy;
pub mod status;

pub use config::{RegistryConfig, ScriptConfig, DEFAULT_CONFIG_PATH, REQUIRED_SECTIONS};
pub use events::{EventEmitter, LifecycleEvent};
pub use gate::{GateCheck, GateReport, ZeroTrustGate};
pub use graph::{DependencyGraph, ScriptNode};
pub use hooks::{HookPhase, HookResult, HookRunner, HookStatus, PhaseReport, HOOK_TIMEOUT};
pub use lifecycle::{LifecycleExecutor, NodeReport, NodeState, PipelineIdentity, ACTION_TIMEOUT};
pub use orchestrator::{Orchestrator, OrchestratorOptions, RunSummary};
pub use permissions::{FileMode, PathPattern, PermissionManager};
pub use policy::{PolicyEvaluation, PolicyKey, PolicyRegistry};
pub use status::{governed_run, StatusReport};
