use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

use riftgov_exec::{truncate_output, CommandRunner, CommandSpec, TruncationMode};
use riftgov_types::{AuditOutcome, RiftError, RunContext};

use crate::events::{EventEmitter, LifecycleEvent};
use crate::gate::ZeroTrustGate;
use crate::graph::ScriptNode;
use crate::hooks::{HookPhase, HookRunner, PhaseReport};
use crate::permissions::{permission_error, PermissionManager};

/// Bound on a script's primary action.
pub const ACTION_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Captured output kept in the audit record, in bytes.
const AUDIT_OUTPUT_LIMIT: usize = 4_000;

// ---------------------------------------------------------------------------
// NodeState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "reason")]
pub enum NodeState {
    Pending,
    PermissionCheck,
    GovernanceCheck,
    PreHooks,
    Executing,
    PostHooks,
    Completed,
    Failed(String),
}

impl NodeState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, NodeState::Completed | NodeState::Failed(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            NodeState::Pending => "pending",
            NodeState::PermissionCheck => "permission_check",
            NodeState::GovernanceCheck => "governance_check",
            NodeState::PreHooks => "pre_hooks",
            NodeState::Executing => "executing",
            NodeState::PostHooks => "post_hooks",
            NodeState::Completed => "completed",
            NodeState::Failed(_) => "failed",
        }
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeState::Failed(reason) => write!(f, "failed({reason})"),
            other => f.write_str(other.label()),
        }
    }
}

// ---------------------------------------------------------------------------
// NodeReport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeReport {
    pub name: String,
    pub stage: u8,
    /// Every state entered, in order, ending in `Completed` or `Failed`.
    pub states: Vec<NodeState>,
    pub hooks: Vec<PhaseReport>,
    /// Error category when failed (`permission`, `governance`, `hook`, ...).
    pub failure_category: Option<String>,
    pub error: Option<String>,
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
}

impl NodeReport {
    pub fn final_state(&self) -> &NodeState {
        self.states.last().unwrap_or(&NodeState::Pending)
    }

    pub fn is_completed(&self) -> bool {
        *self.final_state() == NodeState::Completed
    }
}

// ---------------------------------------------------------------------------
// Pipeline identity
// ---------------------------------------------------------------------------

/// Pipeline-level identifiers exported to scripts and hooks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineIdentity {
    pub project_root: PathBuf,
    pub pipeline_id: String,
    pub toolchain_flow: String,
    pub build_stack: String,
}

impl PipelineIdentity {
    /// Context for one node, keys without prefix.
    fn context(&self, node: &ScriptNode, run_id: &str) -> Vec<(&'static str, String)> {
        vec![
            ("SCRIPT_NAME", node.name.clone()),
            ("SCRIPT_PATH", node.path.display().to_string()),
            ("STAGE", node.stage.to_string()),
            ("PROJECT_ROOT", self.project_root.display().to_string()),
            ("PIPELINE_ID", self.pipeline_id.clone()),
            ("RUN_ID", run_id.to_string()),
            ("TOOLCHAIN_FLOW", self.toolchain_flow.clone()),
            ("BUILD_STACK", self.build_stack.clone()),
        ]
    }

    pub fn env(&self, prefix: &str, node: &ScriptNode, run_id: &str) -> HashMap<String, String> {
        self.context(node, run_id)
            .into_iter()
            .map(|(key, value)| (format!("{prefix}{key}"), value))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// LifecycleExecutor
// ---------------------------------------------------------------------------

/// Drives one node through
/// `Pending -> PermissionCheck -> GovernanceCheck -> PreHooks -> Executing ->
/// PostHooks -> Completed | Failed`.
///
/// Every failure is written to the audit log before the node report is
/// returned. Permission bits are applied and then read by the governance
/// gate within the same node, in that order.
pub struct LifecycleExecutor {
    permissions: PermissionManager,
    gate: ZeroTrustGate,
    hooks: HookRunner,
    runner: Arc<dyn CommandRunner>,
    identity: PipelineIdentity,
    action_timeout: Duration,
    dry_run: bool,
    events: EventEmitter,
}

struct Progress<'a> {
    node: &'a ScriptNode,
    report: NodeReport,
    started: Instant,
}

impl LifecycleExecutor {
    pub fn new(
        permissions: PermissionManager,
        gate: ZeroTrustGate,
        hooks: HookRunner,
        runner: Arc<dyn CommandRunner>,
        identity: PipelineIdentity,
    ) -> Self {
        Self {
            permissions,
            gate,
            hooks,
            runner,
            identity,
            action_timeout: ACTION_TIMEOUT,
            dry_run: false,
            events: EventEmitter::default(),
        }
    }

    pub fn with_action_timeout(mut self, timeout: Duration) -> Self {
        self.action_timeout = timeout;
        self
    }

    /// Skip primary actions. Hooks are skipped by the [`HookRunner`]'s own
    /// flag; permission and governance checks always run.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_events(mut self, events: EventEmitter) -> Self {
        self.events = events;
        self
    }

    pub fn events(&self) -> &EventEmitter {
        &self.events
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub async fn execute(
        &self,
        ctx: &RunContext,
        node: &ScriptNode,
        completed: &HashSet<String>,
    ) -> NodeReport {
        let mut progress = Progress {
            node,
            report: NodeReport {
                name: node.name.clone(),
                stage: node.stage,
                states: vec![NodeState::Pending],
                hooks: Vec::new(),
                failure_category: None,
                error: None,
                exit_code: None,
                duration_ms: 0,
            },
            started: Instant::now(),
        };
        tracing::info!(script = %node.name, stage = node.stage, "Executing script");
        self.events.emit(LifecycleEvent::NodeStarted {
            name: node.name.clone(),
            stage: node.stage,
        });

        match self.run_phases(ctx, &mut progress, completed).await {
            Ok(()) => {
                self.enter(&mut progress, NodeState::Completed);
                progress.report.duration_ms = progress.started.elapsed().as_millis() as u64;
                ctx.audit
                    .append(
                        format!("script {}", node.name),
                        AuditOutcome::Passed,
                        if self.dry_run { "completed (dry-run)" } else { "completed" },
                    )
                    .await;
                tracing::info!(script = %node.name, "Script execution completed");
                self.events.emit(LifecycleEvent::NodeCompleted {
                    name: node.name.clone(),
                    duration_ms: progress.report.duration_ms,
                });
            }
            Err(err) => {
                let failed_in = progress.report.final_state().label();
                ctx.audit
                    .append(
                        format!("script {} {failed_in}", node.name),
                        AuditOutcome::Failed,
                        err.to_string(),
                    )
                    .await;
                tracing::error!(script = %node.name, state = failed_in, error = %err, "Script failed");
                progress.report.failure_category = Some(err.category().to_string());
                progress.report.error = Some(err.to_string());
                self.enter(&mut progress, NodeState::Failed(err.category().to_string()));
                progress.report.duration_ms = progress.started.elapsed().as_millis() as u64;
                self.events.emit(LifecycleEvent::NodeFailed {
                    name: node.name.clone(),
                    reason: err.to_string(),
                });
            }
        }

        progress.report
    }

    fn enter(&self, progress: &mut Progress<'_>, state: NodeState) {
        tracing::debug!(script = %progress.node.name, state = %state, "State transition");
        self.events.emit(LifecycleEvent::StateEntered {
            name: progress.node.name.clone(),
            state: state.label().to_string(),
        });
        progress.report.states.push(state);
    }

    async fn run_phases(
        &self,
        ctx: &RunContext,
        progress: &mut Progress<'_>,
        completed: &HashSet<String>,
    ) -> Result<(), RiftError> {
        let node = progress.node;

        // PermissionCheck
        self.enter(progress, NodeState::PermissionCheck);
        let required = self.permissions.required_mode(node);
        let applied = self
            .permissions
            .apply(&node.path, required)
            .await
            .map_err(|e| {
                tracing::error!(script = %node.name, error = %e, "Permission elevation failed");
                permission_error(&node.name, required, None)
            })?;
        if applied != required {
            return Err(permission_error(&node.name, required, Some(applied)));
        }
        ctx.audit
            .append(
                format!("script {} permission", node.name),
                AuditOutcome::Passed,
                format!("applied {required} to {}", node.path.display()),
            )
            .await;

        // GovernanceCheck
        self.enter(progress, NodeState::GovernanceCheck);
        let gate = self.gate.evaluate(node, required, completed).await;
        for check in &gate.checks {
            ctx.audit
                .append(
                    format!("script {} {}", node.name, check.name),
                    if check.passed { AuditOutcome::Passed } else { AuditOutcome::Failed },
                    check.detail.clone(),
                )
                .await;
        }
        for key in gate.into_result()? {
            ctx.audit
                .append(
                    format!("script {} policy {key}", node.name),
                    AuditOutcome::Warning,
                    "unenforced",
                )
                .await;
        }

        // PreHooks
        self.enter(progress, NodeState::PreHooks);
        self.run_hooks(ctx, progress, HookPhase::Pre).await?;

        // Executing
        self.enter(progress, NodeState::Executing);
        progress.report.exit_code = self.run_action(ctx, node).await?;

        // PostHooks
        self.enter(progress, NodeState::PostHooks);
        self.run_hooks(ctx, progress, HookPhase::Post).await?;

        Ok(())
    }

    async fn run_hooks(
        &self,
        ctx: &RunContext,
        progress: &mut Progress<'_>,
        phase: HookPhase,
    ) -> Result<(), RiftError> {
        let node = progress.node;
        let hooks = match phase {
            HookPhase::Pre => &node.hooks.pre,
            HookPhase::Post => &node.hooks.post,
        };
        if hooks.is_empty() {
            return Ok(());
        }

        let env = self.identity.env("HOOK_", node, &ctx.run_id);
        let report = self.hooks.run_phase(ctx, &node.name, phase, hooks, &env).await;
        for result in &report.results {
            self.events.emit(LifecycleEvent::HookFinished {
                name: node.name.clone(),
                phase: phase.to_string(),
                hook: result.hook.clone(),
                status: result.status.label().to_string(),
            });
        }
        let failure = report.failure(&node.name);
        progress.report.hooks.push(report);
        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Run the primary action. Output goes to the audit record only.
    async fn run_action(&self, ctx: &RunContext, node: &ScriptNode) -> Result<Option<i32>, RiftError> {
        if self.dry_run {
            tracing::info!(script = %node.name, path = %node.path.display(), "[dry-run] would execute script");
            ctx.audit
                .append(format!("script {} execute", node.name), AuditOutcome::Passed, "dry-run")
                .await;
            return Ok(None);
        }

        let spec = CommandSpec::new(&node.path, self.action_timeout)
            .envs(self.identity.env("RIFT_", node, &ctx.run_id))
            .current_dir(&self.identity.project_root);

        let result = self.runner.run(&spec).await.map_err(|e| RiftError::Execution {
            script: node.name.clone(),
            message: e.to_string(),
        })?;

        let mut detail = format!("exit code {}", result.exit_code);
        let streams = [
            ("stdout", &result.stdout, TruncationMode::HeadTail),
            ("stderr", &result.stderr, TruncationMode::Tail),
        ];
        for (label, stream, mode) in streams {
            if !stream.trim().is_empty() {
                detail.push_str(&format!(
                    "\n{label}:\n{}",
                    truncate_output(stream, AUDIT_OUTPUT_LIMIT, mode)
                ));
            }
        }
        let outcome = if result.success() { AuditOutcome::Passed } else { AuditOutcome::Failed };
        ctx.audit
            .append(format!("script {} execute", node.name), outcome, detail)
            .await;

        if result.timed_out {
            return Err(RiftError::CommandTimeout {
                timeout_ms: self.action_timeout.as_millis() as u64,
            });
        }
        if !result.success() {
            return Err(RiftError::Execution {
                script: node.name.clone(),
                message: result.failure_summary(),
            });
        }
        Ok(Some(result.exit_code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_labels() {
        assert_eq!(NodeState::PreHooks.to_string(), "pre_hooks");
        assert_eq!(NodeState::Failed("hook".into()).to_string(), "failed(hook)");
        assert!(NodeState::Completed.is_terminal());
        assert!(!NodeState::Executing.is_terminal());
    }

    #[test]
    fn identity_env_prefixes() {
        let identity = PipelineIdentity {
            project_root: PathBuf::from("/proj"),
            pipeline_id: "phase1".into(),
            toolchain_flow: "riftlang.exe -> .so.a -> rift.exe -> gosilang".into(),
            build_stack: "nlink -> polybuild".into(),
        };
        let mut node = ScriptNode::new("build", "scripts/build.sh");
        node.stage = 3;

        let rift = identity.env("RIFT_", &node, "run-7");
        assert_eq!(rift["RIFT_STAGE"], "3");
        assert_eq!(rift["RIFT_SCRIPT_NAME"], "build");
        assert_eq!(rift["RIFT_PROJECT_ROOT"], "/proj");
        assert_eq!(rift["RIFT_RUN_ID"], "run-7");
        assert_eq!(rift["RIFT_BUILD_STACK"], "nlink -> polybuild");

        let hook = identity.env("HOOK_", &node, "run-7");
        assert_eq!(hook["HOOK_SCRIPT_PATH"], "scripts/build.sh");
        assert_eq!(hook["HOOK_PIPELINE_ID"], "phase1");
    }
}
