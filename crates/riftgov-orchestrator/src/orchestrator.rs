use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

use riftgov_exec::CommandRunner;
use riftgov_types::{AuditOutcome, Result, RiftError, RunContext};

use crate::config::RegistryConfig;
use crate::events::{EventEmitter, LifecycleEvent};
use crate::gate::ZeroTrustGate;
use crate::graph::{DependencyGraph, ScriptNode};
use crate::hooks::HookRunner;
use crate::lifecycle::{LifecycleExecutor, NodeReport, PipelineIdentity};
use crate::permissions::PermissionManager;
use crate::policy::PolicyRegistry;

/// Toolchain identifiers used when the registry metadata leaves them out.
pub const DEFAULT_TOOLCHAIN_FLOW: &str = "riftlang.exe -> .so.a -> rift.exe -> gosilang";
pub const DEFAULT_BUILD_STACK: &str = "nlink -> polybuild";

// ---------------------------------------------------------------------------
// RunSummary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    /// `None` when the whole registry was run.
    pub target: Option<String>,
    pub order: Vec<String>,
    pub nodes: Vec<NodeReport>,
    pub failed_at: Option<String>,
    pub dry_run: bool,
    pub duration_ms: u64,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.failed_at.is_none()
    }

    /// Nodes in the resolved order that never ran because an earlier one
    /// failed.
    pub fn not_run(&self) -> Vec<&str> {
        self.order
            .iter()
            .skip(self.nodes.len())
            .map(String::as_str)
            .collect()
    }

    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            0
        } else {
            1
        }
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Settings not carried by the registry file.
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    pub project_root: PathBuf,
    pub dry_run: bool,
    pub hook_timeout: Option<Duration>,
    pub action_timeout: Option<Duration>,
}

impl OrchestratorOptions {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            dry_run: false,
            hook_timeout: None,
            action_timeout: None,
        }
    }
}

/// Resolves a target and runs each node in order, one at a time, stopping at
/// the first failure.
pub struct Orchestrator {
    graph: DependencyGraph,
    executor: LifecycleExecutor,
}

impl Orchestrator {
    pub fn new(graph: DependencyGraph, executor: LifecycleExecutor) -> Self {
        Self { graph, executor }
    }

    pub fn from_config(
        config: &RegistryConfig,
        options: &OrchestratorOptions,
        runner: Arc<dyn CommandRunner>,
    ) -> Result<Self> {
        let graph = DependencyGraph::from_config(config)?;
        let hook_timeout = options
            .hook_timeout
            .unwrap_or(Duration::from_secs(config.hooks.timeout_secs));

        let policies = if config.governance.zero_trust {
            PolicyRegistry::default()
        } else {
            tracing::warn!("Zero-trust policy predicates disabled by configuration");
            PolicyRegistry::empty()
        };

        let metadata = &config.metadata;
        let identity = PipelineIdentity {
            project_root: options.project_root.clone(),
            pipeline_id: metadata
                .pipeline_id
                .clone()
                .unwrap_or_else(|| metadata.name.clone()),
            toolchain_flow: metadata
                .toolchain_flow
                .clone()
                .unwrap_or_else(|| DEFAULT_TOOLCHAIN_FLOW.to_string()),
            build_stack: metadata
                .build_stack
                .clone()
                .unwrap_or_else(|| DEFAULT_BUILD_STACK.to_string()),
        };

        let hooks = HookRunner::new(config.hooks_dir(), runner.clone())
            .with_timeout(hook_timeout)
            .dry_run(options.dry_run);
        let mut executor = LifecycleExecutor::new(
            PermissionManager::new(&config.permissions),
            ZeroTrustGate::new(&options.project_root, policies),
            hooks,
            runner,
            identity,
        )
        .dry_run(options.dry_run);
        if let Some(timeout) = options.action_timeout {
            executor = executor.with_action_timeout(timeout);
        }

        Ok(Self::new(graph, executor))
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn events(&self) -> &EventEmitter {
        self.executor.events()
    }

    pub fn plan(&self, target: &str) -> Result<Vec<&ScriptNode>> {
        self.graph.resolve(target)
    }

    /// Resolve `target` and execute its closure.
    ///
    /// Resolution errors are audited and returned; node failures are not
    /// errors, they end the run and show up in the summary.
    pub async fn run_target(&self, ctx: &RunContext, target: &str) -> Result<RunSummary> {
        let order = match self.graph.resolve(target) {
            Ok(order) => order,
            Err(err) => return Err(audit_resolution_failure(ctx, target, err).await),
        };
        Ok(self.run_order(ctx, Some(target), order).await)
    }

    pub async fn run_all(&self, ctx: &RunContext) -> Result<RunSummary> {
        let order = match self.graph.resolve_all() {
            Ok(order) => order,
            Err(err) => return Err(audit_resolution_failure(ctx, "all", err).await),
        };
        Ok(self.run_order(ctx, None, order).await)
    }

    async fn run_order(
        &self,
        ctx: &RunContext,
        target: Option<&str>,
        order: Vec<&ScriptNode>,
    ) -> RunSummary {
        let started = Instant::now();
        let names: Vec<String> = order.iter().map(|n| n.name.clone()).collect();
        tracing::info!(run_target = target.unwrap_or("all"), order = ?names, "Resolved execution order");
        ctx.audit
            .append(
                format!("resolve {}", target.unwrap_or("all")),
                AuditOutcome::Passed,
                names.join(" -> "),
            )
            .await;
        self.events().emit(LifecycleEvent::RunStarted {
            target: target.map(String::from),
            order: names.clone(),
        });

        let mut completed = HashSet::new();
        let mut nodes = Vec::with_capacity(order.len());
        let mut failed_at = None;

        for node in order {
            let report = self.executor.execute(ctx, node, &completed).await;
            let ok = report.is_completed();
            nodes.push(report);
            if !ok {
                failed_at = Some(node.name.clone());
                break;
            }
            completed.insert(node.name.clone());
        }

        let summary = RunSummary {
            target: target.map(String::from),
            order: names,
            nodes,
            failed_at,
            dry_run: self.executor.is_dry_run(),
            duration_ms: started.elapsed().as_millis() as u64,
        };

        match &summary.failed_at {
            Some(name) => {
                tracing::error!(script = %name, skipped = ?summary.not_run(), "Run stopped at failed script");
            }
            None => tracing::info!(run_target = target.unwrap_or("all"), "Run completed"),
        }
        self.events().emit(LifecycleEvent::RunCompleted {
            target: summary.target.clone(),
            success: summary.is_success(),
            duration_ms: summary.duration_ms,
        });
        summary
    }
}

async fn audit_resolution_failure(ctx: &RunContext, target: &str, err: RiftError) -> RiftError {
    tracing::error!(run_target = target, error = %err, "Dependency resolution failed");
    ctx.audit
        .append(format!("resolve {target}"), AuditOutcome::Failed, err.to_string())
        .await;
    err
}
