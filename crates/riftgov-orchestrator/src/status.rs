use std::fmt::Write as _;

use serde::Serialize;

use riftgov_governance::{PipelineReport, PipelineValidator};
use riftgov_types::{AuditOutcome, AuditRecord, OverallStatus, Result, RunContext};

use crate::orchestrator::{Orchestrator, RunSummary};

/// Governance report plus, when scripts were run, the execution summary.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub governance: PipelineReport,
    pub execution: Option<RunSummary>,
    /// Whole-run audit trail, governance and execution records together.
    pub audit_log: Vec<AuditRecord>,
    pub overall_status: OverallStatus,
}

impl StatusReport {
    /// 1 when execution failed. When scripts ran cleanly, warning-tier
    /// governance gives 0, since tier 2 only applies to report-only runs.
    /// Otherwise the governance tier.
    pub fn exit_code(&self) -> i32 {
        let governance = self.overall_status.exit_code();
        match &self.execution {
            Some(run) if !run.is_success() => 1,
            Some(_) if governance == 2 => 0,
            _ => governance,
        }
    }

    pub fn render_text(&self) -> String {
        let mut out = self.governance.render_text();
        match &self.execution {
            None if self.governance.halted_at.is_some() => {
                let _ = writeln!(out, "\nexecution: skipped (build halted)");
            }
            None => {}
            Some(run) => {
                let _ = writeln!(
                    out,
                    "\nexecution{}: {}",
                    if run.dry_run { " (dry-run)" } else { "" },
                    run.order.join(" -> ")
                );
                for node in &run.nodes {
                    let _ = writeln!(out, "  {:<24} {}", node.name, node.final_state());
                }
                for name in run.not_run() {
                    let _ = writeln!(out, "  {name:<24} not run");
                }
            }
        }
        let _ = writeln!(out, "exit code: {}", self.exit_code());
        out
    }
}

/// Validate governance, then run scripts unless the pipeline halted.
///
/// `target` of `None` runs the whole registry. Resolution errors propagate.
pub async fn governed_run(
    ctx: &RunContext,
    pipeline: &PipelineValidator,
    orchestrator: &Orchestrator,
    target: Option<&str>,
) -> Result<StatusReport> {
    let governance = pipeline.generate_report(ctx).await;

    let execution = if let Some(stage) = governance.halted_at {
        ctx.audit
            .append(
                "execution",
                AuditOutcome::Failed,
                format!("not started: build halted at stage {stage}"),
            )
            .await;
        tracing::error!(stage, "Build halted, no scripts executed");
        None
    } else {
        Some(match target {
            Some(target) => orchestrator.run_target(ctx, target).await?,
            None => orchestrator.run_all(ctx).await?,
        })
    };

    Ok(StatusReport {
        overall_status: governance.overall_status,
        governance,
        execution,
        audit_log: ctx.audit.snapshot().await,
    })
}
