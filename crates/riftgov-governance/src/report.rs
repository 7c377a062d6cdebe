use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use riftgov_types::{AuditRecord, OverallStatus, Result, ValidationOutcome};

use crate::pipeline::{ComponentResult, StageReport};

/// Governance report for one run, constructed anew each time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineReport {
    pub timestamp: DateTime<Utc>,
    pub run_id: String,
    pub project_root: PathBuf,
    pub stages: BTreeMap<u8, StageReport>,
    pub custom_stages: Vec<ComponentResult>,
    pub halted_at: Option<u8>,
    pub audit_log: Vec<AuditRecord>,
    pub overall_status: OverallStatus,
}

impl PipelineReport {
    pub fn all_outcomes(&self) -> Vec<ValidationOutcome> {
        self.stages
            .values()
            .flat_map(|s| s.components.iter())
            .chain(self.custom_stages.iter())
            .map(|c| c.outcome)
            .collect()
    }

    pub fn exit_code(&self) -> i32 {
        self.overall_status.exit_code()
    }

    /// Write the report as pretty JSON.
    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }

    /// Human-readable summary, one line per component.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "RIFT governance report ({})", self.timestamp.to_rfc3339());
        let _ = writeln!(out, "project root: {}", self.project_root.display());
        let _ = writeln!(out, "run id: {}", self.run_id);

        for report in self.stages.values() {
            let _ = writeln!(out, "\nstage {}", report.stage);
            for c in &report.components {
                render_component(&mut out, c);
            }
        }

        if let Some(stage) = self.halted_at {
            let _ = writeln!(out, "\nBUILD HALTED at stage {stage}");
        }

        if !self.custom_stages.is_empty() {
            let _ = writeln!(out, "\ncustom stages");
            for c in &self.custom_stages {
                render_component(&mut out, c);
            }
        }

        let _ = writeln!(out, "\noverall status: {}", self.overall_status);
        out
    }
}

fn render_component(out: &mut String, c: &ComponentResult) {
    let marker = if c.fallback_used { " (fallback)" } else { "" };
    let _ = write!(out, "  {:<28} {}{}", c.component, c.outcome, marker);
    if !c.detail.is_empty() {
        let _ = write!(out, "  {}", c.detail);
    }
    out.push('\n');
}
