//! Zero-trust governance gate run before any hook or script executes.
//!
//! All four checks are always evaluated so the audit trail shows the full
//! picture; the first failing check decides the error.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use riftgov_types::{Result, RiftError};

use crate::graph::ScriptNode;
use crate::permissions::{current_mode, permission_error, FileMode};
use crate::policy::PolicyRegistry;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateCheck {
    pub name: &'static str,
    pub passed: bool,
    pub detail: String,
}

#[derive(Debug)]
pub struct GateReport {
    pub checks: Vec<GateCheck>,
    pub unenforced: Vec<String>,
    failure: Option<RiftError>,
}

impl GateReport {
    pub fn passed(&self) -> bool {
        self.failure.is_none()
    }

    pub fn into_result(self) -> Result<Vec<String>> {
        match self.failure {
            Some(err) => Err(err),
            None => Ok(self.unenforced),
        }
    }

    fn record(&mut self, name: &'static str, outcome: std::result::Result<String, RiftError>) {
        match outcome {
            Ok(detail) => self.checks.push(GateCheck {
                name,
                passed: true,
                detail,
            }),
            Err(err) => {
                self.checks.push(GateCheck {
                    name,
                    passed: false,
                    detail: err.to_string(),
                });
                self.failure.get_or_insert(err);
            }
        }
    }
}

pub struct ZeroTrustGate {
    project_root: PathBuf,
    policies: PolicyRegistry,
}

impl ZeroTrustGate {
    pub fn new(project_root: impl Into<PathBuf>, policies: PolicyRegistry) -> Self {
        Self {
            project_root: project_root.into(),
            policies,
        }
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub async fn evaluate(
        &self,
        node: &ScriptNode,
        required: FileMode,
        completed: &HashSet<String>,
    ) -> GateReport {
        let mut report = GateReport {
            checks: Vec::with_capacity(4),
            unenforced: Vec::new(),
            failure: None,
        };

        // Permission bits
        let permission = match current_mode(&node.path).await {
            Ok(actual) if actual == required => Ok(format!("mode {actual}")),
            Ok(actual) => Err(permission_error(&node.name, required, Some(actual))),
            Err(_) => Err(permission_error(&node.name, required, None)),
        };
        report.record("permission", permission);

        // Dependencies completed in this run
        let unmet = node.depends_on.iter().find(|d| !completed.contains(*d));
        let dependencies = match unmet {
            Some(dep) => Err(RiftError::UnmetDependency {
                script: node.name.clone(),
                dependency: dep.clone(),
            }),
            None => Ok(format!("{} dependencies completed", node.depends_on.len())),
        };
        report.record("dependencies", dependencies);

        // Declared policy
        let evaluation = self.policies.evaluate(&node.name, &node.governance_policy);
        let policy = match evaluation.violations.first() {
            Some((key, value)) => Err(RiftError::PolicyViolation {
                script: node.name.clone(),
                key: key.clone(),
                value: value.clone(),
            }),
            None if evaluation.unenforced.is_empty() => Ok("all policies satisfied".to_string()),
            None => Ok(format!("unenforced: {}", evaluation.unenforced.join(", "))),
        };
        report.unenforced = evaluation.unenforced;
        report.record("policy", policy);

        // Containment
        let containment = self.check_containment(node).await;
        report.record("containment", containment);

        report
    }

    /// Both paths are canonicalized; anything that cannot be resolved fails
    /// closed.
    async fn check_containment(&self, node: &ScriptNode) -> std::result::Result<String, RiftError> {
        let escape = |detail: String| RiftError::PathEscape {
            script: node.name.clone(),
            path: detail,
        };
        let root = tokio::fs::canonicalize(&self.project_root)
            .await
            .map_err(|e| escape(format!("project root unresolvable: {e}")))?;
        let resolved = tokio::fs::canonicalize(&node.path)
            .await
            .map_err(|e| escape(format!("{} unresolvable: {e}", node.path.display())))?;
        if resolved.starts_with(&root) {
            Ok(format!("within {}", root.display()))
        } else {
            Err(escape(resolved.display().to_string()))
        }
    }
}
