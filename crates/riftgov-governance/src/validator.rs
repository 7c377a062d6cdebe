use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use riftgov_types::{AuditOutcome, GovernanceDescriptor, RiftError, RunContext, ValidationOutcome};

use crate::freshness::{check_freshness, Freshness, MAX_DESCRIPTOR_AGE_DAYS};
use crate::lock::{LockChecker, LockVerdict};
use crate::paths::GovernancePaths;
use crate::security::{check_optimizer_addendum, Finding};

// ---------------------------------------------------------------------------
// Scope
// ---------------------------------------------------------------------------

/// What a descriptor governs. Decides which checks apply and how the audit
/// subject reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DescriptorScope {
    Primary { stage: u8 },
    Substage { stage: u8, name: String },
    Custom { name: String },
}

impl DescriptorScope {
    pub fn substage(stage: u8, name: impl Into<String>) -> Self {
        DescriptorScope::Substage {
            stage,
            name: name.into(),
        }
    }

    pub fn subject(&self) -> String {
        match self {
            DescriptorScope::Primary { stage } => format!("stage {stage} primary"),
            DescriptorScope::Substage { stage, name } => format!("stage {stage} {name}"),
            DescriptorScope::Custom { name } => format!("custom stage {name}"),
        }
    }

    /// Only the stage-5 optimizer carries the security addendum.
    pub fn is_stage5_optimizer(&self) -> bool {
        matches!(self, DescriptorScope::Substage { stage: 5, name } if name == "optimizer")
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Validation {
    pub outcome: ValidationOutcome,
    /// Present whenever the schema check passed, even if a later check failed.
    pub descriptor: Option<GovernanceDescriptor>,
    pub detail: String,
}

impl Validation {
    fn rejected(outcome: ValidationOutcome, descriptor: Option<GovernanceDescriptor>, detail: String) -> Self {
        Self {
            outcome,
            descriptor,
            detail,
        }
    }
}

// ---------------------------------------------------------------------------
// GovernanceValidator
// ---------------------------------------------------------------------------

/// Validates one descriptor file.
///
/// Checks run in a fixed order and stop at the first failure:
/// schema, freshness, SemVerX lock, and (stage-5 optimizer only) the security
/// addendum. Every call appends exactly one audit record and never returns an
/// error: the [`ValidationOutcome`] is the whole contract.
pub struct GovernanceValidator {
    paths: GovernancePaths,
    lock: LockChecker,
    max_age: Duration,
}

impl GovernanceValidator {
    pub fn new(paths: GovernancePaths, lock: LockChecker) -> Self {
        Self {
            paths,
            lock,
            max_age: Duration::days(MAX_DESCRIPTOR_AGE_DAYS),
        }
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    pub fn paths(&self) -> &GovernancePaths {
        &self.paths
    }

    pub async fn validate(&self, ctx: &RunContext, source: &Path, scope: &DescriptorScope) -> Validation {
        self.validate_at(ctx, source, scope, Utc::now()).await
    }

    /// Same as [`validate`](Self::validate) with an explicit clock.
    pub async fn validate_at(
        &self,
        ctx: &RunContext,
        source: &Path,
        scope: &DescriptorScope,
        now: DateTime<Utc>,
    ) -> Validation {
        let validation = self.run_checks(ctx, source, scope, now).await;

        tracing::debug!(
            source = %source.display(),
            outcome = %validation.outcome,
            "Descriptor validated"
        );
        ctx.audit
            .append(
                format!("{} ({})", scope.subject(), source.display()),
                AuditOutcome::Governance(validation.outcome),
                validation.detail.clone(),
            )
            .await;

        validation
    }

    async fn run_checks(
        &self,
        ctx: &RunContext,
        source: &Path,
        scope: &DescriptorScope,
        now: DateTime<Utc>,
    ) -> Validation {
        // Schema
        let descriptor = match read_descriptor(source).await {
            Ok(d) => d,
            Err(detail) => {
                return Validation::rejected(ValidationOutcome::InvalidSchema, None, detail);
            }
        };
        ctx.descriptors
            .insert(PathBuf::from(source), descriptor.clone())
            .await;

        // Freshness
        match check_freshness(&descriptor.timestamp, now, self.max_age) {
            Freshness::Fresh => {}
            Freshness::Expired { age } => {
                let detail = RiftError::Expired {
                    source_path: source.display().to_string(),
                    message: format!("descriptor is {} days old", age.num_days()),
                };
                return Validation::rejected(ValidationOutcome::Expired, Some(descriptor), detail.to_string());
            }
            Freshness::Unparseable => {
                let detail = RiftError::Expired {
                    source_path: source.display().to_string(),
                    message: format!("unreadable timestamp '{}'", descriptor.timestamp),
                };
                return Validation::rejected(ValidationOutcome::Expired, Some(descriptor), detail.to_string());
            }
        }

        // Lock compliance
        if let LockVerdict::Violation(reason) = self.lock.check(self.paths.root(), &descriptor).await {
            let detail = RiftError::LockViolation {
                package: descriptor.package_name.clone(),
                version: descriptor.version.clone(),
                reason,
            };
            return Validation::rejected(
                ValidationOutcome::SemverxViolation,
                Some(descriptor),
                detail.to_string(),
            );
        }

        // Stage-5 security addendum
        if scope.is_stage5_optimizer() {
            let artifact = self.paths.optimizer_audit_artifact();
            if let Err(Finding { outcome, reason }) =
                check_optimizer_addendum(&descriptor, &artifact).await
            {
                let detail = RiftError::SecurityGovernance(reason);
                return Validation::rejected(outcome, Some(descriptor), detail.to_string());
            }
        }

        Validation {
            outcome: ValidationOutcome::Valid,
            descriptor: Some(descriptor),
            detail: String::new(),
        }
    }
}

async fn read_descriptor(source: &Path) -> Result<GovernanceDescriptor, String> {
    let text = tokio::fs::read_to_string(source)
        .await
        .map_err(|e| format!("cannot read {}: {e}", source.display()))?;
    GovernanceDescriptor::parse(source, &text).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use riftgov_exec::{RecordingRunner, ScriptedResponse};
    use std::sync::Arc;

    struct Fixture {
        dir: tempfile::TempDir,
        runner: Arc<RecordingRunner>,
        validator: GovernanceValidator,
    }

    fn fixture(default: ScriptedResponse) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(RecordingRunner::with_default(default));
        let validator = GovernanceValidator::new(
            GovernancePaths::new(dir.path()),
            LockChecker::new(runner.clone()),
        );
        Fixture {
            dir,
            runner,
            validator,
        }
    }

    fn write(dir: &Path, name: &str, value: serde_json::Value) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, value.to_string()).unwrap();
        path
    }

    fn descriptor(stage: u8, age_days: i64) -> serde_json::Value {
        serde_json::json!({
            "package_name": "rift-core",
            "version": "1.0.0",
            "stage": stage,
            "timestamp": (Utc::now() - Duration::days(age_days)).to_rfc3339(),
        })
    }

    #[tokio::test]
    async fn valid_descriptor_is_cached_and_audited() {
        let f = fixture(ScriptedResponse::exit(0));
        let ctx = RunContext::new();
        let path = write(f.dir.path(), ".riftrc.1", descriptor(1, 1));

        let v = f
            .validator
            .validate(&ctx, &path, &DescriptorScope::Primary { stage: 1 })
            .await;

        assert_eq!(v.outcome, ValidationOutcome::Valid);
        assert!(ctx.descriptors.get(&path).await.is_some());
        let audit = ctx.audit.snapshot().await;
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].outcome, AuditOutcome::Governance(ValidationOutcome::Valid));
    }

    #[tokio::test]
    async fn each_missing_required_field_is_invalid_schema() {
        let f = fixture(ScriptedResponse::exit(0));
        let ctx = RunContext::new();
        for field in riftgov_types::REQUIRED_FIELDS {
            let mut d = descriptor(2, 1);
            d.as_object_mut().unwrap().remove(*field);
            let path = write(f.dir.path(), ".riftrc.2", d);
            let v = f
                .validator
                .validate(&ctx, &path, &DescriptorScope::Primary { stage: 2 })
                .await;
            assert_eq!(v.outcome, ValidationOutcome::InvalidSchema, "without {field}");
            assert!(v.descriptor.is_none());
        }
    }

    #[tokio::test]
    async fn unreadable_source_is_invalid_schema() {
        let f = fixture(ScriptedResponse::exit(0));
        let ctx = RunContext::new();
        let v = f
            .validator
            .validate(
                &ctx,
                &f.dir.path().join("absent"),
                &DescriptorScope::Primary { stage: 0 },
            )
            .await;
        assert_eq!(v.outcome, ValidationOutcome::InvalidSchema);
        assert_eq!(ctx.audit.len().await, 1);
    }

    #[tokio::test]
    async fn old_descriptor_is_expired() {
        let f = fixture(ScriptedResponse::exit(0));
        let ctx = RunContext::new();
        let path = write(f.dir.path(), ".riftrc.3", descriptor(3, 120));
        let v = f
            .validator
            .validate(&ctx, &path, &DescriptorScope::Primary { stage: 3 })
            .await;
        assert_eq!(v.outcome, ValidationOutcome::Expired);
        assert!(v.descriptor.is_some());
        assert!(v.detail.starts_with("Governance descriptor"), "{}", v.detail);
        assert!(v.detail.ends_with("expired: descriptor is 120 days old"), "{}", v.detail);
    }

    #[tokio::test]
    async fn unparseable_timestamp_is_expired() {
        let f = fixture(ScriptedResponse::exit(0));
        let ctx = RunContext::new();
        let mut d = descriptor(3, 0);
        d["timestamp"] = serde_json::json!("soon");
        let path = write(f.dir.path(), ".riftrc.3", d);
        let v = f
            .validator
            .validate(&ctx, &path, &DescriptorScope::Primary { stage: 3 })
            .await;
        assert_eq!(v.outcome, ValidationOutcome::Expired);
    }

    #[tokio::test]
    async fn lock_without_nlink_skips_external_tool() {
        let f = fixture(ScriptedResponse::NotFound);
        let ctx = RunContext::new();
        let mut d = descriptor(4, 1);
        d["semverx_lock"] = serde_json::json!(true);
        d["nlink_enabled"] = serde_json::json!(false);
        let path = write(f.dir.path(), ".riftrc.4", d);
        let v = f
            .validator
            .validate(&ctx, &path, &DescriptorScope::Primary { stage: 4 })
            .await;
        assert_eq!(v.outcome, ValidationOutcome::Valid);
        assert!(f.runner.calls().is_empty());
    }

    #[tokio::test]
    async fn unavailable_lock_tool_is_violation() {
        let f = fixture(ScriptedResponse::NotFound);
        let ctx = RunContext::new();
        let mut d = descriptor(4, 1);
        d["semverx_lock"] = serde_json::json!(true);
        d["nlink_enabled"] = serde_json::json!(true);
        let path = write(f.dir.path(), ".riftrc.4", d);
        let v = f
            .validator
            .validate(&ctx, &path, &DescriptorScope::Primary { stage: 4 })
            .await;
        assert_eq!(v.outcome, ValidationOutcome::SemverxViolation);
        assert!(
            v.detail.starts_with("SemVerX lock violation for rift-core@1.0.0: "),
            "{}",
            v.detail
        );
    }

    #[tokio::test]
    async fn unverified_optimizer_is_violation_only_in_optimizer_scope() {
        let f = fixture(ScriptedResponse::exit(0));
        let ctx = RunContext::new();
        let mut d = descriptor(5, 1);
        d["stage_5_optimizer"] = serde_json::json!({
            "optimizer_model": "ast-minimizer",
            "minimization_verified": false,
            "audit_enabled": false,
        });
        let path = write(f.dir.path(), "gov.optimizer.stage.riftrc.5", d);

        let optimizer = f
            .validator
            .validate(&ctx, &path, &DescriptorScope::substage(5, "optimizer"))
            .await;
        assert_eq!(optimizer.outcome, ValidationOutcome::SemverxViolation);
        assert!(optimizer
            .detail
            .starts_with("Stage 5 security governance failed: "));

        let verifier = f
            .validator
            .validate(&ctx, &path, &DescriptorScope::substage(5, "verifier"))
            .await;
        assert_eq!(verifier.outcome, ValidationOutcome::Valid);
    }

    #[test]
    fn scope_subjects() {
        assert_eq!(DescriptorScope::Primary { stage: 2 }.subject(), "stage 2 primary");
        assert_eq!(DescriptorScope::substage(5, "optimizer").subject(), "stage 5 optimizer");
        assert!(DescriptorScope::substage(5, "optimizer").is_stage5_optimizer());
        assert!(!DescriptorScope::substage(4, "optimizer").is_stage5_optimizer());
        assert_eq!(
            DescriptorScope::Custom { name: "chaos".into() }.subject(),
            "custom stage chaos"
        );
    }
}
