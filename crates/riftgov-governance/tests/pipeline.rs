//! End-to-end governance validation over a temporary project tree.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use chrono::{Duration, Utc};
use riftgov_exec::RecordingRunner;
use riftgov_governance::{
    substages_for, GovernancePaths, GovernanceValidator, LockChecker, PipelineValidator,
    STAGE_SUBSTAGES,
};
use riftgov_types::{OverallStatus, RunContext, ValidationOutcome};

fn validator(root: &Path) -> PipelineValidator {
    PipelineValidator::new(GovernanceValidator::new(
        GovernancePaths::new(root),
        LockChecker::new(Arc::new(RecordingRunner::new())),
    ))
}

fn write_json(path: &Path, value: serde_json::Value) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, serde_json::to_string_pretty(&value).unwrap()).unwrap();
}

fn descriptor(stage: u8, age_days: i64) -> serde_json::Value {
    serde_json::json!({
        "package_name": format!("rift-stage-{stage}"),
        "version": "4.0.0",
        "stage": stage,
        "stage_type": "stable",
        "timestamp": (Utc::now() - Duration::days(age_days)).to_rfc3339(),
        "semverx_lock": false,
        "nlink_enabled": false,
    })
}

/// Primary and substage descriptors for every stage, plus the stage-5
/// optimizer addendum and its audit trace.
fn compliant_tree(root: &Path) {
    let paths = GovernancePaths::new(root);
    for (stage, substages) in STAGE_SUBSTAGES {
        write_json(&paths.primary(*stage), descriptor(*stage, 2));
        for name in *substages {
            let mut d = descriptor(*stage, 2);
            if *stage == 5 && *name == "optimizer" {
                d["stage_5_optimizer"] = serde_json::json!({
                    "optimizer_model": "ast-minimizer-v2",
                    "minimization_verified": true,
                    "audit_enabled": true,
                });
            }
            write_json(&paths.substage(name, *stage), d);
        }
    }
    let trace = paths.optimizer_audit_artifact();
    std::fs::create_dir_all(trace.parent().unwrap()).unwrap();
    std::fs::write(trace, "sha256:feed").unwrap();
}

#[tokio::test]
async fn all_valid_is_compliant() {
    let dir = tempfile::tempdir().unwrap();
    compliant_tree(dir.path());

    let ctx = RunContext::new();
    let report = validator(dir.path()).generate_report(&ctx).await;

    assert_eq!(report.stages.len(), 7);
    assert!(report.halted_at.is_none());
    assert!(report
        .all_outcomes()
        .iter()
        .all(|o| *o == ValidationOutcome::Valid));
    assert_eq!(report.overall_status, OverallStatus::Compliant);
    assert_eq!(report.exit_code(), 0);
    assert_eq!(report.run_id, ctx.run_id);

    let stage5 = report.stages[&5].outcome_map();
    assert!(stage5.contains_key("optimizer_governance"));
    assert!(stage5.contains_key("verifier_governance"));
}

#[tokio::test]
async fn expired_stage_three_halts_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    compliant_tree(dir.path());
    let paths = GovernancePaths::new(dir.path());
    write_json(&paths.primary(3), descriptor(3, 90 * 2));

    let ctx = RunContext::new();
    let report = validator(dir.path()).generate_report(&ctx).await;

    assert_eq!(report.halted_at, Some(3));
    assert_eq!(
        report.stages.keys().copied().collect::<Vec<_>>(),
        vec![0, 1, 2, 3]
    );
    assert_eq!(
        report.stages[&3].outcome_map()["stage_3_primary"],
        ValidationOutcome::Expired
    );
    assert_eq!(report.overall_status, OverallStatus::ExpiredGovernance);
    assert_eq!(report.exit_code(), 1);
    assert!(report
        .audit_log
        .iter()
        .any(|r| r.detail.starts_with("Build halted at stage 3")));
}

#[tokio::test]
async fn unverified_optimizer_is_critical_failure() {
    let dir = tempfile::tempdir().unwrap();
    compliant_tree(dir.path());
    let paths = GovernancePaths::new(dir.path());
    let mut d = descriptor(5, 2);
    d["stage_5_optimizer"] = serde_json::json!({
        "optimizer_model": "ast-minimizer-v2",
        "minimization_verified": false,
        "audit_enabled": true,
    });
    write_json(&paths.substage("optimizer", 5), d);

    let ctx = RunContext::new();
    let report = validator(dir.path()).generate_report(&ctx).await;

    assert_eq!(report.halted_at, Some(5));
    assert!(!report.stages.contains_key(&6));
    assert_eq!(report.overall_status, OverallStatus::CriticalFailure);
}

#[tokio::test]
async fn missing_substage_is_warning_tier() {
    let dir = tempfile::tempdir().unwrap();
    compliant_tree(dir.path());
    let paths = GovernancePaths::new(dir.path());
    std::fs::remove_file(paths.substage("emitter", 6)).unwrap();

    let ctx = RunContext::new();
    let report = validator(dir.path()).generate_report(&ctx).await;

    assert!(report.halted_at.is_none());
    assert_eq!(
        report.stages[&6].outcome_map()["emitter_fallback"],
        ValidationOutcome::MissingGovernance
    );
    assert_eq!(report.overall_status, OverallStatus::MissingGovernance);
    assert_eq!(report.exit_code(), 2);
}

#[tokio::test]
async fn custom_stages_from_main_config() {
    let dir = tempfile::tempdir().unwrap();
    compliant_tree(dir.path());
    write_json(
        &dir.path().join(".riftrc"),
        serde_json::json!({
            "custom_stages": [
                {"name": "preprod", "stage_id": "pp", "activated": true},
                {"name": "backlog", "stage_id": "bl"}
            ]
        }),
    );

    let ctx = RunContext::new();
    let report = validator(dir.path()).generate_report(&ctx).await;

    let custom: Vec<_> = report
        .custom_stages
        .iter()
        .map(|c| (c.component.as_str(), c.outcome))
        .collect();
    assert_eq!(
        custom,
        vec![
            ("custom_preprod", ValidationOutcome::MissingGovernance),
            ("custom_backlog", ValidationOutcome::Valid),
        ]
    );
    assert_eq!(report.overall_status, OverallStatus::MissingGovernance);
}

#[tokio::test]
async fn repeated_runs_are_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    compliant_tree(dir.path());
    std::fs::remove_file(GovernancePaths::new(dir.path()).substage("parser", 1)).unwrap();
    let pipeline = validator(dir.path());

    let first_ctx = RunContext::new();
    let first = pipeline.generate_report(&first_ctx).await;
    let second_ctx = RunContext::new();
    let second = pipeline.generate_report(&second_ctx).await;

    let keyed = |r: &riftgov_governance::PipelineReport| -> BTreeSet<(u8, String, ValidationOutcome)> {
        r.stages
            .values()
            .flat_map(|s| {
                s.components
                    .iter()
                    .map(move |c| (s.stage, c.component.clone(), c.outcome))
            })
            .collect()
    };
    assert_eq!(keyed(&first), keyed(&second));
    assert_eq!(first.overall_status, second.overall_status);
    assert_eq!(first.audit_log.len(), second.audit_log.len());
    assert_ne!(first.run_id, second.run_id);
    assert!(!substages_for(1).is_empty());
}
