//! Stage-5 optimizer security addendum.
//!
//! The optimizer descriptor must embed a `stage_5_optimizer` object:
//!
//! ```json
//! "stage_5_optimizer": {
//!   "optimizer_model": "ast-minimizer-v2",
//!   "minimization_verified": true,
//!   "audit_enabled": true
//! }
//! ```
//!
//! A missing object is `missing_governance`, missing or mistyped fields are
//! `invalid_schema`, an unverified minimization is a security failure reported
//! as `semverx_violation`, and an enabled audit without its on-disk trace is
//! `missing_governance`.

use std::path::Path;

use riftgov_types::{GovernanceDescriptor, ValidationOutcome};

pub const OPTIMIZER_ADDENDUM_FIELDS: &[&str] =
    &["optimizer_model", "minimization_verified", "audit_enabled"];

/// A failed validation step: the outcome it maps to and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub outcome: ValidationOutcome,
    pub reason: String,
}

impl Finding {
    pub fn new(outcome: ValidationOutcome, reason: impl Into<String>) -> Self {
        Self {
            outcome,
            reason: reason.into(),
        }
    }
}

pub async fn check_optimizer_addendum(
    descriptor: &GovernanceDescriptor,
    audit_artifact: &Path,
) -> Result<(), Finding> {
    let addendum = descriptor.optimizer.as_ref().ok_or_else(|| {
        Finding::new(
            ValidationOutcome::MissingGovernance,
            "stage 5 optimizer security addendum is missing",
        )
    })?;
    let addendum = addendum.as_object().ok_or_else(|| {
        Finding::new(
            ValidationOutcome::InvalidSchema,
            "stage_5_optimizer must be an object",
        )
    })?;

    if let Some(field) = OPTIMIZER_ADDENDUM_FIELDS
        .iter()
        .find(|field| !addendum.contains_key(**field))
    {
        return Err(Finding::new(
            ValidationOutcome::InvalidSchema,
            format!("stage_5_optimizer is missing '{field}'"),
        ));
    }

    let flag = |field: &str| {
        addendum[field].as_bool().ok_or_else(|| {
            Finding::new(
                ValidationOutcome::InvalidSchema,
                format!("stage_5_optimizer.{field} must be a boolean"),
            )
        })
    };

    if !flag("minimization_verified")? {
        return Err(Finding::new(
            ValidationOutcome::SemverxViolation,
            "optimizer AST minimization was not verified",
        ));
    }

    if flag("audit_enabled")? && !tokio::fs::try_exists(audit_artifact).await.unwrap_or(false) {
        return Err(Finding::new(
            ValidationOutcome::MissingGovernance,
            format!("optimizer audit trace {} not found", audit_artifact.display()),
        ));
    }

    Ok(())
}
