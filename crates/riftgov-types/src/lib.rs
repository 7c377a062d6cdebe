//! Shared types, errors, audit log, and run context for RIFT governance.
//!
//! This crate provides the foundational types used across all other riftgov crates:
//! - `RiftError`: unified error taxonomy
//! - `ValidationOutcome`: closed result of validating one governance unit
//! - `OverallStatus`: tiered status rolled up from many outcomes
//! - `GovernanceDescriptor`: parsed `.riftrc` / `gov.*` descriptor
//! - `AuditLog` / `RunContext`: append-only audit trail and run-scoped state

pub mod audit;
pub mod descriptor;

pub use audit::{AuditLog, AuditOutcome, AuditRecord, DescriptorCache, RunContext};
pub use descriptor::{parse_timestamp, GovernanceDescriptor, StageRef, StageType, REQUIRED_FIELDS};

use serde::{Deserialize, Serialize};

/// Unified error type for all riftgov subsystems.
#[derive(Debug, thiserror::Error)]
pub enum RiftError {
    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    // === Descriptor Errors ===
    #[error("Schema error in {source_path}: {message}")]
    Schema {
        source_path: String,
        message: String,
    },

    #[error("Governance descriptor {source_path} expired: {message}")]
    Expired {
        source_path: String,
        message: String,
    },

    #[error("SemVerX lock violation for {package}@{version}: {reason}")]
    LockViolation {
        package: String,
        version: String,
        reason: String,
    },

    #[error("Stage 5 security governance failed: {0}")]
    SecurityGovernance(String),

    #[error("Build halted at stage {stage}: {reason}")]
    BuildHalt { stage: u8, reason: String },

    // === Dependency Graph Errors ===
    #[error("Circular dependency detected: {}", cycle.join(" -> "))]
    Cycle { cycle: Vec<String> },

    #[error("Script '{node}' depends on undeclared script '{dependency}'")]
    UnknownDependency { node: String, dependency: String },

    #[error("Unknown target script '{0}'")]
    UnknownTarget(String),

    // === Lifecycle Errors ===
    #[error("Permission check failed for '{script}': required {required}, found {actual}")]
    Permission {
        script: String,
        required: String,
        actual: String,
    },

    #[error("Policy '{key}={value}' not satisfied for '{script}'")]
    PolicyViolation {
        script: String,
        key: String,
        value: String,
    },

    #[error("Script '{script}' resolves outside the project root: {path}")]
    PathEscape { script: String, path: String },

    #[error("Script '{script}' has unmet dependency '{dependency}'")]
    UnmetDependency { script: String, dependency: String },

    #[error("{phase}-hooks failed for '{script}': {}", failed.join(", "))]
    HookFailure {
        script: String,
        phase: String,
        failed: Vec<String>,
    },

    #[error("Execution of '{script}' failed: {message}")]
    Execution { script: String, message: String },

    #[error("Command timed out after {timeout_ms}ms")]
    CommandTimeout { timeout_ms: u64 },

    // === Generic ===
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl RiftError {
    /// Returns `true` for structural errors that abort the entire run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RiftError::Config(_)
                | RiftError::Cycle { .. }
                | RiftError::UnknownDependency { .. }
                | RiftError::UnknownTarget(_)
                | RiftError::BuildHalt { .. }
        )
    }

    /// Short, stable tag used as the audit subject category.
    pub fn category(&self) -> &'static str {
        match self {
            RiftError::Config(_) => "config",
            RiftError::Schema { .. } => "schema",
            RiftError::Expired { .. } => "expiration",
            RiftError::LockViolation { .. } => "lock",
            RiftError::SecurityGovernance(_) => "security",
            RiftError::BuildHalt { .. } => "halt",
            RiftError::Cycle { .. }
            | RiftError::UnknownDependency { .. }
            | RiftError::UnknownTarget(_) => "resolution",
            RiftError::Permission { .. } => "permission",
            RiftError::PolicyViolation { .. }
            | RiftError::PathEscape { .. }
            | RiftError::UnmetDependency { .. } => "governance",
            RiftError::HookFailure { .. } => "hook",
            RiftError::Execution { .. } | RiftError::CommandTimeout { .. } => "execution",
            RiftError::Io(_) | RiftError::Json(_) | RiftError::Other(_) => "internal",
        }
    }
}

/// A convenience alias for `Result<T, RiftError>`.
pub type Result<T> = std::result::Result<T, RiftError>;

// ---------------------------------------------------------------------------
// ValidationOutcome: result of validating one governance unit
// ---------------------------------------------------------------------------

/// Exactly one of these is produced per validated descriptor, substage, or
/// custom stage. Every consumer matches on it exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationOutcome {
    Valid,
    Expired,
    InvalidSchema,
    SemverxViolation,
    MissingGovernance,
}

impl ValidationOutcome {
    /// Outcomes that trigger a build halt once their stage completes.
    pub fn is_critical(self) -> bool {
        match self {
            ValidationOutcome::SemverxViolation | ValidationOutcome::Expired => true,
            ValidationOutcome::Valid
            | ValidationOutcome::InvalidSchema
            | ValidationOutcome::MissingGovernance => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ValidationOutcome::Valid => "valid",
            ValidationOutcome::Expired => "expired",
            ValidationOutcome::InvalidSchema => "invalid_schema",
            ValidationOutcome::SemverxViolation => "semverx_violation",
            ValidationOutcome::MissingGovernance => "missing_governance",
        }
    }
}

impl std::fmt::Display for ValidationOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// OverallStatus: tiered roll-up used for exit codes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OverallStatus {
    Compliant,
    CriticalFailure,
    ExpiredGovernance,
    MissingGovernance,
    SchemaViolations,
}

impl OverallStatus {
    /// First matching tier wins: SemVerX violation, then expiry, then missing
    /// governance, then schema violations, else compliant.
    pub fn from_outcomes<I>(outcomes: I) -> Self
    where
        I: IntoIterator<Item = ValidationOutcome>,
    {
        let mut semverx = false;
        let mut expired = false;
        let mut missing = false;
        let mut schema = false;
        for outcome in outcomes {
            match outcome {
                ValidationOutcome::SemverxViolation => semverx = true,
                ValidationOutcome::Expired => expired = true,
                ValidationOutcome::MissingGovernance => missing = true,
                ValidationOutcome::InvalidSchema => schema = true,
                ValidationOutcome::Valid => {}
            }
        }
        if semverx {
            OverallStatus::CriticalFailure
        } else if expired {
            OverallStatus::ExpiredGovernance
        } else if missing {
            OverallStatus::MissingGovernance
        } else if schema {
            OverallStatus::SchemaViolations
        } else {
            OverallStatus::Compliant
        }
    }

    /// Process exit code tier: 0 compliant, 1 build halt, 2 warning.
    pub fn exit_code(self) -> i32 {
        match self {
            OverallStatus::Compliant => 0,
            OverallStatus::CriticalFailure | OverallStatus::ExpiredGovernance => 1,
            OverallStatus::MissingGovernance | OverallStatus::SchemaViolations => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OverallStatus::Compliant => "COMPLIANT",
            OverallStatus::CriticalFailure => "CRITICAL_FAILURE",
            OverallStatus::ExpiredGovernance => "EXPIRED_GOVERNANCE",
            OverallStatus::MissingGovernance => "MISSING_GOVERNANCE",
            OverallStatus::SchemaViolations => "SCHEMA_VIOLATIONS",
        }
    }
}

impl std::fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_cycle() {
        let err = RiftError::Cycle {
            cycle: vec!["a".into(), "b".into(), "c".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "Circular dependency detected: a -> b -> c -> a");
    }

    #[test]
    fn error_display_unknown_dependency() {
        let err = RiftError::UnknownDependency {
            node: "emit".into(),
            dependency: "ghost".into(),
        };
        assert_eq!(
            err.to_string(),
            "Script 'emit' depends on undeclared script 'ghost'"
        );
    }

    #[test]
    fn error_display_hook_failure() {
        let err = RiftError::HookFailure {
            script: "build".into(),
            phase: "pre".into(),
            failed: vec!["lint".into(), "fmt".into()],
        };
        assert_eq!(err.to_string(), "pre-hooks failed for 'build': lint, fmt");
    }

    #[test]
    fn error_display_permission() {
        let err = RiftError::Permission {
            script: "build".into(),
            required: "0755".into(),
            actual: "0644".into(),
        };
        assert_eq!(
            err.to_string(),
            "Permission check failed for 'build': required 0755, found 0644"
        );
    }

    #[test]
    fn error_display_build_halt() {
        let err = RiftError::BuildHalt {
            stage: 3,
            reason: "expired".into(),
        };
        assert_eq!(err.to_string(), "Build halted at stage 3: expired");
    }

    #[test]
    fn fatal_errors_are_structural() {
        assert!(RiftError::Config("missing section".into()).is_fatal());
        assert!(RiftError::Cycle { cycle: vec![] }.is_fatal());
        assert!(RiftError::UnknownTarget("x".into()).is_fatal());
        assert!(!RiftError::CommandTimeout { timeout_ms: 10 }.is_fatal());
        assert!(!RiftError::Execution {
            script: "x".into(),
            message: "exit 1".into()
        }
        .is_fatal());
    }

    #[test]
    fn categories_group_related_errors() {
        assert_eq!(RiftError::UnknownTarget("x".into()).category(), "resolution");
        assert_eq!(
            RiftError::PathEscape {
                script: "x".into(),
                path: "/etc".into()
            }
            .category(),
            "governance"
        );
        assert_eq!(RiftError::CommandTimeout { timeout_ms: 1 }.category(), "execution");
    }

    #[test]
    fn from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: RiftError = io_err.into();
        assert!(matches!(err, RiftError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    // --- ValidationOutcome ---

    #[test]
    fn outcome_serializes_to_snake_case() {
        assert_eq!(
            serde_json::to_string(&ValidationOutcome::SemverxViolation).unwrap(),
            "\"semverx_violation\""
        );
        assert_eq!(
            serde_json::to_string(&ValidationOutcome::MissingGovernance).unwrap(),
            "\"missing_governance\""
        );
    }

    #[test]
    fn only_semverx_and_expired_are_critical() {
        assert!(ValidationOutcome::SemverxViolation.is_critical());
        assert!(ValidationOutcome::Expired.is_critical());
        assert!(!ValidationOutcome::MissingGovernance.is_critical());
        assert!(!ValidationOutcome::InvalidSchema.is_critical());
        assert!(!ValidationOutcome::Valid.is_critical());
    }

    // --- OverallStatus ---

    #[test]
    fn overall_status_tiers_in_order() {
        use ValidationOutcome::*;
        assert_eq!(
            OverallStatus::from_outcomes([InvalidSchema, Expired, SemverxViolation]),
            OverallStatus::CriticalFailure
        );
        assert_eq!(
            OverallStatus::from_outcomes([MissingGovernance, Expired]),
            OverallStatus::ExpiredGovernance
        );
        assert_eq!(
            OverallStatus::from_outcomes([InvalidSchema, MissingGovernance]),
            OverallStatus::MissingGovernance
        );
        assert_eq!(
            OverallStatus::from_outcomes([Valid, InvalidSchema]),
            OverallStatus::SchemaViolations
        );
        assert_eq!(
            OverallStatus::from_outcomes([Valid, Valid]),
            OverallStatus::Compliant
        );
        assert_eq!(
            OverallStatus::from_outcomes(std::iter::empty()),
            OverallStatus::Compliant
        );
    }

    #[test]
    fn overall_status_exit_codes() {
        assert_eq!(OverallStatus::Compliant.exit_code(), 0);
        assert_eq!(OverallStatus::CriticalFailure.exit_code(), 1);
        assert_eq!(OverallStatus::ExpiredGovernance.exit_code(), 1);
        assert_eq!(OverallStatus::MissingGovernance.exit_code(), 2);
        assert_eq!(OverallStatus::SchemaViolations.exit_code(), 2);
    }

    #[test]
    fn overall_status_serializes_screaming() {
        assert_eq!(
            serde_json::to_string(&OverallStatus::ExpiredGovernance).unwrap(),
            "\"EXPIRED_GOVERNANCE\""
        );
        assert_eq!(OverallStatus::SchemaViolations.to_string(), "SCHEMA_VIOLATIONS");
    }
}
