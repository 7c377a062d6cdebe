//! Governance descriptor validation and stage pipeline validation.
//!
//! [`GovernanceValidator`] checks one descriptor file (schema, freshness,
//! SemVerX lock, stage-5 security addendum). [`PipelineValidator`] drives it
//! across stages 0-6 and custom stages, applies the missing-governance
//! fallback policy, and halts on critical outcomes.

pub mod freshness;
pub mod lock;
pub mod paths;
pub mod pipeline;
pub mod report;
pub mod security;
pub mod validator;

pub use freshness::{check_freshness, Freshness, MAX_DESCRIPTOR_AGE_DAYS};
pub use lock::{LockChecker, LockVerdict, DEFAULT_SEMVERX_TOOL, LOCK_CHECK_TIMEOUT};
pub use paths::GovernancePaths;
pub use pipeline::{
    substages_for, ComponentResult, PipelineRun, PipelineValidator, StageReport, STAGE_SUBSTAGES,
};
pub use report::PipelineReport;
pub use security::{check_optimizer_addendum, Finding, OPTIMIZER_ADDENDUM_FIELDS};
pub use validator::{DescriptorScope, GovernanceValidator, Validation};
