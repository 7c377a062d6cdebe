use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use riftgov_types::{AuditOutcome, OverallStatus, RiftError, RunContext, StageType, ValidationOutcome};

use crate::report::PipelineReport;
use crate::validator::{DescriptorScope, GovernanceValidator};

/// Substages governed within each numbered stage.
pub const STAGE_SUBSTAGES: &[(u8, &[&str])] = &[
    (0, &["tokenizer"]),
    (1, &["parser"]),
    (2, &["semantic"]),
    (3, &["validator"]),
    (4, &["bytecode"]),
    (5, &["optimizer", "verifier"]),
    (6, &["emitter"]),
];

pub fn substages_for(stage: u8) -> &'static [&'static str] {
    STAGE_SUBSTAGES
        .iter()
        .find(|(id, _)| *id == stage)
        .map(|(_, names)| *names)
        .unwrap_or(&[])
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Outcome for one keyed unit of a stage or for one custom stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentResult {
    /// Report key: `stage_{N}_primary`, `{substage}_governance`,
    /// `{substage}_fallback`, `custom_{name}` or `main_config`.
    pub component: String,
    pub outcome: ValidationOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<PathBuf>,
    #[serde(default)]
    pub fallback_used: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub detail: String,
}

impl ComponentResult {
    fn new(component: impl Into<String>, outcome: ValidationOutcome) -> Self {
        Self {
            component: component.into(),
            outcome,
            source: None,
            fallback_used: false,
            detail: String::new(),
        }
    }

    fn with_source(mut self, source: &Path) -> Self {
        self.source = Some(source.to_path_buf());
        self
    }

    fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = detail.into();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: u8,
    pub components: Vec<ComponentResult>,
}

impl StageReport {
    pub fn outcome_map(&self) -> BTreeMap<String, ValidationOutcome> {
        self.components
            .iter()
            .map(|c| (c.component.clone(), c.outcome))
            .collect()
    }

    pub fn outcomes(&self) -> impl Iterator<Item = ValidationOutcome> + '_ {
        self.components.iter().map(|c| c.outcome)
    }

    pub fn critical_components(&self) -> Vec<&ComponentResult> {
        self.components
            .iter()
            .filter(|c| c.outcome.is_critical())
            .collect()
    }

    pub fn is_critical(&self) -> bool {
        self.outcomes().any(ValidationOutcome::is_critical)
    }
}

/// Stage-by-stage results of one pass over stages 0-6.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineRun {
    pub stages: BTreeMap<u8, StageReport>,
    /// Stage whose critical outcome stopped the pass.
    pub halted_at: Option<u8>,
}

impl PipelineRun {
    pub fn outcomes(&self) -> impl Iterator<Item = ValidationOutcome> + '_ {
        self.stages.values().flat_map(StageReport::outcomes)
    }

    pub fn halt_error(&self) -> Option<RiftError> {
        let stage = self.halted_at?;
        let reason = self
            .stages
            .get(&stage)
            .map(|report| {
                report
                    .critical_components()
                    .iter()
                    .map(|c| format!("{} {}", c.component, c.outcome))
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .unwrap_or_default();
        Some(RiftError::BuildHalt { stage, reason })
    }
}

// ---------------------------------------------------------------------------
// PipelineValidator
// ---------------------------------------------------------------------------

pub struct PipelineValidator {
    validator: GovernanceValidator,
}

impl PipelineValidator {
    pub fn new(validator: GovernanceValidator) -> Self {
        Self { validator }
    }

    pub fn validator(&self) -> &GovernanceValidator {
        &self.validator
    }

    /// Validate one stage: its primary descriptor when present, then every
    /// substage, falling back per the missing-governance policy.
    pub async fn validate_stage(&self, ctx: &RunContext, stage: u8) -> StageReport {
        let paths = self.validator.paths();
        let mut components = Vec::new();

        let primary = paths.primary(stage);
        if exists(&primary).await {
            let v = self
                .validator
                .validate(ctx, &primary, &DescriptorScope::Primary { stage })
                .await;
            components.push(
                ComponentResult::new(format!("stage_{stage}_primary"), v.outcome)
                    .with_source(&primary)
                    .with_detail(v.detail),
            );
        }

        for name in substages_for(stage) {
            let source = paths.substage(name, stage);
            let result = if exists(&source).await {
                let v = self
                    .validator
                    .validate(ctx, &source, &DescriptorScope::substage(stage, *name))
                    .await;
                ComponentResult::new(format!("{name}_governance"), v.outcome)
                    .with_source(&source)
                    .with_detail(v.detail)
            } else {
                self.resolve_missing(ctx, stage, name).await
            };
            components.push(result);
        }

        StageReport { stage, components }
    }

    /// Missing substage descriptor: fallback tree first, then the stage's
    /// primary `stage_type`.
    async fn resolve_missing(&self, ctx: &RunContext, stage: u8, name: &str) -> ComponentResult {
        let paths = self.validator.paths();
        let component = format!("{name}_fallback");

        let fallback = paths.fallback(name, stage);
        if exists(&fallback).await {
            tracing::warn!(stage, substage = name, path = %fallback.display(), "Using fallback governance");
            ctx.audit
                .append(
                    format!("stage {stage} {name}"),
                    AuditOutcome::Warning,
                    format!("fallback used: {}", fallback.display()),
                )
                .await;
            let v = self
                .validator
                .validate(ctx, &fallback, &DescriptorScope::substage(stage, name))
                .await;
            let mut result = ComponentResult::new(component, v.outcome)
                .with_source(&fallback)
                .with_detail(v.detail);
            result.fallback_used = true;
            return result;
        }

        let primary = paths.primary(stage);
        let (outcome, detail) = match primary_is_experimental(ctx, &primary).await {
            Some(true) => (
                ValidationOutcome::Valid,
                "experimental stage, substage governance optional".to_string(),
            ),
            Some(_) => (
                ValidationOutcome::MissingGovernance,
                format!("no descriptor for {name} and stage {stage} is not experimental"),
            ),
            None => (
                ValidationOutcome::MissingGovernance,
                format!("no descriptor, fallback, or primary for {name}"),
            ),
        };

        ctx.audit
            .append(
                format!("stage {stage} {name}"),
                AuditOutcome::Governance(outcome),
                detail.clone(),
            )
            .await;
        ComponentResult::new(component, outcome).with_detail(detail)
    }

    /// Validate stages 0-6 in order, halting after the first stage with a
    /// SemVerX violation or expired descriptor.
    pub async fn validate_pipeline(&self, ctx: &RunContext) -> PipelineRun {
        let mut run = PipelineRun::default();

        for (stage, _) in STAGE_SUBSTAGES {
            let report = self.validate_stage(ctx, *stage).await;
            let critical = report.is_critical();
            run.stages.insert(*stage, report);

            if critical {
                run.halted_at = Some(*stage);
                if let Some(err) = run.halt_error() {
                    tracing::error!(stage, error = %err, "Build halt");
                    ctx.audit
                        .append(format!("stage {stage}"), AuditOutcome::Failed, err.to_string())
                        .await;
                }
                break;
            }
        }

        run
    }

    /// Read the `custom_stages` list from the main project config.
    ///
    /// A missing config means no custom stages; an unreadable one is an error
    /// message for the `main_config` entry.
    pub async fn load_custom_stages(&self) -> Result<Vec<Value>, String> {
        let path = self.validator.paths().main_config();
        if !exists(&path).await {
            return Ok(Vec::new());
        }
        let text = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
        let config: Value = serde_json::from_str(&text)
            .map_err(|e| format!("malformed {}: {e}", path.display()))?;
        match config.get("custom_stages") {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Array(entries)) => Ok(entries.clone()),
            Some(_) => Err("custom_stages must be an array".to_string()),
        }
    }

    pub async fn validate_custom_stages(
        &self,
        ctx: &RunContext,
        entries: &[Value],
    ) -> Vec<ComponentResult> {
        let mut results = Vec::with_capacity(entries.len());

        for entry in entries {
            let name = entry
                .get("name")
                .and_then(Value::as_str)
                .filter(|n| !n.is_empty());
            let has_stage_id = entry.get("stage_id").is_some_and(is_set);

            let Some(name) = name.filter(|_| has_stage_id) else {
                let component = format!("custom_{}", name.unwrap_or("unnamed"));
                let detail = "custom stage requires name and stage_id";
                ctx.audit
                    .append(
                        component.clone(),
                        AuditOutcome::Governance(ValidationOutcome::InvalidSchema),
                        detail,
                    )
                    .await;
                results.push(
                    ComponentResult::new(component, ValidationOutcome::InvalidSchema)
                        .with_detail(detail),
                );
                continue;
            };

            let component = format!("custom_{name}");
            if name.contains(['/', '\\']) || name == ".." {
                let detail = format!("custom stage name '{name}' is not a plain file name");
                ctx.audit
                    .append(
                        component.clone(),
                        AuditOutcome::Governance(ValidationOutcome::InvalidSchema),
                        detail.clone(),
                    )
                    .await;
                results.push(
                    ComponentResult::new(component, ValidationOutcome::InvalidSchema)
                        .with_detail(detail),
                );
                continue;
            }

            let source = self.validator.paths().custom(name);
            if exists(&source).await {
                let v = self
                    .validator
                    .validate(ctx, &source, &DescriptorScope::Custom { name: name.to_string() })
                    .await;
                results.push(
                    ComponentResult::new(component, v.outcome)
                        .with_source(&source)
                        .with_detail(v.detail),
                );
                continue;
            }

            let activated = entry.get("activated").is_some_and(is_set);
            let (outcome, detail) = if activated {
                (ValidationOutcome::MissingGovernance, "activated custom stage has no descriptor")
            } else {
                (ValidationOutcome::Valid, "inactive custom stage, descriptor optional")
            };
            ctx.audit
                .append(component.clone(), AuditOutcome::Governance(outcome), detail)
                .await;
            results.push(ComponentResult::new(component, outcome).with_detail(detail));
        }

        results
    }

    /// Full governance pass: stages 0-6, then custom stages unless the
    /// pipeline halted.
    pub async fn generate_report(&self, ctx: &RunContext) -> PipelineReport {
        let run = self.validate_pipeline(ctx).await;

        let custom_stages = if run.halted_at.is_some() {
            tracing::info!("Pipeline halted, custom stages not evaluated");
            Vec::new()
        } else {
            match self.load_custom_stages().await {
                Ok(entries) => self.validate_custom_stages(ctx, &entries).await,
                Err(detail) => {
                    ctx.audit
                        .append(
                            "main_config",
                            AuditOutcome::Governance(ValidationOutcome::InvalidSchema),
                            detail.clone(),
                        )
                        .await;
                    vec![ComponentResult::new("main_config", ValidationOutcome::InvalidSchema)
                        .with_source(&self.validator.paths().main_config())
                        .with_detail(detail)]
                }
            }
        };

        let overall_status = OverallStatus::from_outcomes(
            run.outcomes().chain(custom_stages.iter().map(|c| c.outcome)),
        );

        PipelineReport {
            timestamp: Utc::now(),
            run_id: ctx.run_id.clone(),
            project_root: self.validator.paths().root().to_path_buf(),
            stages: run.stages,
            custom_stages,
            halted_at: run.halted_at,
            audit_log: ctx.audit.snapshot().await,
            overall_status,
        }
    }
}

async fn exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

/// Whether the stage primary declares `stage_type: experimental`; `None` when
/// there is no readable JSON primary. A descriptor parsed earlier in this run
/// answers from the cache. A primary that failed the schema is read raw.
async fn primary_is_experimental(ctx: &RunContext, primary: &Path) -> Option<bool> {
    if let Some(d) = ctx.descriptors.get(primary).await {
        return Some(d.stage_type == StageType::Experimental);
    }
    let text = tokio::fs::read_to_string(primary).await.ok()?;
    let raw: Value = serde_json::from_str(&text).ok()?;
    Some(raw.get("stage_type").and_then(Value::as_str) == Some("experimental"))
}

/// Set in the JSON sense: not null, false, zero or empty.
fn is_set(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}
