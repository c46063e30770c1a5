// SPDX-License-Identifier: MIT

//! Workflow nodes of the governance graph
//!
//! Each node reads the run state, calls one collaborator and returns a
//! `RunStatePatch` carrying exactly one audit entry. Profiling and drift
//! detection are CPU-bound and run on the blocking pool.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

use super::artifacts::{ArtifactKind, ArtifactStore};
use super::dataset::DatasetSource;
use super::drift::{DriftDetector, DriftSeverity};
use super::error::{GovernorError, Result};
use super::policy::{PolicyDecision, PolicyGuard};
use super::profiler::{DatasetProfile, Profiler};
use super::query::{QueryEngine, TableRef};
use super::rules::{RuleGenerator, RuleRequest, TemplateRuleGenerator};
use super::state::{RunState, RunStatePatch};
use super::validator::{ValidationReport, Validator};
use crate::flow::{Node, NodeError, RunContext};

pub const PROFILE: &str = "profile";
pub const DRIFT: &str = "drift";
pub const RULEGEN: &str = "rulegen";
pub const VALIDATE: &str = "validate";
pub const GUARD: &str = "guard";
pub const HUMAN_REVIEW: &str = "human_review";

/// Collaborators shared by every node of a governance graph
#[derive(Clone)]
pub struct GovernorContext {
    pub datasets: Arc<dyn DatasetSource>,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub rules: Arc<dyn RuleGenerator>,
    pub validator: Validator,
    pub profiler: Profiler,
    pub detector: DriftDetector,
    pub guard: PolicyGuard,
}

impl GovernorContext {
    /// Context with the template rule generator and default thresholds
    pub fn new(
        datasets: Arc<dyn DatasetSource>,
        artifacts: Arc<dyn ArtifactStore>,
        engine: Arc<dyn QueryEngine>,
    ) -> Self {
        Self {
            datasets,
            artifacts,
            rules: Arc::new(TemplateRuleGenerator::new()),
            validator: Validator::new(engine),
            profiler: Profiler::new(),
            detector: DriftDetector::default(),
            guard: PolicyGuard::default(),
        }
    }

    pub fn with_rule_generator(mut self, rules: Arc<dyn RuleGenerator>) -> Self {
        self.rules = rules;
        self
    }
}

async fn blocking<T, F>(task: F) -> std::result::Result<T, NodeError>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    Ok(tokio::task::spawn_blocking(task).await??)
}

/// Profiles the current dataset and stores the report
pub struct ProfileNode {
    ctx: GovernorContext,
}

impl ProfileNode {
    pub fn new(ctx: GovernorContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Node<RunState> for ProfileNode {
    fn name(&self) -> &str {
        PROFILE
    }

    async fn run(
        &self,
        run: &RunContext,
        state: &RunState,
    ) -> std::result::Result<RunStatePatch, NodeError> {
        let dataset = self.ctx.datasets.load(&state.dataset_uri).await?;
        let mut profiler = self.ctx.profiler.clone();
        if let Some(reference_uri) = &state.reference_uri {
            let reference = self.ctx.datasets.load(reference_uri).await?;
            profiler = profiler.with_reference(&reference);
        }

        let profile = blocking(move || profiler.profile(&dataset)).await?;
        let mut document = serde_json::to_value(&profile)?;
        if let Some(fields) = document.as_object_mut() {
            fields.insert(
                "generated_at".to_string(),
                serde_json::Value::String(Utc::now().to_rfc3339()),
            );
        }
        let uri = self
            .ctx
            .artifacts
            .put(&run.run_id, ArtifactKind::Profile, &state.table_name, &document)
            .await?;
        log::info!(
            "Profiled {} ({} rows, {} columns) into {}",
            state.table_name,
            profile.row_count,
            profile.column_count,
            uri
        );

        Ok(RunStatePatch {
            profile_uri: Some(uri),
            ..Default::default()
        }
        .audit(format!(
            "Profiler: Profiled {} rows across {} columns.",
            profile.row_count, profile.column_count
        )))
    }
}

/// Compares the current dataset with the reference, when one is given
pub struct DriftNode {
    ctx: GovernorContext,
}

impl DriftNode {
    pub fn new(ctx: GovernorContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Node<RunState> for DriftNode {
    fn name(&self) -> &str {
        DRIFT
    }

    async fn run(
        &self,
        run: &RunContext,
        state: &RunState,
    ) -> std::result::Result<RunStatePatch, NodeError> {
        let Some(reference_uri) = &state.reference_uri else {
            return Ok(RunStatePatch {
                drift_detected: Some(false),
                drift_severity: Some(DriftSeverity::None),
                drifted_columns: Some(Vec::new()),
                ..Default::default()
            }
            .audit("Drift: Skipped (no reference dataset)."));
        };

        let current = self.ctx.datasets.load(&state.dataset_uri).await?;
        let reference = self.ctx.datasets.load(reference_uri).await?;
        let detector = self.ctx.detector.clone();
        let result = blocking(move || detector.detect_drift(&current, &reference)).await?;

        let severity = result.severity();
        let drifted: Vec<String> = result
            .drifted_columns()
            .into_iter()
            .map(String::from)
            .collect();
        let uri = self
            .ctx
            .artifacts
            .put(
                &run.run_id,
                ArtifactKind::Drift,
                &state.table_name,
                &serde_json::to_value(&result)?,
            )
            .await?;

        let entry = if result.drift_detected {
            log::warn!("Drift in {}: {:?} ({})", state.table_name, drifted, severity);
            format!("Drift: Detected ({}).", severity)
        } else {
            "Drift: None detected.".to_string()
        };

        Ok(RunStatePatch {
            drift_report_uri: Some(uri),
            drift_detected: Some(result.drift_detected),
            drift_severity: Some(severity),
            drifted_columns: Some(drifted),
            ..Default::default()
        }
        .audit(entry))
    }
}

/// Proposes a candidate rule from the stored profile
pub struct RuleGenNode {
    ctx: GovernorContext,
}

impl RuleGenNode {
    pub fn new(ctx: GovernorContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Node<RunState> for RuleGenNode {
    fn name(&self) -> &str {
        RULEGEN
    }

    async fn run(
        &self,
        _run: &RunContext,
        state: &RunState,
    ) -> std::result::Result<RunStatePatch, NodeError> {
        let profile_uri = state
            .profile_uri
            .as_deref()
            .ok_or_else(|| GovernorError::input("no profile recorded for this run"))?;
        let profile: DatasetProfile =
            serde_json::from_value(self.ctx.artifacts.get(profile_uri).await?)?;

        let request = RuleRequest {
            profile,
            profile_uri: profile_uri.to_string(),
            drift_severity: state.drift_severity,
            drifted_columns: state.drifted_columns.clone(),
            table: state.table_name.clone(),
            attempt: state.retry_count,
        };
        let rule = self.ctx.rules.generate(&request).await?;
        if request.profile.column(&rule.target_column).is_none() {
            return Err(GovernorError::rule_generation(format!(
                "rule {} targets unknown column '{}'",
                rule.template_id, rule.target_column
            ))
            .into());
        }

        let entry = format!(
            "RuleGen: Generated {} for column {}",
            rule.template_id, rule.target_column
        );
        Ok(RunStatePatch {
            candidate_rule: Some(rule),
            ..Default::default()
        }
        .audit(entry))
    }
}

/// Executes the candidate rule against the table
pub struct ValidateNode {
    ctx: GovernorContext,
}

impl ValidateNode {
    pub fn new(ctx: GovernorContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Node<RunState> for ValidateNode {
    fn name(&self) -> &str {
        VALIDATE
    }

    async fn run(
        &self,
        _run: &RunContext,
        state: &RunState,
    ) -> std::result::Result<RunStatePatch, NodeError> {
        let rule = state
            .candidate_rule
            .as_ref()
            .ok_or_else(|| GovernorError::validation("no candidate rule to validate"))?;
        let table = TableRef::new(state.dataset_uri.clone(), state.table_name.clone());
        let report = self.ctx.validator.validate_rule(&table, rule).await;

        let entry = match (&report.rows_flagged, &report.error) {
            (Some(rows), _) if report.passed => {
                format!("Validator: SQL valid. Flagged {} rows.", rows)
            }
            (_, Some(error)) => format!("Validator: Failed - {}", error),
            _ => "Validator: Failed - unknown error".to_string(),
        };
        Ok(RunStatePatch {
            validation_report: Some(report),
            ..Default::default()
        }
        .audit(entry))
    }
}

/// Applies the governance policy
pub struct GuardNode {
    ctx: GovernorContext,
}

impl GuardNode {
    pub fn new(ctx: GovernorContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Node<RunState> for GuardNode {
    fn name(&self) -> &str {
        GUARD
    }

    async fn run(
        &self,
        _run: &RunContext,
        state: &RunState,
    ) -> std::result::Result<RunStatePatch, NodeError> {
        let report: &ValidationReport = state
            .validation_report
            .as_ref()
            .ok_or_else(|| GovernorError::validation("guard reached without a validation report"))?;
        let outcome = self.ctx.guard.decide(report, state.retry_count);
        log::info!(
            "Guard decision for {}: {} (retries {})",
            state.table_name,
            outcome.decision,
            outcome.retry_count
        );

        Ok(RunStatePatch {
            policy_decision: Some(outcome.decision),
            retry_count: Some(outcome.retry_count),
            ..Default::default()
        }
        .audit(outcome.audit_entry))
    }
}

/// Turns the reviewer's answer into the final decision. Runs only after a
/// resume has supplied `human_approval`.
#[derive(Default)]
pub struct HumanReviewNode;

impl HumanReviewNode {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Node<RunState> for HumanReviewNode {
    fn name(&self) -> &str {
        HUMAN_REVIEW
    }

    async fn run(
        &self,
        _run: &RunContext,
        state: &RunState,
    ) -> std::result::Result<RunStatePatch, NodeError> {
        let approved = state.human_approval.ok_or_else(|| {
            GovernorError::validation("human review resumed without an approval decision")
        })?;
        let (decision, entry) = if approved {
            (PolicyDecision::Approve, "Review: Rule approved.")
        } else {
            (PolicyDecision::Reject, "Review: Rule rejected.")
        };

        Ok(RunStatePatch {
            policy_decision: Some(decision),
            ..Default::default()
        }
        .audit(entry))
    }
}
