// SPDX-License-Identifier: MIT

//! Run state of a rule governance workflow

use serde::{Deserialize, Serialize};

use super::drift::DriftSeverity;
use super::policy::PolicyDecision;
use super::rules::CandidateRule;
use super::validator::ValidationReport;
use crate::flow::state::{reducer, GraphState};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RunState {
    pub dataset_uri: String,
    pub table_name: String,
    #[serde(default)]
    pub reference_uri: Option<String>,
    #[serde(default)]
    pub profile_uri: Option<String>,
    #[serde(default)]
    pub drift_report_uri: Option<String>,
    #[serde(default)]
    pub drift_detected: bool,
    #[serde(default)]
    pub drift_severity: DriftSeverity,
    #[serde(default)]
    pub drifted_columns: Vec<String>,
    #[serde(default)]
    pub candidate_rule: Option<CandidateRule>,
    #[serde(default)]
    pub validation_report: Option<ValidationReport>,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub policy_decision: PolicyDecision,
    #[serde(default)]
    pub human_approval: Option<bool>,
    #[serde(default)]
    pub audit_log: Vec<String>,
}

impl RunState {
    pub fn new(dataset_uri: impl Into<String>, table_name: impl Into<String>) -> Self {
        Self {
            dataset_uri: dataset_uri.into(),
            table_name: table_name.into(),
            ..Default::default()
        }
    }

    pub fn with_reference(mut self, reference_uri: impl Into<String>) -> Self {
        self.reference_uri = Some(reference_uri.into());
        self
    }
}

/// Partial update to `RunState`. Absent fields leave state untouched;
/// `audit_log` entries are appended.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RunStatePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drift_report_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drift_detected: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drift_severity: Option<DriftSeverity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drifted_columns: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate_rule: Option<CandidateRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_report: Option<ValidationReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_decision: Option<PolicyDecision>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub human_approval: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub audit_log: Vec<String>,
}

impl RunStatePatch {
    pub fn audit(mut self, entry: impl Into<String>) -> Self {
        self.audit_log.push(entry.into());
        self
    }

    /// The patch a reviewer submits on resume
    pub fn approval(approved: bool) -> Self {
        Self {
            human_approval: Some(approved),
            ..Default::default()
        }
    }
}

impl GraphState for RunState {
    type Patch = RunStatePatch;

    fn merge(&mut self, patch: RunStatePatch) {
        reducer::overwrite_option(&mut self.profile_uri, patch.profile_uri);
        reducer::overwrite_option(&mut self.drift_report_uri, patch.drift_report_uri);
        reducer::overwrite(&mut self.drift_detected, patch.drift_detected);
        reducer::overwrite(&mut self.drift_severity, patch.drift_severity);
        reducer::overwrite(&mut self.drifted_columns, patch.drifted_columns);
        reducer::overwrite_option(&mut self.candidate_rule, patch.candidate_rule);
        reducer::overwrite_option(&mut self.validation_report, patch.validation_report);
        reducer::max(&mut self.retry_count, patch.retry_count);
        reducer::overwrite(&mut self.policy_decision, patch.policy_decision);
        reducer::overwrite_option(&mut self.human_approval, patch.human_approval);
        reducer::append(&mut self.audit_log, patch.audit_log);
    }
}
