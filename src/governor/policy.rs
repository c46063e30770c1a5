// SPDX-License-Identifier: MIT

//! Governance policy over validation outcomes

use serde::{Deserialize, Serialize};
use std::fmt;

use super::validator::ValidationReport;

/// Default number of rule regenerations before a rule is rejected
pub const DEFAULT_MAX_RETRIES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyDecision {
    /// The guard has not run yet
    #[default]
    None,
    Retry,
    HumanReview,
    Approve,
    Reject,
}

impl PolicyDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyDecision::None => "none",
            PolicyDecision::Retry => "retry",
            PolicyDecision::HumanReview => "human_review",
            PolicyDecision::Approve => "approve",
            PolicyDecision::Reject => "reject",
        }
    }

    /// Approve and reject end a run
    pub fn is_final(&self) -> bool {
        matches!(self, PolicyDecision::Approve | PolicyDecision::Reject)
    }
}

impl fmt::Display for PolicyDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A guard transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardOutcome {
    pub decision: PolicyDecision,
    pub retry_count: u32,
    pub audit_entry: String,
}

#[derive(Debug, Clone, Copy)]
pub struct PolicyGuard {
    max_retries: u32,
}

impl Default for PolicyGuard {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES)
    }
}

impl PolicyGuard {
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Map a validation report and the retries spent so far to a decision
    pub fn decide(&self, report: &ValidationReport, retry_count: u32) -> GuardOutcome {
        if !report.passed {
            if retry_count < self.max_retries {
                return GuardOutcome {
                    decision: PolicyDecision::Retry,
                    retry_count: retry_count + 1,
                    audit_entry: "Guard: Validation failed. Retrying...".to_string(),
                };
            }
            return GuardOutcome {
                decision: PolicyDecision::Reject,
                retry_count,
                audit_entry: "Guard: Max retries reached.".to_string(),
            };
        }

        if report.flagged() > 0 {
            GuardOutcome {
                decision: PolicyDecision::HumanReview,
                retry_count,
                audit_entry: "Guard: Anomalies found. Requesting Human Review.".to_string(),
            }
        } else {
            GuardOutcome {
                decision: PolicyDecision::Approve,
                retry_count,
                audit_entry: "Guard: Auto-Approved.".to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_validation_retries_until_cap() {
        let guard = PolicyGuard::default();
        let failed = ValidationReport::failed("syntax error");

        let outcome = guard.decide(&failed, 2);
        assert_eq!(outcome.decision, PolicyDecision::Retry);
        assert_eq!(outcome.retry_count, 3);
        assert_eq!(outcome.audit_entry, "Guard: Validation failed. Retrying...");

        let outcome = guard.decide(&failed, 3);
        assert_eq!(outcome.decision, PolicyDecision::Reject);
        assert_eq!(outcome.retry_count, 3);
        assert_eq!(outcome.audit_entry, "Guard: Max retries reached.");
    }

    #[test]
    fn test_passed_validation() {
        let guard = PolicyGuard::default();
        assert_eq!(
            guard.decide(&ValidationReport::passed(0), 0).decision,
            PolicyDecision::Approve
        );
        assert_eq!(
            guard.decide(&ValidationReport::passed(5), 1).decision,
            PolicyDecision::HumanReview
        );
        assert_eq!(guard.decide(&ValidationReport::passed(5), 1).retry_count, 1);
    }

    #[test]
    fn test_zero_retry_budget_rejects_immediately() {
        let outcome = PolicyGuard::new(0).decide(&ValidationReport::failed("x"), 0);
        assert_eq!(outcome.decision, PolicyDecision::Reject);
    }

    #[test]
    fn test_decision_serialization() {
        assert_eq!(
            serde_json::to_value(PolicyDecision::HumanReview).unwrap(),
            serde_json::json!("human_review")
        );
        assert_eq!(PolicyDecision::default(), PolicyDecision::None);
        assert_eq!(PolicyDecision::Retry.to_string(), "retry");
        assert!(PolicyDecision::Reject.is_final());
        assert!(!PolicyDecision::HumanReview.is_final());
    }
}
