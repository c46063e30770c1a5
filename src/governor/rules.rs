// SPDX-License-Identifier: MIT

//! Candidate rules and the generator seam
//!
//! The bundled generator draws from a small template catalog:
//! - DQ-001 mandatory field: rows where the column is null
//! - DQ-002 value range: rows of a drifted numeric column outside mean ± 3σ
//! - DQ-003 allowed values: rows of a categorical column outside its known values

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::drift::DriftSeverity;
use super::error::{GovernorError, Result};
use super::profiler::{ColumnStatistics, DatasetProfile};

/// A proposed data-quality rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRule {
    pub template_id: String,
    pub target_column: String,
    /// Query selecting the rows that violate the rule
    pub generated_sql: String,
    pub description: String,
}

/// Everything a generator may base a rule on
#[derive(Debug, Clone)]
pub struct RuleRequest {
    pub profile: DatasetProfile,
    pub profile_uri: String,
    pub drift_severity: DriftSeverity,
    /// Columns whose drift test fired
    pub drifted_columns: Vec<String>,
    pub table: String,
    /// 0 on the first try, incremented on every retry
    pub attempt: u32,
}

#[async_trait]
pub trait RuleGenerator: Send + Sync {
    async fn generate(&self, request: &RuleRequest) -> Result<CandidateRule>;
}

/// Deterministic generator over the template catalog. Retries rotate through
/// the eligible candidates.
#[derive(Debug, Clone, Default)]
pub struct TemplateRuleGenerator;

impl TemplateRuleGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Eligible rules in priority order
    pub fn candidates(&self, request: &RuleRequest) -> Vec<CandidateRule> {
        let profile = &request.profile;
        let table = &request.table;
        let mut rules = Vec::new();

        if request.drift_severity != DriftSeverity::None {
            for name in &request.drifted_columns {
                let Some(ColumnStatistics::Numeric(stats)) =
                    profile.column(name).map(|c| &c.stats)
                else {
                    continue;
                };
                let bounds = match (stats.mean, stats.std, stats.min, stats.max) {
                    (Some(mean), Some(std), _, _) if std > 0.0 => {
                        Some((mean - 3.0 * std, mean + 3.0 * std))
                    }
                    (_, _, Some(min), Some(max)) => Some((min, max)),
                    _ => None,
                };
                if let Some((low, high)) = bounds {
                    let column = quote_ident(name);
                    rules.push(CandidateRule {
                        template_id: "DQ-002".to_string(),
                        target_column: name.clone(),
                        generated_sql: format!(
                            "SELECT * FROM {} WHERE {} < {} OR {} > {}",
                            table, column, low, column, high
                        ),
                        description: format!(
                            "Value Range Check for {} ({} drift)",
                            name, request.drift_severity
                        ),
                    });
                }
            }
        }

        let mut with_nulls: Vec<_> = profile
            .columns
            .values()
            .filter(|c| c.null_count > 0)
            .collect();
        with_nulls.sort_by(|a, b| b.null_count.cmp(&a.null_count).then(a.name.cmp(&b.name)));
        for column in with_nulls {
            rules.push(mandatory_field(table, &column.name));
        }

        for column in profile.columns.values() {
            let ColumnStatistics::Categorical(stats) = &column.stats else {
                continue;
            };
            if stats.value_counts.is_empty() || stats.unique_count > stats.value_counts.len() {
                continue;
            }
            let allowed = stats
                .value_counts
                .iter()
                .map(|v| quote_literal(&v.value))
                .collect::<Vec<_>>()
                .join(", ");
            let target = quote_ident(&column.name);
            rules.push(CandidateRule {
                template_id: "DQ-003".to_string(),
                target_column: column.name.clone(),
                generated_sql: format!(
                    "SELECT * FROM {} WHERE {} IS NOT NULL AND CAST({} AS VARCHAR) NOT IN ({})",
                    table, target, target, allowed
                ),
                description: format!("Allowed Values Check for {}", column.name),
            });
        }

        if rules.is_empty() {
            if let Some(first) = profile.column_names().first() {
                rules.push(mandatory_field(table, first));
            }
        }
        rules
    }
}

#[async_trait]
impl RuleGenerator for TemplateRuleGenerator {
    async fn generate(&self, request: &RuleRequest) -> Result<CandidateRule> {
        let candidates = self.candidates(request);
        if candidates.is_empty() {
            return Err(GovernorError::rule_generation(format!(
                "profile {} has no columns to build a rule for",
                request.profile_uri
            )));
        }
        let rule = candidates[request.attempt as usize % candidates.len()].clone();
        log::info!(
            "Generated {} for column {} (attempt {})",
            rule.template_id,
            rule.target_column,
            request.attempt
        );
        Ok(rule)
    }
}

fn mandatory_field(table: &str, column: &str) -> CandidateRule {
    CandidateRule {
        template_id: "DQ-001".to_string(),
        target_column: column.to_string(),
        generated_sql: format!("SELECT * FROM {} WHERE {} IS NULL", table, quote_ident(column)),
        description: format!("Mandatory Field Check for {}", column),
    }
}

/// Quote a SQL identifier
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
