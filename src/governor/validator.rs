// SPDX-License-Identifier: MIT

//! Executes candidate rules against the live table

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::query::{QueryEngine, TableRef};
use super::rules::CandidateRule;

/// Outcome of running a candidate rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// The query parsed and executed
    pub passed: bool,
    /// Rows the rule flagged as violations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows_flagged: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ValidationReport {
    pub fn passed(rows_flagged: u64) -> Self {
        Self {
            passed: true,
            rows_flagged: Some(rows_flagged),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            passed: false,
            rows_flagged: None,
            error: Some(error.into()),
        }
    }

    /// Rows flagged, zero when the rule did not run
    pub fn flagged(&self) -> u64 {
        self.rows_flagged.unwrap_or(0)
    }
}

/// Runs rule queries through a `QueryEngine`. Failures are reported, never
/// raised.
#[derive(Clone)]
pub struct Validator {
    engine: Arc<dyn QueryEngine>,
    row_limit: Option<u64>,
}

impl Validator {
    pub fn new(engine: Arc<dyn QueryEngine>) -> Self {
        Self {
            engine,
            row_limit: None,
        }
    }

    /// Stop counting flagged rows at `limit`
    pub fn with_row_limit(mut self, limit: u64) -> Self {
        self.row_limit = Some(limit);
        self
    }

    /// Run a violation query and count the rows it selects
    pub async fn validate(&self, table: &TableRef, predicate: &str) -> ValidationReport {
        let query = match self.wrap(predicate) {
            Ok(query) => query,
            Err(message) => {
                log::warn!("Rejected rule query: {}", message);
                return ValidationReport::failed(message);
            }
        };

        match self.engine.execute(table, &query).await {
            Ok(rows) => {
                log::info!("Rule query flagged {} rows in {}", rows, table.table_name);
                ValidationReport::passed(rows)
            }
            Err(e) => {
                log::warn!("Rule query failed on {}: {}", table.table_name, e);
                ValidationReport::failed(e.to_string())
            }
        }
    }

    /// Check the rule's target column exists, then run its query
    pub async fn validate_rule(&self, table: &TableRef, rule: &CandidateRule) -> ValidationReport {
        let schema = match self.engine.describe_schema(table).await {
            Ok(schema) => schema,
            Err(e) => return ValidationReport::failed(e.to_string()),
        };
        if !schema.iter().any(|(name, _)| name == &rule.target_column) {
            return ValidationReport::failed(format!(
                "unknown column '{}' in table {}",
                rule.target_column, table.table_name
            ));
        }
        self.validate(table, &rule.generated_sql).await
    }

    fn wrap(&self, predicate: &str) -> std::result::Result<String, String> {
        let body = predicate.trim();
        let body = body.strip_suffix(';').unwrap_or(body).trim_end();
        if body.is_empty() {
            return Err("empty rule query".to_string());
        }
        if has_statement_separator(body) {
            return Err("rule query must be a single statement".to_string());
        }
        let keyword = body
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_ascii_uppercase();
        if keyword != "SELECT" && keyword != "WITH" {
            return Err(format!(
                "rule query must be a SELECT statement, found {}",
                keyword
            ));
        }

        let mut query = format!("WITH candidate AS ({}) SELECT * FROM candidate", body);
        if let Some(limit) = self.row_limit {
            query.push_str(&format!(" LIMIT {}", limit));
        }
        Ok(query)
    }
}

/// True when `sql` has a `;` outside quoted literals and identifiers
fn has_statement_separator(sql: &str) -> bool {
    // A doubled quote closes and reopens the literal, so toggling is enough
    let mut quote: Option<char> = None;
    for c in sql.chars() {
        match (quote, c) {
            (None, '\'' | '"') => quote = Some(c),
            (Some(open), _) if c == open => quote = None,
            (None, ';') => return true,
            _ => {}
        }
    }
    false
}
