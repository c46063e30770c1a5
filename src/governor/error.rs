// SPDX-License-Identifier: MIT

//! Typed error handling for the rule governor
//!
//! Input, query and statistical failures are kept apart: an input error ends
//! the step, a query failure becomes a failed validation report, and a
//! statistical test error only excludes one column from the drift aggregate.

use thiserror::Error;

use crate::flow::FlowError;

/// Top-level error type for the governor
#[derive(Debug, Error)]
pub enum GovernorError {
    /// Malformed or missing dataset
    #[error("Input error: {0}")]
    Input(String),

    /// A candidate rule could not be executed
    #[error("Validation error: {0}")]
    Validation(String),

    /// A statistical test is degenerate for the given samples
    #[error("Statistical test error: {0}")]
    StatisticalTest(String),

    /// Query engine failures
    #[error("Query error: {0}")]
    Query(String),

    /// Configuration errors (bad values, unreadable config file)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Artifact persistence failures
    #[error("Artifact error: {0}")]
    Artifact(String),

    /// Rule generation failures
    #[error("Rule generation error: {0}")]
    RuleGeneration(String),

    /// Workflow engine errors
    #[error(transparent)]
    Flow(#[from] FlowError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    /// A blocking task panicked or was cancelled
    #[error("Task error: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl GovernorError {
    /// Create an input error
    pub fn input(message: impl Into<String>) -> Self {
        Self::Input(message.into())
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a statistical test error
    pub fn statistical(message: impl Into<String>) -> Self {
        Self::StatisticalTest(message.into())
    }

    /// Create a query error
    pub fn query(message: impl Into<String>) -> Self {
        Self::Query(message.into())
    }

    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create an artifact error
    pub fn artifact(message: impl Into<String>) -> Self {
        Self::Artifact(message.into())
    }

    /// Create a rule generation error
    pub fn rule_generation(message: impl Into<String>) -> Self {
        Self::RuleGeneration(message.into())
    }
}

impl From<datafusion::error::DataFusionError> for GovernorError {
    fn from(err: datafusion::error::DataFusionError) -> Self {
        Self::Query(err.to_string())
    }
}

impl From<arrow::error::ArrowError> for GovernorError {
    fn from(err: arrow::error::ArrowError) -> Self {
        Self::Query(err.to_string())
    }
}

/// Result type alias for governor operations
pub type Result<T> = std::result::Result<T, GovernorError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::EngineError;

    #[test]
    fn test_error_display() {
        let err = GovernorError::input("ragged columns");
        assert_eq!(err.to_string(), "Input error: ragged columns");

        let err = GovernorError::statistical("fewer than 2 categories");
        assert!(err.to_string().starts_with("Statistical test error"));
    }

    #[test]
    fn test_flow_error_is_transparent() {
        let flow: FlowError = EngineError::MissingCheckpoint("r1".to_string()).into();
        let err: GovernorError = flow.into();
        assert_eq!(err.to_string(), "Engine error: No checkpoint found for run r1");
    }

    #[test]
    fn test_query_error_conversion() {
        let err: GovernorError =
            datafusion::error::DataFusionError::Plan("bad plan".to_string()).into();
        assert!(matches!(err, GovernorError::Query(msg) if msg.contains("bad plan")));
    }
}
