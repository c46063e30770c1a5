// SPDX-License-Identifier: MIT

//! Typed error handling for the workflow engine
//!
//! `EngineError` covers faults in the engine itself (routing, checkpoints,
//! resume misuse). They are kept apart from business outcomes so a caller can
//! always tell a broken run from a rejected rule.

use thiserror::Error;

use super::condition::ConditionError;

/// Faults raised by the graph engine
#[derive(Debug, Error)]
pub enum EngineError {
    /// A node name that is not registered in the graph
    #[error("Unknown node: {0}")]
    UnknownNode(String),

    /// No checkpoint exists for the run id
    #[error("No checkpoint found for run {0}")]
    MissingCheckpoint(String),

    /// Resume targeted a run that is not waiting for input
    #[error("Run {run_id} is not suspended (status: {status})")]
    NotSuspended { run_id: String, status: String },

    /// No edge out of a node matched the current state
    #[error("No route out of node '{node}' matched the current state")]
    Unroutable { node: String },

    /// Per-run step cap reached
    #[error("Run {run_id} exceeded the step limit of {limit}")]
    StepLimitExceeded { run_id: String, limit: u32 },

    /// Graph failed validation at construction time
    #[error("Invalid graph: {0}")]
    InvalidGraph(String),

    /// Compare-and-swap on the checkpoint store lost the race
    #[error("Checkpoint conflict for run {run_id}: expected sequence {expected:?}")]
    Conflict {
        run_id: String,
        expected: Option<u64>,
    },

    /// A node function returned an error
    #[error("Node '{node}' failed: {message}")]
    NodeFailed { node: String, message: String },
}

/// Top-level error type for the flow kit
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Condition error: {0}")]
    Condition(#[from] ConditionError),

    /// Checkpoint store failures that are not engine faults
    #[error("Store error: {0}")]
    Store(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

impl FlowError {
    /// Create a store error
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store(message.into())
    }

    /// Create an invalid graph error
    pub fn invalid_graph(message: impl Into<String>) -> Self {
        Self::Engine(EngineError::InvalidGraph(message.into()))
    }

    /// Returns the engine fault, if this error is one
    pub fn as_engine(&self) -> Option<&EngineError> {
        match self {
            Self::Engine(e) => Some(e),
            _ => None,
        }
    }
}
