// SPDX-License-Identifier: MIT

//! State management for graph workflows
//!
//! This module provides:
//! - `GraphState` - the contract a run state implements to be driven by the engine
//! - `reducer` - field merge strategies used when folding a node patch into state
//! - `RunStatus` - the lifecycle status stored beside a run's checkpoints

pub mod reducer;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

/// State carried through a graph run.
///
/// Nodes never mutate state directly. They return a `Patch` and the engine
/// folds it in with `merge`, so every change passes through one place.
pub trait GraphState: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Partial update emitted by a node
    type Patch: Clone + Serialize + DeserializeOwned + Send + Sync + 'static;

    /// Apply a node patch to this state
    fn merge(&mut self, patch: Self::Patch);
}

/// Lifecycle status of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    /// The engine is executing nodes
    Running,
    /// Halted before an interrupt node, awaiting `resume`
    WaitingForHuman,
    /// Reached the terminal marker
    Completed,
    /// A node or the engine failed
    Failed { message: String },
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed { .. })
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Running => write!(f, "running"),
            RunStatus::WaitingForHuman => write!(f, "waiting_for_human"),
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::Failed { .. } => write!(f, "failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_display() {
        assert_eq!(RunStatus::Running.to_string(), "running");
        assert_eq!(RunStatus::WaitingForHuman.to_string(), "waiting_for_human");
        assert_eq!(RunStatus::Completed.to_string(), "completed");
        assert_eq!(
            RunStatus::Failed {
                message: "boom".to_string()
            }
            .to_string(),
            "failed"
        );
    }

    #[test]
    fn test_status_serialization() {
        let failed = RunStatus::Failed {
            message: "boom".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&failed).unwrap(),
            json!({"status": "failed", "message": "boom"})
        );
        let waiting: RunStatus =
            serde_json::from_value(json!({"status": "waiting_for_human"})).unwrap();
        assert_eq!(waiting, RunStatus::WaitingForHuman);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Failed {
            message: String::new()
        }
        .is_terminal());
        assert!(!RunStatus::Running.is_terminal());
        assert!(!RunStatus::WaitingForHuman.is_terminal());
    }
}
