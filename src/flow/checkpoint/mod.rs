// SPDX-License-Identifier: MIT

//! Checkpoints and the pluggable checkpoint store
//!
//! A checkpoint is an immutable snapshot of run state taken at a node
//! boundary. Stores keep the full history per run plus the run's status; the
//! engine only ever appends through `compare_and_swap`, so two writers can
//! never interleave checkpoints of the same run.

mod file;
mod memory;

pub use file::FileCheckpointStore;
pub use memory::InMemoryCheckpointStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::error::FlowError;
use super::state::RunStatus;

/// Why a checkpoint was written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointKind {
    /// Initial state before the entry node
    Start,
    /// After a node's patch was merged
    Node,
    /// After an external patch was applied by `resume`
    Resume,
}

/// Snapshot of a run's state at a node boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub run_id: String,
    /// Position in the run's history, starting at 0
    pub sequence: u64,
    pub kind: CheckpointKind,
    /// Node executions performed so far in this run
    pub steps: u32,
    /// Serialized run state
    pub state: serde_json::Value,
    /// Next pending node; `None` once the run is terminal
    pub next: Option<String>,
    /// Node that produced this state (the `as_node` for resumes)
    pub written_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Checkpoint {
    /// Decode the stored state into a typed run state
    pub fn decode<S: DeserializeOwned>(&self) -> Result<S, FlowError> {
        Ok(serde_json::from_value(self.state.clone())?)
    }

    pub fn is_terminal(&self) -> bool {
        self.next.is_none()
    }
}

/// Persistence backend for checkpoints and run status
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Latest checkpoint of a run
    async fn get(&self, run_id: &str) -> Result<Option<Checkpoint>, FlowError>;

    /// Checkpoint at a given sequence number
    async fn get_at(&self, run_id: &str, sequence: u64) -> Result<Option<Checkpoint>, FlowError>;

    /// Append a checkpoint without checking the current head
    async fn put(&self, checkpoint: Checkpoint) -> Result<(), FlowError>;

    /// Append a checkpoint only if the run's latest sequence equals `expected`
    /// (`None` meaning the run has no checkpoints yet). Returns whether the
    /// write happened.
    async fn compare_and_swap(
        &self,
        expected: Option<u64>,
        checkpoint: Checkpoint,
    ) -> Result<bool, FlowError>;

    /// All checkpoints of a run in sequence order
    async fn history(&self, run_id: &str) -> Result<Vec<Checkpoint>, FlowError>;

    async fn set_status(&self, run_id: &str, status: RunStatus) -> Result<(), FlowError>;

    async fn status(&self, run_id: &str) -> Result<Option<RunStatus>, FlowError>;

    /// Ids of every run known to the store
    async fn list_runs(&self) -> Result<Vec<String>, FlowError>;
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_checkpoint_state() {
        let cp = testing::checkpoint("run", 3);
        let state: serde_json::Value = cp.decode().unwrap();
        assert_eq!(state["counter"], 3);
        assert!(!cp.is_terminal());
    }
}
