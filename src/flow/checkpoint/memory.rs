// SPDX-License-Identifier: MIT

//! In-memory checkpoint store (the default backend)

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{Checkpoint, CheckpointStore};
use crate::flow::error::FlowError;
use crate::flow::state::RunStatus;

#[derive(Debug, Default)]
struct RunEntry {
    checkpoints: Vec<Checkpoint>,
    status: Option<RunStatus>,
}

/// Checkpoint store backed by a shared map. Clones share the same runs.
#[derive(Clone, Default)]
pub struct InMemoryCheckpointStore {
    runs: Arc<RwLock<HashMap<String, RunEntry>>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn get(&self, run_id: &str) -> Result<Option<Checkpoint>, FlowError> {
        let runs = self.runs.read().await;
        Ok(runs
            .get(run_id)
            .and_then(|entry| entry.checkpoints.last().cloned()))
    }

    async fn get_at(&self, run_id: &str, sequence: u64) -> Result<Option<Checkpoint>, FlowError> {
        let runs = self.runs.read().await;
        Ok(runs.get(run_id).and_then(|entry| {
            entry
                .checkpoints
                .iter()
                .find(|c| c.sequence == sequence)
                .cloned()
        }))
    }

    async fn put(&self, checkpoint: Checkpoint) -> Result<(), FlowError> {
        let mut runs = self.runs.write().await;
        runs.entry(checkpoint.run_id.clone())
            .or_default()
            .checkpoints
            .push(checkpoint);
        Ok(())
    }

    async fn compare_and_swap(
        &self,
        expected: Option<u64>,
        checkpoint: Checkpoint,
    ) -> Result<bool, FlowError> {
        // The write lock makes check-and-append a single step
        let mut runs = self.runs.write().await;
        let entry = runs.entry(checkpoint.run_id.clone()).or_default();
        let head = entry.checkpoints.last().map(|c| c.sequence);
        if head != expected {
            return Ok(false);
        }
        entry.checkpoints.push(checkpoint);
        Ok(true)
    }

    async fn history(&self, run_id: &str) -> Result<Vec<Checkpoint>, FlowError> {
        let runs = self.runs.read().await;
        Ok(runs
            .get(run_id)
            .map(|entry| entry.checkpoints.clone())
            .unwrap_or_default())
    }

    async fn set_status(&self, run_id: &str, status: RunStatus) -> Result<(), FlowError> {
        let mut runs = self.runs.write().await;
        runs.entry(run_id.to_string()).or_default().status = Some(status);
        Ok(())
    }

    async fn status(&self, run_id: &str) -> Result<Option<RunStatus>, FlowError> {
        let runs = self.runs.read().await;
        Ok(runs.get(run_id).and_then(|entry| entry.status.clone()))
    }

    async fn list_runs(&self) -> Result<Vec<String>, FlowError> {
        let runs = self.runs.read().await;
        Ok(runs.keys().cloned().collect())
    }
}
