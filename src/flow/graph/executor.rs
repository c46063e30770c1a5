// SPDX-License-Identifier: MIT

//! Checkpointed graph executor
//!
//! Each run is a sequence of node executions. After every node the merged
//! state and the next pending node are committed through the store's
//! compare-and-swap, so a run can be inspected, suspended before an interrupt
//! node, resumed by a later process, or replayed from any checkpoint.

use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

use super::builder::CompiledGraph;
use super::types::{RunContext, RunEvent, Target};
use crate::flow::checkpoint::{Checkpoint, CheckpointKind, CheckpointStore};
use crate::flow::error::{EngineError, FlowError};
use crate::flow::state::{GraphState, RunStatus};

/// Point-in-time view of a run
#[derive(Debug, Clone, Serialize)]
pub struct RunSnapshot<S> {
    pub run_id: String,
    pub status: RunStatus,
    pub state: S,
    /// Node that runs next; the interrupted node while waiting for input
    pub pending_node: Option<String>,
    /// Sequence of the latest checkpoint
    pub sequence: u64,
}

/// Result of re-executing a run without persistence
#[derive(Debug, Clone)]
pub struct Replay<S> {
    pub state: S,
    /// Interrupt node the replay stopped at, if it did not reach the end
    pub pending_node: Option<String>,
    pub steps: u32,
}

enum Outcome {
    Completed,
    Suspended(String),
}

type EventSender = mpsc::Sender<RunEvent>;

/// Drives compiled graphs and persists their checkpoints
pub struct WorkflowEngine<S: GraphState> {
    graph: Arc<CompiledGraph<S>>,
    store: Arc<dyn CheckpointStore>,
    locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl<S: GraphState> Clone for WorkflowEngine<S> {
    fn clone(&self) -> Self {
        Self {
            graph: self.graph.clone(),
            store: self.store.clone(),
            locks: self.locks.clone(),
        }
    }
}

impl<S: GraphState> WorkflowEngine<S> {
    pub fn new(graph: CompiledGraph<S>, store: Arc<dyn CheckpointStore>) -> Self {
        Self {
            graph: Arc::new(graph),
            store,
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn graph(&self) -> &CompiledGraph<S> {
        &self.graph
    }

    pub fn store(&self) -> &Arc<dyn CheckpointStore> {
        &self.store
    }

    /// Start a run and execute it until it completes, suspends or fails
    pub async fn start(&self, initial: S) -> Result<String, FlowError> {
        self.start_streaming(initial, None).await
    }

    /// Like `start`, reporting progress on an event channel
    pub async fn start_streaming(
        &self,
        initial: S,
        events: Option<EventSender>,
    ) -> Result<String, FlowError> {
        let run_id = new_run_id();
        let lock = self.run_lock(&run_id).await;
        let result = {
            let _guard = lock.lock().await;
            self.start_locked(&run_id, &initial, events.as_ref()).await
        };
        drop(lock);
        self.release_lock(&run_id).await;
        result.map(|()| run_id)
    }

    async fn start_locked(
        &self,
        run_id: &str,
        initial: &S,
        events: Option<&EventSender>,
    ) -> Result<(), FlowError> {
        let checkpoint = self.begin(run_id, initial).await?;
        emit(
            events,
            RunEvent::Started {
                run_id: run_id.to_string(),
            },
        )
        .await;
        self.drive(checkpoint, false, events).await
    }

    /// Persist the initial checkpoint and execute on a background task.
    /// Returns as soon as the run id exists.
    pub async fn start_detached(
        &self,
        initial: S,
        events: Option<EventSender>,
    ) -> Result<String, FlowError> {
        let run_id = new_run_id();
        let guard = self.run_lock(&run_id).await.lock_owned().await;

        let checkpoint = match self.begin(&run_id, &initial).await {
            Ok(checkpoint) => checkpoint,
            Err(e) => {
                drop(guard);
                self.release_lock(&run_id).await;
                return Err(e);
            }
        };
        emit(
            events.as_ref(),
            RunEvent::Started {
                run_id: run_id.clone(),
            },
        )
        .await;

        let engine = self.clone();
        tokio::spawn(async move {
            let run_id = checkpoint.run_id.clone();
            if let Err(e) = engine.drive(checkpoint, false, events.as_ref()).await {
                log::error!("Detached run {} aborted: {}", run_id, e);
            }
            drop(guard);
            engine.release_lock(&run_id).await;
        });

        Ok(run_id)
    }

    /// Latest state, status and pending node of a run
    pub async fn status(&self, run_id: &str) -> Result<RunSnapshot<S>, FlowError> {
        let checkpoint = self.latest(run_id).await?;
        let status = self
            .store
            .status(run_id)
            .await?
            .unwrap_or(RunStatus::Running);

        Ok(RunSnapshot {
            run_id: run_id.to_string(),
            status,
            state: checkpoint.decode()?,
            pending_node: checkpoint.next.clone(),
            sequence: checkpoint.sequence,
        })
    }

    /// Every checkpoint of a run, oldest first
    pub async fn history(&self, run_id: &str) -> Result<Vec<Checkpoint>, FlowError> {
        let history = self.store.history(run_id).await?;
        if history.is_empty() {
            return Err(EngineError::MissingCheckpoint(run_id.to_string()).into());
        }
        Ok(history)
    }

    /// Apply an external patch to a suspended run, attributed to `as_node`,
    /// and continue from the interrupted node
    pub async fn resume(
        &self,
        run_id: &str,
        patch: S::Patch,
        as_node: &str,
    ) -> Result<RunStatus, FlowError> {
        self.resume_streaming(run_id, patch, as_node, None).await
    }

    pub async fn resume_streaming(
        &self,
        run_id: &str,
        patch: S::Patch,
        as_node: &str,
        events: Option<EventSender>,
    ) -> Result<RunStatus, FlowError> {
        if !self.graph.has_node(as_node) {
            return Err(EngineError::UnknownNode(as_node.to_string()).into());
        }
        // Unknown runs never get a lock entry
        self.latest(run_id).await?;

        let lock = self.run_lock(run_id).await;
        let result = {
            let _guard = lock.lock().await;
            self.resume_locked(run_id, patch, as_node, events.as_ref()).await
        };
        drop(lock);
        self.release_lock(run_id).await;
        result
    }

    async fn resume_locked(
        &self,
        run_id: &str,
        patch: S::Patch,
        as_node: &str,
        events: Option<&EventSender>,
    ) -> Result<RunStatus, FlowError> {
        let current = self.latest(run_id).await?;
        let status = self
            .store
            .status(run_id)
            .await?
            .unwrap_or(RunStatus::Running);
        if status != RunStatus::WaitingForHuman {
            return Err(EngineError::NotSuspended {
                run_id: run_id.to_string(),
                status: status.to_string(),
            }
            .into());
        }

        let mut state: S = current.decode()?;
        state.merge(patch);

        let checkpoint = Checkpoint {
            run_id: run_id.to_string(),
            sequence: current.sequence + 1,
            kind: CheckpointKind::Resume,
            steps: current.steps,
            state: serde_json::to_value(&state)?,
            next: current.next.clone(),
            written_by: Some(as_node.to_string()),
            created_at: Utc::now(),
        };
        self.commit(&current, checkpoint.clone()).await?;
        self.store.set_status(run_id, RunStatus::Running).await?;
        log::info!("Resumed run {} as '{}'", run_id, as_node);

        self.drive(checkpoint, true, events).await?;
        Ok(self
            .store
            .status(run_id)
            .await?
            .unwrap_or(RunStatus::Running))
    }

    /// Re-execute from a checkpoint without touching the store.
    ///
    /// Stops before interrupt nodes, except when starting from a resume
    /// checkpoint whose pending node is the one that was interrupted.
    pub async fn replay(&self, checkpoint: &Checkpoint) -> Result<Replay<S>, FlowError> {
        let mut state: S = checkpoint.decode()?;
        let mut next = checkpoint.next.clone();
        let mut steps = checkpoint.steps;
        let mut skip_interrupt = checkpoint.kind == CheckpointKind::Resume;

        while let Some(node_name) = next {
            if self.graph.is_interrupt(&node_name) && !skip_interrupt {
                return Ok(Replay {
                    state,
                    pending_node: Some(node_name),
                    steps,
                });
            }
            skip_interrupt = false;

            if steps >= self.graph.max_steps() {
                return Err(EngineError::StepLimitExceeded {
                    run_id: checkpoint.run_id.clone(),
                    limit: self.graph.max_steps(),
                }
                .into());
            }
            steps += 1;

            let patch = self
                .execute(&node_name, &checkpoint.run_id, steps, &state)
                .await?;
            state.merge(patch);
            next = match self.graph.route(&node_name, &state)? {
                Target::Node(name) => Some(name),
                Target::End => None,
            };
        }

        Ok(Replay {
            state,
            pending_node: None,
            steps,
        })
    }

    async fn begin(&self, run_id: &str, initial: &S) -> Result<Checkpoint, FlowError> {
        let checkpoint = Checkpoint {
            run_id: run_id.to_string(),
            sequence: 0,
            kind: CheckpointKind::Start,
            steps: 0,
            state: serde_json::to_value(initial)?,
            next: Some(self.graph.entry().to_string()),
            written_by: None,
            created_at: Utc::now(),
        };
        if !self
            .store
            .compare_and_swap(None, checkpoint.clone())
            .await?
        {
            return Err(EngineError::Conflict {
                run_id: run_id.to_string(),
                expected: None,
            }
            .into());
        }
        self.store.set_status(run_id, RunStatus::Running).await?;
        log::info!("Started run {} on graph '{}'", run_id, self.graph.name());
        Ok(checkpoint)
    }

    /// Run the loop and record how it ended. Execution faults become a
    /// `failed` status; only store failures while recording it are returned.
    async fn drive(
        &self,
        checkpoint: Checkpoint,
        resuming: bool,
        events: Option<&EventSender>,
    ) -> Result<(), FlowError> {
        let run_id = checkpoint.run_id.clone();
        match self.run_loop(checkpoint, resuming, events).await {
            Ok(Outcome::Completed) => {
                self.store.set_status(&run_id, RunStatus::Completed).await?;
                log::info!("Run {} completed", run_id);
                emit(events, RunEvent::Completed { run_id }).await;
            }
            Ok(Outcome::Suspended(node)) => {
                self.store
                    .set_status(&run_id, RunStatus::WaitingForHuman)
                    .await?;
                log::info!("Run {} suspended before '{}'", run_id, node);
                emit(events, RunEvent::Suspended { run_id, node }).await;
            }
            Err(e) => {
                let message = e.to_string();
                log::error!("Run {} failed: {}", run_id, message);
                self.store
                    .set_status(
                        &run_id,
                        RunStatus::Failed {
                            message: message.clone(),
                        },
                    )
                    .await?;
                emit(events, RunEvent::Failed { run_id, message }).await;
            }
        }
        Ok(())
    }

    async fn run_loop(
        &self,
        checkpoint: Checkpoint,
        resuming: bool,
        events: Option<&EventSender>,
    ) -> Result<Outcome, FlowError> {
        let mut state: S = checkpoint.decode()?;
        let mut current = checkpoint;
        let mut skip_interrupt = resuming;

        loop {
            let Some(node_name) = current.next.clone() else {
                return Ok(Outcome::Completed);
            };

            if self.graph.is_interrupt(&node_name) && !skip_interrupt {
                return Ok(Outcome::Suspended(node_name));
            }
            skip_interrupt = false;

            if current.steps >= self.graph.max_steps() {
                return Err(EngineError::StepLimitExceeded {
                    run_id: current.run_id.clone(),
                    limit: self.graph.max_steps(),
                }
                .into());
            }
            let step = current.steps + 1;

            emit(
                events,
                RunEvent::NodeStarted {
                    run_id: current.run_id.clone(),
                    node: node_name.clone(),
                    step,
                },
            )
            .await;

            let patch = self
                .execute(&node_name, &current.run_id, step, &state)
                .await?;
            state.merge(patch);

            let next = match self.graph.route(&node_name, &state)? {
                Target::Node(name) => Some(name),
                Target::End => None,
            };

            let checkpoint = Checkpoint {
                run_id: current.run_id.clone(),
                sequence: current.sequence + 1,
                kind: CheckpointKind::Node,
                steps: step,
                state: serde_json::to_value(&state)?,
                next,
                written_by: Some(node_name.clone()),
                created_at: Utc::now(),
            };
            self.commit(&current, checkpoint.clone()).await?;

            emit(
                events,
                RunEvent::NodeCompleted {
                    run_id: checkpoint.run_id.clone(),
                    node: node_name,
                    sequence: checkpoint.sequence,
                },
            )
            .await;
            current = checkpoint;
        }
    }

    async fn execute(
        &self,
        node_name: &str,
        run_id: &str,
        step: u32,
        state: &S,
    ) -> Result<S::Patch, FlowError> {
        let node = self
            .graph
            .node(node_name)
            .ok_or_else(|| EngineError::UnknownNode(node_name.to_string()))?;
        let ctx = RunContext {
            run_id: run_id.to_string(),
            step,
        };

        log::info!("Run {} step {}: executing node '{}'", run_id, step, node_name);
        node.run(&ctx, state).await.map_err(|e| {
            EngineError::NodeFailed {
                node: node_name.to_string(),
                message: e.to_string(),
            }
            .into()
        })
    }

    async fn commit(&self, previous: &Checkpoint, next: Checkpoint) -> Result<(), FlowError> {
        if self
            .store
            .compare_and_swap(Some(previous.sequence), next)
            .await?
        {
            Ok(())
        } else {
            Err(EngineError::Conflict {
                run_id: previous.run_id.clone(),
                expected: Some(previous.sequence),
            }
            .into())
        }
    }

    async fn latest(&self, run_id: &str) -> Result<Checkpoint, FlowError> {
        self.store
            .get(run_id)
            .await?
            .ok_or_else(|| EngineError::MissingCheckpoint(run_id.to_string()).into())
    }

    async fn run_lock(&self, run_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(run_id.to_string()).or_default().clone()
    }

    /// Drop the lock entry of a run once no caller holds or awaits it
    async fn release_lock(&self, run_id: &str) {
        let mut locks = self.locks.lock().await;
        if locks.get(run_id).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(run_id);
        }
    }

    #[cfg(test)]
    async fn lock_count(&self) -> usize {
        self.locks.lock().await.len()
    }
}

fn new_run_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

async fn emit(events: Option<&EventSender>, event: RunEvent) {
    if let Some(tx) = events {
        // A dropped receiver only means nobody is listening any more
        let _ = tx.send(event).await;
    }
}
