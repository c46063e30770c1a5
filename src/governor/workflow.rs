// SPDX-License-Identifier: MIT

//! The rule governance graph and the service that runs it
//!
//! ```text
//! profile -> drift -> rulegen -> validate -> guard
//!   guard: retry -> rulegen | human_review -> [interrupt] human_review -> END
//!          approve -> END   | reject -> END
//! ```

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;

use super::artifacts::{ArtifactStore, FileArtifactStore, InMemoryArtifactStore};
use super::config::GovernorConfig;
use super::dataset::{DatasetSource, FileDatasetSource};
use super::drift::DriftDetector;
use super::error::Result;
use super::nodes::{
    DriftNode, GovernorContext, GuardNode, HumanReviewNode, ProfileNode, RuleGenNode,
    ValidateNode, DRIFT, GUARD, HUMAN_REVIEW, PROFILE, RULEGEN, VALIDATE,
};
use super::policy::PolicyGuard;
use super::profiler::Profiler;
use super::query::DataFusionQueryEngine;
use super::state::{RunState, RunStatePatch};
use crate::flow::{
    Checkpoint, CheckpointStore, CompiledGraph, FileCheckpointStore, FlowError, GraphBuilder,
    GraphLoader, InMemoryCheckpointStore, NodeRegistry, RunEvent, RunSnapshot, Target,
    WorkflowEngine,
};

pub const GRAPH_NAME: &str = "rule_governance";

/// Build the governance graph over a set of collaborators
pub fn governance_graph(
    ctx: &GovernorContext,
    max_steps: u32,
) -> std::result::Result<CompiledGraph<RunState>, FlowError> {
    GraphBuilder::new(GRAPH_NAME)
        .add_node(Arc::new(ProfileNode::new(ctx.clone())))
        .add_node(Arc::new(DriftNode::new(ctx.clone())))
        .add_node(Arc::new(RuleGenNode::new(ctx.clone())))
        .add_node(Arc::new(ValidateNode::new(ctx.clone())))
        .add_node(Arc::new(GuardNode::new(ctx.clone())))
        .add_node(Arc::new(HumanReviewNode::new()))
        .add_edge(PROFILE, Target::node(DRIFT))
        .add_edge(DRIFT, Target::node(RULEGEN))
        .add_edge(RULEGEN, Target::node(VALIDATE))
        .add_edge(VALIDATE, Target::node(GUARD))
        .add_branches(
            GUARD,
            [
                ("policy_decision == 'retry'", Target::node(RULEGEN)),
                ("policy_decision == 'human_review'", Target::node(HUMAN_REVIEW)),
                ("policy_decision == 'approve'", Target::End),
                ("policy_decision == 'reject'", Target::End),
            ],
        )
        .add_edge(HUMAN_REVIEW, Target::End)
        .set_entry(PROFILE)
        .interrupt_before(HUMAN_REVIEW)
        .max_steps(max_steps)
        .compile()
}

/// Registry of the governance nodes, for graphs loaded from YAML
pub async fn node_registry(ctx: &GovernorContext) -> NodeRegistry<RunState> {
    let registry = NodeRegistry::new();
    registry.register(Arc::new(ProfileNode::new(ctx.clone()))).await;
    registry.register(Arc::new(DriftNode::new(ctx.clone()))).await;
    registry.register(Arc::new(RuleGenNode::new(ctx.clone()))).await;
    registry.register(Arc::new(ValidateNode::new(ctx.clone()))).await;
    registry.register(Arc::new(GuardNode::new(ctx.clone()))).await;
    registry.register(Arc::new(HumanReviewNode::new())).await;
    registry
}

/// Input of a governance run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRequest {
    pub dataset_uri: String,
    pub table_name: String,
    #[serde(default)]
    pub reference_uri: Option<String>,
}

impl RunRequest {
    fn into_state(self) -> RunState {
        let state = RunState::new(self.dataset_uri, self.table_name);
        match self.reference_uri {
            Some(reference) => state.with_reference(reference),
            None => state,
        }
    }
}

/// Starts, inspects and resumes governance runs
#[derive(Clone)]
pub struct GovernanceService {
    engine: WorkflowEngine<RunState>,
}

impl GovernanceService {
    pub fn new(engine: WorkflowEngine<RunState>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &WorkflowEngine<RunState> {
        &self.engine
    }

    /// Run until the workflow completes, fails or waits for review
    pub async fn start(&self, request: RunRequest) -> Result<RunSnapshot<RunState>> {
        let run_id = self.engine.start(request.into_state()).await?;
        self.status(&run_id).await
    }

    pub async fn start_streaming(
        &self,
        request: RunRequest,
        events: mpsc::Sender<RunEvent>,
    ) -> Result<RunSnapshot<RunState>> {
        let run_id = self
            .engine
            .start_streaming(request.into_state(), Some(events))
            .await?;
        self.status(&run_id).await
    }

    /// Return the run id at once and execute in the background
    pub async fn start_detached(&self, request: RunRequest) -> Result<String> {
        Ok(self
            .engine
            .start_detached(request.into_state(), None)
            .await?)
    }

    pub async fn status(&self, run_id: &str) -> Result<RunSnapshot<RunState>> {
        Ok(self.engine.status(run_id).await?)
    }

    /// Record a reviewer's decision on a suspended run and finish it
    pub async fn submit_approval(
        &self,
        run_id: &str,
        approved: bool,
        reviewer: Option<&str>,
    ) -> Result<RunSnapshot<RunState>> {
        let entry = match reviewer {
            Some(reviewer) => format!("Human Approved: {} (by {})", approved, reviewer),
            None => format!("Human Approved: {}", approved),
        };
        let patch = RunStatePatch::approval(approved).audit(entry);
        self.engine.resume(run_id, patch, GUARD).await?;
        self.status(run_id).await
    }

    pub async fn checkpoints(&self, run_id: &str) -> Result<Vec<Checkpoint>> {
        Ok(self.engine.history(run_id).await?)
    }

    pub async fn runs(&self) -> Result<Vec<String>> {
        Ok(self.engine.store().list_runs().await?)
    }
}

/// Wire the default collaborators described by a configuration
pub async fn build_service(config: &GovernorConfig) -> Result<GovernanceService> {
    let datasets: Arc<dyn DatasetSource> = Arc::new(FileDatasetSource::new(&config.data_root));
    let artifacts: Arc<dyn ArtifactStore> = match &config.artifact_dir {
        Some(dir) => Arc::new(FileArtifactStore::new(dir)),
        None => Arc::new(InMemoryArtifactStore::new()),
    };
    let store: Arc<dyn CheckpointStore> = match &config.checkpoint_dir {
        Some(dir) => Arc::new(FileCheckpointStore::new(dir)),
        None => Arc::new(InMemoryCheckpointStore::new()),
    };

    let engine = Arc::new(DataFusionQueryEngine::new(datasets.clone()));
    let mut ctx = GovernorContext::new(datasets, artifacts, engine);
    ctx.profiler = Profiler::new().with_outlier_threshold(config.outlier_threshold);
    ctx.detector = DriftDetector::new(config.significance);
    ctx.guard = PolicyGuard::new(config.max_retries);
    if let Some(limit) = config.row_limit {
        ctx.validator = ctx.validator.with_row_limit(limit);
    }

    let graph = match &config.workflow_file {
        Some(path) => {
            let mut definition = GraphLoader::load_definition(path)?;
            definition.max_steps = config.max_steps;
            GraphLoader::build(&definition, &node_registry(&ctx).await).await?
        }
        None => governance_graph(&ctx, config.max_steps)?,
    };
    log::info!(
        "Governance graph '{}' ready ({} nodes, step cap {})",
        graph.name(),
        graph.node_names().len(),
        graph.max_steps()
    );

    Ok(GovernanceService::new(WorkflowEngine::new(graph, store)))
}
