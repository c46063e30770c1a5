// SPDX-License-Identifier: MIT

//! Data-quality rule governance
//!
//! This module provides:
//! - `Profiler` / `DriftDetector` - the statistical signals
//! - `Validator` / `PolicyGuard` - rule execution and the governance policy
//! - `GovernanceService` - the checkpointed workflow tying them together

pub mod artifacts;
pub mod config;
pub mod dataset;
pub mod drift;
pub mod error;
pub mod nodes;
pub mod policy;
pub mod profiler;
pub mod query;
pub mod rules;
pub mod server;
pub mod state;
pub mod stats;
pub mod validator;
pub mod workflow;

pub use artifacts::{ArtifactKind, ArtifactStore, FileArtifactStore, InMemoryArtifactStore};
pub use config::GovernorConfig;
pub use dataset::{
    Cell, Column, ColumnKind, Dataset, DatasetSource, FileDatasetSource, InMemoryDatasetSource,
};
pub use drift::{ColumnDrift, DriftDetector, DriftResult, DriftSeverity, StatTest};
pub use error::{GovernorError, Result};
pub use nodes::GovernorContext;
pub use policy::{GuardOutcome, PolicyDecision, PolicyGuard};
pub use profiler::{ColumnProfile, DatasetProfile, Profiler};
pub use query::{DataFusionQueryEngine, QueryEngine, TableRef};
pub use rules::{CandidateRule, RuleGenerator, RuleRequest, TemplateRuleGenerator};
pub use state::{RunState, RunStatePatch};
pub use validator::{ValidationReport, Validator};
pub use workflow::{build_service, governance_graph, GovernanceService, RunRequest};

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Arc;

    pub const CLAIMS_URI: &str = "mem://claims";
    pub const REFERENCE_URI: &str = "mem://claims_reference";

    /// Eight claims, three of them without an amount
    pub fn claims() -> Dataset {
        Dataset::new(
            Some("claims".to_string()),
            vec![
                Column::numeric(
                    "amount",
                    vec![
                        Some(120.0),
                        None,
                        Some(75.5),
                        None,
                        Some(980.0),
                        None,
                        Some(64.0),
                        Some(310.0),
                    ],
                ),
                Column::categorical(
                    "region",
                    vec![
                        Some("north"),
                        Some("south"),
                        Some("north"),
                        Some("east"),
                        Some("west"),
                        Some("north"),
                        Some("south"),
                        Some("east"),
                    ],
                ),
                Column::boolean(
                    "approved",
                    vec![
                        Some(true),
                        Some(false),
                        Some(true),
                        Some(true),
                        Some(false),
                        Some(true),
                        Some(true),
                        Some(false),
                    ],
                ),
            ],
        )
        .unwrap()
    }

    pub fn reference() -> Dataset {
        Dataset::new(
            Some("claims".to_string()),
            vec![
                Column::numeric(
                    "amount",
                    vec![
                        Some(110.0),
                        Some(95.0),
                        Some(80.0),
                        Some(130.0),
                        Some(900.0),
                        Some(70.0),
                        Some(300.0),
                        Some(60.0),
                    ],
                ),
                Column::categorical(
                    "region",
                    vec![
                        Some("north"),
                        Some("south"),
                        Some("east"),
                        Some("east"),
                        Some("west"),
                        Some("north"),
                        Some("south"),
                        Some("west"),
                    ],
                ),
            ],
        )
        .unwrap()
    }

    pub async fn claims_source() -> InMemoryDatasetSource {
        let source = InMemoryDatasetSource::new();
        source.insert(CLAIMS_URI, claims()).await;
        source.insert(REFERENCE_URI, reference()).await;
        source
    }

    pub async fn claims_context(artifacts: Arc<dyn ArtifactStore>) -> GovernorContext {
        let source: Arc<dyn DatasetSource> = Arc::new(claims_source().await);
        let engine = Arc::new(DataFusionQueryEngine::new(source.clone()));
        GovernorContext::new(source, artifacts, engine)
    }
}
