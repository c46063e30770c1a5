// SPDX-License-Identifier: MIT

//! Graph loader - YAML routing tables bound to registered nodes
//!
//! A definition names nodes and how to leave them; the behaviour of each node
//! comes from a `NodeRegistry`.
//!
//! ```yaml
//! name: example
//! entry: a
//! interrupt_before: [b]
//! nodes:
//!   - id: a
//!     branches:
//!       - when: "count > 3"
//!         goto: end
//!       - when: "count <= 3"
//!         goto: b
//!   - id: b
//!     next: a
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::flow::error::FlowError;
use crate::flow::graph::{CompiledGraph, GraphBuilder, Target, DEFAULT_MAX_STEPS};
use crate::flow::registry::NodeRegistry;
use crate::flow::state::GraphState;

/// A graph routing table
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GraphDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub entry: String,
    #[serde(default)]
    pub interrupt_before: Vec<String>,
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,
    #[serde(default)]
    pub nodes: Vec<NodeRoute>,
}

fn default_max_steps() -> u32 {
    DEFAULT_MAX_STEPS
}

/// Outgoing route of one node: either `next` or `branches`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NodeRoute {
    pub id: String,
    pub next: Option<String>,
    #[serde(default)]
    pub branches: Vec<BranchDefinition>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BranchDefinition {
    pub when: String,
    pub goto: String,
}

/// Loads graph definitions and binds them to registered nodes
pub struct GraphLoader;

impl GraphLoader {
    /// Load a graph definition from a YAML file
    pub fn load_definition<P: AsRef<Path>>(path: P) -> Result<GraphDefinition, FlowError> {
        let content = fs::read_to_string(path)?;
        Self::parse_yaml(&content)
    }

    /// Parse a graph definition from a YAML string
    pub fn parse_yaml(content: &str) -> Result<GraphDefinition, FlowError> {
        let def: GraphDefinition = serde_yaml::from_str(content)?;
        Ok(def)
    }

    /// Resolve node ids against the registry and compile the graph
    pub async fn build<S: GraphState>(
        def: &GraphDefinition,
        registry: &NodeRegistry<S>,
    ) -> Result<CompiledGraph<S>, FlowError> {
        let mut builder = GraphBuilder::new(def.name.clone())
            .set_entry(def.entry.clone())
            .max_steps(def.max_steps);

        for route in &def.nodes {
            let node = registry.get(&route.id).await.ok_or_else(|| {
                FlowError::invalid_graph(format!("node '{}' is not registered", route.id))
            })?;
            builder = builder.add_node(node);

            builder = match (&route.next, route.branches.is_empty()) {
                (Some(next), true) => builder.add_edge(route.id.clone(), Target::parse(next)),
                (None, false) => builder.add_branches(
                    route.id.clone(),
                    route
                        .branches
                        .iter()
                        .map(|b| (b.when.clone(), Target::parse(&b.goto))),
                ),
                (Some(_), false) => {
                    return Err(FlowError::invalid_graph(format!(
                        "node '{}' declares both next and branches",
                        route.id
                    )))
                }
                (None, true) => {
                    return Err(FlowError::invalid_graph(format!(
                        "node '{}' declares neither next nor branches",
                        route.id
                    )))
                }
            };
        }

        for name in &def.interrupt_before {
            builder = builder.interrupt_before(name.clone());
        }

        log::info!(
            "Loaded graph definition '{}' with {} nodes",
            def.name,
            def.nodes.len()
        );
        builder.compile()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::checkpoint::InMemoryCheckpointStore;
    use crate::flow::error::EngineError;
    use crate::flow::graph::testing::{counter_node, Counter};
    use crate::flow::graph::WorkflowEngine;
    use crate::flow::state::RunStatus;
    use std::sync::Arc;

    const LOOP_YAML: &str = r#"
name: loop
description: "Counts to four"
entry: work
max_steps: 20
nodes:
  - id: work
    next: check
  - id: check
    branches:
      - when: "count >= 4"
        goto: end
      - when: "count < 4"
        goto: work
"#;

    async fn registry() -> NodeRegistry<Counter> {
        let registry = NodeRegistry::new();
        registry.register(counter_node("work")).await;
        registry.register(counter_node("check")).await;
        registry
    }

    #[test]
    fn test_parse_definition() {
        let def = GraphLoader::parse_yaml(LOOP_YAML).unwrap();
        assert_eq!(def.name, "loop");
        assert_eq!(def.entry, "work");
        assert_eq!(def.max_steps, 20);
        assert!(def.interrupt_before.is_empty());
        assert_eq!(def.nodes.len(), 2);
        assert_eq!(def.nodes[0].next.as_deref(), Some("check"));
        assert_eq!(def.nodes[1].branches[0].goto, "end");
    }

    #[test]
    fn test_default_max_steps() {
        let def = GraphLoader::parse_yaml("name: g\nentry: a\n").unwrap();
        assert_eq!(def.max_steps, DEFAULT_MAX_STEPS);
    }

    #[tokio::test]
    async fn test_build_and_run_loaded_graph() {
        let def = GraphLoader::parse_yaml(LOOP_YAML).unwrap();
        let graph = GraphLoader::build(&def, &registry().await).await.unwrap();
        let engine = WorkflowEngine::new(graph, Arc::new(InMemoryCheckpointStore::new()));

        let run_id = engine.start(Counter::default()).await.unwrap();
        let snapshot = engine.status(&run_id).await.unwrap();
        assert_eq!(snapshot.status, RunStatus::Completed);
        assert_eq!(snapshot.state.count, 4);
    }

    #[tokio::test]
    async fn test_unregistered_node_is_rejected() {
        let yaml = "name: g\nentry: ghost\nnodes:\n  - id: ghost\n    next: end\n";
        let def = GraphLoader::parse_yaml(yaml).unwrap();
        let err = GraphLoader::build(&def, &registry().await).await.unwrap_err();
        assert!(matches!(
            err.as_engine(),
            Some(EngineError::InvalidGraph(msg)) if msg.contains("ghost")
        ));
    }

    #[tokio::test]
    async fn test_ambiguous_route_is_rejected() {
        let yaml = r#"
name: g
entry: work
nodes:
  - id: work
    next: end
    branches:
      - when: "count > 1"
        goto: end
"#;
        let def = GraphLoader::parse_yaml(yaml).unwrap();
        let err = GraphLoader::build(&def, &registry().await).await.unwrap_err();
        assert!(err.to_string().contains("both next and branches"));
    }

    #[test]
    fn test_load_definition_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.yaml");
        fs::write(&path, LOOP_YAML).unwrap();

        let def = GraphLoader::load_definition(&path).unwrap();
        assert_eq!(def.nodes.len(), 2);
        assert!(GraphLoader::load_definition(dir.path().join("missing.yaml")).is_err());
    }
}
