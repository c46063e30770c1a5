// SPDX-License-Identifier: MIT

//! Graph builder and the immutable compiled graph
//!
//! The builder collects nodes, edges and interrupt points; `compile` validates
//! the whole table once so routing at run time only ever fails on state.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::types::{Branch, Edge, Node, Target};
use crate::flow::condition;
use crate::flow::error::{EngineError, FlowError};
use crate::flow::state::GraphState;

/// Default per-run cap on node executions
pub const DEFAULT_MAX_STEPS: u32 = 50;

enum PendingEdge<S> {
    Ready(Edge<S>),
    Branches(Vec<(String, Target)>),
}

/// Collects the pieces of a graph before validation
pub struct GraphBuilder<S: GraphState> {
    name: String,
    nodes: Vec<Arc<dyn Node<S>>>,
    edges: Vec<(String, PendingEdge<S>)>,
    entry: Option<String>,
    interrupt_before: Vec<String>,
    max_steps: u32,
}

impl<S: GraphState> GraphBuilder<S> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
            edges: Vec::new(),
            entry: None,
            interrupt_before: Vec::new(),
            max_steps: DEFAULT_MAX_STEPS,
        }
    }

    pub fn add_node(mut self, node: Arc<dyn Node<S>>) -> Self {
        self.nodes.push(node);
        self
    }

    /// Fixed transition from `from` to `to`
    pub fn add_edge(mut self, from: impl Into<String>, to: Target) -> Self {
        self.edges
            .push((from.into(), PendingEdge::Ready(Edge::Static(to))));
        self
    }

    /// Conditional transition decided by a function over the state
    pub fn add_router<F>(mut self, from: impl Into<String>, router: F) -> Self
    where
        F: Fn(&S) -> Option<Target> + Send + Sync + 'static,
    {
        self.edges.push((
            from.into(),
            PendingEdge::Ready(Edge::Router(Arc::new(router))),
        ));
        self
    }

    /// Conditional transition over condition expressions, first match wins.
    /// Conditions are parsed by `compile`.
    pub fn add_branches<I, C>(mut self, from: impl Into<String>, branches: I) -> Self
    where
        I: IntoIterator<Item = (C, Target)>,
        C: Into<String>,
    {
        let branches = branches
            .into_iter()
            .map(|(when, target)| (when.into(), target))
            .collect();
        self.edges
            .push((from.into(), PendingEdge::Branches(branches)));
        self
    }

    pub fn set_entry(mut self, node: impl Into<String>) -> Self {
        self.entry = Some(node.into());
        self
    }

    /// Halt and persist before this node runs
    pub fn interrupt_before(mut self, node: impl Into<String>) -> Self {
        self.interrupt_before.push(node.into());
        self
    }

    pub fn max_steps(mut self, limit: u32) -> Self {
        self.max_steps = limit;
        self
    }

    /// Validate and freeze the graph
    pub fn compile(self) -> Result<CompiledGraph<S>, FlowError> {
        let mut nodes: HashMap<String, Arc<dyn Node<S>>> = HashMap::new();
        for node in self.nodes {
            let name = node.name().to_string();
            if nodes.insert(name.clone(), node).is_some() {
                return Err(FlowError::invalid_graph(format!(
                    "duplicate node '{}'",
                    name
                )));
            }
        }

        let check_target = |target: &Target, from: &str| -> Result<(), FlowError> {
            match target {
                Target::Node(name) if !nodes.contains_key(name) => Err(FlowError::invalid_graph(
                    format!("edge from '{}' targets unknown node '{}'", from, name),
                )),
                _ => Ok(()),
            }
        };

        let mut edges: HashMap<String, Edge<S>> = HashMap::new();
        for (from, pending) in self.edges {
            if !nodes.contains_key(&from) {
                return Err(FlowError::invalid_graph(format!(
                    "edge from unknown node '{}'",
                    from
                )));
            }
            let edge = match pending {
                PendingEdge::Ready(edge) => {
                    if let Edge::Static(target) = &edge {
                        check_target(target, &from)?;
                    }
                    edge
                }
                PendingEdge::Branches(raw) => {
                    if raw.is_empty() {
                        return Err(FlowError::invalid_graph(format!(
                            "node '{}' has an empty branch list",
                            from
                        )));
                    }
                    let mut branches = Vec::with_capacity(raw.len());
                    for (source, target) in raw {
                        check_target(&target, &from)?;
                        let when = condition::parse(&source).map_err(|e| {
                            FlowError::invalid_graph(format!(
                                "bad condition '{}' on node '{}': {}",
                                source, from, e
                            ))
                        })?;
                        branches.push(Branch {
                            when,
                            source,
                            target,
                        });
                    }
                    Edge::Branches(branches)
                }
            };
            if edges.insert(from.clone(), edge).is_some() {
                return Err(FlowError::invalid_graph(format!(
                    "node '{}' has more than one outgoing edge",
                    from
                )));
            }
        }

        if let Some(orphan) = nodes.keys().find(|name| !edges.contains_key(*name)) {
            return Err(FlowError::invalid_graph(format!(
                "node '{}' has no outgoing edge",
                orphan
            )));
        }

        let entry = self
            .entry
            .ok_or_else(|| FlowError::invalid_graph("no entry node set"))?;
        if !nodes.contains_key(&entry) {
            return Err(FlowError::invalid_graph(format!(
                "entry node '{}' is not registered",
                entry
            )));
        }

        let mut interrupt_before = HashSet::new();
        for name in self.interrupt_before {
            if !nodes.contains_key(&name) {
                return Err(FlowError::invalid_graph(format!(
                    "interrupt on unknown node '{}'",
                    name
                )));
            }
            interrupt_before.insert(name);
        }

        if self.max_steps == 0 {
            return Err(FlowError::invalid_graph("max_steps must be positive"));
        }

        log::info!(
            "Compiled graph '{}' with {} nodes (entry: {})",
            self.name,
            nodes.len(),
            entry
        );

        Ok(CompiledGraph {
            name: self.name,
            nodes,
            edges,
            entry,
            interrupt_before,
            max_steps: self.max_steps,
        })
    }
}

/// Immutable node registry, edge table and interrupt set
pub struct CompiledGraph<S: GraphState> {
    name: String,
    nodes: HashMap<String, Arc<dyn Node<S>>>,
    edges: HashMap<String, Edge<S>>,
    entry: String,
    interrupt_before: HashSet<String>,
    max_steps: u32,
}

impl<S: GraphState> std::fmt::Debug for CompiledGraph<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledGraph")
            .field("name", &self.name)
            .field("entry", &self.entry)
            .field("nodes", &self.node_names())
            .field("max_steps", &self.max_steps)
            .finish()
    }
}

impl<S: GraphState> CompiledGraph<S> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entry(&self) -> &str {
        &self.entry
    }

    pub fn max_steps(&self) -> u32 {
        self.max_steps
    }

    pub fn node(&self, name: &str) -> Option<&Arc<dyn Node<S>>> {
        self.nodes.get(name)
    }

    pub fn has_node(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    pub fn node_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.nodes.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn is_interrupt(&self, name: &str) -> bool {
        self.interrupt_before.contains(name)
    }

    /// Resolve the transition out of `from` for the given state
    pub fn route(&self, from: &str, state: &S) -> Result<Target, FlowError> {
        let edge = self
            .edges
            .get(from)
            .ok_or_else(|| EngineError::UnknownNode(from.to_string()))?;

        let target = match edge {
            Edge::Static(target) => Some(target.clone()),
            Edge::Router(router) => router(state),
            Edge::Branches(branches) => {
                let doc = serde_json::to_value(state)?;
                branches
                    .iter()
                    .find(|b| condition::evaluate(&b.when, &doc))
                    .map(|b| {
                        log::debug!("Branch '{}' matched out of '{}'", b.source, from);
                        b.target.clone()
                    })
            }
        };

        match target {
            None => Err(EngineError::Unroutable {
                node: from.to_string(),
            }
            .into()),
            Some(Target::Node(name)) if !self.nodes.contains_key(&name) => {
                Err(EngineError::UnknownNode(name).into())
            }
            Some(target) => Ok(target),
        }
    }
}
