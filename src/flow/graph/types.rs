// SPDX-License-Identifier: MIT

//! Graph building blocks: nodes, edges, routing targets and run events

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::flow::condition::Expression;
use crate::flow::state::GraphState;

/// Error type returned by node functions
pub type NodeError = Box<dyn Error + Send + Sync>;

/// Where an edge leads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    Node(String),
    End,
}

impl Target {
    pub fn node(name: impl Into<String>) -> Self {
        Target::Node(name.into())
    }

    /// Parse a target name, treating `end` as the terminal marker
    pub fn parse(name: &str) -> Self {
        if name.eq_ignore_ascii_case("end") {
            Target::End
        } else {
            Target::Node(name.to_string())
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Node(name) => write!(f, "{}", name),
            Target::End => write!(f, "END"),
        }
    }
}

/// Per-invocation context handed to a node
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: String,
    /// 1-based count of node executions in this run, including this one
    pub step: u32,
}

/// A named async step in a graph
#[async_trait]
pub trait Node<S: GraphState>: Send + Sync {
    fn name(&self) -> &str;

    /// Compute a patch from the current state
    async fn run(&self, ctx: &RunContext, state: &S) -> Result<S::Patch, NodeError>;
}

/// Adapter turning an async closure into a node
pub struct FnNode<S, F> {
    name: String,
    func: F,
    _state: PhantomData<fn() -> S>,
}

impl<S, F, Fut> FnNode<S, F>
where
    S: GraphState,
    F: Fn(RunContext, S) -> Fut + Send + Sync,
    Fut: Future<Output = Result<S::Patch, NodeError>> + Send,
{
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
            _state: PhantomData,
        }
    }
}

#[async_trait]
impl<S, F, Fut> Node<S> for FnNode<S, F>
where
    S: GraphState,
    F: Fn(RunContext, S) -> Fut + Send + Sync,
    Fut: Future<Output = Result<S::Patch, NodeError>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &RunContext, state: &S) -> Result<S::Patch, NodeError> {
        (self.func)(ctx.clone(), state.clone()).await
    }
}

/// Router function for a conditional edge
pub type RouterFn<S> = Arc<dyn Fn(&S) -> Option<Target> + Send + Sync>;

/// One arm of a condition-expression edge
#[derive(Debug, Clone)]
pub struct Branch {
    pub when: Expression,
    /// Original condition text, kept for logs
    pub source: String,
    pub target: Target,
}

/// Outgoing edge of a node
pub enum Edge<S> {
    /// Always go to the same target
    Static(Target),
    /// Route by a function over the state; `None` means no match
    Router(RouterFn<S>),
    /// First branch whose condition holds on the JSON view of the state
    Branches(Vec<Branch>),
}

impl<S> Clone for Edge<S> {
    fn clone(&self) -> Self {
        match self {
            Edge::Static(t) => Edge::Static(t.clone()),
            Edge::Router(f) => Edge::Router(f.clone()),
            Edge::Branches(b) => Edge::Branches(b.clone()),
        }
    }
}

impl<S> fmt::Debug for Edge<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Edge::Static(t) => write!(f, "Static({})", t),
            Edge::Router(_) => write!(f, "Router(..)"),
            Edge::Branches(b) => f.debug_tuple("Branches").field(b).finish(),
        }
    }
}

/// Progress events emitted while a run executes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    Started { run_id: String },
    NodeStarted { run_id: String, node: String, step: u32 },
    NodeCompleted { run_id: String, node: String, sequence: u64 },
    Suspended { run_id: String, node: String },
    Completed { run_id: String },
    Failed { run_id: String, message: String },
}

impl RunEvent {
    pub fn run_id(&self) -> &str {
        match self {
            RunEvent::Started { run_id }
            | RunEvent::NodeStarted { run_id, .. }
            | RunEvent::NodeCompleted { run_id, .. }
            | RunEvent::Suspended { run_id, .. }
            | RunEvent::Completed { run_id }
            | RunEvent::Failed { run_id, .. } => run_id,
        }
    }

    /// Whether no further events follow for this run
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            RunEvent::Suspended { .. } | RunEvent::Completed { .. } | RunEvent::Failed { .. }
        )
    }
}
