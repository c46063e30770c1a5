// SPDX-License-Identifier: MIT

//! Durable, resumable graph workflows
//!
//! The kit is domain-agnostic: a run state implements `GraphState`, nodes
//! implement `Node`, and `WorkflowEngine` executes the compiled graph with a
//! checkpoint after every node.

pub mod checkpoint;
pub mod condition;
pub mod error;
pub mod graph;
pub mod loader;
pub mod registry;
pub mod state;

pub use checkpoint::{
    Checkpoint, CheckpointKind, CheckpointStore, FileCheckpointStore, InMemoryCheckpointStore,
};
pub use error::{EngineError, FlowError};
pub use graph::{
    CompiledGraph, FnNode, GraphBuilder, Node, NodeError, RunContext, RunEvent, RunSnapshot,
    Target, WorkflowEngine,
};
pub use loader::{GraphDefinition, GraphLoader};
pub use registry::NodeRegistry;
pub use state::{GraphState, RunStatus};
